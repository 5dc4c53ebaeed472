//! Wiring for a complete outbox: engine, persistence, connectivity.

use std::sync::Arc;

use outpost_core::sync::{retry_policy_from_config, StatusDiscardPolicy};
use outpost_core::{
    ConnectionQualityProbe, ConnectivityMonitor, DurableStore, EffectExecutor, IntentSink,
    OutboxEngine, ReachabilitySource,
};
use outpost_domain::{EngineConfig, OutpostError, Result};
use tracing::{info, instrument, warn};

use crate::database::{DbManager, SqliteKeyValueStore};
use crate::http::HttpEffectExecutor;
use crate::platform::{ChannelReachabilitySource, HttpReachabilityProbe, UnsupportedQualityProbe};
use crate::scheduling::TokioScheduler;

/// A running outbox and everything it depends on.
pub struct OutboxContext {
    pub config: EngineConfig,
    pub engine: Arc<OutboxEngine>,
    pub store: Option<Arc<dyn DurableStore>>,
    monitor: ConnectivityMonitor,
    probe: Option<Arc<HttpReachabilityProbe>>,
    channel: Option<Arc<ChannelReachabilitySource>>,
}

impl OutboxContext {
    pub fn builder(config: EngineConfig, sink: Arc<dyn IntentSink>) -> OutboxContextBuilder {
        OutboxContextBuilder {
            config,
            sink,
            executor: None,
            store: None,
            reachability: None,
            quality: None,
        }
    }

    /// Start the send loop, the connectivity monitor and, if configured,
    /// reachability polling.
    #[instrument(skip(self))]
    pub fn start(&self) -> Result<()> {
        self.engine.start()?;
        self.monitor.start(self.engine.connectivity_callback())?;
        if let Some(probe) = &self.probe {
            probe.start_polling()?;
        }
        info!("Outbox context started");
        Ok(())
    }

    /// Stop everything started by [`start`](Self::start). Every component is
    /// stopped even if an earlier one fails; the first error is returned.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> Result<()> {
        let mut first_error = None;

        if let Some(probe) = &self.probe {
            if probe.is_polling() {
                if let Err(err) = probe.stop_polling().await {
                    warn!(error = %err, "Failed to stop reachability polling");
                    first_error.get_or_insert(err);
                }
            }
        }
        if self.monitor.is_running() {
            if let Err(err) = self.monitor.stop().await {
                warn!(error = %err, "Failed to stop connectivity monitor");
                first_error.get_or_insert(err);
            }
        }
        if self.engine.is_running() {
            if let Err(err) = self.engine.stop().await {
                warn!(error = %err, "Failed to stop outbox engine");
                first_error.get_or_insert(err);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Push-based reachability source, present when no other source was
    /// configured. Platform glue reports into it.
    pub fn reachability_channel(&self) -> Option<&Arc<ChannelReachabilitySource>> {
        self.channel.as_ref()
    }

    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }
}

/// Builder for [`OutboxContext`]. Anything not supplied is built from the
/// configuration.
pub struct OutboxContextBuilder {
    config: EngineConfig,
    sink: Arc<dyn IntentSink>,
    executor: Option<Arc<dyn EffectExecutor>>,
    store: Option<Arc<dyn DurableStore>>,
    reachability: Option<Arc<dyn ReachabilitySource>>,
    quality: Option<Arc<dyn ConnectionQualityProbe>>,
}

impl OutboxContextBuilder {
    pub fn executor(mut self, executor: Arc<dyn EffectExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Use `store` instead of opening the configured SQLite database.
    pub fn durable_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn reachability(mut self, source: Arc<dyn ReachabilitySource>) -> Self {
        self.reachability = Some(source);
        self
    }

    pub fn quality(mut self, probe: Arc<dyn ConnectionQualityProbe>) -> Self {
        self.quality = Some(probe);
        self
    }

    /// Build the context and rehydrate the outbox. Nothing runs until
    /// [`OutboxContext::start`].
    #[instrument(skip(self))]
    pub async fn build(self) -> Result<OutboxContext> {
        let config = self.config;

        let executor = match self.executor {
            Some(executor) => executor,
            None => Arc::new(HttpEffectExecutor::from_config(&config.executor)?),
        };

        let store = match self.store {
            Some(store) => Some(store),
            None if config.persistence.enabled => Some(open_sqlite_store(&config).await?),
            None => None,
        };

        let mut builder = OutboxEngine::builder(executor, self.sink)
            .discard_policy(Arc::new(StatusDiscardPolicy::new(&config.discard)))
            .retry_policy(Arc::from(retry_policy_from_config(&config.retry)))
            .scheduler(Arc::new(TokioScheduler::new()?));
        if let Some(store) = &store {
            builder = builder.durable_store(
                Arc::clone(store),
                config.persistence.key.clone(),
                config.persistence.snapshot,
            );
        }
        let engine = Arc::new(builder.build()?);
        let restored = engine.rehydrate().await?;

        let mut probe = None;
        let mut channel = None;
        let source: Arc<dyn ReachabilitySource> = match self.reachability {
            Some(source) => source,
            None => match HttpReachabilityProbe::from_config(&config.connectivity)? {
                Some(http) => {
                    let http = Arc::new(http);
                    probe = Some(Arc::clone(&http));
                    http
                }
                None => {
                    let pushed = Arc::new(ChannelReachabilitySource::default());
                    channel = Some(Arc::clone(&pushed));
                    pushed
                }
            },
        };
        let quality = self.quality.unwrap_or_else(|| Arc::new(UnsupportedQualityProbe));
        let monitor = ConnectivityMonitor::new(source, quality, &config.connectivity);

        info!(
            restored,
            persistence = store.is_some(),
            http_probe = probe.is_some(),
            "Outbox context built"
        );

        Ok(OutboxContext { config, engine, store, monitor, probe, channel })
    }
}

async fn open_sqlite_store(config: &EngineConfig) -> Result<Arc<dyn DurableStore>> {
    let persistence = config.persistence.clone();
    tokio::task::spawn_blocking(move || {
        let manager = DbManager::new(
            &persistence.db_path,
            persistence.pool_size,
            persistence.encryption_key.as_deref(),
        )?;
        let store: Arc<dyn DurableStore> = Arc::new(SqliteKeyValueStore::new(Arc::new(manager))?);
        Ok(store)
    })
    .await
    .map_err(|e| OutpostError::Internal(format!("opening the outbox database failed: {e}")))?
}
