//! Reading the persisted outbox snapshot back at startup.

use outpost_domain::{OutpostError, PersistedOutbox, Result};
use tracing::{debug, warn};

use crate::sync::ports::DurableStore;

/// Load the snapshot stored under `key`.
///
/// Read failures are errors. A snapshot that cannot be decoded is logged and
/// treated as absent so a damaged file never prevents startup.
pub async fn read_snapshot(store: &dyn DurableStore, key: &str) -> Result<Option<PersistedOutbox>> {
    let raw = store
        .get(key)
        .await
        .map_err(|err| OutpostError::Persistence(format!("failed to read {key}: {err}")))?;

    let Some(raw) = raw else {
        debug!(key, "No outbox snapshot found");
        return Ok(None);
    };

    match serde_json::from_str::<PersistedOutbox>(&raw) {
        Ok(persisted) => Ok(Some(persisted)),
        Err(err) => {
            warn!(key, error = %err, "Ignoring corrupt outbox snapshot");
            Ok(None)
        }
    }
}
