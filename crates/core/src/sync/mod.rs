//! Send pipeline: ports, policies, settlement, the processor and the engine.

pub mod engine;
pub mod policy;
pub mod ports;
pub mod processor;
pub mod settlement;

pub use engine::{OutboxEngine, OutboxEngineBuilder};
pub use policy::{
    retry_policy_from_config, DiscardPolicy, ExponentialRetryPolicy, RetryPolicy,
    ScheduleRetryPolicy, StatusDiscardPolicy,
};
pub use ports::{CancelHandle, DurableStore, EffectExecutor, IntentSink, Scheduler, TimerCallback};
pub use processor::{ProcessorPorts, SendOutcome, SendProcessor};
pub use settlement::{SettlementError, SettlementHandle, SettlementRegistry};
