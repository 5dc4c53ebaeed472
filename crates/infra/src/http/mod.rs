//! HTTP effect execution

pub mod executor;
pub mod request;

pub use executor::{HttpEffectExecutor, HttpEffectExecutorBuilder};
pub use request::{multipart_fields, PreparedBody, PreparedRequest};
