//! reconcile-core: Shared infrastructure for the reconciliation engine.
pub mod config;
pub mod error;
pub mod observability;
pub mod rpc;

pub use async_trait;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tracing;
