//! Remote procedure call plumbing shared by backend facades.
//!
//! The engine talks to its backend through one primitive: call a method of a
//! service with positional arguments and a context object, get JSON back.

pub mod http;
pub mod retry;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::EngineError;

pub use http::{HttpTransport, HttpTransportConfig};
pub use retry::{RetryConfig, is_retryable, retry_rpc_call};

/// A single backend invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcCall {
    pub service: String,
    pub method: String,
    pub args: Vec<Value>,
    pub context: Map<String, Value>,
}

impl RpcCall {
    pub fn new(service: &str, method: &str) -> Self {
        Self {
            service: service.to_string(),
            method: method.to_string(),
            args: Vec::new(),
            context: Map::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg<T: Serialize>(mut self, value: T) -> Result<Self, EngineError> {
        self.args.push(serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context.extend(context);
        self
    }

    /// `service.method`, used as the operation name in logs and metrics.
    pub fn operation(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }
}

#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, call: RpcCall) -> Result<Value, EngineError>;
}
