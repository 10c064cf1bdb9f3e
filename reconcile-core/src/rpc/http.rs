//! JSON-RPC over HTTP transport.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::retry::{RetryConfig, retry_rpc_call};
use super::{RpcCall, RpcTransport};
use crate::error::EngineError;

/// Configuration for the HTTP transport.
#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    /// The JSON-RPC endpoint of the backend.
    pub endpoint: String,
    /// Request timeout.
    pub request_timeout: Duration,
    /// Retry configuration.
    pub retry_config: RetryConfig,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8069/jsonrpc".to_string(),
            request_timeout: Duration::from_secs(30),
            retry_config: RetryConfig::no_retry(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

/// Backend transport speaking JSON-RPC 2.0 over HTTP POST.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    retry_config: RetryConfig,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EngineError::ConfigError(anyhow::Error::new(e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
            retry_config: config.retry_config,
            next_id: AtomicU64::new(1),
        })
    }

    /// Create a transport for the specified endpoint with default settings.
    pub fn connect(endpoint: &str) -> Result<Self, EngineError> {
        Self::new(HttpTransportConfig {
            endpoint: endpoint.to_string(),
            ..Default::default()
        })
    }

    async fn send(&self, body: &Value) -> Result<Value, EngineError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(body)
            .send()
            .await?
            .error_for_status()?;

        let payload: RpcResponse = response.json().await?;

        if let Some(error) = payload.error {
            let message = match error.data {
                Some(data) => data
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or(error.message),
                None => error.message,
            };
            return Err(EngineError::Rpc {
                code: error.code,
                message,
            });
        }

        Ok(payload.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    #[instrument(skip(self, call), fields(operation = %call.operation()))]
    async fn call(&self, call: RpcCall) -> Result<Value, EngineError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "id": id,
            "params": {
                "service": call.service,
                "method": call.method,
                "args": call.args,
                "context": call.context,
            },
        });

        debug!(request_id = id, "Sending backend call");

        retry_rpc_call(&self.retry_config, &call.operation(), || self.send(&body)).await
    }
}
