//! Configuration module for the reconciliation engine.

use reconcile_core::config as core_config;
use reconcile_core::error::EngineError;
use reconcile_core::rpc::{HttpTransportConfig, RetryConfig};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub backend: BackendConfig,
    pub settings: EngineSettings,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

/// Paging knobs of a reconciliation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Lines formatted per page.
    pub default_display_qty: usize,
    /// Candidates fetched per page.
    pub limit_move_lines: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_display_qty: 10,
            limit_move_lines: 15,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, EngineError> {
        let common = core_config::Config::load()?;
        let defaults = EngineSettings::default();

        Ok(Self {
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "reconciliation-engine".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| common.log_level.clone()),
            common,
            backend: BackendConfig {
                url: env::var("BACKEND_URL").ok(),
                timeout_secs: env::var("BACKEND_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
                max_retries: env::var("BACKEND_MAX_RETRIES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(0),
            },
            settings: EngineSettings {
                default_display_qty: env::var("RECONCILE_DISPLAY_QTY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|qty| *qty > 0)
                    .unwrap_or(defaults.default_display_qty),
                limit_move_lines: env::var("RECONCILE_LIMIT_MOVE_LINES")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|limit| *limit > 0)
                    .unwrap_or(defaults.limit_move_lines),
            },
        })
    }

    /// Transport settings for the configured backend.
    pub fn transport_config(&self) -> Result<HttpTransportConfig, EngineError> {
        let endpoint = self.backend.url.clone().ok_or_else(|| {
            EngineError::ConfigError(anyhow::anyhow!("BACKEND_URL is required"))
        })?;

        let retry_config = if self.backend.max_retries == 0 {
            RetryConfig::no_retry()
        } else {
            RetryConfig::with_max_retries(self.backend.max_retries)
        };

        Ok(HttpTransportConfig {
            endpoint,
            request_timeout: Duration::from_secs(self.backend.timeout_secs),
            retry_config,
        })
    }
}
