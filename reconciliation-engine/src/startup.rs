//! Engine assembly from configuration.

use std::sync::Arc;

use reconcile_core::error::EngineError;
use reconcile_core::observability::init_tracing;
use reconcile_core::rpc::HttpTransport;
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, RpcBackend};
use crate::config::EngineConfig;
use crate::engine::ReconciliationEngine;
use crate::policy::{BankPolicy, ManualPolicy, ReconciliationPolicy};
use crate::services::metrics::init_metrics;
use crate::services::CurrencyRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Bank,
    Manual,
}

impl PolicyKind {
    pub fn policy(&self) -> Arc<dyn ReconciliationPolicy> {
        match self {
            PolicyKind::Bank => Arc::new(BankPolicy),
            PolicyKind::Manual => Arc::new(ManualPolicy),
        }
    }
}

/// Install logging and register metrics. Safe to call more than once.
pub fn init_observability(config: &EngineConfig) {
    init_tracing(&config.service_name, &config.log_level);
    init_metrics();
}

/// Engine talking JSON-RPC to the configured backend.
pub fn build_engine(
    config: &EngineConfig,
    kind: PolicyKind,
    currencies: CurrencyRegistry,
) -> Result<ReconciliationEngine, EngineError> {
    let transport = HttpTransport::new(config.transport_config()?)?;
    let backend: Arc<dyn Backend> = Arc::new(RpcBackend::new(transport));

    tracing::info!(
        service_name = %config.service_name,
        policy = ?kind,
        display_qty = config.settings.default_display_qty,
        limit_move_lines = config.settings.limit_move_lines,
        "Building reconciliation engine"
    );

    Ok(ReconciliationEngine::new(
        backend,
        kind.policy(),
        currencies,
        config.settings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, EngineSettings};
    use reconcile_core::config::Config as CommonConfig;

    fn config(url: Option<&str>) -> EngineConfig {
        EngineConfig {
            common: CommonConfig {
                log_level: "info".to_string(),
            },
            service_name: "reconciliation-engine-test".to_string(),
            log_level: "info".to_string(),
            backend: BackendConfig {
                url: url.map(str::to_string),
                timeout_secs: 5,
                max_retries: 0,
            },
            settings: EngineSettings {
                default_display_qty: 5,
                limit_move_lines: 20,
            },
        }
    }

    #[test]
    fn builds_with_configured_settings() {
        let engine = build_engine(
            &config(Some("http://127.0.0.1:8069/jsonrpc")),
            PolicyKind::Manual,
            CurrencyRegistry::default(),
        )
        .unwrap();
        assert_eq!(engine.settings().limit_move_lines, 20);
        assert_eq!(engine.settings().default_display_qty, 5);
    }

    #[test]
    fn missing_backend_url_is_a_config_error() {
        let err = build_engine(&config(None), PolicyKind::Bank, CurrencyRegistry::default())
            .err()
            .unwrap();
        assert_eq!(err.kind(), "config");
    }
}
