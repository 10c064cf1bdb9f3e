//! JSON-RPC implementation of the backend facade.

use std::time::Instant;

use async_trait::async_trait;
use reconcile_core::error::EngineError;
use reconcile_core::rpc::{RpcCall, RpcTransport};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use super::Backend;
use crate::models::{
    AccountCode, CandidateQuery, ComputedTaxes, ManualMode, ManualReconciliation, ManualSummary,
    MoveLine, NameGet, PartnerAccounts, RawStatementLine, ReconcileModel, RecordId,
    StatementLineSubmission, StatementSummary, TaxComputation, TaxInfo,
};
use crate::services::metrics;

const WIDGET: &str = "account.reconciliation.widget";
const RECONCILE_MODEL: &str = "account.reconcile.model";
const ANALYTIC_TAG: &str = "account.analytic.tag";
const ACCOUNT: &str = "account.account";
const TAX: &str = "account.tax";
const PARTNER: &str = "res.partner";
const STATEMENT: &str = "account.bank.statement";

/// Backend reached through an [`RpcTransport`].
pub struct RpcBackend<T> {
    transport: T,
    context: Map<String, Value>,
}

impl<T: RpcTransport> RpcBackend<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            context: Map::new(),
        }
    }

    /// Context merged into every call (language, company, ...).
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    async fn invoke<R: DeserializeOwned>(&self, call: RpcCall) -> Result<R, EngineError> {
        let method = call.method.clone();
        let call = call.with_context(self.context.clone());
        let start = Instant::now();

        let result = self.transport.call(call).await;
        metrics::record_backend_call_duration(&method, start.elapsed().as_secs_f64());

        match result {
            Ok(value) => {
                metrics::record_backend_call(&method, "ok");
                Ok(serde_json::from_value(value)?)
            }
            Err(e) => {
                metrics::record_backend_call(&method, e.kind());
                Err(e)
            }
        }
    }

    async fn invoke_unit(&self, call: RpcCall) -> Result<(), EngineError> {
        self.invoke::<Value>(call).await.map(|_| ())
    }
}

#[async_trait]
impl<T: RpcTransport> Backend for RpcBackend<T> {
    #[instrument(skip(self, line_ids), fields(lines = line_ids.len()))]
    async fn fetch_statement_summary(
        &self,
        line_ids: &[RecordId],
        search_text: Option<&str>,
    ) -> Result<StatementSummary, EngineError> {
        let call = RpcCall::new(WIDGET, "get_bank_statement_data")
            .arg(line_ids)?
            .arg(search_text)?;
        self.invoke(call).await
    }

    #[instrument(skip(self, partner_ids, account_ids), fields(mode = mode.as_str()))]
    async fn fetch_manual_summary(
        &self,
        mode: ManualMode,
        partner_ids: &[RecordId],
        account_ids: &[RecordId],
    ) -> Result<ManualSummary, EngineError> {
        let call = RpcCall::new(WIDGET, "get_data_for_manual_reconciliation_widget")
            .arg(partner_ids)?
            .arg(account_ids)?
            .arg(mode.as_str())?;
        self.invoke(call).await
    }

    #[instrument(skip(self, line_ids, excluded_ids), fields(lines = line_ids.len()))]
    async fn fetch_line_details(
        &self,
        line_ids: &[RecordId],
        excluded_ids: &[RecordId],
    ) -> Result<Vec<RawStatementLine>, EngineError> {
        let call = RpcCall::new(WIDGET, "get_bank_statement_line_data")
            .arg(line_ids)?
            .arg(excluded_ids)?;
        self.invoke(call).await
    }

    #[instrument(skip(self))]
    async fn fetch_reconcile_templates(
        &self,
        company_ids: &[RecordId],
    ) -> Result<Vec<ReconcileModel>, EngineError> {
        let domain = if company_ids.is_empty() {
            json!([])
        } else {
            json!([["company_id", "in", company_ids]])
        };
        let call = RpcCall::new(RECONCILE_MODEL, "search_read").arg(domain)?;
        self.invoke(call).await
    }

    #[instrument(skip(self))]
    async fn fetch_analytic_tags(&self, ids: &[RecordId]) -> Result<Vec<NameGet>, EngineError> {
        let call = RpcCall::new(ANALYTIC_TAG, "read")
            .arg(ids)?
            .arg(["display_name"])?;
        self.invoke(call).await
    }

    #[instrument(skip(self))]
    async fn fetch_accounts(&self) -> Result<Vec<AccountCode>, EngineError> {
        let call = RpcCall::new(ACCOUNT, "search_read")
            .arg(json!([]))?
            .arg(["code"])?;
        self.invoke(call).await
    }

    #[instrument(skip(self))]
    async fn fetch_taxes(&self) -> Result<Vec<TaxInfo>, EngineError> {
        let call = RpcCall::new(TAX, "search_read")
            .arg(json!([]))?
            .arg(["price_include", "name"])?;
        self.invoke(call).await
    }

    #[instrument(skip(self))]
    async fn fetch_partner_accounts(
        &self,
        partner_id: RecordId,
    ) -> Result<PartnerAccounts, EngineError> {
        let call = RpcCall::new(PARTNER, "get_reconciliation_accounts").arg(partner_id)?;
        self.invoke(call).await
    }

    #[instrument(skip(self, query), fields(record_id = query.record_id, offset = query.offset, limit = query.limit))]
    async fn fetch_bank_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<MoveLine>, EngineError> {
        let call = RpcCall::new(WIDGET, "get_move_lines_for_bank_statement_line")
            .arg(query.record_id)?
            .arg(query.partner_id)?
            .arg(&query.excluded_ids)?
            .arg(&query.filter)?
            .arg(query.offset)?
            .arg(query.limit)?;
        self.invoke(call).await
    }

    #[instrument(skip(self, query), fields(record_id = query.record_id, offset = query.offset, limit = query.limit))]
    async fn fetch_manual_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<MoveLine>, EngineError> {
        let call = RpcCall::new(WIDGET, "get_move_lines_for_manual_reconciliation")
            .arg(query.record_id)?
            .arg(query.partner_id)?
            .arg(&query.excluded_ids)?
            .arg(&query.filter)?
            .arg(query.offset)?
            .arg(query.limit)?;
        self.invoke(call).await
    }

    #[instrument(skip(self, request), fields(taxes = request.tax_ids.len()))]
    async fn compute_taxes(&self, request: &TaxComputation) -> Result<ComputedTaxes, EngineError> {
        let mut context = Map::new();
        context.insert("round".into(), Value::Bool(request.round));
        if let Some(force) = request.force_price_include {
            context.insert("force_price_include".into(), Value::Bool(force));
        }
        let call = RpcCall::new(TAX, "json_friendly_compute_all")
            .arg(&request.tax_ids)?
            .arg(request.base_amount)?
            .arg(request.currency_id)?
            .with_context(context);
        self.invoke(call).await
    }

    #[instrument(skip(self, line_ids, data), fields(lines = line_ids.len()))]
    async fn submit_bank_reconciliation(
        &self,
        line_ids: &[RecordId],
        data: &[StatementLineSubmission],
    ) -> Result<(), EngineError> {
        let call = RpcCall::new(WIDGET, "process_bank_statement_line")
            .arg(line_ids)?
            .arg(data)?;
        debug!("Submitting bank reconciliation");
        self.invoke_unit(call).await
    }

    #[instrument(skip(self, data), fields(lines = data.len()))]
    async fn submit_manual_reconciliation(
        &self,
        data: &[ManualReconciliation],
    ) -> Result<(), EngineError> {
        let call = RpcCall::new(WIDGET, "process_move_lines").arg(data)?;
        debug!("Submitting manual reconciliation");
        self.invoke_unit(call).await
    }

    #[instrument(skip(self))]
    async fn mark_partners_reconciled(&self, partner_ids: &[RecordId]) -> Result<(), EngineError> {
        let call = RpcCall::new(PARTNER, "mark_as_reconciled").arg(partner_ids)?;
        self.invoke_unit(call).await
    }

    #[instrument(skip(self))]
    async fn close_statement(&self, statement_id: RecordId) -> Result<RecordId, EngineError> {
        let call = RpcCall::new(STATEMENT, "button_confirm_bank").arg([statement_id])?;
        self.invoke_unit(call).await?;
        Ok(statement_id)
    }

    #[instrument(skip(self))]
    async fn rename_statement(&self, statement_id: RecordId, name: &str) -> Result<(), EngineError> {
        let call = RpcCall::new(STATEMENT, "write")
            .arg([statement_id])?
            .arg(json!({ "name": name }))?;
        self.invoke_unit(call).await
    }
}
