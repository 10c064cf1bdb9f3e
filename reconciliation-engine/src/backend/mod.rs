//! Typed facade over the accounting backend.
//!
//! Every verb the engine needs is one method here. [`RpcBackend`] maps them
//! onto JSON-RPC calls; tests substitute an in-memory implementation.

mod rpc;

pub use rpc::RpcBackend;

use async_trait::async_trait;
use reconcile_core::error::EngineError;

use crate::models::{
    AccountCode, CandidateQuery, ComputedTaxes, ManualMode, ManualReconciliation, ManualSummary,
    MoveLine, NameGet, PartnerAccounts, RawStatementLine, ReconcileModel, RecordId,
    StatementLineSubmission, StatementSummary, TaxComputation, TaxInfo,
};

#[async_trait]
pub trait Backend: Send + Sync {
    // =========================================================================
    // Working set
    // =========================================================================

    async fn fetch_statement_summary(
        &self,
        line_ids: &[RecordId],
        search_text: Option<&str>,
    ) -> Result<StatementSummary, EngineError>;

    async fn fetch_manual_summary(
        &self,
        mode: ManualMode,
        partner_ids: &[RecordId],
        account_ids: &[RecordId],
    ) -> Result<ManualSummary, EngineError>;

    /// Refreshed statement lines, with proposals that avoid `excluded_ids`.
    async fn fetch_line_details(
        &self,
        line_ids: &[RecordId],
        excluded_ids: &[RecordId],
    ) -> Result<Vec<RawStatementLine>, EngineError>;

    // =========================================================================
    // Reference data
    // =========================================================================

    async fn fetch_reconcile_templates(
        &self,
        company_ids: &[RecordId],
    ) -> Result<Vec<ReconcileModel>, EngineError>;

    async fn fetch_analytic_tags(&self, ids: &[RecordId]) -> Result<Vec<NameGet>, EngineError>;

    async fn fetch_accounts(&self) -> Result<Vec<AccountCode>, EngineError>;

    async fn fetch_taxes(&self) -> Result<Vec<TaxInfo>, EngineError>;

    async fn fetch_partner_accounts(
        &self,
        partner_id: RecordId,
    ) -> Result<PartnerAccounts, EngineError>;

    // =========================================================================
    // Matching
    // =========================================================================

    async fn fetch_bank_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<MoveLine>, EngineError>;

    async fn fetch_manual_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<MoveLine>, EngineError>;

    async fn compute_taxes(&self, request: &TaxComputation) -> Result<ComputedTaxes, EngineError>;

    // =========================================================================
    // Submission and statement housekeeping
    // =========================================================================

    async fn submit_bank_reconciliation(
        &self,
        line_ids: &[RecordId],
        data: &[StatementLineSubmission],
    ) -> Result<(), EngineError>;

    async fn submit_manual_reconciliation(
        &self,
        data: &[ManualReconciliation],
    ) -> Result<(), EngineError>;

    async fn mark_partners_reconciled(&self, partner_ids: &[RecordId]) -> Result<(), EngineError>;

    async fn close_statement(&self, statement_id: RecordId) -> Result<RecordId, EngineError>;

    async fn rename_statement(&self, statement_id: RecordId, name: &str)
        -> Result<(), EngineError>;
}

