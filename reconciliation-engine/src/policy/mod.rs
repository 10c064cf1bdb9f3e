//! Reconciliation policies.
//!
//! The engine is shared between bank statement reconciliation and manual
//! reconciliation of open balances. Everything that differs between the two
//! (where lines and candidates come from, how the balance is classified, how
//! a validated line is submitted) lives behind [`ReconciliationPolicy`].

mod bank;
mod manual;

pub use bank::BankPolicy;
pub use manual::ManualPolicy;

use async_trait::async_trait;
use reconcile_core::error::EngineError;
use rust_decimal::Decimal;

use crate::backend::Backend;
use crate::models::{
    BalanceType, Line, LineHandle, LineSubmission, LoadContext, Mode, MoveLine, NameGet, Proposition,
    RawLine, RecordId, StatementHeader, SubmissionLine, WorkingSet,
};

/// What to do with a freshly loaded line, executed in order by the engine.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormatPlan {
    /// Adopt the partner shared by every pre-proposed match, or refresh the
    /// accounts of the line's own partner.
    pub resolve_partner: bool,
    /// Template to apply as a write-off.
    pub write_off_model: Option<RecordId>,
    /// Partner to fall back to when the line still has none.
    pub fallback_partner: Option<NameGet>,
    pub initial_mode: Option<Mode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagerState {
    pub any_invisible: bool,
    pub pager_index: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapedSubmission {
    pub payload: LineSubmission,
    /// Whether submitting settles the line for good.
    pub settles_line: bool,
}

/// When a submitted line that was not settled upfront counts as reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Immediate,
    WhenNoCandidatesRemain,
}

/// Result of a validation pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidationOutcome {
    /// Lines that were submitted.
    pub handles: Vec<LineHandle>,
    /// Lines now reconciled.
    pub reconciled: Vec<LineHandle>,
    /// Lines submitted but still open.
    pub updated: Vec<LineHandle>,
    /// Partners of the reconciled lines.
    pub partner_ids: Vec<RecordId>,
}

#[async_trait]
pub trait ReconciliationPolicy: Send + Sync {
    /// Label used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn fetch_working_set(
        &self,
        backend: &dyn Backend,
        context: &LoadContext,
    ) -> Result<WorkingSet, EngineError>;

    /// Up-to-date data for the lines about to be shown, in the same order.
    async fn fetch_page_details(
        &self,
        backend: &dyn Backend,
        page: Vec<RawLine>,
        excluded_ids: &[RecordId],
    ) -> Result<Vec<RawLine>, EngineError>;

    async fn fetch_candidates(
        &self,
        backend: &dyn Backend,
        line: &Line,
        excluded_ids: Vec<RecordId>,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<MoveLine>, EngineError>;

    /// `(reconciled, total)` progress right after loading.
    fn progress_bounds(&self, header: &StatementHeader, line_count: usize) -> (u64, u64);

    fn has_more_lines(&self, pager: PagerState) -> bool;

    fn balance_type(
        &self,
        line: &Line,
        amount_currency: Decimal,
        valid: &[&Proposition],
    ) -> BalanceType;

    fn format_plan(&self, line: &Line, raw: &RawLine, context: &LoadContext) -> FormatPlan;

    /// Whether validating a line without any valid proposition writes the
    /// whole balance off to the open-balance account.
    fn write_off_when_empty(&self) -> bool;

    fn shape_submission(
        &self,
        line: &mut Line,
        decimal_places: u32,
    ) -> Result<ShapedSubmission, EngineError>;

    async fn submit(
        &self,
        backend: &dyn Backend,
        payloads: Vec<LineSubmission>,
    ) -> Result<(), EngineError>;

    fn completion(&self) -> Completion;

    async fn after_validation(
        &self,
        _backend: &dyn Backend,
        _outcome: &ValidationOutcome,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    fn is_valid(&self, proposition: &Proposition) -> bool {
        proposition.is_valid()
    }
}

/// Debit/credit form of a proposition. The backend books the counterpart, so
/// the sign is flipped.
pub(crate) fn submission_line(prop: &Proposition) -> SubmissionLine {
    let amount = -prop.effective_amount();
    let mut line = SubmissionLine {
        name: prop.label.clone(),
        debit: if amount > Decimal::ZERO {
            amount
        } else {
            Decimal::ZERO
        },
        credit: if amount < Decimal::ZERO {
            -amount
        } else {
            Decimal::ZERO
        },
        analytic_account_id: prop.analytic_account_id.as_ref().map(|a| a.id),
        analytic_tag_ids: prop.analytic_tag_ids.iter().map(|t| t.id).collect(),
        tax_exigible: prop.tax_exigible,
        reconcile_model_id: prop.reconcile_model_id,
        ..Default::default()
    };

    match prop.id.record_id() {
        Some(id) => line.counterpart_aml_id = Some(id),
        None => {
            line.account_id = prop.account_id.as_ref().map(|a| a.id);
            line.journal_id = prop.journal_id.as_ref().map(|j| j.id);
        }
    }

    if prop.is_tax() {
        line.tax_line_id = prop.tax_ids.first().map(|t| t.id);
    } else {
        line.tax_ids = prop.tax_ids.iter().map(|t| t.id).collect();
    }

    line
}
