//! Manual reconciliation of open partner and account balances.

use async_trait::async_trait;
use reconcile_core::error::EngineError;
use rust_decimal::Decimal;
use tracing::info;

use super::{
    submission_line, Completion, FormatPlan, PagerState, ReconciliationPolicy, ShapedSubmission,
    ValidationOutcome,
};
use crate::backend::Backend;
use crate::models::{
    BalanceType, CandidateQuery, Line, LineSource, LineSubmission, LoadContext,
    ManualReconciliation, Mode, MoveLine, OpenBalanceKind, Proposition, RawLine,
    ReconciliationTarget, RecordId, StatementHeader, WorkingSet,
};

/// Settles open balances of partners and accounts against each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualPolicy;

#[async_trait]
impl ReconciliationPolicy for ManualPolicy {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn fetch_working_set(
        &self,
        backend: &dyn Backend,
        context: &LoadContext,
    ) -> Result<WorkingSet, EngineError> {
        let ReconciliationTarget::Manual {
            mode,
            partner_ids,
            account_ids,
        } = &context.target
        else {
            return Err(EngineError::bad_request(
                "manual reconciliation needs partners or accounts",
            ));
        };

        let summary = backend
            .fetch_manual_summary(*mode, partner_ids, account_ids)
            .await?;
        let lines: Vec<RawLine> = summary
            .into_open_balances()
            .into_iter()
            .map(RawLine::OpenBalance)
            .collect();

        Ok(WorkingSet {
            header: StatementHeader {
                value_max: lines.len() as u64,
                ..Default::default()
            },
            lines,
        })
    }

    async fn fetch_page_details(
        &self,
        _backend: &dyn Backend,
        page: Vec<RawLine>,
        _excluded_ids: &[RecordId],
    ) -> Result<Vec<RawLine>, EngineError> {
        Ok(page)
    }

    async fn fetch_candidates(
        &self,
        backend: &dyn Backend,
        line: &Line,
        excluded_ids: Vec<RecordId>,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<MoveLine>, EngineError> {
        let LineSource::OpenBalance(open) = &line.source else {
            return Err(EngineError::bad_request(format!(
                "line {} is not an open balance",
                line.handle
            )));
        };
        let query = CandidateQuery {
            record_id: open.account_id.id,
            partner_id: line.partner.as_ref().map(|p| p.id),
            excluded_ids,
            filter: line.filter.clone(),
            offset,
            limit,
        };
        backend.fetch_manual_candidates(&query).await
    }

    fn progress_bounds(&self, _header: &StatementHeader, line_count: usize) -> (u64, u64) {
        (0, line_count as u64)
    }

    fn has_more_lines(&self, pager: PagerState) -> bool {
        pager.pager_index < pager.total
    }

    fn balance_type(
        &self,
        _line: &Line,
        amount_currency: Decimal,
        valid: &[&Proposition],
    ) -> BalanceType {
        if amount_currency.is_zero() && !valid.is_empty() {
            return BalanceType::Balanced;
        }
        let has_debit = valid.iter().any(|p| p.amount > Decimal::ZERO);
        let has_credit = valid.iter().any(|p| p.amount < Decimal::ZERO);
        if has_debit && has_credit {
            BalanceType::PartiallyMatched
        } else {
            BalanceType::Unbalanced
        }
    }

    fn format_plan(&self, _line: &Line, _raw: &RawLine, _context: &LoadContext) -> FormatPlan {
        FormatPlan {
            initial_mode: Some(Mode::Match),
            ..Default::default()
        }
    }

    fn write_off_when_empty(&self) -> bool {
        false
    }

    fn shape_submission(
        &self,
        line: &mut Line,
        _decimal_places: u32,
    ) -> Result<ShapedSubmission, EngineError> {
        let kind = match &line.source {
            LineSource::OpenBalance(open) => open.kind,
            LineSource::Statement(_) => OpenBalanceKind::Account,
        };
        let mut payload = ManualReconciliation {
            id: line.id,
            kind: kind.reconciliation_type().to_string(),
            mv_line_ids: Vec::new(),
            new_mv_line_dicts: Vec::new(),
        };

        if line.valid_propositions().next().is_none() {
            line.reconciliation_proposition.clear();
            line.create_form = None;
            return Ok(ShapedSubmission {
                payload: LineSubmission::Manual(payload),
                settles_line: true,
            });
        }

        for prop in line.valid_propositions() {
            match prop.id.record_id() {
                Some(id) => payload.mv_line_ids.push(id),
                None if prop.display => payload.new_mv_line_dicts.push(submission_line(prop)),
                None => {}
            }
        }
        line.reconciliation_proposition.clear();
        line.create_form = None;

        Ok(ShapedSubmission {
            payload: LineSubmission::Manual(payload),
            settles_line: false,
        })
    }

    async fn submit(
        &self,
        backend: &dyn Backend,
        payloads: Vec<LineSubmission>,
    ) -> Result<(), EngineError> {
        let data: Vec<ManualReconciliation> = payloads
            .into_iter()
            .filter_map(|payload| match payload {
                LineSubmission::Manual(data) => Some(data),
                LineSubmission::Statement { .. } => None,
            })
            .collect();
        if data.is_empty() {
            return Ok(());
        }
        backend.submit_manual_reconciliation(&data).await
    }

    fn completion(&self) -> Completion {
        Completion::WhenNoCandidatesRemain
    }

    async fn after_validation(
        &self,
        backend: &dyn Backend,
        outcome: &ValidationOutcome,
    ) -> Result<(), EngineError> {
        if outcome.partner_ids.is_empty() {
            return Ok(());
        }
        info!(
            partners = outcome.partner_ids.len(),
            "Marking partners as reconciled"
        );
        backend.mark_partners_reconciled(&outcome.partner_ids).await
    }
}
