//! Bank statement reconciliation.

use std::collections::HashMap;

use async_trait::async_trait;
use reconcile_core::error::EngineError;
use rust_decimal::Decimal;
use tracing::debug;

use super::{
    submission_line, Completion, FormatPlan, PagerState, ReconciliationPolicy, ShapedSubmission,
};
use crate::backend::Backend;
use crate::models::{
    BalanceType, CandidateQuery, Line, LineSource, LineSubmission, LoadContext,
    ReconciliationTarget, MoveLine, Proposition, RawLine, RecordId, StatementHeader,
    StatementLineSubmission, SubmissionLine, WorkingSet,
};
use crate::services::is_zero;

/// Matches bank statement lines against open journal items.
#[derive(Debug, Clone, Copy, Default)]
pub struct BankPolicy;

#[async_trait]
impl ReconciliationPolicy for BankPolicy {
    fn name(&self) -> &'static str {
        "bank"
    }

    async fn fetch_working_set(
        &self,
        backend: &dyn Backend,
        context: &LoadContext,
    ) -> Result<WorkingSet, EngineError> {
        let ReconciliationTarget::Statement { statement_line_ids } = &context.target else {
            return Err(EngineError::bad_request(
                "bank reconciliation needs statement lines",
            ));
        };

        let summary = backend
            .fetch_statement_summary(statement_line_ids, context.search_text.as_deref())
            .await?;

        Ok(WorkingSet {
            header: summary.header,
            lines: summary.lines.into_iter().map(RawLine::Statement).collect(),
        })
    }

    async fn fetch_page_details(
        &self,
        backend: &dyn Backend,
        page: Vec<RawLine>,
        excluded_ids: &[RecordId],
    ) -> Result<Vec<RawLine>, EngineError> {
        let ids: Vec<RecordId> = page.iter().map(RawLine::record_id).collect();
        let mut fresh: HashMap<RecordId, RawLine> = backend
            .fetch_line_details(&ids, excluded_ids)
            .await?
            .into_iter()
            .map(|raw| (raw.st_line.id, RawLine::Statement(raw)))
            .collect();

        debug!(requested = ids.len(), received = fresh.len(), "Fetched line details");

        Ok(page
            .into_iter()
            .map(|cached| fresh.remove(&cached.record_id()).unwrap_or(cached))
            .collect())
    }

    async fn fetch_candidates(
        &self,
        backend: &dyn Backend,
        line: &Line,
        excluded_ids: Vec<RecordId>,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<MoveLine>, EngineError> {
        let query = CandidateQuery {
            record_id: line.id,
            partner_id: line.partner.as_ref().map(|p| p.id),
            excluded_ids,
            filter: line.filter.clone(),
            offset,
            limit,
        };
        backend.fetch_bank_candidates(&query).await
    }

    fn progress_bounds(&self, header: &StatementHeader, _line_count: usize) -> (u64, u64) {
        (header.value_min, header.value_max)
    }

    fn has_more_lines(&self, pager: PagerState) -> bool {
        pager.any_invisible
    }

    fn balance_type(
        &self,
        line: &Line,
        amount_currency: Decimal,
        _valid: &[&Proposition],
    ) -> BalanceType {
        if amount_currency.is_zero() {
            BalanceType::Balanced
        } else if line.partner.is_some() {
            BalanceType::PartiallyMatched
        } else {
            BalanceType::Unbalanced
        }
    }

    fn format_plan(&self, _line: &Line, raw: &RawLine, context: &LoadContext) -> FormatPlan {
        FormatPlan {
            resolve_partner: true,
            write_off_model: raw.write_off_model(),
            fallback_partner: context.partner.clone(),
            initial_mode: None,
        }
    }

    fn write_off_when_empty(&self) -> bool {
        true
    }

    fn shape_submission(
        &self,
        line: &mut Line,
        decimal_places: u32,
    ) -> Result<ShapedSubmission, EngineError> {
        let mut data = StatementLineSubmission {
            partner_id: line.partner.as_ref().map(|p| p.id),
            to_check: line.to_check,
            ..Default::default()
        };

        for prop in line.valid_propositions() {
            match prop.id.record_id() {
                Some(id) if prop.already_paid => data.payment_aml_ids.push(id),
                Some(_) => data.counterpart_aml_dicts.push(submission_line(prop)),
                None if prop.display => data.new_aml_dicts.push(submission_line(prop)),
                None => {}
            }
        }

        if !is_zero(line.balance.amount, decimal_places) {
            let account_id = line.open_balance_account_id.ok_or_else(|| {
                EngineError::bad_request(format!(
                    "line {} has an open balance but no account to book it on",
                    line.handle
                ))
            })?;
            let label = match &line.source {
                LineSource::Statement(st_line) => st_line.name.as_str(),
                LineSource::OpenBalance(_) => "",
            };
            let residual = -line.balance.amount;
            data.new_aml_dicts.push(SubmissionLine {
                name: format!("{} : Open balance", label),
                debit: residual.max(Decimal::ZERO),
                credit: (-residual).max(Decimal::ZERO),
                account_id: Some(account_id),
                ..Default::default()
            });
        }

        Ok(ShapedSubmission {
            payload: LineSubmission::Statement {
                line_id: line.id,
                data,
            },
            settles_line: true,
        })
    }

    async fn submit(
        &self,
        backend: &dyn Backend,
        payloads: Vec<LineSubmission>,
    ) -> Result<(), EngineError> {
        let mut line_ids = Vec::with_capacity(payloads.len());
        let mut data = Vec::with_capacity(payloads.len());
        for payload in payloads {
            if let LineSubmission::Statement { line_id, data: line } = payload {
                line_ids.push(line_id);
                data.push(line);
            }
        }
        if line_ids.is_empty() {
            return Ok(());
        }
        backend.submit_bank_reconciliation(&line_ids, &data).await
    }

    fn completion(&self) -> Completion {
        Completion::Immediate
    }
}
