//! Validation: shaping lines into submissions and settling them.

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use reconcile_core::error::EngineError;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, instrument, warn};

use super::propositions::quick_create_proposition;
use super::ReconciliationEngine;
use crate::models::{Focus, Line, LineHandle, LineSource, Mode, NameGet, RecordId};
use crate::policy::{Completion, ValidationOutcome};
use crate::services::metrics;

const WRITE_OFF_LABEL: &str = "Write-off";

impl ReconciliationEngine {
    /// Submit one line, or with `None` every open line whose balance is zero
    /// and that holds at least one proposition.
    ///
    /// Settled lines are marked reconciled before the backend answers; if
    /// the submission fails every selected line is restored.
    #[instrument(skip(self), fields(policy = self.policy.name()))]
    pub async fn validate(
        &self,
        handle: Option<LineHandle>,
    ) -> Result<ValidationOutcome, EngineError> {
        let result = self.validate_inner(handle).await;
        self.observe("validate", &result);
        result
    }

    async fn validate_inner(
        &self,
        handle: Option<LineHandle>,
    ) -> Result<ValidationOutcome, EngineError> {
        let mut lines = self.select_for_validation(handle).await?;
        if lines.is_empty() {
            return Ok(ValidationOutcome::default());
        }

        let before: Vec<Line> = lines.iter().map(|line| Line::clone(line)).collect();
        if self.policy.write_off_when_empty() {
            for idx in 0..lines.len() {
                if lines[idx].valid_propositions().next().is_some() {
                    continue;
                }
                if let Err(e) = self.write_off(&mut lines[idx]).await {
                    restore(&mut lines, before);
                    return Err(e);
                }
            }
        }

        let mut submitted_ids: HashSet<RecordId> = HashSet::new();
        let mut payloads = Vec::with_capacity(lines.len());
        let mut settled = vec![false; lines.len()];
        let mut shaping_error = None;
        for (idx, line) in lines.iter_mut().enumerate() {
            submitted_ids.extend(line.claimed_ids());
            let precision = self.currencies.precision(line.currency_id());
            match self.policy.shape_submission(line, precision) {
                Ok(shaped) => {
                    if shaped.settles_line {
                        line.reconciled = true;
                        settled[idx] = true;
                    }
                    payloads.push(shaped.payload);
                }
                Err(e) => {
                    shaping_error = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = shaping_error {
            restore(&mut lines, before);
            return Err(e);
        }
        let optimistic = settled.iter().filter(|s| **s).count() as u64;
        self.valuenow.fetch_add(optimistic, Ordering::SeqCst);

        if let Err(e) = self.policy.submit(&*self.backend, payloads).await {
            warn!(lines = lines.len(), error = %e, "Submission failed, restoring lines");
            restore(&mut lines, before);
            self.valuenow.fetch_sub(optimistic, Ordering::SeqCst);
            return Err(e);
        }

        let mut outcome = ValidationOutcome::default();
        for (idx, line) in lines.iter_mut().enumerate() {
            outcome.handles.push(line.handle);
            let reconciled = settled[idx] || self.complete(line).await?;
            if reconciled {
                outcome.reconciled.push(line.handle);
                if let Some(partner) = &line.partner {
                    if !outcome.partner_ids.contains(&partner.id) {
                        outcome.partner_ids.push(partner.id);
                    }
                }
            } else {
                outcome.updated.push(line.handle);
            }
            self.sync_claims(line);
        }
        drop(lines);

        metrics::record_lines_reconciled(self.policy.name(), outcome.reconciled.len());
        info!(
            submitted = outcome.handles.len(),
            reconciled = outcome.reconciled.len(),
            "Lines validated"
        );

        self.policy
            .after_validation(&*self.backend, &outcome)
            .await?;
        self.forget_submitted(&outcome.handles, &submitted_ids)
            .await;
        Ok(outcome)
    }

    /// Locks of the lines to submit, taken in display order.
    async fn select_for_validation(
        &self,
        handle: Option<LineHandle>,
    ) -> Result<Vec<OwnedMutexGuard<Line>>, EngineError> {
        if let Some(handle) = handle {
            let line = self.line_arc(handle)?.lock_owned().await;
            Self::ensure_open(&line)?;
            return Ok(vec![line]);
        }

        let mut selected = Vec::new();
        for handle in self.handles().await {
            let Ok(line) = self.line_arc(handle) else {
                continue;
            };
            let line = line.lock_owned().await;
            let balanced = self
                .currencies
                .is_zero(line.balance.amount, line.currency_id());
            if !line.reconciled && balanced && !line.reconciliation_proposition.is_empty() {
                selected.push(line);
            }
        }
        Ok(selected)
    }

    /// Book the whole balance on the line's open-balance account.
    async fn write_off(&self, line: &mut Line) -> Result<(), EngineError> {
        let account_id = line.open_balance_account_id.ok_or_else(|| {
            EngineError::bad_request(format!(
                "line {} has no account to write its balance off to",
                line.handle
            ))
        })?;
        let snapshot = self.snapshot().await;
        let context = self.context().await;

        line.blur();
        let mut write_off = quick_create_proposition(
            line,
            None,
            line.balance.amount,
            &snapshot,
            context.as_deref(),
            &self.currencies,
        );
        let code = snapshot.account_code(account_id);
        write_off.account_id = Some(NameGet::new(account_id, code.clone().unwrap_or_default()));
        write_off.account_code = code;
        write_off.focus = Focus::Unfocused;
        write_off.label = match &line.source {
            LineSource::Statement(st_line) if !st_line.name.is_empty() => st_line.name.clone(),
            _ => WRITE_OFF_LABEL.to_string(),
        };
        line.reconciliation_proposition.push(write_off);

        self.compute_line(line).await
    }

    /// Whether a submitted line that was not settled upfront is done.
    async fn complete(&self, line: &mut Line) -> Result<bool, EngineError> {
        match self.policy.completion() {
            Completion::Immediate => {}
            Completion::WhenNoCandidatesRemain => {
                line.filter.clear();
                line.offset = 0;
                line.limit_override = None;
                self.compute_line(line).await?;
                self.perform_move_line(line).await?;
                if !line.mv_lines.is_empty() {
                    line.mode = Mode::Match;
                    return Ok(false);
                }
            }
        }
        line.reconciled = true;
        self.valuenow.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    /// Drop submitted records from the candidates of the other lines.
    async fn forget_submitted(&self, submitted: &[LineHandle], ids: &HashSet<RecordId>) {
        if ids.is_empty() {
            return;
        }
        for handle in self.handles().await {
            if submitted.contains(&handle) {
                continue;
            }
            if let Ok(line) = self.line_arc(handle) {
                line.lock()
                    .await
                    .mv_lines
                    .retain(|candidate| !ids.contains(&candidate.id));
            }
        }
    }
}

fn restore(lines: &mut [OwnedMutexGuard<Line>], before: Vec<Line>) {
    for (line, previous) in lines.iter_mut().zip(before) {
        **line = previous;
    }
}
