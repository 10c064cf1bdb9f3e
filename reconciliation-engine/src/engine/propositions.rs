//! Proposition mutations: adding and removing matches, authoring drafts,
//! templates and partial reconciliation.

use chrono::Local;
use reconcile_core::error::EngineError;
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use super::{PartialReconcileOutcome, ReconciliationEngine, Snapshot};
use crate::models::{
    CreateForm, Focus, Line, LineHandle, LoadContext, Many2ManyOp, Mode, Proposition,
    PropositionRef, PropositionUpdate, RecordId, TaxState, TemplateAmount, TemplateLine,
};
use crate::services::CurrencyRegistry;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

impl ReconciliationEngine {
    /// Adopt candidate `record_id` of the line as a proposition.
    #[instrument(skip(self))]
    pub async fn add_proposition(
        &self,
        handle: LineHandle,
        record_id: RecordId,
    ) -> Result<(), EngineError> {
        let result: Result<(), EngineError> = async {
            let line = self.line_arc(handle)?;
            let mut line = line.lock().await;
            Self::ensure_open(&line)?;
            let added = self.add_proposition_inner(&mut line, record_id).await;
            self.sync_claims(&line);
            added
        }
        .await;
        self.observe("add_proposition", &result);
        result
    }

    async fn add_proposition_inner(
        &self,
        line: &mut Line,
        record_id: RecordId,
    ) -> Result<(), EngineError> {
        let idx = line
            .mv_lines
            .iter()
            .position(|candidate| candidate.id == record_id)
            .ok_or_else(|| {
                EngineError::not_found(format!(
                    "{} is not a candidate of line {}",
                    record_id, line.handle
                ))
            })?;
        if !self.claim(record_id, line.handle) {
            return Err(EngineError::bad_request(format!(
                "{} is already proposed on another line",
                record_id
            )));
        }

        let candidate = line.mv_lines.remove(idx);
        line.blur();
        line.reconciliation_proposition
            .push(Proposition::from_candidate(&candidate));
        line.limit_override = Some(self.window_size(line));

        let adopted_partner = match line.reconciliation_proposition.as_slice() {
            [only] if line.partner.is_none() => only.partner_id.clone(),
            _ => None,
        };
        match adopted_partner {
            Some(partner) => {
                debug!(partner = partner.id, "Adopting partner of the first match");
                self.change_partner_inner(line, Some(partner), true).await
            }
            None => {
                self.compute_line(line).await?;
                self.perform_move_line(line).await
            }
        }
    }

    /// Drop a proposition together with the tax lines linked to it.
    #[instrument(skip(self))]
    pub async fn remove_proposition(
        &self,
        handle: LineHandle,
        id: PropositionRef,
    ) -> Result<(), EngineError> {
        let result: Result<(), EngineError> = async {
            let line = self.line_arc(handle)?;
            let mut line = line.lock().await;
            Self::ensure_open(&line)?;
            self.remove_proposition_inner(&mut line, &id).await?;
            self.sync_claims(&line);
            Ok(())
        }
        .await;
        self.observe("remove_proposition", &result);
        result
    }

    async fn remove_proposition_inner(
        &self,
        line: &mut Line,
        id: &PropositionRef,
    ) -> Result<(), EngineError> {
        let removed = line
            .reconciliation_proposition
            .iter()
            .find(|p| &p.id == id)
            .cloned()
            .ok_or_else(|| {
                EngineError::not_found(format!("line {} has no proposition {}", line.handle, id))
            })?;

        line.reconciliation_proposition.retain(|p| {
            p.id != removed.id
                && !p.is_linked_to(&removed)
                && (removed.tax_link.is_none() || p.tax_link != removed.tax_link)
        });
        line.limit_override = Some(self.window_size(line));

        if line.reconciliation_proposition.is_empty() && !line.has_own_partner {
            line.partner = None;
            line.reset_open_balance_account();
        }

        let avoid_create = self
            .context()
            .await
            .is_some_and(|context| context.avoid_create);
        let mode = if id.is_draft() && !avoid_create {
            Mode::Create
        } else {
            Mode::Match
        };

        self.compute_line(line).await?;
        self.change_mode_inner(line, mode).await
    }

    /// Append a blank draft seeded from the remaining balance. Returns false,
    /// leaving the line untouched, while the draft being edited is invalid.
    #[instrument(skip(self))]
    pub async fn create_proposition(&self, handle: LineHandle) -> Result<bool, EngineError> {
        let result: Result<bool, EngineError> = async {
            let line = self.line_arc(handle)?;
            let mut line = line.lock().await;
            Self::ensure_open(&line)?;
            let created = self.create_proposition_inner(&mut line).await?;
            self.sync_claims(&line);
            Ok(created)
        }
        .await;
        self.observe("create_proposition", &result);
        result
    }

    pub(crate) async fn create_proposition_inner(
        &self,
        line: &mut Line,
    ) -> Result<bool, EngineError> {
        if line.focused().is_some_and(|p| !self.policy.is_valid(p)) {
            debug!(line = %line.handle, "Focused draft is incomplete, not creating another");
            return Ok(false);
        }

        for prop in &mut line.reconciliation_proposition {
            prop.focus = Focus::Unfocused;
        }
        let snapshot = self.snapshot().await;
        let context = self.context().await;
        let draft = quick_create_proposition(
            line,
            None,
            line.balance.amount,
            &snapshot,
            context.as_deref(),
            &self.currencies,
        );
        line.create_form = Some(CreateForm::from(&draft));
        line.reconciliation_proposition.push(draft);

        self.compute_line(line).await?;
        Ok(true)
    }

    /// Instantiate the propositions of reconcile model `model_id`.
    #[instrument(skip(self))]
    pub async fn quick_create(
        &self,
        handle: LineHandle,
        model_id: RecordId,
    ) -> Result<(), EngineError> {
        let result: Result<(), EngineError> = async {
            let line = self.line_arc(handle)?;
            let mut line = line.lock().await;
            Self::ensure_open(&line)?;
            self.quick_create_inner(&mut line, model_id).await?;
            self.sync_claims(&line);
            Ok(())
        }
        .await;
        self.observe("quick_create", &result);
        result
    }

    pub(crate) async fn quick_create_inner(
        &self,
        line: &mut Line,
        model_id: RecordId,
    ) -> Result<(), EngineError> {
        let snapshot = self.snapshot().await;
        let template = snapshot.templates.get(&model_id).ok_or_else(|| {
            EngineError::not_found(format!("reconcile model {} does not exist", model_id))
        })?;
        let context = self.context().await;

        line.blur();
        let basis = line.balance.amount;
        let mut first = quick_create_proposition(
            line,
            Some((template.id, &template.primary)),
            basis,
            &snapshot,
            context.as_deref(),
            &self.currencies,
        );
        let first_id = first.id.clone();

        if let Some(second) = &template.second {
            first.focus = Focus::Unfocused;
            line.reconciliation_proposition.push(first);

            let mut second = quick_create_proposition(
                line,
                Some((template.id, second)),
                basis,
                &snapshot,
                context.as_deref(),
                &self.currencies,
            );
            second.focus = Focus::Unfocused;
            line.reconciliation_proposition.push(second);
            balance_template_pair(line, template.id, None);
        } else {
            line.reconciliation_proposition.push(first);
        }

        if let Some(first) = line
            .reconciliation_proposition
            .iter_mut()
            .find(|p| p.id == first_id)
        {
            first.focus = Focus::Focused;
            let mut form = CreateForm::from(&*first);
            form.amount = first.base_amount.unwrap_or(first.amount);
            line.create_form = Some(form);
        }

        info!(line = %line.handle, model = template.id, "Applied reconcile model");
        self.compute_line(line).await
    }

    /// Apply field edits to the focused proposition, creating one first when
    /// nothing is focused.
    #[instrument(skip(self))]
    pub async fn update_proposition(
        &self,
        handle: LineHandle,
        updates: Vec<PropositionUpdate>,
    ) -> Result<(), EngineError> {
        let result: Result<(), EngineError> = async {
            let line = self.line_arc(handle)?;
            let mut line = line.lock().await;
            Self::ensure_open(&line)?;
            self.update_proposition_inner(&mut line, updates).await?;
            self.sync_claims(&line);
            Ok(())
        }
        .await;
        self.observe("update_proposition", &result);
        result
    }

    async fn update_proposition_inner(
        &self,
        line: &mut Line,
        updates: Vec<PropositionUpdate>,
    ) -> Result<(), EngineError> {
        if line.focused_index().is_none() {
            self.create_proposition_inner(line).await?;
        }
        let idx = line.focused_index().ok_or_else(|| {
            EngineError::InternalError(anyhow::anyhow!(
                "line {} has no focused proposition",
                line.handle
            ))
        })?;
        if line.reconciliation_proposition[idx].is_tax() {
            return Err(EngineError::bad_request("tax lines cannot be edited"));
        }

        let snapshot = self.snapshot().await;
        let mut rebalance = None;
        {
            let prop = &mut line.reconciliation_proposition[idx];
            for update in updates {
                match update {
                    PropositionUpdate::Account(account) => {
                        prop.account_code = account.as_ref().and_then(|a| snapshot.account_code(a.id));
                        prop.account_id = account;
                        prop.mark_tax_dirty();
                    }
                    PropositionUpdate::Amount(amount) => {
                        prop.base_amount = Some(amount);
                        prop.amount = amount;
                        prop.mark_tax_dirty();
                        if let Some(model_id) = prop.reconcile_model_id {
                            rebalance = Some((model_id, prop.id.clone()));
                        }
                    }
                    PropositionUpdate::Label(label) => prop.label = label,
                    PropositionUpdate::Date(date) => prop.date = Some(date),
                    PropositionUpdate::Journal(journal) => prop.journal_id = journal,
                    PropositionUpdate::AnalyticAccount(account) => {
                        prop.analytic_account_id = account
                    }
                    PropositionUpdate::AnalyticTags(op) => op.apply(&mut prop.analytic_tag_ids),
                    PropositionUpdate::Taxes(op) => {
                        let adding = matches!(op, Many2ManyOp::Add(_));
                        op.apply(&mut prop.tax_ids);
                        if adding {
                            if let [only] = prop.tax_ids.as_slice() {
                                if snapshot.taxes.get(&only.id).is_some_and(|tax| tax.price_include) {
                                    prop.force_tax_included = true;
                                }
                            }
                        }
                        prop.mark_tax_dirty();
                    }
                    PropositionUpdate::ForceTaxIncluded(force) => {
                        prop.force_tax_included = force;
                        prop.mark_tax_dirty();
                    }
                    PropositionUpdate::ToCheck(to_check) => prop.to_check = to_check,
                }
            }

            // Tax-included amounts only make sense with a single tax.
            if prop.tax_ids.len() != 1 {
                prop.force_tax_included = false;
                if let Some(base) = prop.base_amount {
                    if base != prop.amount {
                        prop.amount = base;
                        prop.mark_tax_dirty();
                    }
                }
            }
        }

        if let Some((model_id, edited)) = rebalance {
            balance_template_pair(line, model_id, Some(&edited));
        }

        let prop = &line.reconciliation_proposition[idx];
        let mut form = CreateForm::from(prop);
        form.amount = prop.base_amount.unwrap_or(prop.amount);
        line.create_form = Some(form);

        self.compute_line(line).await
    }

    /// Settle only part of a proposition. `text` is the amount as typed.
    #[instrument(skip(self))]
    pub async fn partial_reconcile(
        &self,
        handle: LineHandle,
        id: PropositionRef,
        text: String,
    ) -> Result<PartialReconcileOutcome, EngineError> {
        let result: Result<PartialReconcileOutcome, EngineError> = async {
            let line = self.line_arc(handle)?;
            let mut line = line.lock().await;
            Self::ensure_open(&line)?;
            let outcome = self.partial_reconcile_inner(&mut line, &id, &text).await?;
            self.sync_claims(&line);
            Ok(outcome)
        }
        .await;
        self.observe("partial_reconcile", &result);
        result
    }

    async fn partial_reconcile_inner(
        &self,
        line: &mut Line,
        id: &PropositionRef,
        text: &str,
    ) -> Result<PartialReconcileOutcome, EngineError> {
        let currency_id = line.currency_id();
        let handle = line.handle;
        let prop = line
            .reconciliation_proposition
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| {
                EngineError::not_found(format!("line {} has no proposition {}", handle, id))
            })?;

        let outcome = match self.currencies.parse(text, currency_id) {
            Ok(value) if value.is_sign_negative() && !value.is_zero() => {
                PartialReconcileOutcome::Rejected {
                    warning: format!("partial amount {} must not be negative", text.trim()),
                }
            }
            Ok(value) if value.is_zero() || value >= prop.amount.abs() => {
                PartialReconcileOutcome::Cleared
            }
            Ok(value) => PartialReconcileOutcome::Applied(value),
            Err(_) => PartialReconcileOutcome::Rejected {
                warning: format!("'{}' is not a valid amount", text.trim()),
            },
        };

        match &outcome {
            PartialReconcileOutcome::Applied(value) => {
                prop.partial_amount = Some(*value * prop.amount.signum());
                prop.partial_amount_str = Some(self.currencies.format(*value, currency_id));
            }
            PartialReconcileOutcome::Rejected { warning } => {
                warn!(line = %handle, proposition = %id, "{}", warning);
                prop.partial_amount = None;
                prop.partial_amount_str = None;
            }
            PartialReconcileOutcome::Cleared => {
                prop.partial_amount = None;
                prop.partial_amount_str = None;
            }
        }

        self.compute_line(line).await?;
        Ok(outcome)
    }

    /// Suggested partial amount for a proposition of the line.
    pub async fn get_partial_reconcile_amount(
        &self,
        handle: LineHandle,
        id: &PropositionRef,
    ) -> Result<Decimal, EngineError> {
        let line = self.line_arc(handle)?;
        let line = line.lock().await;
        let prop = line
            .reconciliation_proposition
            .iter()
            .find(|p| &p.id == id)
            .ok_or_else(|| {
                EngineError::not_found(format!("line {} has no proposition {}", handle, id))
            })?;
        Ok(partial_reconcile_amount(line.balance.amount, prop))
    }

    /// Candidates already shown to the user, kept stable across add/remove.
    fn window_size(&self, line: &Line) -> u32 {
        line.offset
            .saturating_add(1)
            .saturating_mul(self.settings.limit_move_lines)
    }
}

/// Amount of `prop` that settles the line without pushing its balance past
/// zero.
pub fn partial_reconcile_amount(balance: Decimal, prop: &Proposition) -> Decimal {
    let amount = prop.effective_amount();
    if balance.abs() >= amount.abs() {
        return amount.abs();
    }
    let remaining = (balance + amount).abs();
    if remaining <= prop.amount.abs() {
        remaining
    } else {
        amount.abs()
    }
}

/// Draft proposition seeded from `template`, or a blank one. Percentages and
/// the blank amount are taken from `basis`, the balance before the draft.
pub(super) fn quick_create_proposition(
    line: &Line,
    template: Option<(RecordId, &TemplateLine)>,
    basis: Decimal,
    snapshot: &Snapshot,
    context: Option<&LoadContext>,
    currencies: &CurrencyRegistry,
) -> Proposition {
    let currency_id = line.currency_id();
    let fields = template.map(|(_, fields)| fields);

    let amount = match fields.map(|f| f.amount) {
        Some(TemplateAmount::Percentage(percent)) => {
            currencies.round(basis * percent / HUNDRED, currency_id)
        }
        Some(TemplateAmount::Fixed(amount)) if basis.is_sign_negative() && !basis.is_zero() => {
            -amount.abs()
        }
        Some(TemplateAmount::Fixed(amount)) => amount.abs(),
        None => basis,
    };

    let account_id = fields.and_then(|f| f.account_id.clone());
    let label = fields
        .map(|f| f.label.as_str())
        .filter(|label| !label.is_empty())
        .unwrap_or_else(|| line.source.label())
        .to_string();
    let journal_id = fields
        .and_then(|f| f.journal_id.clone())
        .or_else(|| context.and_then(|c| c.default_journal.clone()));

    Proposition {
        id: PropositionRef::new_draft(),
        label,
        amount,
        amount_str: String::new(),
        base_amount: Some(amount),
        partial_amount: None,
        partial_amount_str: None,
        amount_currency: amount,
        currency_id: None,
        account_code: account_id.as_ref().and_then(|a| snapshot.account_code(a.id)),
        account_id,
        date: Some(Local::now().date_naive()),
        journal_id,
        analytic_account_id: fields.and_then(|f| f.analytic_account_id.clone()),
        analytic_tag_ids: fields.map(|f| f.analytic_tag_ids.clone()).unwrap_or_default(),
        tax_ids: fields.map(|f| f.tax_ids.clone()).unwrap_or_default(),
        tax_link: None,
        tax_exigible: None,
        force_tax_included: fields.is_some_and(|f| f.force_tax_included),
        partner_id: None,
        already_paid: false,
        to_check: fields.is_some_and(|f| f.to_check),
        percent: fields.and_then(|f| f.amount.percent()),
        reconcile_model_id: template.map(|(id, _)| id),
        invalid: false,
        display: false,
        focus: Focus::Focused,
        tax_state: TaxState::PendingTaxRecompute,
    }
}

/// Keep a two-line template that splits 100% exact: one line of the pair
/// absorbs the rounding. `edited` keeps its amount; without it the first line
/// absorbs.
fn balance_template_pair(line: &mut Line, model_id: RecordId, edited: Option<&PropositionRef>) {
    let pair: Vec<usize> = line
        .reconciliation_proposition
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_tax() && p.reconcile_model_id == Some(model_id))
        .map(|(idx, _)| idx)
        .collect();
    let &[first, second] = pair.as_slice() else {
        return;
    };

    let props = &line.reconciliation_proposition;
    let split = props[first].percent.zip(props[second].percent);
    if !matches!(split, Some((a, b)) if a + b == HUNDRED) {
        return;
    }

    let (absorber, kept) = match edited {
        Some(id) if props[first].id == *id => (second, first),
        _ => (first, second),
    };
    let pair_ids = [props[first].id.clone(), props[second].id.clone()];
    let others: Decimal = props
        .iter()
        .filter(|p| !p.invalid)
        .filter(|p| !pair_ids.contains(&p.id))
        .filter(|p| p.tax_link.as_ref().map_or(true, |link| !pair_ids.contains(link)))
        .map(Proposition::effective_amount)
        .sum();
    let basis = line.nominal_amount() - others;
    let kept_amount = props[kept].base_amount.unwrap_or(props[kept].amount);

    let absorber = &mut line.reconciliation_proposition[absorber];
    absorber.base_amount = Some(basis - kept_amount);
    absorber.amount = basis - kept_amount;
    absorber.mark_tax_dirty();
}
