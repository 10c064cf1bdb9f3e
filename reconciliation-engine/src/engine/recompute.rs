//! Line recomputation: tax breakdown, display fields and balance.

use std::collections::HashSet;

use futures::future::try_join_all;
use reconcile_core::error::EngineError;
use rust_decimal::prelude::Signed;
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use super::{ReconciliationEngine, Snapshot};
use crate::models::{
    Balance, ComputedTax, ComputedTaxes, Line, NameGet, Proposition, PropositionRef, RecordId,
    TaxComputation, TaxState,
};
use crate::policy::ReconciliationPolicy;
use crate::services::{metrics, CurrencyRegistry};

impl ReconciliationEngine {
    /// Recompute `line` from its proposition list. Tax computations for every
    /// dirty proposition run concurrently; the line is only touched once all
    /// of them succeeded.
    #[instrument(skip(self, line), fields(line = %line.handle))]
    pub(crate) async fn compute_line(&self, line: &mut Line) -> Result<(), EngineError> {
        let snapshot = self.snapshot().await;

        let dirty_parents: HashSet<PropositionRef> = line
            .reconciliation_proposition
            .iter()
            .filter(|p| !p.is_tax() && p.needs_tax_recompute())
            .map(|p| p.id.clone())
            .collect();

        // Tax children of a dirty parent are regenerated below.
        let mut props: Vec<Proposition> = line
            .reconciliation_proposition
            .iter()
            .filter(|p| {
                p.tax_link
                    .as_ref()
                    .map_or(true, |parent| !dirty_parents.contains(parent))
            })
            .cloned()
            .collect();

        let requests: Vec<(usize, TaxComputation)> = props
            .iter()
            .enumerate()
            .filter_map(|(idx, prop)| tax_request(prop, line.currency_id()).map(|req| (idx, req)))
            .collect();

        let computed = if requests.is_empty() {
            Vec::new()
        } else {
            debug!(requests = requests.len(), "Computing taxes");
            let result = try_join_all(
                requests
                    .iter()
                    .map(|(_, request)| self.backend.compute_taxes(request)),
            )
            .await;
            metrics::record_tax_computation(if result.is_ok() { "ok" } else { "error" });
            result?
        };

        let mut children: Vec<(usize, Vec<Proposition>)> = Vec::with_capacity(computed.len());
        for ((idx, _), result) in requests.iter().zip(computed) {
            let parent = &mut props[*idx];
            children.push((*idx, tax_children(parent, &result, &snapshot)));
            parent.amount = result.base;
        }

        // Splice children right after their parent, back to front.
        for (idx, taxes) in children.into_iter().rev() {
            let at = idx + 1;
            props.splice(at..at, taxes);
        }

        for prop in &mut props {
            prop.tax_state = TaxState::Clean;
            self.decorate(prop, line.currency_id());
        }

        line.reconciliation_proposition = props;
        line.to_check = line.reconciliation_proposition.iter().any(|p| p.to_check);
        line.balance = compute_balance(line, &*self.policy, &self.currencies, &snapshot);

        debug!(
            balance = %line.balance.amount,
            balance_type = line.balance.balance_type.code(),
            propositions = line.reconciliation_proposition.len(),
            "Line recomputed"
        );
        Ok(())
    }

    fn decorate(&self, prop: &mut Proposition, currency_id: Option<RecordId>) {
        prop.amount_str = self.currencies.format(prop.amount.abs(), currency_id);
        prop.invalid = !self.policy.is_valid(prop);
        prop.display = prop.is_displayed();
    }
}

/// Tax computation needed for `prop`, if any.
fn tax_request(prop: &Proposition, currency_id: Option<RecordId>) -> Option<TaxComputation> {
    let base_amount = prop.base_amount?;
    if prop.is_tax() || !prop.needs_tax_recompute() || prop.tax_ids.is_empty() || base_amount.is_zero()
    {
        return None;
    }
    Some(TaxComputation {
        tax_ids: prop.tax_ids.iter().map(|t| t.id).collect(),
        base_amount,
        currency_id,
        round: true,
        force_price_include: (prop.tax_ids.len() == 1 && prop.force_tax_included).then_some(true),
    })
}

fn tax_children(parent: &Proposition, result: &ComputedTaxes, snapshot: &Snapshot) -> Vec<Proposition> {
    result
        .taxes
        .iter()
        .map(|tax| tax_child(parent, tax, snapshot))
        .collect()
}

fn tax_child(parent: &Proposition, tax: &ComputedTax, snapshot: &Snapshot) -> Proposition {
    let (account_id, account_code) = match tax.account_id {
        Some(id) => {
            let code = snapshot.account_code(id);
            (
                Some(NameGet::new(id, code.clone().unwrap_or_default())),
                code,
            )
        }
        None => (parent.account_id.clone(), parent.account_code.clone()),
    };
    let label = if parent.label.is_empty() {
        tax.name.clone()
    } else {
        format!("{} {}", parent.label, tax.name)
    };

    Proposition {
        id: PropositionRef::new_draft(),
        label,
        amount: tax.amount,
        amount_str: String::new(),
        base_amount: None,
        partial_amount: None,
        partial_amount_str: None,
        amount_currency: tax.amount,
        currency_id: parent.currency_id,
        account_id,
        account_code,
        date: parent.date,
        journal_id: parent.journal_id.clone(),
        analytic_account_id: tax
            .analytic
            .then(|| parent.analytic_account_id.clone())
            .flatten(),
        analytic_tag_ids: if tax.analytic {
            parent.analytic_tag_ids.clone()
        } else {
            Vec::new()
        },
        tax_ids: vec![NameGet::new(tax.id, tax.name.clone())],
        tax_link: Some(parent.id.clone()),
        tax_exigible: tax.exigible_on_payment().then_some(true),
        force_tax_included: false,
        partner_id: None,
        already_paid: false,
        to_check: false,
        percent: None,
        reconcile_model_id: parent.reconcile_model_id,
        invalid: false,
        display: false,
        focus: Default::default(),
        tax_state: TaxState::Clean,
    }
}

/// Residual of `line` given its current (decorated) propositions.
pub(crate) fn compute_balance(
    line: &Line,
    policy: &dyn ReconciliationPolicy,
    currencies: &CurrencyRegistry,
    snapshot: &Snapshot,
) -> Balance {
    let line_currency = line.currency_id();
    let nominal = line.nominal_amount();
    let valid: Vec<&Proposition> = line.valid_propositions().collect();

    let offset: Decimal = valid.iter().map(|p| p.effective_amount()).sum();
    let total = currencies.round(nominal - offset, line_currency);

    let foreign: HashSet<RecordId> = valid.iter().filter_map(|p| p.currency_id).collect();
    let foreign_currency = match (foreign.len(), foreign.iter().next()) {
        (1, Some(&currency)) if nominal.is_zero() && Some(currency) != line_currency => {
            Some(currency)
        }
        _ => None,
    };

    let amount_currency = match foreign_currency {
        Some(currency) => {
            let residual: Decimal = valid
                .iter()
                .map(|p| -p.amount_currency.abs() * p.amount.signum())
                .sum();
            currencies.round(residual, Some(currency))
        }
        None => total,
    };

    let balance_type = policy.balance_type(line, amount_currency, &valid);

    Balance {
        amount: total,
        amount_str: currencies.format(total.abs(), line_currency),
        currency_id: foreign_currency,
        amount_currency,
        amount_currency_str: currencies
            .format(amount_currency.abs(), foreign_currency.or(line_currency)),
        account_code: line
            .open_balance_account_id
            .and_then(|id| snapshot.account_code(id)),
        show_balance: !amount_currency.is_zero(),
        balance_type,
    }
}
