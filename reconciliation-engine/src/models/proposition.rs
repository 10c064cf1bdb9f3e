//! Propositions: counter-entries proposed to offset a line.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{NameGet, PropositionRef, RecordId};

/// Whether a proposition is the one currently edited in the create form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Focus {
    #[default]
    Unfocused,
    Focused,
}

/// Whether the tax breakdown of a proposition must be regenerated before the
/// next balance is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxState {
    #[default]
    Clean,
    PendingTaxRecompute,
}

/// A candidate counter-entry as served by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveLine {
    pub id: RecordId,
    #[serde(default)]
    pub label: String,
    /// Signed amount expressed in the line's currency.
    pub amount: Decimal,
    #[serde(default)]
    pub amount_currency: Option<Decimal>,
    #[serde(default)]
    pub currency_id: Option<RecordId>,
    #[serde(default)]
    pub account_id: Option<NameGet>,
    #[serde(default)]
    pub account_code: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub journal_id: Option<NameGet>,
    #[serde(default)]
    pub partner_id: Option<NameGet>,
    #[serde(default)]
    pub already_paid: bool,
    #[serde(default)]
    pub to_check: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposition {
    pub id: PropositionRef,
    pub label: String,
    pub amount: Decimal,
    pub amount_str: String,
    /// Amount typed by the user (or computed from a template), before taxes.
    pub base_amount: Option<Decimal>,
    pub partial_amount: Option<Decimal>,
    pub partial_amount_str: Option<String>,
    pub amount_currency: Decimal,
    pub currency_id: Option<RecordId>,
    pub account_id: Option<NameGet>,
    pub account_code: Option<String>,
    pub date: Option<NaiveDate>,
    pub journal_id: Option<NameGet>,
    pub analytic_account_id: Option<NameGet>,
    pub analytic_tag_ids: Vec<NameGet>,
    pub tax_ids: Vec<NameGet>,
    /// Parent proposition of a generated tax line.
    pub tax_link: Option<PropositionRef>,
    pub tax_exigible: Option<bool>,
    pub force_tax_included: bool,
    pub partner_id: Option<NameGet>,
    pub already_paid: bool,
    pub to_check: bool,
    pub percent: Option<Decimal>,
    pub reconcile_model_id: Option<RecordId>,
    pub invalid: bool,
    pub display: bool,
    pub focus: Focus,
    pub tax_state: TaxState,
}

impl Proposition {
    /// Adopt a backend candidate as a proposition.
    pub fn from_candidate(candidate: &MoveLine) -> Self {
        Self {
            id: PropositionRef::Existing(candidate.id),
            label: candidate.label.clone(),
            amount: candidate.amount,
            amount_str: String::new(),
            base_amount: None,
            partial_amount: None,
            partial_amount_str: None,
            amount_currency: candidate.amount_currency.unwrap_or(candidate.amount),
            currency_id: candidate.currency_id,
            account_id: candidate.account_id.clone(),
            account_code: candidate.account_code.clone(),
            date: candidate.date,
            journal_id: candidate.journal_id.clone(),
            analytic_account_id: None,
            analytic_tag_ids: Vec::new(),
            tax_ids: Vec::new(),
            tax_link: None,
            tax_exigible: None,
            force_tax_included: false,
            partner_id: candidate.partner_id.clone(),
            already_paid: candidate.already_paid,
            to_check: candidate.to_check,
            percent: None,
            reconcile_model_id: None,
            invalid: false,
            display: false,
            focus: Focus::Unfocused,
            tax_state: TaxState::Clean,
        }
    }

    pub fn is_tax(&self) -> bool {
        self.tax_link.is_some()
    }

    pub fn is_focused(&self) -> bool {
        self.focus == Focus::Focused
    }

    pub fn needs_tax_recompute(&self) -> bool {
        self.tax_state == TaxState::PendingTaxRecompute
    }

    pub fn mark_tax_dirty(&mut self) {
        self.tax_state = TaxState::PendingTaxRecompute;
    }

    /// Amount that actually offsets the line: the partial override when set.
    pub fn effective_amount(&self) -> Decimal {
        self.partial_amount.unwrap_or(self.amount)
    }

    /// An existing record is always valid; a draft needs an account, a
    /// non-zero amount and a label.
    pub fn is_valid(&self) -> bool {
        self.id.is_existing()
            || (self.account_id.is_some() && !self.amount.is_zero() && !self.label.is_empty())
    }

    /// Drafts with an account are shown and submitted as new journal items.
    pub fn is_displayed(&self) -> bool {
        self.id.is_draft() && self.account_id.is_some()
    }

    /// Whether this proposition was generated from `parent` or is its parent.
    pub fn is_linked_to(&self, other: &Proposition) -> bool {
        self.tax_link.as_ref() == Some(&other.id) || other.tax_link.as_ref() == Some(&self.id)
    }
}

/// Snapshot of the focused proposition's editable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateForm {
    pub account_id: Option<NameGet>,
    pub amount: Decimal,
    pub analytic_account_id: Option<NameGet>,
    pub label: String,
    pub tax_ids: Vec<NameGet>,
    pub force_tax_included: bool,
    pub analytic_tag_ids: Vec<NameGet>,
    pub to_check: bool,
}

impl From<&Proposition> for CreateForm {
    fn from(prop: &Proposition) -> Self {
        Self {
            account_id: prop.account_id.clone(),
            amount: prop.amount,
            analytic_account_id: prop.analytic_account_id.clone(),
            label: prop.label.clone(),
            tax_ids: prop.tax_ids.clone(),
            force_tax_included: prop.force_tax_included,
            analytic_tag_ids: prop.analytic_tag_ids.clone(),
            to_check: prop.to_check,
        }
    }
}

/// Add/remove protocol for many-to-many fields of a proposition.
#[derive(Debug, Clone, PartialEq)]
pub enum Many2ManyOp {
    Add(Vec<NameGet>),
    Forget(RecordId),
}

impl Many2ManyOp {
    pub(crate) fn apply(&self, values: &mut Vec<NameGet>) {
        match self {
            Many2ManyOp::Add(added) => {
                for value in added {
                    if !values.iter().any(|v| v.id == value.id) {
                        values.push(value.clone());
                    }
                }
            }
            Many2ManyOp::Forget(id) => values.retain(|v| v.id != *id),
        }
    }
}

/// A single field edit applied to the focused proposition.
#[derive(Debug, Clone, PartialEq)]
pub enum PropositionUpdate {
    Account(Option<NameGet>),
    Amount(Decimal),
    Label(String),
    Date(NaiveDate),
    Journal(Option<NameGet>),
    AnalyticAccount(Option<NameGet>),
    AnalyticTags(Many2ManyOp),
    Taxes(Many2ManyOp),
    ForceTaxIncluded(bool),
    ToCheck(bool),
}
