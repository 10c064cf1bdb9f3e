//! Payloads exchanged with the accounting backend.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{NameGet, RecordId};
use super::line::{LineSource, OpenBalance, OpenBalanceKind, StatementLine};
use super::proposition::MoveLine;

// ============================================================================
// Working set
// ============================================================================

/// Statement-level information returned alongside the lines.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatementHeader {
    #[serde(default)]
    pub statement_id: Option<RecordId>,
    #[serde(default)]
    pub statement_name: Option<String>,
    #[serde(default)]
    pub journal_id: Option<NameGet>,
    /// Lines of the statement already reconciled.
    #[serde(default)]
    pub value_min: u64,
    /// Lines of the statement in total.
    #[serde(default)]
    pub value_max: u64,
}

/// One bank statement line with the matches the server already proposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStatementLine {
    pub st_line: StatementLine,
    #[serde(default)]
    pub reconciliation_proposition: Vec<MoveLine>,
    /// Reconcile model the server matched this line against.
    #[serde(default)]
    pub model_id: Option<RecordId>,
    /// Whether the matched model should be applied as a write-off.
    #[serde(default)]
    pub write_off: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementSummary {
    #[serde(flatten)]
    pub header: StatementHeader,
    #[serde(default)]
    pub lines: Vec<RawStatementLine>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ManualSummary {
    #[serde(default)]
    pub customers: Vec<OpenBalance>,
    #[serde(default)]
    pub suppliers: Vec<OpenBalance>,
    #[serde(default)]
    pub accounts: Vec<OpenBalance>,
}

impl ManualSummary {
    /// Flatten the three groups, tagging each balance with its kind.
    pub fn into_open_balances(self) -> Vec<OpenBalance> {
        let tag = |kind: OpenBalanceKind| {
            move |mut open: OpenBalance| {
                open.kind = kind;
                open
            }
        };
        self.customers
            .into_iter()
            .map(tag(OpenBalanceKind::Customer))
            .chain(self.suppliers.into_iter().map(tag(OpenBalanceKind::Supplier)))
            .chain(self.accounts.into_iter().map(tag(OpenBalanceKind::Account)))
            .collect()
    }
}

/// A line as fetched, before the engine formats it.
#[derive(Debug, Clone, PartialEq)]
pub enum RawLine {
    Statement(RawStatementLine),
    OpenBalance(OpenBalance),
}

impl RawLine {
    pub fn record_id(&self) -> RecordId {
        match self {
            Self::Statement(raw) => raw.st_line.id,
            Self::OpenBalance(open) => open.record_id(),
        }
    }

    pub fn source(&self) -> LineSource {
        match self {
            Self::Statement(raw) => LineSource::Statement(raw.st_line.clone()),
            Self::OpenBalance(open) => LineSource::OpenBalance(open.clone()),
        }
    }

    pub fn proposed(&self) -> &[MoveLine] {
        match self {
            Self::Statement(raw) => &raw.reconciliation_proposition,
            Self::OpenBalance(open) => &open.reconciliation_proposition,
        }
    }

    pub fn partner(&self) -> Option<&NameGet> {
        match self {
            Self::Statement(raw) => raw.st_line.partner_id.as_ref(),
            Self::OpenBalance(open) => open.partner_id.as_ref(),
        }
    }

    /// Model to apply as a write-off when the server flagged one.
    pub fn write_off_model(&self) -> Option<RecordId> {
        match self {
            Self::Statement(raw) if raw.write_off => raw.model_id,
            _ => None,
        }
    }
}

/// Everything needed to build the session's lines.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkingSet {
    pub header: StatementHeader,
    pub lines: Vec<RawLine>,
}

// ============================================================================
// Reference data
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountCode {
    pub id: RecordId,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxInfo {
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price_include: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerAccounts {
    #[serde(default)]
    pub receivable_account_id: Option<RecordId>,
    #[serde(default)]
    pub payable_account_id: Option<RecordId>,
}

// ============================================================================
// Candidates and taxes
// ============================================================================

/// Page request for counter-entry candidates. `record_id` is the statement
/// line (bank) or the account (manual).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateQuery {
    pub record_id: RecordId,
    pub partner_id: Option<RecordId>,
    pub excluded_ids: Vec<RecordId>,
    pub filter: String,
    pub offset: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxComputation {
    pub tax_ids: Vec<RecordId>,
    pub base_amount: Decimal,
    pub currency_id: Option<RecordId>,
    pub round: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_price_include: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedTax {
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
    pub amount: Decimal,
    #[serde(default)]
    pub account_id: Option<RecordId>,
    #[serde(default)]
    pub analytic: bool,
    #[serde(default)]
    pub tax_exigibility: Option<String>,
}

impl ComputedTax {
    /// Taxes due on payment are only exigible once the payment is reconciled.
    pub fn exigible_on_payment(&self) -> bool {
        self.tax_exigibility.as_deref() == Some("on_payment")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedTaxes {
    pub base: Decimal,
    #[serde(default)]
    pub taxes: Vec<ComputedTax>,
}

// ============================================================================
// Submission
// ============================================================================

/// One journal item in debit/credit form.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubmissionLine {
    pub name: String,
    pub debit: Decimal,
    pub credit: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterpart_aml_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytic_account_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub analytic_tag_ids: Vec<RecordId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tax_ids: Vec<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_line_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_exigible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconcile_model_id: Option<RecordId>,
}

impl SubmissionLine {
    /// Amount in the sign convention of the proposition it came from.
    pub fn signed_amount(&self) -> Decimal {
        self.credit - self.debit
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatementLineSubmission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_id: Option<RecordId>,
    pub counterpart_aml_dicts: Vec<SubmissionLine>,
    pub payment_aml_ids: Vec<RecordId>,
    pub new_aml_dicts: Vec<SubmissionLine>,
    pub to_check: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualReconciliation {
    pub id: RecordId,
    #[serde(rename = "type")]
    pub kind: String,
    pub mv_line_ids: Vec<RecordId>,
    pub new_mv_line_dicts: Vec<SubmissionLine>,
}

/// Payload produced for one validated line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineSubmission {
    Statement {
        line_id: RecordId,
        data: StatementLineSubmission,
    },
    Manual(ManualReconciliation),
}
