//! Reconciliation lines and their derived balance.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{LineHandle, NameGet, RecordId};
use super::proposition::{CreateForm, MoveLine, Proposition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Inactive,
    Match,
    Create,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Match => "match",
            Self::Create => "create",
        }
    }
}

/// Which action the residual balance calls for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceType {
    /// Fully balanced: the line can be validated.
    Balanced,
    /// A residual remains but a partner is known (bank), or the propositions
    /// mix debits and credits (manual).
    PartiallyMatched,
    #[default]
    Unbalanced,
}

impl BalanceType {
    pub fn code(&self) -> i8 {
        match self {
            Self::Balanced => 1,
            Self::PartiallyMatched => 0,
            Self::Unbalanced => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Balance {
    pub amount: Decimal,
    pub amount_str: String,
    /// Foreign currency tracked alongside, when exactly one appears.
    pub currency_id: Option<RecordId>,
    pub amount_currency: Decimal,
    pub amount_currency_str: String,
    pub account_code: Option<String>,
    pub show_balance: bool,
    pub balance_type: BalanceType,
}

/// A bank statement transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
    pub amount: Decimal,
    #[serde(default)]
    pub amount_currency: Option<Decimal>,
    #[serde(default)]
    pub currency_id: Option<RecordId>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub partner_id: Option<NameGet>,
    #[serde(default)]
    pub journal_id: Option<NameGet>,
    #[serde(default, rename = "ref")]
    pub reference: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub open_balance_account_id: Option<RecordId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenBalanceKind {
    Customer,
    Supplier,
    #[default]
    Account,
}

impl OpenBalanceKind {
    /// Reconciliation type reported back on submission.
    pub fn reconciliation_type(&self) -> &'static str {
        match self {
            Self::Customer | Self::Supplier => "partner",
            Self::Account => "account",
        }
    }
}

/// An open partner or account balance awaiting manual reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenBalance {
    #[serde(default)]
    pub kind: OpenBalanceKind,
    pub account_id: NameGet,
    #[serde(default)]
    pub account_code: Option<String>,
    #[serde(default)]
    pub partner_id: Option<NameGet>,
    #[serde(default)]
    pub currency_id: Option<RecordId>,
    #[serde(default)]
    pub reconciliation_proposition: Vec<MoveLine>,
}

impl OpenBalance {
    /// Backend id the balance is reconciled under.
    pub fn record_id(&self) -> RecordId {
        match (&self.kind, &self.partner_id) {
            (OpenBalanceKind::Account, _) | (_, None) => self.account_id.id,
            (_, Some(partner)) => partner.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum LineSource {
    Statement(StatementLine),
    OpenBalance(OpenBalance),
}

impl LineSource {
    pub fn record_id(&self) -> RecordId {
        match self {
            Self::Statement(st_line) => st_line.id,
            Self::OpenBalance(open) => open.record_id(),
        }
    }

    /// Amount the propositions have to offset. Open balances are settled
    /// against each other, so they start from zero.
    pub fn nominal_amount(&self) -> Decimal {
        match self {
            Self::Statement(st_line) => st_line.amount,
            Self::OpenBalance(_) => Decimal::ZERO,
        }
    }

    pub fn currency_id(&self) -> Option<RecordId> {
        match self {
            Self::Statement(st_line) => st_line.currency_id,
            Self::OpenBalance(open) => open.currency_id,
        }
    }

    /// Default label for authored propositions.
    pub fn label(&self) -> &str {
        match self {
            Self::Statement(st_line) => &st_line.name,
            Self::OpenBalance(_) => "",
        }
    }

    pub fn partner(&self) -> Option<&NameGet> {
        match self {
            Self::Statement(st_line) => st_line.partner_id.as_ref(),
            Self::OpenBalance(open) => open.partner_id.as_ref(),
        }
    }

    pub fn open_balance_account_id(&self) -> Option<RecordId> {
        match self {
            Self::Statement(st_line) => st_line.open_balance_account_id,
            Self::OpenBalance(open) => Some(open.account_id.id),
        }
    }
}

/// One unit of reconciliation work and its proposed counter-entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub handle: LineHandle,
    pub id: RecordId,
    pub mode: Mode,
    pub source: LineSource,
    pub partner: Option<NameGet>,
    /// Whether the source record carried a partner before any adoption.
    pub has_own_partner: bool,
    pub open_balance_account_id: Option<RecordId>,
    pub default_open_balance_account_id: Option<RecordId>,
    pub reconciliation_proposition: Vec<Proposition>,
    pub mv_lines: Vec<MoveLine>,
    /// Page index into the candidate list.
    pub offset: u32,
    pub limit_override: Option<u32>,
    pub filter: String,
    pub balance: Balance,
    pub create_form: Option<CreateForm>,
    pub to_check: bool,
    pub visible: bool,
    pub reconciled: bool,
}

impl Line {
    pub fn new(handle: LineHandle, source: LineSource) -> Self {
        let partner = source.partner().cloned();
        let open_balance_account_id = source.open_balance_account_id();
        Self {
            handle,
            id: source.record_id(),
            mode: Mode::Inactive,
            has_own_partner: partner.is_some(),
            partner,
            open_balance_account_id,
            default_open_balance_account_id: open_balance_account_id,
            source,
            reconciliation_proposition: Vec::new(),
            mv_lines: Vec::new(),
            offset: 0,
            limit_override: None,
            filter: String::new(),
            balance: Balance::default(),
            create_form: None,
            to_check: false,
            visible: false,
            reconciled: false,
        }
    }

    pub fn nominal_amount(&self) -> Decimal {
        self.source.nominal_amount()
    }

    pub fn currency_id(&self) -> Option<RecordId> {
        self.source.currency_id()
    }

    /// Index of the proposition currently edited, i.e. the last focused one.
    pub fn focused_index(&self) -> Option<usize> {
        self.reconciliation_proposition
            .iter()
            .rposition(Proposition::is_focused)
    }

    pub fn focused(&self) -> Option<&Proposition> {
        self.focused_index()
            .map(|idx| &self.reconciliation_proposition[idx])
    }

    pub fn valid_propositions(&self) -> impl Iterator<Item = &Proposition> {
        self.reconciliation_proposition.iter().filter(|p| !p.invalid)
    }

    /// Backend ids claimed by this line's propositions.
    pub fn claimed_ids(&self) -> Vec<RecordId> {
        self.reconciliation_proposition
            .iter()
            .filter_map(|p| p.id.record_id())
            .collect()
    }

    /// Drop focus from every proposition, then forget the invalid ones.
    pub fn blur(&mut self) {
        for prop in &mut self.reconciliation_proposition {
            prop.focus = Default::default();
        }
        self.reconciliation_proposition.retain(|p| p.is_valid());
    }

    pub fn reset_open_balance_account(&mut self) {
        self.open_balance_account_id = self.default_open_balance_account_id;
    }
}
