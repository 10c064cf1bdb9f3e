use serde::{Deserialize, Serialize};

use super::ids::{NameGet, RecordId};

/// Which open balances a manual reconciliation session covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualMode {
    Customers,
    Suppliers,
    Accounts,
    All,
}

impl ManualMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customers => "customers",
            Self::Suppliers => "suppliers",
            Self::Accounts => "accounts",
            Self::All => "all",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconciliationTarget {
    Statement {
        statement_line_ids: Vec<RecordId>,
    },
    Manual {
        mode: ManualMode,
        #[serde(default)]
        partner_ids: Vec<RecordId>,
        #[serde(default)]
        account_ids: Vec<RecordId>,
    },
}

impl ReconciliationTarget {
    /// Nothing to load: no statement lines, or no partner/account scope
    /// outside of the all-balances mode.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Statement { statement_line_ids } => statement_line_ids.is_empty(),
            Self::Manual {
                mode,
                partner_ids,
                account_ids,
            } => partner_ids.is_empty() && account_ids.is_empty() && *mode != ManualMode::All,
        }
    }
}

/// Immutable configuration of a reconciliation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadContext {
    pub target: ReconciliationTarget,
    #[serde(default)]
    pub company_ids: Vec<RecordId>,
    /// Partner proposed to bank lines that end up without one.
    #[serde(default)]
    pub partner: Option<NameGet>,
    #[serde(default)]
    pub search_text: Option<String>,
    /// Never fall back to create mode when no candidate matches.
    #[serde(default)]
    pub avoid_create: bool,
    /// Journal set on quick-created propositions.
    #[serde(default)]
    pub default_journal: Option<NameGet>,
}

impl LoadContext {
    pub fn statement(statement_line_ids: Vec<RecordId>) -> Self {
        Self::new(ReconciliationTarget::Statement { statement_line_ids })
    }

    pub fn manual(mode: ManualMode, partner_ids: Vec<RecordId>, account_ids: Vec<RecordId>) -> Self {
        Self::new(ReconciliationTarget::Manual {
            mode,
            partner_ids,
            account_ids,
        })
    }

    fn new(target: ReconciliationTarget) -> Self {
        Self {
            target,
            company_ids: Vec::new(),
            partner: None,
            search_text: None,
            avoid_create: false,
            default_journal: None,
        }
    }

    pub fn with_partner(mut self, partner: NameGet) -> Self {
        self.partner = Some(partner);
        self
    }

    pub fn with_search_text(mut self, text: impl Into<String>) -> Self {
        self.search_text = Some(text.into());
        self
    }

    pub fn with_avoid_create(mut self, avoid_create: bool) -> Self {
        self.avoid_create = avoid_create;
        self
    }

    pub fn with_default_journal(mut self, journal: NameGet) -> Self {
        self.default_journal = Some(journal);
        self
    }

    pub fn with_company_ids(mut self, company_ids: Vec<RecordId>) -> Self {
        self.company_ids = company_ids;
        self
    }
}
