//! Domain models for the reconciliation engine.

mod context;
mod ids;
mod line;
mod proposition;
mod template;
mod wire;

pub use context::{LoadContext, ManualMode, ReconciliationTarget};
pub use ids::{LineHandle, NameGet, PropositionRef, RecordId};
pub use line::{
    Balance, BalanceType, Line, LineSource, Mode, OpenBalance, OpenBalanceKind, StatementLine,
};
pub use proposition::{
    CreateForm, Focus, Many2ManyOp, MoveLine, Proposition, PropositionUpdate, TaxState,
};
pub use template::{AmountType, ReconcileModel, ReconcileTemplate, TemplateAmount, TemplateLine};
pub use wire::{
    AccountCode, CandidateQuery, ComputedTax, ComputedTaxes, LineSubmission, ManualReconciliation,
    ManualSummary, PartnerAccounts, RawLine, RawStatementLine, StatementHeader,
    StatementLineSubmission, StatementSummary, SubmissionLine, TaxComputation, TaxInfo,
    WorkingSet,
};
