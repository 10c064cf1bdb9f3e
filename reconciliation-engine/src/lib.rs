//! Reconciliation Engine - bank statement and manual reconciliation matching.

pub mod backend;
pub mod config;
pub mod engine;
pub mod models;
pub mod policy;
pub mod services;
pub mod startup;

pub use backend::{Backend, RpcBackend};
pub use engine::{
    partial_reconcile_amount, LoadOutcome, PartialReconcileOutcome, ReconciliationEngine, Snapshot,
};
pub use policy::{BankPolicy, ManualPolicy, ReconciliationPolicy, ValidationOutcome};
