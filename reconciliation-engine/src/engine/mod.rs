//! The reconciliation engine.
//!
//! One engine instance owns a reconciliation session: the lines being
//! reconciled, their propositions and candidates, and the reference data
//! loaded alongside them. Every line lives behind its own async mutex, so
//! operations on one line are strictly ordered while different lines are
//! worked on concurrently. Backend ids claimed by propositions are indexed in
//! `claims` so that candidate searches never need another line's lock.

mod loading;
mod matching;
mod partner;
mod propositions;
mod recompute;
mod validation;

pub use propositions::partial_reconcile_amount;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use reconcile_core::error::EngineError;
use tokio::sync::{Mutex, RwLock};

use crate::backend::Backend;
use crate::config::EngineSettings;
use crate::models::{
    Line, LineHandle, LoadContext, RawLine, ReconcileTemplate, RecordId, StatementHeader, TaxInfo,
};
use crate::policy::{BankPolicy, ManualPolicy, ReconciliationPolicy};
use crate::services::{metrics, CurrencyRegistry};

/// Reference data loaded with the session, replaced only by a reload.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub templates: BTreeMap<RecordId, ReconcileTemplate>,
    pub accounts: HashMap<RecordId, String>,
    pub taxes: HashMap<RecordId, TaxInfo>,
}

impl Snapshot {
    pub fn account_code(&self, account_id: RecordId) -> Option<String> {
        self.accounts.get(&account_id).cloned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The context named nothing to reconcile.
    NothingToDo,
    Loaded { lines: usize },
}

/// Result of a partial reconciliation request.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialReconcileOutcome {
    Applied(rust_decimal::Decimal),
    /// The override was dropped: zero, or not smaller than the full amount.
    Cleared,
    /// The input was unusable; the override was dropped.
    Rejected { warning: String },
}

#[derive(Debug, Default)]
struct Session {
    header: StatementHeader,
    /// Handles in display order.
    order: Vec<LineHandle>,
    raws: HashMap<LineHandle, RawLine>,
    pager_index: usize,
}

pub struct ReconciliationEngine {
    backend: Arc<dyn Backend>,
    policy: Arc<dyn ReconciliationPolicy>,
    currencies: CurrencyRegistry,
    settings: EngineSettings,
    context: RwLock<Option<Arc<LoadContext>>>,
    snapshot: RwLock<Arc<Snapshot>>,
    session: Mutex<Session>,
    lines: DashMap<LineHandle, Arc<Mutex<Line>>>,
    claims: DashMap<RecordId, LineHandle>,
    valuenow: AtomicU64,
    valuemax: AtomicU64,
    next_handle: AtomicU64,
}

impl ReconciliationEngine {
    pub fn new(
        backend: Arc<dyn Backend>,
        policy: Arc<dyn ReconciliationPolicy>,
        currencies: CurrencyRegistry,
        settings: EngineSettings,
    ) -> Self {
        Self {
            backend,
            policy,
            currencies,
            settings,
            context: RwLock::new(None),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            session: Mutex::new(Session::default()),
            lines: DashMap::new(),
            claims: DashMap::new(),
            valuenow: AtomicU64::new(0),
            valuemax: AtomicU64::new(0),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Engine reconciling bank statement lines.
    pub fn bank(
        backend: Arc<dyn Backend>,
        currencies: CurrencyRegistry,
        settings: EngineSettings,
    ) -> Self {
        Self::new(backend, Arc::new(BankPolicy), currencies, settings)
    }

    /// Engine reconciling open partner and account balances.
    pub fn manual(
        backend: Arc<dyn Backend>,
        currencies: CurrencyRegistry,
        settings: EngineSettings,
    ) -> Self {
        Self::new(backend, Arc::new(ManualPolicy), currencies, settings)
    }

    pub fn settings(&self) -> EngineSettings {
        self.settings
    }

    pub fn currencies(&self) -> &CurrencyRegistry {
        &self.currencies
    }

    pub async fn context(&self) -> Option<Arc<LoadContext>> {
        self.context.read().await.clone()
    }

    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().await.clone()
    }

    /// Copy of a line's current state.
    pub async fn line(&self, handle: LineHandle) -> Result<Line, EngineError> {
        let line = self.line_arc(handle)?;
        let guard = line.lock().await;
        Ok(guard.clone())
    }

    /// Handles of every line, in display order.
    pub async fn handles(&self) -> Vec<LineHandle> {
        self.session.lock().await.order.clone()
    }

    /// Copies of every line, in display order.
    pub async fn lines(&self) -> Vec<Line> {
        let mut lines = Vec::new();
        for handle in self.handles().await {
            if let Ok(line) = self.line(handle).await {
                lines.push(line);
            }
        }
        lines
    }

    /// Handle of the line reconciling the given backend record.
    pub async fn find_line(&self, record_id: RecordId) -> Option<LineHandle> {
        let session = self.session.lock().await;
        session
            .order
            .iter()
            .find(|handle| {
                session
                    .raws
                    .get(handle)
                    .is_some_and(|raw| raw.record_id() == record_id)
            })
            .copied()
    }

    /// `(reconciled, total)` line counters of the session.
    pub fn progress(&self) -> (u64, u64) {
        (
            self.valuenow.load(Ordering::SeqCst),
            self.valuemax.load(Ordering::SeqCst),
        )
    }

    fn line_arc(&self, handle: LineHandle) -> Result<Arc<Mutex<Line>>, EngineError> {
        self.lines
            .get(&handle)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EngineError::not_found(format!("line {} does not exist", handle)))
    }

    async fn require_context(&self) -> Result<Arc<LoadContext>, EngineError> {
        self.context()
            .await
            .ok_or_else(|| EngineError::bad_request("no reconciliation has been loaded"))
    }

    fn ensure_open(line: &Line) -> Result<(), EngineError> {
        if line.reconciled {
            return Err(EngineError::bad_request(format!(
                "line {} is already reconciled",
                line.handle
            )));
        }
        Ok(())
    }

    /// Ids excluded from a candidate search for `line`: whatever other lines
    /// claim, plus the line's own matches.
    fn excluded_ids(&self, line: &Line) -> Vec<RecordId> {
        let mut excluded: HashSet<RecordId> = self
            .claims
            .iter()
            .filter(|entry| *entry.value() != line.handle)
            .map(|entry| *entry.key())
            .collect();
        excluded.extend(line.claimed_ids());
        let mut excluded: Vec<RecordId> = excluded.into_iter().collect();
        excluded.sort_unstable();
        excluded
    }

    /// Reserve `record_id` for `handle`; false if another line holds it.
    fn claim(&self, record_id: RecordId, handle: LineHandle) -> bool {
        let owner = *self.claims.entry(record_id).or_insert(handle);
        owner == handle
    }

    /// Bring the claim index in line with `line`'s propositions.
    fn sync_claims(&self, line: &Line) {
        let claimed: HashSet<RecordId> = line.claimed_ids().into_iter().collect();
        self.claims
            .retain(|id, owner| *owner != line.handle || claimed.contains(id));
        for id in claimed {
            self.claims.entry(id).or_insert(line.handle);
        }
    }

    fn observe<T>(&self, operation: &str, result: &Result<T, EngineError>) {
        let status = match result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::record_operation(operation, status);
    }
}
