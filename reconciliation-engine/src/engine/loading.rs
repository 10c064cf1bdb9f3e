//! Session loading and line pagination.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::future::try_join_all;
use futures::try_join;
use reconcile_core::error::EngineError;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{LoadOutcome, ReconciliationEngine, Session, Snapshot};
use crate::models::{
    Line, LineHandle, LoadContext, NameGet, Proposition, RawLine, ReconcileTemplate, RecordId,
    StatementHeader,
};
use crate::policy::PagerState;

impl ReconciliationEngine {
    /// Start a session for `context`. A context naming nothing to reconcile
    /// is not an error: the engine is left untouched.
    #[instrument(skip(self, context), fields(policy = self.policy.name()))]
    pub async fn load(&self, context: LoadContext) -> Result<LoadOutcome, EngineError> {
        if context.target.is_empty() {
            info!("Nothing to reconcile");
            return Ok(LoadOutcome::NothingToDo);
        }
        *self.context.write().await = Some(Arc::new(context));
        self.reload().await
    }

    /// Drop all local state and fetch the session again.
    #[instrument(skip(self), fields(policy = self.policy.name()))]
    pub async fn reload(&self) -> Result<LoadOutcome, EngineError> {
        let result = self.reload_inner().await;
        self.observe("reload", &result);
        result
    }

    async fn reload_inner(&self) -> Result<LoadOutcome, EngineError> {
        let context = self.require_context().await?;

        self.lines.clear();
        self.claims.clear();
        *self.session.lock().await = Session::default();
        self.valuenow.store(0, Ordering::SeqCst);
        self.valuemax.store(0, Ordering::SeqCst);

        let backend = &*self.backend;
        let (working_set, templates, accounts, taxes) = try_join!(
            self.policy.fetch_working_set(backend, &context),
            self.fetch_templates(&context.company_ids),
            backend.fetch_accounts(),
            backend.fetch_taxes(),
        )?;

        *self.snapshot.write().await = Arc::new(Snapshot {
            templates,
            accounts: accounts
                .into_iter()
                .map(|account| (account.id, account.code))
                .collect(),
            taxes: taxes.into_iter().map(|tax| (tax.id, tax)).collect(),
        });

        let (value_now, value_max) = self
            .policy
            .progress_bounds(&working_set.header, working_set.lines.len());
        self.valuenow.store(value_now, Ordering::SeqCst);
        self.valuemax.store(value_max, Ordering::SeqCst);

        let mut session = Session {
            header: working_set.header,
            ..Default::default()
        };
        for raw in working_set.lines {
            let handle = LineHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
            let line = Line::new(handle, raw.source());
            self.lines.insert(handle, Arc::new(Mutex::new(line)));
            session.order.push(handle);
            session.raws.insert(handle, raw);
        }
        let count = session.order.len();
        *self.session.lock().await = session;

        let formatted = self
            .format_next_page(self.settings.default_display_qty)
            .await?;
        info!(lines = count, formatted, "Reconciliation loaded");
        Ok(LoadOutcome::Loaded { lines: count })
    }

    async fn fetch_templates(
        &self,
        company_ids: &[RecordId],
    ) -> Result<BTreeMap<RecordId, ReconcileTemplate>, EngineError> {
        let models = self.backend.fetch_reconcile_templates(company_ids).await?;

        let mut tag_ids: Vec<RecordId> = models
            .iter()
            .flat_map(|model| model.analytic_tag_ids())
            .collect();
        tag_ids.sort_unstable();
        tag_ids.dedup();

        let tags: HashMap<RecordId, NameGet> = if tag_ids.is_empty() {
            HashMap::new()
        } else {
            self.backend
                .fetch_analytic_tags(&tag_ids)
                .await?
                .into_iter()
                .map(|tag| (tag.id, tag))
                .collect()
        };

        Ok(models
            .into_iter()
            .map(|model| (model.id, model.into_template(&tags)))
            .collect())
    }

    /// Format the next `qty` lines (the configured page size by default).
    /// Returns how many lines were formatted.
    #[instrument(skip(self))]
    pub async fn load_more(&self, qty: Option<usize>) -> Result<usize, EngineError> {
        let qty = qty.unwrap_or(self.settings.default_display_qty);
        let result = self.format_next_page(qty).await;
        self.observe("load_more", &result);
        result
    }

    pub async fn has_more_lines(&self) -> bool {
        let (handles, pager_index) = {
            let session = self.session.lock().await;
            (session.order.clone(), session.pager_index)
        };

        let mut any_invisible = false;
        for handle in &handles {
            if let Ok(line) = self.line_arc(*handle) {
                if !line.lock().await.visible {
                    any_invisible = true;
                    break;
                }
            }
        }

        self.policy.has_more_lines(PagerState {
            any_invisible,
            pager_index,
            total: handles.len(),
        })
    }

    pub async fn statement_header(&self) -> StatementHeader {
        self.session.lock().await.header.clone()
    }

    /// Confirm the statement being reconciled.
    #[instrument(skip(self))]
    pub async fn close_statement(&self) -> Result<RecordId, EngineError> {
        let result: Result<RecordId, EngineError> = async {
            let statement_id = self.statement_id().await?;
            let closed = self.backend.close_statement(statement_id).await?;
            info!(statement = statement_id, "Statement closed");
            Ok(closed)
        }
        .await;
        self.observe("close_statement", &result);
        result
    }

    #[instrument(skip(self))]
    pub async fn rename_statement(&self, name: String) -> Result<(), EngineError> {
        let result: Result<(), EngineError> = async {
            let statement_id = self.statement_id().await?;
            self.backend.rename_statement(statement_id, &name).await?;
            self.session.lock().await.header.statement_name = Some(name);
            Ok(())
        }
        .await;
        self.observe("rename_statement", &result);
        result
    }

    async fn statement_id(&self) -> Result<RecordId, EngineError> {
        self.session
            .lock()
            .await
            .header
            .statement_id
            .ok_or_else(|| EngineError::bad_request("no statement is being reconciled"))
    }

    async fn format_next_page(&self, qty: usize) -> Result<usize, EngineError> {
        let page: Vec<(LineHandle, RawLine)> = {
            let mut session = self.session.lock().await;
            let start = session.pager_index.min(session.order.len());
            let end = start.saturating_add(qty).min(session.order.len());
            session.pager_index = end;
            session.order[start..end]
                .iter()
                .filter_map(|handle| session.raws.get(handle).map(|raw| (*handle, raw.clone())))
                .collect()
        };
        if page.is_empty() {
            return Ok(0);
        }

        let mut excluded: Vec<RecordId> = self.claims.iter().map(|entry| *entry.key()).collect();
        excluded.sort_unstable();

        let (handles, raws): (Vec<LineHandle>, Vec<RawLine>) = page.into_iter().unzip();
        let details = self
            .policy
            .fetch_page_details(&*self.backend, raws, &excluded)
            .await?;

        {
            let mut session = self.session.lock().await;
            for (handle, raw) in handles.iter().zip(&details) {
                session.raws.insert(*handle, raw.clone());
            }
        }

        debug!(lines = handles.len(), "Formatting page");
        try_join_all(
            handles
                .iter()
                .zip(details)
                .map(|(handle, raw)| self.format_line(*handle, raw)),
        )
        .await?;
        Ok(handles.len())
    }

    /// Turn a fetched line into its initial state: adopt the propositions
    /// the backend suggests, then apply the policy's format plan.
    #[instrument(skip(self, raw))]
    async fn format_line(&self, handle: LineHandle, raw: RawLine) -> Result<(), EngineError> {
        let context = self.require_context().await?;
        let line = self.line_arc(handle)?;
        let mut line = line.lock().await;

        line.source = raw.source();
        line.visible = true;
        for candidate in raw.proposed() {
            if self.claim(candidate.id, handle) {
                line.reconciliation_proposition
                    .push(Proposition::from_candidate(candidate));
            } else {
                debug!(candidate = candidate.id, "Proposal already claimed by another line");
            }
        }

        let plan = self.policy.format_plan(&line, &raw, &context);
        self.compute_line(&mut line).await?;

        if plan.resolve_partner {
            let partner = match &line.partner {
                Some(partner) => Some(partner.clone()),
                None => shared_partner(&line.reconciliation_proposition),
            };
            if let Some(partner) = partner {
                self.change_partner_inner(&mut line, Some(partner), true)
                    .await?;
            }
        }

        if let Some(model_id) = plan.write_off_model {
            if self.snapshot().await.templates.contains_key(&model_id) {
                self.quick_create_inner(&mut line, model_id).await?;
            } else {
                warn!(model = model_id, "Write-off model is not available");
            }
        }

        if line.partner.is_none() {
            if let Some(partner) = plan.fallback_partner {
                self.change_partner_inner(&mut line, Some(partner), true)
                    .await?;
            }
        }

        if let Some(mode) = plan.initial_mode {
            self.change_mode_inner(&mut line, mode).await?;
        }

        self.sync_claims(&line);
        Ok(())
    }
}

/// Partner carried by every proposition, when they all agree on one.
fn shared_partner(propositions: &[Proposition]) -> Option<NameGet> {
    let first = propositions.first()?.partner_id.clone()?;
    propositions
        .iter()
        .all(|p| p.partner_id.as_ref().is_some_and(|partner| partner.id == first.id))
        .then_some(first)
}
