//! Candidate search and mode switching.

use reconcile_core::error::EngineError;
use tracing::{debug, instrument};

use super::ReconciliationEngine;
use crate::models::{Line, LineHandle, Mode};

impl ReconciliationEngine {
    /// Move the candidate window of a line by `pages` pages.
    #[instrument(skip(self))]
    pub async fn change_offset(&self, handle: LineHandle, pages: i32) -> Result<(), EngineError> {
        let result: Result<(), EngineError> = async {
            let line = self.line_arc(handle)?;
            let mut line = line.lock().await;
            Self::ensure_open(&line)?;
            line.offset = line.offset.saturating_add_signed(pages);
            line.limit_override = None;
            self.perform_move_line(&mut line).await?;
            self.sync_claims(&line);
            Ok(())
        }
        .await;
        self.observe("change_offset", &result);
        result
    }

    /// Restrict candidates to those matching `filter`, from the first page.
    #[instrument(skip(self))]
    pub async fn change_filter(&self, handle: LineHandle, filter: String) -> Result<(), EngineError> {
        let result: Result<(), EngineError> = async {
            let line = self.line_arc(handle)?;
            let mut line = line.lock().await;
            Self::ensure_open(&line)?;
            line.filter = filter;
            line.offset = 0;
            line.limit_override = None;
            self.perform_move_line(&mut line).await?;
            self.sync_claims(&line);
            Ok(())
        }
        .await;
        self.observe("change_filter", &result);
        result
    }

    #[instrument(skip(self))]
    pub async fn change_mode(&self, handle: LineHandle, mode: Mode) -> Result<(), EngineError> {
        let result: Result<(), EngineError> = async {
            let line = self.line_arc(handle)?;
            let mut line = line.lock().await;
            Self::ensure_open(&line)?;
            self.change_mode_inner(&mut line, mode).await?;
            self.sync_claims(&line);
            Ok(())
        }
        .await;
        self.observe("change_mode", &result);
        result
    }

    pub(crate) async fn change_mode_inner(
        &self,
        line: &mut Line,
        mode: Mode,
    ) -> Result<(), EngineError> {
        if line.mode == Mode::Create && mode != Mode::Create {
            line.blur();
            line.create_form = None;
        }
        line.mode = mode;
        if mode == Mode::Create {
            // Create never fetches; drop any pending window.
            line.limit_override = None;
        }
        match mode {
            Mode::Match => self.perform_move_line(line).await,
            Mode::Create => self.create_proposition_inner(line).await.map(|_| ()),
            Mode::Inactive => self.compute_line(line).await,
        }
    }

    /// Refresh the candidate list of `line`. A line left without candidates
    /// and without a filter falls back to the create form, unless creation is
    /// disabled or nothing remains to balance.
    #[instrument(skip(self, line), fields(line = %line.handle, offset = line.offset))]
    pub(crate) async fn perform_move_line(&self, line: &mut Line) -> Result<(), EngineError> {
        let page_size = self.settings.limit_move_lines;
        let (offset, limit, replace) = match line.limit_override {
            Some(window) => (0, window, true),
            None => {
                let offset = line.offset.saturating_mul(page_size);
                (offset, page_size, offset == 0)
            }
        };

        let excluded = self.excluded_ids(line);
        let candidates = self
            .policy
            .fetch_candidates(&*self.backend, line, excluded, offset, limit)
            .await?;
        line.limit_override = None;

        debug!(received = candidates.len(), offset, limit, "Fetched candidates");
        if replace {
            line.mv_lines = candidates;
        } else {
            line.mv_lines.extend(candidates);
        }

        if line.mv_lines.is_empty() && line.filter.is_empty() && line.mode != Mode::Create {
            let avoid_create = self
                .context()
                .await
                .is_some_and(|context| context.avoid_create);
            if !avoid_create && !line.balance.amount.is_zero() {
                line.mode = Mode::Create;
                self.create_proposition_inner(line).await?;
                return Ok(());
            }
            line.mode = Mode::Inactive;
        }
        self.compute_line(line).await
    }
}
