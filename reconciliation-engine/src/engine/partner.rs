//! Partner propagation.

use reconcile_core::error::EngineError;
use tracing::{debug, instrument};

use super::ReconciliationEngine;
use crate::models::{Line, LineHandle, Mode, NameGet};

impl ReconciliationEngine {
    /// Set or clear the partner of a line. Unless `preserve_mode` is set the
    /// line goes back to matching.
    #[instrument(skip(self))]
    pub async fn change_partner(
        &self,
        handle: LineHandle,
        partner: Option<NameGet>,
        preserve_mode: bool,
    ) -> Result<(), EngineError> {
        let result: Result<(), EngineError> = async {
            let line = self.line_arc(handle)?;
            let mut line = line.lock().await;
            Self::ensure_open(&line)?;
            self.change_partner_inner(&mut line, partner, preserve_mode)
                .await?;
            self.sync_claims(&line);
            Ok(())
        }
        .await;
        self.observe("change_partner", &result);
        result
    }

    pub(crate) async fn change_partner_inner(
        &self,
        line: &mut Line,
        partner: Option<NameGet>,
        preserve_mode: bool,
    ) -> Result<(), EngineError> {
        // Fetch first so a failed lookup leaves the line untouched.
        let open_balance_account = match &partner {
            Some(partner) => {
                let accounts = self.backend.fetch_partner_accounts(partner.id).await?;
                let account = if line.balance.amount.is_sign_negative() && !line.balance.amount.is_zero() {
                    accounts.payable_account_id
                } else {
                    accounts.receivable_account_id
                };
                Some(account.or(line.default_open_balance_account_id))
            }
            None => None,
        };

        let conflicting = partner.as_ref().is_some_and(|partner| {
            line.reconciliation_proposition.iter().any(|p| {
                p.partner_id
                    .as_ref()
                    .is_some_and(|owner| owner.id != partner.id)
            })
        });
        if conflicting {
            debug!(line = %line.handle, "Partner conflicts with the propositions, clearing them");
            line.reconciliation_proposition.clear();
            line.create_form = None;
        }

        match open_balance_account {
            Some(account) => line.open_balance_account_id = account,
            None => line.reset_open_balance_account(),
        }
        line.partner = partner;
        line.mv_lines.clear();
        line.offset = 0;

        self.compute_line(line).await?;
        let mode = if preserve_mode || line.mode == Mode::Create {
            line.mode
        } else {
            Mode::Match
        };
        self.change_mode_inner(line, mode).await
    }
}
