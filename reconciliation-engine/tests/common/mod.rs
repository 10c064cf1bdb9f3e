//! Common test utilities for reconciliation-engine integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reconcile_core::error::EngineError;
use reconcile_core::observability::init_test_tracing;
use reconciliation_engine::backend::Backend;
use reconciliation_engine::config::EngineSettings;
use reconciliation_engine::models::{
    AccountCode, AmountType, CandidateQuery, ComputedTax, ComputedTaxes, LineHandle, ManualMode,
    ManualReconciliation, ManualSummary, MoveLine, NameGet, OpenBalance, OpenBalanceKind,
    PartnerAccounts, RawStatementLine, ReconcileModel, RecordId, StatementHeader, StatementLine,
    StatementLineSubmission, StatementSummary, TaxComputation, TaxInfo,
};
use reconciliation_engine::services::{round_to_decimals, CurrencyInfo, CurrencyRegistry};
use reconciliation_engine::ReconciliationEngine;
use rust_decimal::Decimal;

pub const USD: RecordId = 1;
pub const EUR: RecordId = 2;
pub const STATEMENT_ID: RecordId = 77;
pub const SUSPENSE_ACCOUNT: RecordId = 400;
pub const RECEIVABLE_ACCOUNT: RecordId = 121;
pub const PAYABLE_ACCOUNT: RecordId = 211;
pub const FEES_ACCOUNT: RecordId = 626;
pub const TAX_ACCOUNT: RecordId = 451;

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    init_test_tracing("info,reconciliation_engine=debug");
}

pub fn dec(value: &str) -> Decimal {
    value.parse().unwrap()
}

pub fn currencies() -> CurrencyRegistry {
    CurrencyRegistry::new([
        CurrencyInfo {
            id: USD,
            name: "USD".to_string(),
            decimal_places: 2,
        },
        CurrencyInfo {
            id: EUR,
            name: "EUR".to_string(),
            decimal_places: 2,
        },
    ])
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn statement_line(id: RecordId, name: &str, amount: &str) -> StatementLine {
    StatementLine {
        id,
        name: name.to_string(),
        amount: dec(amount),
        amount_currency: None,
        currency_id: Some(USD),
        date: None,
        partner_id: None,
        journal_id: Some(NameGet::new(3, "Bank")),
        reference: None,
        note: None,
        open_balance_account_id: Some(SUSPENSE_ACCOUNT),
    }
}

pub fn raw_line(st_line: StatementLine) -> RawStatementLine {
    RawStatementLine {
        st_line,
        reconciliation_proposition: Vec::new(),
        model_id: None,
        write_off: false,
    }
}

pub fn partner(id: RecordId) -> NameGet {
    NameGet::new(id, format!("Partner {}", id))
}

pub fn move_line(id: RecordId, amount: &str) -> MoveLine {
    MoveLine {
        id,
        label: format!("INV/2024/{:04}", id),
        amount: dec(amount),
        amount_currency: None,
        currency_id: None,
        account_id: Some(NameGet::new(RECEIVABLE_ACCOUNT, "121000 Account Receivable")),
        account_code: Some("121000".to_string()),
        date: None,
        journal_id: None,
        partner_id: None,
        already_paid: false,
        to_check: false,
    }
}

pub fn open_balance(kind: OpenBalanceKind, account_id: RecordId, partner_id: Option<RecordId>) -> OpenBalance {
    OpenBalance {
        kind,
        account_id: NameGet::new(account_id, format!("{} Account", account_id)),
        account_code: Some(account_id.to_string()),
        partner_id: partner_id.map(partner),
        currency_id: Some(USD),
        reconciliation_proposition: Vec::new(),
    }
}

/// Single-line reconcile model booking to the fees account.
pub fn fees_model(id: RecordId, amount_type: AmountType, amount: &str) -> ReconcileModel {
    ReconcileModel {
        id,
        name: format!("Model {}", id),
        account_id: Some(NameGet::new(FEES_ACCOUNT, "626000 Bank Fees")),
        amount_type,
        amount: dec(amount),
        label: "Bank fees".to_string(),
        tax_ids: Vec::new(),
        force_tax_included: false,
        analytic_account_id: None,
        analytic_tag_ids: Vec::new(),
        journal_id: None,
        to_check: false,
        has_second_line: false,
        second_account_id: None,
        second_amount_type: None,
        second_amount: None,
        second_label: None,
        second_tax_ids: None,
        second_force_tax_included: None,
        second_analytic_account_id: None,
        second_analytic_tag_ids: None,
        second_journal_id: None,
    }
}

pub fn settings(display_qty: usize) -> EngineSettings {
    EngineSettings {
        default_display_qty: display_qty,
        ..Default::default()
    }
}

pub fn bank_engine(backend: &Arc<MockBackend>) -> ReconciliationEngine {
    init_tracing();
    ReconciliationEngine::bank(backend.clone(), currencies(), EngineSettings::default())
}

pub fn bank_engine_with(backend: &Arc<MockBackend>, settings: EngineSettings) -> ReconciliationEngine {
    init_tracing();
    ReconciliationEngine::bank(backend.clone(), currencies(), settings)
}

pub fn manual_engine(backend: &Arc<MockBackend>) -> ReconciliationEngine {
    init_tracing();
    ReconciliationEngine::manual(backend.clone(), currencies(), EngineSettings::default())
}

/// Handle of the line reconciling `record_id`, panicking when absent.
pub async fn handle_of(engine: &ReconciliationEngine, record_id: RecordId) -> LineHandle {
    engine
        .find_line(record_id)
        .await
        .unwrap_or_else(|| panic!("no line for record {}", record_id))
}

// ============================================================================
// Mock backend
// ============================================================================

/// Backend invocation as recorded by [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    StatementSummary(Vec<RecordId>),
    ManualSummary(ManualMode),
    LineDetails {
        line_ids: Vec<RecordId>,
        excluded_ids: Vec<RecordId>,
    },
    Templates,
    AnalyticTags(Vec<RecordId>),
    Accounts,
    Taxes,
    PartnerAccounts(RecordId),
    BankCandidates(CandidateQuery),
    ManualCandidates(CandidateQuery),
    ComputeTaxes(TaxComputation),
    SubmitBank {
        line_ids: Vec<RecordId>,
        data: Vec<StatementLineSubmission>,
    },
    SubmitManual(Vec<ManualReconciliation>),
    MarkPartnersReconciled(Vec<RecordId>),
    CloseStatement(RecordId),
    RenameStatement(RecordId, String),
}

#[derive(Debug, Clone)]
pub struct TaxRate {
    pub name: String,
    pub percent: Decimal,
    pub account_id: Option<RecordId>,
    pub exigibility: Option<String>,
    pub price_include: bool,
}

#[derive(Default)]
struct State {
    statement: Vec<RawStatementLine>,
    manual: ManualSummary,
    templates: Vec<ReconcileModel>,
    tags: Vec<NameGet>,
    accounts: Vec<AccountCode>,
    taxes: HashMap<RecordId, TaxRate>,
    partner_accounts: HashMap<RecordId, PartnerAccounts>,
    candidates: HashMap<RecordId, Vec<MoveLine>>,
    reconciled: HashSet<RecordId>,
    fail_taxes: bool,
    fail_submissions: bool,
}

/// In-memory backend serving canned data and recording every call.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<State>,
    calls: Mutex<Vec<Call>>,
}

impl MockBackend {
    pub fn new() -> Self {
        let backend = Self::default();
        {
            let mut state = backend.state.lock().unwrap();
            state.accounts = [
                (SUSPENSE_ACCOUNT, "499000"),
                (RECEIVABLE_ACCOUNT, "121000"),
                (PAYABLE_ACCOUNT, "211000"),
                (FEES_ACCOUNT, "626000"),
                (TAX_ACCOUNT, "451000"),
            ]
            .into_iter()
            .map(|(id, code)| AccountCode {
                id,
                code: code.to_string(),
            })
            .collect();
        }
        backend
    }

    pub fn with_statement(self, lines: Vec<RawStatementLine>) -> Self {
        self.state.lock().unwrap().statement = lines;
        self
    }

    pub fn with_manual(self, summary: ManualSummary) -> Self {
        self.state.lock().unwrap().manual = summary;
        self
    }

    pub fn with_candidates(self, record_id: RecordId, candidates: Vec<MoveLine>) -> Self {
        self.state
            .lock()
            .unwrap()
            .candidates
            .insert(record_id, candidates);
        self
    }

    pub fn with_template(self, model: ReconcileModel) -> Self {
        self.state.lock().unwrap().templates.push(model);
        self
    }

    pub fn with_analytic_tag(self, tag: NameGet) -> Self {
        self.state.lock().unwrap().tags.push(tag);
        self
    }

    pub fn with_tax(self, id: RecordId, name: &str, percent: &str, account_id: Option<RecordId>) -> Self {
        self.state.lock().unwrap().taxes.insert(
            id,
            TaxRate {
                name: name.to_string(),
                percent: dec(percent),
                account_id,
                exigibility: None,
                price_include: false,
            },
        );
        self
    }

    /// Register a tax whose rate is included in the amounts it applies to.
    pub fn with_price_included_tax(self, id: RecordId, name: &str, percent: &str) -> Self {
        self.state.lock().unwrap().taxes.insert(
            id,
            TaxRate {
                name: name.to_string(),
                percent: dec(percent),
                account_id: Some(TAX_ACCOUNT),
                exigibility: None,
                price_include: true,
            },
        );
        self
    }

    pub fn with_partner_accounts(self, partner_id: RecordId) -> Self {
        self.state.lock().unwrap().partner_accounts.insert(
            partner_id,
            PartnerAccounts {
                receivable_account_id: Some(RECEIVABLE_ACCOUNT),
                payable_account_id: Some(PAYABLE_ACCOUNT),
            },
        );
        self
    }

    pub fn failing_taxes(self) -> Self {
        self.state.lock().unwrap().fail_taxes = true;
        self
    }

    pub fn set_failing_submissions(&self, fail: bool) {
        self.state.lock().unwrap().fail_submissions = fail;
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn tax_calls(&self) -> Vec<TaxComputation> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::ComputeTaxes(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    pub fn candidate_queries(&self) -> Vec<CandidateQuery> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::BankCandidates(query) | Call::ManualCandidates(query) => Some(query),
                _ => None,
            })
            .collect()
    }

    pub fn bank_submissions(&self) -> Vec<(Vec<RecordId>, Vec<StatementLineSubmission>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SubmitBank { line_ids, data } => Some((line_ids, data)),
                _ => None,
            })
            .collect()
    }

    pub fn manual_submissions(&self) -> Vec<Vec<ManualReconciliation>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SubmitManual(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn candidates(&self, query: &CandidateQuery) -> Vec<MoveLine> {
        let state = self.state.lock().unwrap();
        let filter = query.filter.to_lowercase();
        state
            .candidates
            .get(&query.record_id)
            .into_iter()
            .flatten()
            .filter(|candidate| !query.excluded_ids.contains(&candidate.id))
            .filter(|candidate| !state.reconciled.contains(&candidate.id))
            .filter(|candidate| filter.is_empty() || candidate.label.to_lowercase().contains(&filter))
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn fetch_statement_summary(
        &self,
        line_ids: &[RecordId],
        _search_text: Option<&str>,
    ) -> Result<StatementSummary, EngineError> {
        self.record(Call::StatementSummary(line_ids.to_vec()));
        let state = self.state.lock().unwrap();
        let lines: Vec<RawStatementLine> = state
            .statement
            .iter()
            .filter(|raw| line_ids.contains(&raw.st_line.id))
            .cloned()
            .collect();
        Ok(StatementSummary {
            header: StatementHeader {
                statement_id: Some(STATEMENT_ID),
                statement_name: Some("BNK1/2024/0042".to_string()),
                journal_id: Some(NameGet::new(3, "Bank")),
                value_min: 0,
                value_max: lines.len() as u64,
            },
            lines,
        })
    }

    async fn fetch_manual_summary(
        &self,
        mode: ManualMode,
        _partner_ids: &[RecordId],
        _account_ids: &[RecordId],
    ) -> Result<ManualSummary, EngineError> {
        self.record(Call::ManualSummary(mode));
        Ok(self.state.lock().unwrap().manual.clone())
    }

    async fn fetch_line_details(
        &self,
        line_ids: &[RecordId],
        excluded_ids: &[RecordId],
    ) -> Result<Vec<RawStatementLine>, EngineError> {
        self.record(Call::LineDetails {
            line_ids: line_ids.to_vec(),
            excluded_ids: excluded_ids.to_vec(),
        });
        let state = self.state.lock().unwrap();
        Ok(state
            .statement
            .iter()
            .filter(|raw| line_ids.contains(&raw.st_line.id))
            .map(|raw| {
                let mut raw = raw.clone();
                raw.reconciliation_proposition
                    .retain(|candidate| !excluded_ids.contains(&candidate.id));
                raw
            })
            .collect())
    }

    async fn fetch_reconcile_templates(
        &self,
        _company_ids: &[RecordId],
    ) -> Result<Vec<ReconcileModel>, EngineError> {
        self.record(Call::Templates);
        Ok(self.state.lock().unwrap().templates.clone())
    }

    async fn fetch_analytic_tags(&self, ids: &[RecordId]) -> Result<Vec<NameGet>, EngineError> {
        self.record(Call::AnalyticTags(ids.to_vec()));
        Ok(self
            .state
            .lock()
            .unwrap()
            .tags
            .iter()
            .filter(|tag| ids.contains(&tag.id))
            .cloned()
            .collect())
    }

    async fn fetch_accounts(&self) -> Result<Vec<AccountCode>, EngineError> {
        self.record(Call::Accounts);
        Ok(self.state.lock().unwrap().accounts.clone())
    }

    async fn fetch_taxes(&self) -> Result<Vec<TaxInfo>, EngineError> {
        self.record(Call::Taxes);
        Ok(self
            .state
            .lock()
            .unwrap()
            .taxes
            .iter()
            .map(|(id, rate)| TaxInfo {
                id: *id,
                name: rate.name.clone(),
                price_include: rate.price_include,
            })
            .collect())
    }

    async fn fetch_partner_accounts(
        &self,
        partner_id: RecordId,
    ) -> Result<PartnerAccounts, EngineError> {
        self.record(Call::PartnerAccounts(partner_id));
        self.state
            .lock()
            .unwrap()
            .partner_accounts
            .get(&partner_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("partner {}", partner_id)))
    }

    async fn fetch_bank_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<MoveLine>, EngineError> {
        self.record(Call::BankCandidates(query.clone()));
        Ok(self.candidates(query))
    }

    async fn fetch_manual_candidates(
        &self,
        query: &CandidateQuery,
    ) -> Result<Vec<MoveLine>, EngineError> {
        self.record(Call::ManualCandidates(query.clone()));
        Ok(self.candidates(query))
    }

    async fn compute_taxes(&self, request: &TaxComputation) -> Result<ComputedTaxes, EngineError> {
        self.record(Call::ComputeTaxes(request.clone()));
        let state = self.state.lock().unwrap();
        if state.fail_taxes {
            return Err(EngineError::Rpc {
                code: 200,
                message: "tax engine unavailable".to_string(),
            });
        }

        let rates: Vec<(RecordId, &TaxRate)> = request
            .tax_ids
            .iter()
            .filter_map(|id| state.taxes.get(id).map(|rate| (*id, rate)))
            .collect();
        let base = match (request.force_price_include, rates.as_slice()) {
            (Some(true), [(_, rate)]) => round_to_decimals(
                request.base_amount / (Decimal::ONE + rate.percent / Decimal::ONE_HUNDRED),
                2,
            ),
            _ => request.base_amount,
        };
        let taxes = rates
            .into_iter()
            .map(|(id, rate)| ComputedTax {
                id,
                name: rate.name.clone(),
                amount: round_to_decimals(base * rate.percent / Decimal::ONE_HUNDRED, 2),
                account_id: rate.account_id,
                analytic: false,
                tax_exigibility: rate.exigibility.clone(),
            })
            .collect();
        Ok(ComputedTaxes { base, taxes })
    }

    async fn submit_bank_reconciliation(
        &self,
        line_ids: &[RecordId],
        data: &[StatementLineSubmission],
    ) -> Result<(), EngineError> {
        self.record(Call::SubmitBank {
            line_ids: line_ids.to_vec(),
            data: data.to_vec(),
        });
        let mut state = self.state.lock().unwrap();
        if state.fail_submissions {
            return Err(EngineError::Http { status: 503 });
        }
        for line in data {
            state.reconciled.extend(line.payment_aml_ids.iter().copied());
            state
                .reconciled
                .extend(line.counterpart_aml_dicts.iter().filter_map(|l| l.counterpart_aml_id));
        }
        Ok(())
    }

    async fn submit_manual_reconciliation(
        &self,
        data: &[ManualReconciliation],
    ) -> Result<(), EngineError> {
        self.record(Call::SubmitManual(data.to_vec()));
        let mut state = self.state.lock().unwrap();
        if state.fail_submissions {
            return Err(EngineError::Http { status: 503 });
        }
        for reconciliation in data {
            state
                .reconciled
                .extend(reconciliation.mv_line_ids.iter().copied());
        }
        Ok(())
    }

    async fn mark_partners_reconciled(&self, partner_ids: &[RecordId]) -> Result<(), EngineError> {
        self.record(Call::MarkPartnersReconciled(partner_ids.to_vec()));
        Ok(())
    }

    async fn close_statement(&self, statement_id: RecordId) -> Result<RecordId, EngineError> {
        self.record(Call::CloseStatement(statement_id));
        Ok(statement_id)
    }

    async fn rename_statement(&self, statement_id: RecordId, name: &str) -> Result<(), EngineError> {
        self.record(Call::RenameStatement(statement_id, name.to_string()));
        Ok(())
    }
}
