//! Integration tests for candidate search and mode switching.

mod common;

use common::*;
use reconciliation_engine::models::{
    LineHandle, LoadContext, Mode, MoveLine, NameGet, PropositionUpdate, RawStatementLine,
};
use reconciliation_engine::ReconciliationEngine;
use rust_decimal::Decimal;
use std::sync::Arc;

fn invoices(ids: std::ops::RangeInclusive<i64>) -> Vec<MoveLine> {
    ids.map(|id| move_line(id, "10")).collect()
}

/// One line of 100 with twenty open invoices to pick from.
async fn setup_line(context: LoadContext) -> (Arc<MockBackend>, ReconciliationEngine, LineHandle) {
    let backend = MockBackend::new()
        .with_statement(vec![raw_line(statement_line(10, "SEPA 2024/101", "100"))])
        .with_candidates(10, invoices(501..=520))
        .into_arc();
    let engine = bank_engine(&backend);
    engine.load(context).await.unwrap();
    let handle = handle_of(&engine, 10).await;
    (backend, engine, handle)
}

/// One line of 100 with forty open invoices, enough for several pages.
async fn setup_long_line() -> (Arc<MockBackend>, ReconciliationEngine, LineHandle) {
    let backend = MockBackend::new()
        .with_statement(vec![raw_line(statement_line(10, "SEPA 2024/101", "100"))])
        .with_candidates(10, invoices(501..=540))
        .into_arc();
    let engine = bank_engine(&backend);
    engine.load(LoadContext::statement(vec![10])).await.unwrap();
    let handle = handle_of(&engine, 10).await;
    (backend, engine, handle)
}

fn candidate_ids(line: &reconciliation_engine::models::Line) -> Vec<i64> {
    line.mv_lines.iter().map(|c| c.id).collect()
}

/// One line of 100 and no invoice at all.
async fn setup_lonely_line(context: LoadContext) -> (ReconciliationEngine, LineHandle) {
    let backend = MockBackend::new()
        .with_statement(vec![raw_line(statement_line(10, "SEPA 2024/101", "100"))])
        .into_arc();
    let engine = bank_engine(&backend);
    engine.load(context).await.unwrap();
    let handle = handle_of(&engine, 10).await;
    (engine, handle)
}

#[tokio::test]
async fn next_page_is_appended_to_the_candidates() {
    let (backend, engine, handle) = setup_line(LoadContext::statement(vec![10])).await;

    engine.change_mode(handle, Mode::Match).await.unwrap();
    let first = backend.candidate_queries().pop().unwrap();
    assert_eq!((first.offset, first.limit), (0, 15));
    assert_eq!(engine.line(handle).await.unwrap().mv_lines.len(), 15);

    engine.change_offset(handle, 1).await.unwrap();
    let second = backend.candidate_queries().pop().unwrap();
    assert_eq!((second.offset, second.limit), (15, 15));

    let line = engine.line(handle).await.unwrap();
    assert_eq!(line.offset, 1);
    assert_eq!(line.mv_lines.len(), 20);
    assert_eq!(line.mv_lines[0].id, 501);
    assert_eq!(line.mv_lines[15].id, 516);
}

#[tokio::test]
async fn filter_restarts_from_the_first_page() {
    let (backend, engine, handle) = setup_line(LoadContext::statement(vec![10])).await;
    engine.change_mode(handle, Mode::Match).await.unwrap();
    engine.change_offset(handle, 1).await.unwrap();

    engine
        .change_filter(handle, "0512".to_string())
        .await
        .unwrap();

    let query = backend.candidate_queries().pop().unwrap();
    assert_eq!(query.offset, 0);
    assert_eq!(query.filter, "0512");

    let line = engine.line(handle).await.unwrap();
    assert_eq!(line.offset, 0);
    assert_eq!(line.mode, Mode::Match);
    assert_eq!(
        line.mv_lines.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![512]
    );
}

#[tokio::test]
async fn filter_without_results_stays_in_match_mode() {
    let (_backend, engine, handle) = setup_line(LoadContext::statement(vec![10])).await;
    engine.change_mode(handle, Mode::Match).await.unwrap();

    engine
        .change_filter(handle, "no such invoice".to_string())
        .await
        .unwrap();

    let line = engine.line(handle).await.unwrap();
    assert_eq!(line.mode, Mode::Match);
    assert!(line.mv_lines.is_empty());
    assert!(line.reconciliation_proposition.is_empty());
}

#[tokio::test]
async fn claimed_records_are_never_offered_again() {
    let pool = vec![move_line(501, "100"), move_line(502, "100")];
    let backend = MockBackend::new()
        .with_statement(vec![
            RawStatementLine {
                reconciliation_proposition: vec![move_line(501, "100")],
                ..raw_line(statement_line(10, "SEPA 2024/101", "100"))
            },
            raw_line(statement_line(11, "SEPA 2024/102", "100")),
        ])
        .with_candidates(10, pool.clone())
        .with_candidates(11, pool)
        .into_arc();
    let engine = bank_engine(&backend);
    engine.load(LoadContext::statement(vec![10, 11])).await.unwrap();

    let other = handle_of(&engine, 11).await;
    engine.change_mode(other, Mode::Match).await.unwrap();
    let query = backend.candidate_queries().pop().unwrap();
    assert_eq!(query.excluded_ids, vec![501]);
    let ids: Vec<i64> = engine
        .line(other)
        .await
        .unwrap()
        .mv_lines
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec![502]);

    // The owner does not see its own match as a candidate either.
    let owner = handle_of(&engine, 10).await;
    engine.change_mode(owner, Mode::Match).await.unwrap();
    let ids: Vec<i64> = engine
        .line(owner)
        .await
        .unwrap()
        .mv_lines
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec![502]);
}

#[tokio::test]
async fn no_candidates_opens_the_create_form() {
    let (engine, handle) = setup_lonely_line(LoadContext::statement(vec![10])).await;

    engine.change_mode(handle, Mode::Match).await.unwrap();

    let line = engine.line(handle).await.unwrap();
    assert_eq!(line.mode, Mode::Create);
    assert_eq!(line.reconciliation_proposition.len(), 1);
    let draft = &line.reconciliation_proposition[0];
    assert!(draft.id.is_draft());
    assert!(draft.is_focused());
    assert_eq!(draft.amount, Decimal::from(100));
    assert_eq!(line.create_form.as_ref().map(|f| f.amount), Some(Decimal::from(100)));
    // Without an account the draft does not count yet.
    assert!(draft.invalid);
    assert_eq!(line.balance.amount, Decimal::from(100));
}

#[tokio::test]
async fn avoid_create_leaves_the_line_inactive() {
    let (engine, handle) =
        setup_lonely_line(LoadContext::statement(vec![10]).with_avoid_create(true)).await;

    engine.change_mode(handle, Mode::Match).await.unwrap();

    let line = engine.line(handle).await.unwrap();
    assert_eq!(line.mode, Mode::Inactive);
    assert!(line.reconciliation_proposition.is_empty());
    assert!(line.create_form.is_none());
}

#[tokio::test]
async fn balanced_line_without_candidates_goes_inactive() {
    let backend = MockBackend::new()
        .with_statement(vec![RawStatementLine {
            reconciliation_proposition: vec![move_line(501, "100")],
            ..raw_line(statement_line(10, "SEPA 2024/101", "100"))
        }])
        .into_arc();
    let engine = bank_engine(&backend);
    engine.load(LoadContext::statement(vec![10])).await.unwrap();
    let handle = handle_of(&engine, 10).await;

    engine.change_mode(handle, Mode::Match).await.unwrap();

    let line = engine.line(handle).await.unwrap();
    assert_eq!(line.mode, Mode::Inactive);
    assert_eq!(line.reconciliation_proposition.len(), 1);
}

#[tokio::test]
async fn leaving_create_mode_drops_incomplete_drafts() {
    let (engine, handle) = setup_lonely_line(LoadContext::statement(vec![10])).await;
    engine.change_mode(handle, Mode::Create).await.unwrap();
    assert_eq!(engine.line(handle).await.unwrap().reconciliation_proposition.len(), 1);

    engine.change_mode(handle, Mode::Inactive).await.unwrap();

    let line = engine.line(handle).await.unwrap();
    assert_eq!(line.mode, Mode::Inactive);
    assert!(line.reconciliation_proposition.is_empty());
    assert!(line.create_form.is_none());
}

#[tokio::test]
async fn unknown_line_is_not_found() {
    let (_backend, engine, _handle) = setup_line(LoadContext::statement(vec![10])).await;

    let err = engine
        .change_offset(LineHandle(9_999), 1)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn adding_a_match_keeps_every_shown_page() {
    let (backend, engine, handle) = setup_long_line().await;
    engine.change_mode(handle, Mode::Match).await.unwrap();
    engine.change_offset(handle, 1).await.unwrap();
    assert_eq!(engine.line(handle).await.unwrap().mv_lines.len(), 30);

    engine.add_proposition(handle, 505).await.unwrap();

    let refresh = backend.candidate_queries().pop().unwrap();
    assert_eq!((refresh.offset, refresh.limit), (0, 30));
    let ids = candidate_ids(&engine.line(handle).await.unwrap());
    assert_eq!(ids.len(), 30);
    assert_eq!(ids[0], 501);
    assert!(!ids.contains(&505));

    engine.change_offset(handle, 1).await.unwrap();

    let next = backend.candidate_queries().pop().unwrap();
    assert_eq!((next.offset, next.limit), (30, 15));
    let ids = candidate_ids(&engine.line(handle).await.unwrap());
    let expected: Vec<i64> = (501..=540).filter(|id| *id != 505).collect();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn paging_after_dropping_a_draft_skips_nothing() {
    let (backend, engine, handle) = setup_long_line().await;
    engine.change_mode(handle, Mode::Match).await.unwrap();
    engine.change_mode(handle, Mode::Create).await.unwrap();
    engine
        .update_proposition(
            handle,
            vec![
                PropositionUpdate::Account(Some(NameGet::new(FEES_ACCOUNT, "626000 Bank Fees"))),
                PropositionUpdate::Amount(dec("40")),
            ],
        )
        .await
        .unwrap();
    let draft = engine.line(handle).await.unwrap().reconciliation_proposition[0]
        .id
        .clone();
    engine.remove_proposition(handle, draft).await.unwrap();
    assert_eq!(engine.line(handle).await.unwrap().limit_override, None);

    engine.change_offset(handle, 1).await.unwrap();
    let second = backend.candidate_queries().pop().unwrap();
    assert_eq!((second.offset, second.limit), (15, 15));

    engine.change_offset(handle, 1).await.unwrap();
    let third = backend.candidate_queries().pop().unwrap();
    assert_eq!((third.offset, third.limit), (30, 15));

    let line = engine.line(handle).await.unwrap();
    assert_eq!(line.offset, 2);
    assert_eq!(candidate_ids(&line), (501..=540).collect::<Vec<i64>>());
}
