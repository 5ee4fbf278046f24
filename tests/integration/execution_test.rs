//! Execution lifecycle tests.
//!
//! Cover the per-query state machine, busy rejection, cooperative
//! cancellation and concurrent runs of different queries.

use std::sync::Arc;
use std::time::Duration;

use bdash::adapter::{MockAdapter, MockBehavior};
use bdash::engine::EngineOptions;
use bdash::error::BdashError;
use bdash::model::{DataSource, DataSourceId, Query, QueryId, QueryOutput, QueryPatch, QueryStatus, Value};
use bdash::store::Mutation;
use futures::future::join_all;
use pretty_assertions::assert_eq;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};

use super::{setting, workbench, workbench_with, Workbench};

fn new_query(wb: &Workbench, body: &str) -> QueryId {
    let id = assert_ok!(wb.dispatcher.add_new_query(None));
    wb.dispatcher.update_query(id, QueryPatch::default().body(body));
    id
}

/// `status == working` exactly when the engine holds a handle for the query.
fn assert_handle_matches_status(wb: &Workbench, id: QueryId) {
    let working = wb.store.query(id).map(|q| q.status == QueryStatus::Working);
    assert_eq!(
        working.unwrap_or(false),
        wb.dispatcher.engine().is_running(id),
        "status and handle table disagree for query {id}"
    );
}

#[tokio::test]
async fn test_suspended_driver_resolves_to_success() {
    let wb = workbench(
        MockAdapter::responding(&["x"], vec![vec![Value::Int(1)]])
            .with_delay(Duration::from_millis(20)),
    );
    let id = new_query(&wb, "SELECT 1");

    let handle = assert_ok!(wb.dispatcher.execute_query(id, None));
    assert_eq!(wb.store.query(id).unwrap().status, QueryStatus::Working);
    assert_handle_matches_status(&wb, id);

    assert_eq!(assert_ok!(handle.finished().await), QueryStatus::Success);

    let query = wb.store.query(id).unwrap();
    assert_eq!(query.status, QueryStatus::Success);
    let result = query.rows().unwrap();
    assert_eq!(result.fields, vec!["x"]);
    assert_eq!(result.rows, vec![vec![Value::Int(1)]]);
    assert!(result.runtime >= Duration::from_millis(20));
    assert_handle_matches_status(&wb, id);
}

#[tokio::test]
async fn test_cancel_acknowledged_by_driver() {
    let wb = workbench(MockAdapter::new().with_behavior(MockBehavior::Hang));
    let id = new_query(&wb, "SELECT pg_sleep(1000)");

    let handle = assert_ok!(wb.dispatcher.execute_query(id, None));
    assert!(wb.dispatcher.cancel_query(id));
    // A second cancel while the first is pending is a no-op.
    assert!(!wb.dispatcher.cancel_query(id));

    assert_eq!(assert_ok!(handle.finished().await), QueryStatus::Cancelled);
    let query = wb.store.query(id).unwrap();
    assert_eq!(query.status, QueryStatus::Cancelled);
    assert!(query.result.is_none());
    assert_handle_matches_status(&wb, id);
}

#[tokio::test]
async fn test_driver_failure_records_message() {
    let wb = workbench(
        MockAdapter::new().with_behavior(MockBehavior::Fail("relation \"userz\" does not exist".into())),
    );
    let id = new_query(&wb, "SELECT * FROM userz");

    let handle = assert_ok!(wb.dispatcher.execute_query(id, None));
    assert_eq!(assert_ok!(handle.finished().await), QueryStatus::Failure);

    let query = wb.store.query(id).unwrap();
    assert_eq!(
        query.result,
        Some(QueryOutput::error("relation \"userz\" does not exist"))
    );
}

#[tokio::test]
async fn test_busy_query_rejected_without_touching_state() {
    let gate = Arc::new(Notify::new());
    let wb = workbench(MockAdapter::new().with_gate(gate.clone()));
    let id = new_query(&wb, "SELECT 1");

    let handle = assert_ok!(wb.dispatcher.execute_query(id, None));
    let before = wb.store.query(id).unwrap();

    let err = assert_err!(wb.dispatcher.execute_query(id, None));
    assert!(matches!(err, BdashError::QueryBusy(busy) if busy == id));
    assert_eq!(wb.store.query(id).unwrap(), before);

    gate.notify_one();
    assert_eq!(assert_ok!(handle.finished().await), QueryStatus::Success);
    assert_eq!(wb.adapter.executed().len(), 1);
}

#[tokio::test]
async fn test_terminal_states_can_run_again() {
    let wb = workbench(MockAdapter::new());
    let id = new_query(&wb, "SELECT 1");

    for _ in 0..3 {
        let handle = assert_ok!(wb.dispatcher.execute_query(id, None));
        assert_eq!(assert_ok!(handle.finished().await), QueryStatus::Success);
        assert_handle_matches_status(&wb, id);
    }
    assert_eq!(wb.adapter.executed(), vec!["SELECT 1"; 3]);
}

#[tokio::test]
async fn test_observer_sees_working_then_success() {
    let gate = Arc::new(Notify::new());
    let wb = workbench(MockAdapter::new().with_gate(gate.clone()));
    let id = new_query(&wb, "SELECT 1");
    let mut rx = wb.store.subscribe();
    rx.borrow_and_update();

    let handle = assert_ok!(wb.dispatcher.execute_query(id, None));
    assert_ok!(rx.changed().await);
    assert_eq!(rx.borrow_and_update().query(id).unwrap().status, QueryStatus::Working);

    gate.notify_one();
    let done = wb
        .store
        .wait_for_query(id, |q| q.status.is_terminal())
        .await
        .unwrap();
    assert_eq!(done.status, QueryStatus::Success);
    assert_ok!(handle.finished().await);
}

#[tokio::test]
async fn test_timeout_ends_in_failure() {
    let wb = workbench_with(
        MockAdapter::new().with_behavior(MockBehavior::Hang),
        setting(),
        EngineOptions {
            timeout: Some(Duration::from_millis(20)),
        },
    );
    let id = new_query(&wb, "SELECT 1");

    let handle = assert_ok!(wb.dispatcher.execute_query(id, None));
    assert_eq!(assert_ok!(handle.finished().await), QueryStatus::Failure);

    let query = wb.store.query(id).unwrap();
    let message = query.result.as_ref().and_then(|r| r.error_message()).unwrap();
    assert!(message.contains("timed out"), "unexpected message: {message}");
    assert_handle_matches_status(&wb, id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_executes_of_one_query_admit_exactly_one() {
    let wb = workbench(MockAdapter::new().with_behavior(MockBehavior::Hang));
    let id = new_query(&wb, "SELECT 1");

    let attempts = (0..8).map(|_| {
        let dispatcher = wb.dispatcher.clone();
        tokio::spawn(async move { dispatcher.execute_query(id, None) })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let (admitted, rejected): (Vec<_>, Vec<_>) = results.into_iter().partition(|r| r.is_ok());
    assert_eq!(admitted.len(), 1);
    assert!(rejected
        .iter()
        .all(|r| matches!(r, Err(BdashError::QueryBusy(_)))));
    assert_handle_matches_status(&wb, id);

    assert!(wb.dispatcher.cancel_query(id));
    let handle = admitted.into_iter().next().unwrap().unwrap();
    assert_eq!(assert_ok!(handle.finished().await), QueryStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_different_queries_run_concurrently() {
    let wb = workbench(MockAdapter::new().with_delay(Duration::from_millis(200)));
    let ids: Vec<QueryId> = (0..3)
        .map(|i| new_query(&wb, &format!("SELECT {i}")))
        .collect();

    let handles: Vec<_> = ids
        .iter()
        .map(|id| wb.dispatcher.execute_query(*id, None).unwrap())
        .collect();
    assert_eq!(wb.dispatcher.engine().running(), ids);

    let statuses: Vec<QueryStatus> = join_all(handles.into_iter().map(|h| h.finished()))
        .await
        .into_iter()
        .map(|s| s.unwrap())
        .collect();

    assert_eq!(statuses, vec![QueryStatus::Success; 3]);
    for (i, id) in ids.iter().enumerate() {
        let query = wb.store.query(*id).unwrap();
        assert_eq!(
            query.rows().unwrap().rows,
            vec![vec![Value::from(format!("Mock result for: SELECT {i}"))]]
        );
    }
}

#[tokio::test]
async fn test_delete_during_run_leaves_no_trace() {
    let wb = workbench(MockAdapter::new().with_behavior(MockBehavior::Hang));
    let id = new_query(&wb, "SELECT 1");
    let handle = assert_ok!(wb.dispatcher.execute_query(id, None));

    assert!(wb.dispatcher.delete_query(id));

    assert_eq!(assert_ok!(handle.finished().await), QueryStatus::Cancelled);
    assert!(wb.store.query(id).is_none());
    assert!(wb.dispatcher.engine().running().is_empty());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(wb.adapter.cancel_requests(), 1);
}

#[tokio::test]
async fn test_query_restored_mid_run_can_execute_again() {
    let wb = workbench(MockAdapter::new());
    let id = QueryId::new(7);
    let mut restored = Query::new(id, DataSourceId::new(1)).with_body("SELECT 1");
    restored.status = QueryStatus::Working;
    wb.store.apply(Mutation::Initialize {
        queries: vec![restored],
        charts: vec![],
        data_sources: vec![DataSource::new(DataSourceId::new(1), "local", "mock")],
        setting: setting(),
    });

    assert_eq!(wb.store.query(id).unwrap().status, QueryStatus::Idle);
    assert_handle_matches_status(&wb, id);
    assert!(!wb.dispatcher.cancel_query(id));

    let handle = assert_ok!(wb.dispatcher.execute_query(id, None));
    assert_eq!(assert_ok!(handle.finished().await), QueryStatus::Success);
}
