//! Sharing flows through the dispatcher with recording clients.

use std::sync::{Arc, Mutex};

use bdash::adapter::MockAdapter;
use bdash::dispatcher::{BdashShareOutcome, FixedDecision, OverwriteDecision, UrlOpener};
use bdash::engine::EngineOptions;
use bdash::error::{BdashError, Result, ValidationError};
use bdash::format::ResultFormat;
use bdash::model::{ChartConfig, ChartKind, QueryId, QueryPatch, QueryStatus, Setting, Value};
use bdash::sharing::Overwrite;
use bdash::store::Mutation;
use pretty_assertions::assert_eq;
use tokio_test::assert_ok;

use super::{setting, workbench, workbench_with, Workbench};

#[derive(Default)]
struct RecordingOpener {
    opened: Mutex<Vec<String>>,
}

impl RecordingOpener {
    fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl UrlOpener for RecordingOpener {
    fn open(&self, url: &str) -> Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

fn daily_users() -> MockAdapter {
    MockAdapter::responding(
        &["day", "users"],
        vec![
            vec![Value::from("2024-01-01"), Value::Int(42)],
            vec![Value::from("2024-01-02"), Value::Null],
        ],
    )
}

async fn shared_ready_query(wb: &Workbench, remote_id: Option<&str>) -> QueryId {
    let id = assert_ok!(wb.dispatcher.add_new_query(None));
    let mut patch = QueryPatch::default()
        .title("Daily users")
        .body("SELECT day, users FROM daily");
    if let Some(remote_id) = remote_id {
        patch = patch.bdash_server_query_id(remote_id);
    }
    wb.dispatcher.update_query(id, patch);

    let handle = assert_ok!(wb.dispatcher.execute_query(id, None));
    assert_eq!(assert_ok!(handle.finished().await), QueryStatus::Success);
    id
}

#[tokio::test]
async fn test_reshare_with_update_overwrites_remote_record() {
    let wb = workbench(daily_users());
    let id = shared_ready_query(&wb, Some("abc")).await;
    let opener = Arc::new(RecordingOpener::default());
    let dispatcher = wb
        .dispatcher
        .clone()
        .with_url_opener(opener.clone())
        .with_confirmation(Arc::new(FixedDecision(OverwriteDecision::Update)));

    let outcome = assert_ok!(dispatcher.share_on_bdash_server(id).await);

    let requests = wb.server.requests();
    assert_eq!(requests.len(), 1);
    let (base_url, token, request) = &requests[0];
    assert_eq!(base_url, "https://bdash.example.com/");
    assert_eq!(token, "bs-token");
    assert_eq!(request.overwrite, Some(Overwrite::new("abc")));
    assert_eq!(request.title, "Daily users");
    assert_eq!(request.query_sql, "SELECT day, users FROM daily");
    assert_eq!(request.result_tsv, "day\tusers\n2024-01-01\t42\n2024-01-02\t\n");

    let BdashShareOutcome::Shared(response) = outcome else {
        panic!("expected the query to be shared");
    };
    assert_eq!(response.html_url, "https://bdash.example.com/queries/abc");
    assert_eq!(opener.opened(), vec!["https://bdash.example.com/queries/abc"]);
    assert_eq!(
        wb.store.query(id).unwrap().bdash_server_query_id.as_deref(),
        Some("abc")
    );
}

#[tokio::test]
async fn test_reshare_with_create_allocates_new_identity() {
    let wb = workbench(daily_users());
    let id = shared_ready_query(&wb, Some("abc")).await;
    let dispatcher = wb
        .dispatcher
        .clone()
        .with_confirmation(Arc::new(FixedDecision(OverwriteDecision::Create)));

    assert_ok!(dispatcher.share_on_bdash_server(id).await);

    assert_eq!(wb.server.requests()[0].2.overwrite, None);
    assert_eq!(
        wb.store.query(id).unwrap().bdash_server_query_id.as_deref(),
        Some("mock-1")
    );
}

#[tokio::test]
async fn test_reshare_cancelled_sends_nothing() {
    let wb = workbench(daily_users());
    let id = shared_ready_query(&wb, Some("abc")).await;
    let dispatcher = wb
        .dispatcher
        .clone()
        .with_confirmation(Arc::new(FixedDecision(OverwriteDecision::Cancel)));

    let outcome = assert_ok!(dispatcher.share_on_bdash_server(id).await);

    assert_eq!(outcome, BdashShareOutcome::Cancelled);
    assert!(wb.server.requests().is_empty());
    assert_eq!(
        wb.store.query(id).unwrap().bdash_server_query_id.as_deref(),
        Some("abc")
    );
}

#[tokio::test]
async fn test_reshare_without_confirmation_is_refused() {
    let wb = workbench(daily_users());
    let id = shared_ready_query(&wb, Some("abc")).await;

    let err = wb.dispatcher.share_on_bdash_server(id).await.unwrap_err();

    assert!(matches!(err, BdashError::Config(_)));
    assert!(wb.server.requests().is_empty());
}

#[tokio::test]
async fn test_first_share_persists_identity_then_asks_on_next_share() {
    let wb = workbench(daily_users());
    let id = shared_ready_query(&wb, None).await;

    let outcome = assert_ok!(wb.dispatcher.share_on_bdash_server(id).await);
    assert!(matches!(outcome, BdashShareOutcome::Shared(_)));
    assert_eq!(
        wb.store.query(id).unwrap().bdash_server_query_id.as_deref(),
        Some("mock-1")
    );

    let dispatcher = wb
        .dispatcher
        .clone()
        .with_confirmation(Arc::new(FixedDecision(OverwriteDecision::Update)));
    assert_ok!(dispatcher.share_on_bdash_server(id).await);

    let requests = wb.server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].2.overwrite, None);
    assert_eq!(requests[1].2.overwrite, Some(Overwrite::new("mock-1")));
}

#[tokio::test]
async fn test_missing_tokens_fail_without_network_calls() {
    let mut no_tokens = setting();
    no_tokens.github.token = None;
    no_tokens.bdash_server.token = Some("  ".into());
    let wb = workbench_with(daily_users(), no_tokens, EngineOptions::default());
    let id = shared_ready_query(&wb, None).await;

    let err = wb
        .dispatcher
        .share_on_gist(id, ResultFormat::Csv)
        .await
        .unwrap_err();
    assert_eq!(
        err.as_validation(),
        Some(&ValidationError::MissingToken { service: "GitHub" })
    );

    let err = wb.dispatcher.share_on_bdash_server(id).await.unwrap_err();
    assert_eq!(
        err.as_validation(),
        Some(&ValidationError::MissingToken {
            service: "Bdash Server"
        })
    );

    assert!(wb.gist.requests().is_empty());
    assert!(wb.server.requests().is_empty());
}

#[tokio::test]
async fn test_gist_share_with_json_result() {
    let wb = workbench(daily_users());
    let id = shared_ready_query(&wb, None).await;
    wb.dispatcher.update_chart(
        id,
        ChartConfig {
            kind: ChartKind::Bar,
            x_column: Some("day".into()),
            y_columns: vec!["users".into()],
            ..Default::default()
        },
    );
    let opener = Arc::new(RecordingOpener::default());
    let dispatcher = wb.dispatcher.clone().with_url_opener(opener.clone());

    let url = assert_ok!(dispatcher.share_on_gist(id, ResultFormat::Json).await);

    assert_eq!(url, "https://gist.github.com/mock/1");
    assert_eq!(opener.opened(), vec![url]);

    let requests = wb.gist.requests();
    assert_eq!(requests.len(), 1);
    let (api_url, token, request) = &requests[0];
    assert_eq!(api_url, "https://api.github.com/");
    assert_eq!(token, "gh-token");
    assert_eq!(request.description, "Daily users");
    assert!(!request.public);
    assert_eq!(
        request.files.keys().collect::<Vec<_>>(),
        vec!["manifest.json", "query.sql", "result.json"]
    );
    assert_eq!(request.files["query.sql"].content, "SELECT day, users FROM daily");

    let rows: serde_json::Value = serde_json::from_str(&request.files["result.json"].content).unwrap();
    assert_eq!(
        rows,
        serde_json::json!([
            {"day": "2024-01-01", "users": 42},
            {"day": "2024-01-02", "users": null},
        ])
    );

    let manifest: serde_json::Value =
        serde_json::from_str(&request.files["manifest.json"].content).unwrap();
    assert_eq!(manifest["chart"]["type"], "bar");
    assert_eq!(manifest["dataSource"]["type"], "mock");
}

#[tokio::test]
async fn test_every_gist_share_creates_a_new_gist() {
    let wb = workbench(daily_users());
    let id = shared_ready_query(&wb, None).await;

    let first = assert_ok!(wb.dispatcher.share_on_gist(id, ResultFormat::Csv).await);
    let second = assert_ok!(wb.dispatcher.share_on_gist(id, ResultFormat::Csv).await);

    assert_ne!(first, second);
    assert_eq!(wb.gist.requests().len(), 2);
}

#[tokio::test]
async fn test_share_without_result_is_rejected() {
    let wb = workbench(daily_users());
    let id = assert_ok!(wb.dispatcher.add_new_query(None));

    let err = wb
        .dispatcher
        .share_on_gist(id, ResultFormat::Csv)
        .await
        .unwrap_err();
    assert_eq!(err.as_validation(), Some(&ValidationError::NoResult));
    assert!(wb.gist.requests().is_empty());
}

#[tokio::test]
async fn test_add_query_without_data_sources() {
    let wb = workbench_with(MockAdapter::new(), Setting::default(), EngineOptions::default());
    wb.store.apply(Mutation::SetDataSources(Vec::new()));

    let err = wb.dispatcher.add_new_query(None).unwrap_err();

    assert_eq!(err.as_validation(), Some(&ValidationError::NoDataSource));
    assert!(wb.store.snapshot().queries.is_empty());
}
