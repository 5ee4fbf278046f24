//! Export tests: run a query, copy its result in every format and read it back.

use bdash::adapter::MockAdapter;
use bdash::error::ValidationError;
use bdash::format::ResultFormat;
use bdash::model::{QueryId, QueryPatch, QueryStatus, Value};
use pretty_assertions::assert_eq;
use tokio_test::assert_ok;

use super::{workbench, Workbench};

fn awkward_rows() -> MockAdapter {
    MockAdapter::responding(
        &["id", "name", "note", "score"],
        vec![
            vec![
                Value::Int(1),
                Value::from("Smith, John"),
                Value::from("said \"hi\"\nthen left"),
                Value::Float(1.5),
            ],
            vec![
                Value::Int(2),
                Value::from("tab\there"),
                Value::Null,
                Value::Null,
            ],
        ],
    )
}

async fn finished_query(wb: &Workbench) -> QueryId {
    let id = assert_ok!(wb.dispatcher.add_new_query(None));
    wb.dispatcher
        .update_query(id, QueryPatch::default().body("SELECT * FROM people"));
    let handle = assert_ok!(wb.dispatcher.execute_query(id, None));
    assert_eq!(assert_ok!(handle.finished().await), QueryStatus::Success);
    id
}

fn copy(wb: &Workbench, id: QueryId, format: ResultFormat) -> String {
    assert_ok!(wb.dispatcher.copy_result(id, format));
    wb.clipboard.last().unwrap()
}

fn read_records(text: &str, delimiter: u8) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_reader(text.as_bytes());
    reader
        .records()
        .map(|record| record.unwrap().iter().map(str::to_string).collect())
        .collect()
}

#[tokio::test]
async fn test_csv_export_reads_back_intact() {
    let wb = workbench(awkward_rows());
    let id = finished_query(&wb).await;

    let text = copy(&wb, id, ResultFormat::Csv);
    assert!(text.starts_with("id,name,note,score\n"));

    assert_eq!(
        read_records(&text, b','),
        vec![
            vec!["id", "name", "note", "score"],
            vec!["1", "Smith, John", "said \"hi\"\nthen left", "1.5"],
            vec!["2", "tab\there", "", ""],
        ]
    );
}

#[tokio::test]
async fn test_tsv_export_reads_back_intact() {
    let wb = workbench(awkward_rows());
    let id = finished_query(&wb).await;

    let text = copy(&wb, id, ResultFormat::Tsv);
    assert!(text.starts_with("id\tname\tnote\tscore\n"));

    let records = read_records(&text, b'\t');
    assert_eq!(records.len(), 3);
    assert_eq!(records[1][2], "said \"hi\"\nthen left");
    assert_eq!(records[2][1], "tab\there");
}

#[tokio::test]
async fn test_json_export_keeps_field_order_and_nulls() {
    let wb = workbench(awkward_rows());
    let id = finished_query(&wb).await;

    let text = copy(&wb, id, ResultFormat::Json);
    let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();

    assert_eq!(
        parsed,
        serde_json::json!([
            {"id": 1, "name": "Smith, John", "note": "said \"hi\"\nthen left", "score": 1.5},
            {"id": 2, "name": "tab\there", "note": null, "score": null},
        ])
    );

    let first_row = &text[text.find('{').unwrap()..text.find('}').unwrap()];
    let positions: Vec<usize> = ["\"id\"", "\"name\"", "\"note\"", "\"score\""]
        .iter()
        .map(|key| first_row.find(key).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn test_markdown_export_escapes_cells() {
    let wb = workbench(MockAdapter::responding(
        &["expr", "value"],
        vec![vec![Value::from("a|b"), Value::from("one\ntwo")]],
    ));
    let id = finished_query(&wb).await;

    assert_eq!(
        copy(&wb, id, ResultFormat::Markdown),
        "| expr | value |\n| --- | --- |\n| a\\|b | one<br>two |\n"
    );
}

#[tokio::test]
async fn test_copy_without_result_is_rejected() {
    let wb = workbench(MockAdapter::new());
    let id = assert_ok!(wb.dispatcher.add_new_query(None));

    let err = wb.dispatcher.copy_result(id, ResultFormat::Csv).unwrap_err();
    assert_eq!(err.as_validation(), Some(&ValidationError::NoResult));
    assert!(wb.clipboard.copies().is_empty());
}

#[tokio::test]
async fn test_every_format_is_deterministic() {
    let wb = workbench(awkward_rows());
    let id = finished_query(&wb).await;

    for format in ResultFormat::ALL {
        let first = copy(&wb, id, format);
        let second = copy(&wb, id, format);
        assert_eq!(first, second, "{format} output differs between calls");
    }
}
