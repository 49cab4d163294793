// Project indexing and loose-parameter queries end to end

use lepasserelle::{open_project, query_request, similar_params, ParamError};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn write(dir: &TempDir, path: &str, content: &str) {
    let full = dir.path().join(path);
    if let Some(parent) = full.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(full, content).expect("write");
}

fn project() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    write(
        &dir,
        "app/db.py",
        "def connect(url):\n    return open_pool(url)\n\ndef open_pool(url):\n    return [url]\n",
    );
    write(&dir, "app/main.py", "from db import connect\n\ndef start():\n    return connect(\"sqlite://\")\n");
    write(&dir, "web/api.ts", "export function connect(url: string): string {\n  return url;\n}\n");
    write(&dir, "node_modules/dep/index.js", "function connect() {}\n");
    dir
}

#[tokio::test]
async fn test_query_with_string_encoded_filters() {
    let dir = project();
    let (index, summary) = open_project(dir.path()).await.expect("open");
    assert_eq!(summary.indexed, 3);

    let request = query_request(&json!({
        "query": "connect",
        "filters": "[\"language=python\", \"kind=function\"]",
        "top_k": "10",
    }))
    .expect("request");
    let results = index.query(request).await.expect("query");
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.path.starts_with("app/")));
    assert_eq!(results[0].name, "connect");
}

#[tokio::test]
async fn test_similar_params_reach_the_index() {
    let dir = project();
    let (index, _) = open_project(dir.path()).await.expect("open");
    let connect = index
        .find_symbols("connect")
        .await
        .into_iter()
        .find(|s| s.unit.path == "app/db.py")
        .expect("connect");

    let params = similar_params(&json!({"symbol_id": connect.id.to_string(), "threshold": "0"})).expect("params");
    let similar = index.get_similar(&params.symbol_id, params.threshold).await.expect("similar");
    assert!(similar.iter().all(|(id, _)| *id != connect.id));
    assert!(similar.windows(2).all(|w| w[0].1 >= w[1].1));
}

#[test]
fn test_bad_arguments_never_reach_the_index() {
    let err = query_request(&json!({"query": "connect", "filters": {"date_range": "2024-05-01..2024-01-01"}}))
        .unwrap_err();
    match err {
        ParamError::Filter(e) => assert_eq!(e.reason(), "inverted_date_range"),
        other => panic!("unexpected {:?}", other),
    }
}
