use std::sync::Arc;
use std::time::Duration;

use ragops::config::Config;
use ragops::server::{router, AppState};
use serde_json::Value;
use tempfile::TempDir;

struct TestServer {
    base: String,
    tmp: TempDir,
}

fn test_config(tmp: &TempDir) -> Config {
    let mut config = Config::minimal();
    config.storage.data_dir = tmp.path().join("data");
    config.storage.index_path = tmp.path().join("index/ragops.sqlite");
    config.retrieval.top_k = 3;
    config
}

/// Serve the API on a free port. With `initialize`, the index is built
/// before the first request, as `run_server` does.
async fn spawn_server(initialize: bool, seed: &[(&str, &str)]) -> TestServer {
    let tmp = TempDir::new().unwrap();
    let config = Arc::new(test_config(&tmp));
    std::fs::create_dir_all(&config.storage.data_dir).unwrap();
    for (name, body) in seed {
        std::fs::write(config.storage.data_dir.join(name), body).unwrap();
    }

    let state = AppState::new(config.clone()).unwrap();
    if initialize {
        state.store.rebuild(config).await.unwrap();
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    let base = format!("http://{}", addr);
    wait_healthy(&base).await;
    TestServer { base, tmp }
}

async fn wait_healthy(base: &str) {
    let client = reqwest::Client::new();
    for _ in 0..50 {
        if let Ok(resp) = client.get(format!("{}/health", base)).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("server at {} never became healthy", base);
}

async fn upload(base: &str, name: &str, body: &str) -> reqwest::Response {
    let part = reqwest::multipart::Part::bytes(body.as_bytes().to_vec()).file_name(name.to_string());
    let form = reqwest::multipart::Form::new().part("file", part);
    reqwest::Client::new()
        .post(format!("{}/api/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

async fn query(base: &str, text: &str) -> reqwest::Response {
    reqwest::Client::new()
        .get(format!("{}/api/query", base))
        .query(&[("query_text", text)])
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn health_reports_version() {
    let server = spawn_server(true, &[]).await;
    let body: Value = reqwest::get(format!("{}/health", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn query_before_index_is_500_with_detail() {
    let server = spawn_server(false, &[]).await;
    let resp = query(&server.base, "anything").await;
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "Index not initialized");
}

#[tokio::test]
async fn empty_index_answers_with_no_contexts() {
    let server = spawn_server(true, &[]).await;
    let resp = query(&server.base, "anything").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["response"], "Empty Response");
    assert_eq!(body["contexts"], serde_json::json!([]));
}

#[tokio::test]
async fn upload_then_list_then_query() {
    let server = spawn_server(true, &[("runbook.md", "Rotate the deploy keys every quarter.")]).await;

    let notes = "The staging cluster deploy uses blue green rollout.\n\n\
                 Rollback of a deploy is done with the rollback script.";
    let resp = upload(&server.base, "notes.txt", notes).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["message"],
        "Successfully uploaded notes.txt and updated index"
    );

    let docs: Value = reqwest::get(format!("{}/api/documents", server.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = docs["documents"].as_array().unwrap();
    let notes_entry = entries
        .iter()
        .find(|d| d["name"] == "notes.txt")
        .expect("notes.txt listed");
    assert_eq!(notes_entry["size"], notes.len() as u64);
    assert!(notes_entry["last_modified"].as_f64().unwrap() > 0.0);
    assert!(entries.iter().all(|d| !d["name"].as_str().unwrap().starts_with('.')));

    let resp = query(&server.base, "deploy rollback").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(!body["response"].as_str().unwrap().is_empty());

    let contexts = body["contexts"].as_array().unwrap();
    assert!(!contexts.is_empty());
    assert_eq!(contexts[0]["file_name"], "notes.txt");
    assert_eq!(contexts[0]["metadata"]["file_name"], "notes.txt");
    assert!(contexts[0]["text_preview"].as_str().unwrap().ends_with("..."));

    let scores: Vec<f64> = contexts
        .iter()
        .filter_map(|c| c["score"].as_f64())
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]), "scores not descending: {:?}", scores);
}

#[tokio::test]
async fn reload_picks_up_new_files() {
    let server = spawn_server(true, &[]).await;

    let body: Value = query(&server.base, "kubernetes").await.json().await.unwrap();
    assert_eq!(body["contexts"], serde_json::json!([]));

    let data_dir = server.tmp.path().join("data");
    std::fs::write(data_dir.join("infra.txt"), "Kubernetes runs the workers.").unwrap();

    let resp = reqwest::Client::new()
        .post(format!("{}/api/reload", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "Index reloaded successfully");

    let body: Value = query(&server.base, "kubernetes").await.json().await.unwrap();
    assert_eq!(body["contexts"][0]["file_name"], "infra.txt");
    assert_eq!(body["contexts"][0]["text_preview"], "Kubernetes runs the workers.");
}

#[tokio::test]
async fn missing_query_text_is_500_with_detail() {
    let server = spawn_server(true, &[]).await;
    let resp = reqwest::get(format!("{}/api/query", server.base)).await.unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().is_some());
}

#[tokio::test]
async fn upload_without_file_is_500() {
    let server = spawn_server(true, &[]).await;
    let form = reqwest::multipart::Form::new().text("note", "no file here");
    let resp = reqwest::Client::new()
        .post(format!("{}/api/upload", server.base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "No file provided");
}

#[tokio::test]
async fn upload_hidden_name_is_rejected() {
    let server = spawn_server(true, &[]).await;
    let resp = upload(&server.base, ".env", "SECRET=1").await;
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("Invalid file name"));
}
