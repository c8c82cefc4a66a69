use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use esa_core::corpus::{ConceptRecord, MemoryCorpus};
use esa_core::persist::ModelPaths;
use esa_core::pipeline::build;
use esa_core::ModelConfig;
use http_body_util::BodyExt;
use serde_json::Value;
use std::fs;
use tempfile::{tempdir, TempDir};

fn build_tiny_model() -> TempDir {
    let dir = tempdir().unwrap();
    let records = vec![
        ConceptRecord::new("Rust", "rust compiler borrow checker cargo rust"),
        ConceptRecord::new("Python", "python interpreter pip indentation"),
        ConceptRecord::new("Gardening", "soil compost seed rake"),
    ];
    let config = ModelConfig { row_chunk_size: 4, batch_size: 2, ..ModelConfig::default() };
    build(&ModelPaths::new(dir.path()), &MemoryCorpus::new(records), std::iter::empty(), &config, false).unwrap();
    dir
}

async fn call(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let req = Request::get(uri).body(Body::empty()).unwrap();
    let resp = tower::ServiceExt::oneshot(app, req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

#[tokio::test]
async fn health_is_ok() {
    let dir = build_tiny_model();
    let app = esa_server::build_app(dir.path(), 4, 10).unwrap();
    let (status, body) = call(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

#[tokio::test]
async fn interpret_ranks_concepts() {
    let dir = build_tiny_model();
    let app = esa_server::build_app(dir.path(), 4, 10).unwrap();
    let (status, body) = call(app, "/interpret?q=the%20borrow%20checker&k=2").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["query"], "the borrow checker");
    let concepts = json["concepts"].as_array().unwrap();
    assert_eq!(concepts.len(), 1);
    assert_eq!(concepts[0]["concept"], "Rust");
    assert!(concepts[0]["weight"].as_f64().unwrap() > 0.0);
    assert!(json["took_s"].as_f64().is_some());
}

#[tokio::test]
async fn interpret_clamps_k() {
    let dir = build_tiny_model();
    let app = esa_server::build_app(dir.path(), 4, 10).unwrap();
    let (status, body) = call(app, "/interpret?q=rust%20python%20soil&k=0").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["concepts"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn similarity_reports_distance() {
    let dir = build_tiny_model();
    let app = esa_server::build_app(dir.path(), 4, 10).unwrap();

    let (status, body) = call(app.clone(), "/similarity?a=cargo%20compiler&b=compiler").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    let sim = json["similarity"].as_f64().unwrap();
    assert!((sim - 1.0).abs() < 1e-9);
    assert!(json["distance"].as_f64().unwrap().abs() < 1e-9);

    let (_, body) = call(app, "/similarity?a=compost&b=zebra").await;
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["similarity"].as_f64().unwrap(), 0.0);
    assert_eq!(json["distance"].as_f64().unwrap(), 1.0);
}

#[tokio::test]
async fn stats_expose_meta_and_cache() {
    let dir = build_tiny_model();
    let app = esa_server::build_app(dir.path(), 4, 10).unwrap();
    call(app.clone(), "/interpret?q=rust").await;
    let (status, body) = call(app, "/stats").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["model"]["n_concepts"], 3);
    assert_eq!(json["model"]["row_chunk_size"], 4);
    assert_eq!(json["cache"]["capacity"], 4);
    assert!(json["cache"]["misses"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn corrupt_chunk_is_a_server_error() {
    let dir = build_tiny_model();
    let paths = ModelPaths::new(dir.path());
    for entry in fs::read_dir(paths.chunks_dir()).unwrap() {
        fs::write(entry.unwrap().path(), b"not a chunk").unwrap();
    }
    let app = esa_server::build_app(dir.path(), 4, 10).unwrap();
    let (status, _) = call(app, "/interpret?q=rust").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn missing_model_fails_to_start() {
    let dir = tempdir().unwrap();
    assert!(esa_server::build_app(dir.path(), 4, 10).is_err());
}
