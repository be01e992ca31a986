//! Integration tests for the `philo` binary.
//! Uses assert_cmd to run the binary, a real temp config, and an in-process
//! HTTP server. No mocks.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use axum::body::Body;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use predicates::prelude::*;
use serde_json::json;
use std::io::Write as _;
use std::net::TcpListener as StdTcpListener;

/// Pick a free port by binding to :0 and extracting the assigned port.
fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Write a minimal YAML config to a temp file pointing at `port`.
fn write_config(dir: &tempfile::TempDir, port: u16) -> std::path::PathBuf {
    let path = dir.path().join("config.yaml");
    let mut f = std::fs::File::create(&path).unwrap();
    writeln!(
        f,
        "server:\n  base_url: http://127.0.0.1:{}\n  timeout_secs: 2\nask:\n  mode: basic",
        port
    )
    .unwrap();
    path
}

async fn answer() -> impl IntoResponse {
    let chunks: Vec<Result<&'static str, std::io::Error>> = vec![
        Ok("data: {\"type\":\"sources\",\"data\":[\"/docs/a.md\",\"/docs/b.md\"]}\n\n"),
        Ok("data: {\"type\":\"token\",\"data\":\"Test \"}\n\ndata: {\"type\":\"tok"),
        Ok("en\",\"data\":\"answer.\"}\n\n"),
        Ok("data: {\"type\":\"done\"}\n\n"),
    ];
    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(futures_util::stream::iter(chunks)),
    )
}

async fn providers() -> impl IntoResponse {
    Json(json!({"providers": [
        {"id": "anthropic", "name": "Anthropic Claude", "models": ["claude-sonnet-4-20250514"]},
        {"id": "openai", "name": "OpenAI", "models": ["gpt-4o", "gpt-4o-mini"]}
    ]}))
}

/// Serve `/api/ask` and `/api/providers` on a background thread. The server
/// lives until the test process exits.
fn spawn_test_server() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let port = listener.local_addr().unwrap().port();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            let app = Router::new()
                .route("/api/ask", post(answer))
                .route("/api/providers", get(providers));
            axum::serve(listener, app).await.unwrap();
        });
    });
    port
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn prints_streamed_answer_and_sources() {
    let port = spawn_test_server();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let mut cmd = Command::from(cargo_bin_cmd!("philo"));
    cmd.arg("--config")
        .arg(&config_path)
        .write_stdin("What is the answer?\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Test answer."))
        .stdout(predicate::str::contains("Sources: /docs/a.md, /docs/b.md"))
        .stderr(predicate::str::contains("Thinking..."));
}

#[test]
fn config_from_env_var() {
    let port = spawn_test_server();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let mut cmd = Command::from(cargo_bin_cmd!("philo"));
    cmd.env("PHILO_CONFIG", &config_path)
        .write_stdin("What is the answer?\n");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Test answer."));
}

#[test]
fn positional_question_argument() {
    let port = spawn_test_server();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let mut cmd = Command::from(cargo_bin_cmd!("philo"));
    cmd.arg("--config")
        .arg(&config_path)
        .arg("--provider")
        .arg("openai")
        .arg("What is the answer?");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Test answer."));
}

#[test]
fn export_writes_the_exchange() {
    let port = spawn_test_server();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);
    let export_path = dir.path().join("answer.txt");

    let mut cmd = Command::from(cargo_bin_cmd!("philo"));
    cmd.arg("--config")
        .arg(&config_path)
        .arg("--export")
        .arg(&export_path)
        .arg("What is the answer?");
    cmd.assert().success();

    let body = std::fs::read_to_string(&export_path).unwrap();
    assert!(body.starts_with("CONVERSATION WITH KUCZYNSKI\n"));
    assert!(body.contains("USER:\nWhat is the answer?\n"));
    assert!(body.contains("KUCZYNSKI:\nTest answer.\n"));
    assert!(body.contains("Sources: /docs/a.md, /docs/b.md\n"));
}

#[test]
fn lists_providers() {
    let port = spawn_test_server();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let mut cmd = Command::from(cargo_bin_cmd!("philo"));
    cmd.arg("--config").arg(&config_path).arg("--list-providers");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("anthropic\tAnthropic Claude\tclaude-sonnet-4-20250514"))
        .stdout(predicate::str::contains("openai\tOpenAI\tgpt-4o, gpt-4o-mini"));
}

#[test]
fn empty_question_is_rejected() {
    let port = spawn_test_server();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let mut cmd = Command::from(cargo_bin_cmd!("philo"));
    cmd.arg("--config").arg(&config_path).write_stdin("   \n");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("no question provided"));
}

#[test]
fn server_down_shows_error() {
    // Point the config at a port where nothing is listening.
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_config(&dir, port);

    let mut cmd = Command::from(cargo_bin_cmd!("philo"));
    cmd.arg("--config")
        .arg(&config_path)
        .write_stdin("hello\n");

    cmd.assert()
        .failure()
        .stderr(predicate::str::is_match("(?i)(connect|error|refused)").unwrap());
}

#[test]
fn missing_explicit_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut cmd = Command::from(cargo_bin_cmd!("philo"));
    cmd.arg("--config")
        .arg(dir.path().join("nope.yaml"))
        .arg("hello");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}
