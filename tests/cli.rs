//! Tests that drive the `docqa` binary.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

fn docqa_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_docqa"))
}

const EIFFEL: &str = "The Eiffel Tower is a wrought-iron lattice tower on the Champ de Mars \
in Paris, France. It was completed in 1889.";

const BANANAS: &str = "Bananas are a good source of potassium.";

/// Temp dir with two text files and an offline config.
fn setup_test_env(generation_url: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::write(root.join("eiffel.txt"), EIFFEL).unwrap();
    fs::write(root.join("bananas.txt"), BANANAS).unwrap();
    fs::write(root.join("third.txt"), "A third file.").unwrap();
    fs::write(root.join("slides.docx"), [0u8, 1, 2]).unwrap();

    let config_content = format!(
        r#"[chunking]
size = 500
overlap = 50

[embedding]
provider = "hash"

[rerank]
provider = "lexical"

[generation]
base_url = "{}"
api_key_env = "DOCQA_TEST_GENERATION_KEY"
timeout_secs = 10
"#,
        generation_url
    );
    let config_path = root.join("docqa.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docqa(config: &Path, args: &[&str], stdin: Option<&str>) -> Output {
    let mut child = Command::new(docqa_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .env("DOCQA_TEST_GENERATION_KEY", "test-key")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run docqa binary");
    {
        let mut pipe = child.stdin.take().unwrap();
        if let Some(input) = stdin {
            pipe.write_all(input.as_bytes()).unwrap();
        }
    }
    child.wait_with_output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Chat-completions mock that answers with the first context line.
async fn spawn_chat_mock() -> String {
    async fn handler(Json(body): Json<Value>) -> Json<Value> {
        let prompt = body["messages"][0]["content"].as_str().unwrap_or("");
        let first = prompt
            .split_once("Context:\n")
            .map(|(_, rest)| rest.lines().next().unwrap_or(""))
            .unwrap_or("");
        Json(json!({
            "choices": [{ "message": { "role": "assistant", "content": first } }]
        }))
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().route("/v1/chat/completions", post(handler));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/v1", addr)
}

#[test]
fn test_chunk_previews_text_file() {
    let (tmp, config) = setup_test_env("http://127.0.0.1:9");
    let file = tmp.path().join("eiffel.txt");

    let output = run_docqa(&config, &["chunk", "--file", file.to_str().unwrap()], None);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let out = stdout(&output);
    assert!(out.contains("1 documents → 1 chunks (size 500, overlap 50)"));
    assert!(out.contains("eiffel.txt #0"));
    assert!(out.contains("Champ de Mars"));
}

#[test]
fn test_chunk_reports_skipped_files() {
    let (tmp, config) = setup_test_env("http://127.0.0.1:9");
    let txt = tmp.path().join("eiffel.txt");
    let docx = tmp.path().join("slides.docx");

    let output = run_docqa(
        &config,
        &[
            "chunk",
            "--file",
            txt.to_str().unwrap(),
            "--file",
            docx.to_str().unwrap(),
        ],
        None,
    );
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("Skipped slides.docx"));
    assert!(stdout(&output).contains("1 documents"));
}

#[test]
fn test_more_than_two_files_rejected() {
    let (tmp, config) = setup_test_env("http://127.0.0.1:9");
    let files: Vec<String> = ["eiffel.txt", "bananas.txt", "third.txt"]
        .iter()
        .map(|f| tmp.path().join(f).to_string_lossy().to_string())
        .collect();

    let mut args = vec!["chunk"];
    for f in &files {
        args.push("--file");
        args.push(f);
    }
    let output = run_docqa(&config, &args, None);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("at most 2 files"));
}

#[test]
fn test_no_sources_rejected() {
    let (_tmp, config) = setup_test_env("http://127.0.0.1:9");

    let output = run_docqa(&config, &["ask", "anything"], None);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("no sources given"));

    let output = run_docqa(&config, &["chunk", "--topic", "   "], None);
    assert!(!output.status.success());
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(&config, "[chunking]\nsize = 100\noverlap = 100\n").unwrap();
    fs::write(tmp.path().join("a.txt"), "text").unwrap();
    let file = tmp.path().join("a.txt");

    let output = run_docqa(&config, &["chunk", "--file", file.to_str().unwrap()], None);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("overlap"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ask_prints_answer_and_sources() {
    let url = spawn_chat_mock().await;
    let (tmp, config) = setup_test_env(&url);
    let eiffel = tmp.path().join("eiffel.txt");
    let bananas = tmp.path().join("bananas.txt");

    let output = tokio::task::spawn_blocking(move || {
        run_docqa(
            &config,
            &[
                "ask",
                "--file",
                eiffel.to_str().unwrap(),
                "--file",
                bananas.to_str().unwrap(),
                "Where is the Eiffel Tower?",
            ],
            None,
        )
    })
    .await
    .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Paris"), "stdout: {}", out);
    assert!(out.contains("Sources:"));
    assert!(out.contains("[1] eiffel.txt"));
    drop(tmp);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_chat_answers_each_line() {
    let url = spawn_chat_mock().await;
    let (tmp, config) = setup_test_env(&url);
    let eiffel = tmp.path().join("eiffel.txt");

    let output = tokio::task::spawn_blocking(move || {
        run_docqa(
            &config,
            &["chat", "--file", eiffel.to_str().unwrap()],
            Some("Where is the tower?\n\nWhen was it completed?\n"),
        )
    })
    .await
    .unwrap();

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output).matches("Sources:").count(), 2);
    assert!(stderr(&output).contains("2 exchanges in this session."));
    drop(tmp);
}
