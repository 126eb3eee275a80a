//! CLI integration tests: run the built `docchat` binary.

mod common;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use common::{docx, pptx, write_file};

fn docchat_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docchat");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let books = root.join("books");
    fs::create_dir_all(&books).unwrap();
    write_file(&books, "memo.docx", &docx(&["Budget memo", "Spend less."]));
    write_file(&books, "deck.pptx", &pptx(&["Roadmap"]));
    write_file(&books, "notes.txt", b"Plain notes.");
    write_file(&books, "photo.jpg", b"\xff\xd8");

    let config_content = format!(
        r#"[library]
folder = "{}"

[chunking]
max_tokens = 128
overlap_tokens = 16
"#,
        books.display()
    );
    let config_path = root.join("docchat.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docchat(dir: &Path, config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docchat_binary();
    let output = Command::new(&binary)
        .current_dir(dir)
        .env_remove("OPENAI_API_KEY")
        .env_remove("DOCCHAT_LOG")
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docchat binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_formats_lists_every_extension() {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_docchat(tmp.path(), &config_path, &["formats"]);
    assert!(success, "formats failed: {}", stderr);
    for ext in [".epub", ".pdf", ".docx", ".pptx", ".txt"] {
        assert!(stdout.contains(ext), "missing {} in {}", ext, stdout);
    }
}

#[test]
fn test_extract_prints_text() {
    let (tmp, config_path) = setup_test_env();
    let memo = tmp.path().join("books/memo.docx");
    let (stdout, stderr, success) =
        run_docchat(tmp.path(), &config_path, &["extract", memo.to_str().unwrap()]);
    assert!(success, "extract failed: {}", stderr);
    assert_eq!(stdout, "Budget memo\nSpend less.");
}

#[test]
fn test_extract_unsupported_format_fails() {
    let (tmp, config_path) = setup_test_env();
    let photo = tmp.path().join("books/photo.jpg");
    let (_, stderr, success) =
        run_docchat(tmp.path(), &config_path, &["extract", photo.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Unsupported file format"), "{}", stderr);
}

#[test]
fn test_ingest_writes_artifacts_then_uses_cache() {
    let (tmp, config_path) = setup_test_env();
    let books = tmp.path().join("books");

    let (stdout, stderr, success) = run_docchat(tmp.path(), &config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("extracted: 2"), "{}", stdout);
    assert!(stdout.contains("plain text: 1"), "{}", stdout);
    assert!(stdout.contains("unsupported: 1 (photo.jpg)"), "{}", stdout);
    assert!(stdout.contains("artifacts: 3"), "{}", stdout);
    assert!(stdout.contains("ok"));
    assert_eq!(
        fs::read_to_string(books.join("deck.txt")).unwrap(),
        "Roadmap\n"
    );

    let (stdout, _, success) = run_docchat(tmp.path(), &config_path, &["ingest"]);
    assert!(success);
    assert!(stdout.contains("extracted: 0"), "{}", stdout);
    assert!(stdout.contains("cached: 2"), "{}", stdout);
    assert!(stdout.contains("skipped artifacts: 2"), "{}", stdout);
    assert!(stdout.contains("artifacts: 3"), "{}", stdout);
}

#[test]
fn test_ingest_missing_folder_fails() {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_docchat(
        tmp.path(),
        &config_path,
        &["ingest", "--folder", "does-not-exist"],
    );
    assert!(!success);
    assert!(stderr.contains("does not exist"), "{}", stderr);
}

#[test]
fn test_chat_requires_api_key() {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_docchat(tmp.path(), &config_path, &["chat"]);
    assert!(!success);
    assert!(stderr.contains("OPENAI_API_KEY"), "{}", stderr);
    // the key is checked before anything is processed
    assert!(!tmp.path().join("books/memo.txt").exists());
}

#[test]
fn test_invalid_config_is_rejected() {
    let (tmp, config_path) = setup_test_env();
    fs::write(&config_path, "[retrieval]\ntop_k = 0\n").unwrap();
    let (_, stderr, success) = run_docchat(tmp.path(), &config_path, &["ingest"]);
    assert!(!success);
    assert!(stderr.contains("top_k"), "{}", stderr);
}

#[test]
fn test_owner_without_repo_is_rejected() {
    let (tmp, config_path) = setup_test_env();
    let (_, stderr, success) =
        run_docchat(tmp.path(), &config_path, &["fetch", "--owner", "octo"]);
    assert!(!success);
    assert!(stderr.contains("--owner and --repo"), "{}", stderr);
}
