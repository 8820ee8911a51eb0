use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn gw_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_gw"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(
        files_dir.join("alpha.md"),
        "# Alpha Document\n\nThis is the alpha document about Rust programming.\n\nIt contains information about cargo and crates.",
    )
    .unwrap();
    fs::write(
        files_dir.join("beta.md"),
        "# Beta Document\n\nThis document discusses Python and machine learning.\n\nDeep learning frameworks like PyTorch are covered.",
    )
    .unwrap();
    fs::write(
        files_dir.join("gamma.txt"),
        "Gamma plain text file.\n\nContains notes about deployment and infrastructure.\n\nKubernetes and Docker are mentioned here.",
    )
    .unwrap();
    fs::write(files_dir.join("ignored.rs"), "fn main() {}").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/gw.sqlite"

[embedding]
provider = "hash"
dims = 256

[llm]
provider = "disabled"

[reranker]
provider = "lexical"

[ingest]
root = "{root}/files"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("gw.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_gw(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = gw_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run gw binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn ingest(config_path: &Path) {
    let (stdout, stderr, success) = run_gw(config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_gw(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/gw.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_gw(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_gw(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_ingest_directory() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_gw(&config_path, &["ingest"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files found: 3"), "{stdout}");
    assert!(stdout.contains("ingested documents: 3"), "{stdout}");
    assert!(stdout.contains("indexed chunks (feature-hash): 3"), "{stdout}");
    assert!(stdout.contains("ok"));
}

#[test]
fn test_reingest_skips_unchanged_files() {
    let (tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, _, success) = run_gw(&config_path, &["ingest"]);
    assert!(success);
    assert!(stdout.contains("ingested documents: 0"), "{stdout}");
    assert!(stdout.contains("unchanged: 3"), "{stdout}");

    fs::write(
        tmp.path().join("files/beta.md"),
        "# Beta Document\n\nRewritten notes about Python packaging.",
    )
    .unwrap();
    let (stdout, _, success) = run_gw(&config_path, &["ingest"]);
    assert!(success);
    assert!(stdout.contains("ingested documents: 1"), "{stdout}");
    assert!(stdout.contains("unchanged: 2"), "{stdout}");
    assert!(stdout.contains("indexed chunks (feature-hash): 3"), "{stdout}");
}

#[test]
fn test_dims_change_reembeds_everything() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let config = fs::read_to_string(&config_path).unwrap();
    fs::write(&config_path, config.replace("dims = 256", "dims = 64")).unwrap();

    let (stdout, stderr, success) = run_gw(&config_path, &["ingest"]);
    assert!(success, "ingest failed: {stderr}");
    assert!(stdout.contains("ingested documents: 3"), "{stdout}");
    assert!(stdout.contains("indexed chunks (feature-hash): 3"), "{stdout}");
    assert!(stdout.contains("dimensions: 64"), "{stdout}");

    let (stdout, stderr, success) = run_gw(
        &config_path,
        &["retrieve", "cargo crates", "--min-score", "0", "--json"],
    );
    assert!(success, "retrieve failed: {stderr}");
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(results.as_array().unwrap().len(), 3);
    assert_eq!(results[0]["chunk"]["title"], "alpha.md");

    let (stdout, _, success) = run_gw(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Embedded:    3 / 3 (100%)"), "{stdout}");
}

#[test]
fn test_ingest_dry_run_writes_nothing() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_gw(&config_path, &["ingest", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("files found: 3"));
    assert!(stdout.contains("estimated chunks: 3"));

    let (stdout, _, success) = run_gw(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Documents:   0"), "{stdout}");
}

#[test]
fn test_ingest_missing_path_fails() {
    let (tmp, config_path) = setup_test_env();
    let missing = tmp.path().join("nope");

    let (_, stderr, success) = run_gw(&config_path, &["ingest", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("does not exist"), "{stderr}");
}

#[test]
fn test_retrieve_ranks_lexical_match_first() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_gw(
        &config_path,
        &["retrieve", "cargo crates", "--min-score", "0", "--json"],
    );
    assert!(success, "retrieve failed: {stderr}");
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["chunk"]["title"], "alpha.md");
    assert_eq!(results[0]["score"], 1.0);
    assert_eq!(results[1]["score"], 0.0);
}

#[test]
fn test_retrieve_threshold_filters_everything() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, _, success) = run_gw(&config_path, &["retrieve", "quantum chromodynamics"]);
    assert!(success);
    assert!(stdout.contains("No results."), "{stdout}");
}

#[test]
fn test_retrieve_before_ingest_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_gw(&config_path, &["init"]);

    let (_, stderr, success) = run_gw(&config_path, &["retrieve", "cargo"]);
    assert!(!success);
    assert!(stderr.contains("retrieval failed"), "{stderr}");
}

#[test]
fn test_ask_without_context_skips_generation() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    // The llm is disabled, so success proves no model call was made.
    let (stdout, stderr, success) = run_gw(&config_path, &["ask", "quantum chromodynamics"]);
    assert!(success, "ask failed: {stderr}");
    assert!(stdout.contains("I don't have enough information"), "{stdout}");

    let (stdout, _, success) = run_gw(
        &config_path,
        &["ask", "quantum chromodynamics", "--json"],
    );
    assert!(success);
    let answer: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(answer["insufficient_context"], true);
    assert_eq!(answer["validation"], "skipped");
    assert!(answer["sources"].as_array().unwrap().is_empty());
}

#[test]
fn test_ask_decomposed_without_context() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_gw(
        &config_path,
        &[
            "ask",
            "--decompose",
            "What is quantum chromodynamics? What is string theory?",
        ],
    );
    assert!(success, "ask failed: {stderr}");
    assert!(stdout.contains("I don't have enough information"), "{stdout}");
}

#[test]
fn test_ask_with_context_needs_llm() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (_, stderr, success) = run_gw(
        &config_path,
        &["ask", "cargo crates", "--min-score", "0.5"],
    );
    assert!(!success);
    assert!(stderr.contains("generation failed"), "{stderr}");
}

#[test]
fn test_ask_rejects_invalid_override() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (_, stderr, success) = run_gw(&config_path, &["ask", "cargo", "--top-k", "0"]);
    assert!(!success);
    assert!(stderr.contains("invalid configuration"), "{stderr}");
}

#[test]
fn test_stats_after_ingest() {
    let (_tmp, config_path) = setup_test_env();
    ingest(&config_path);

    let (stdout, stderr, success) = run_gw(&config_path, &["stats"]);
    assert!(success, "stats failed: {stderr}");
    assert!(stdout.contains("Documents:   3"), "{stdout}");
    assert!(stdout.contains("Chunks:      3"), "{stdout}");
    assert!(stdout.contains("Embedded:    3 / 3 (100%)"), "{stdout}");
    assert!(stdout.contains("feature-hash"), "{stdout}");
}

#[test]
fn test_completions_need_no_config() {
    let (stdout, _, success) = run_gw(Path::new("/nonexistent/gw.toml"), &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("gw"));
}

#[test]
fn test_missing_config_fails() {
    let (_, _, success) = run_gw(Path::new("/nonexistent/gw.toml"), &["stats"]);
    assert!(!success);
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = TempDir::new().unwrap();
    let config_path = tmp.path().join("gw.toml");
    fs::write(
        &config_path,
        "[db]\npath = \"x.sqlite\"\n[embedding]\nprovider = \"magic\"\n",
    )
    .unwrap();

    let (_, stderr, success) = run_gw(&config_path, &["init"]);
    assert!(!success);
    assert!(stderr.contains("Unknown embedding provider"), "{stderr}");
}
