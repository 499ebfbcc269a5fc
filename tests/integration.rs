use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn docsift_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("docsift");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("incoming")).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/docsift.sqlite"

[paths]
incoming = "{root}/incoming"
sorted = "{root}/sorted"

[chunking]
size = 400
overlap = 100

[embedding]
provider = "disabled"

[llm]
provider = "disabled"
"#,
        root = root.display()
    );

    let config_path = root.join("config").join("docsift.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_docsift(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = docsift_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run docsift binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn drop_file(config_path: &Path, name: &str, content: &str) -> PathBuf {
    let root = config_path.parent().unwrap().parent().unwrap();
    let path = root.join("incoming").join(name);
    fs::write(&path, content).unwrap();
    path
}

fn sorted_root(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("sorted")
}

fn find_sorted(config_path: &Path, name_prefix: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let sorted = sorted_root(config_path);
    if !sorted.is_dir() {
        return found;
    }
    let mut stack = vec![sorted];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(name_prefix))
            {
                found.push(path);
            }
        }
    }
    found
}

const PYTHON_SNIPPET: &str = r#"def process(data):
    import json
    result = []
    for item in data:
        result.append(item * 2)
    return json.dumps(result)

class Pipeline:
    def run(self):
        return process([1, 2, 3])
"#;

#[test]
fn test_init_creates_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_docsift(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_docsift(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_docsift(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_process_sorts_code_file() {
    let (_tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);
    drop_file(&config_path, "pipeline.py", PYTHON_SNIPPET);

    let (stdout, stderr, success) = run_docsift(&config_path, &["process"]);
    assert!(success, "process failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("1 ingested"), "stdout: {}", stdout);

    // File left the incoming directory and landed under sorted/Code.
    let placed = find_sorted(&config_path, "pipeline");
    assert_eq!(placed.len(), 1, "placed: {:?}", placed);
    assert!(placed[0].starts_with(sorted_root(&config_path).join("Code")));
    let root = config_path.parent().unwrap().parent().unwrap();
    assert!(!root.join("incoming").join("pipeline.py").exists());
}

#[test]
fn test_duplicate_content_is_removed_not_reingested() {
    let (_tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);

    drop_file(&config_path, "original.py", PYTHON_SNIPPET);
    let (stdout, _, success) = run_docsift(&config_path, &["process"]);
    assert!(success);
    assert!(stdout.contains("1 ingested"));

    // Same bytes under a new name.
    drop_file(&config_path, "copy.py", PYTHON_SNIPPET);
    let (stdout, _, success) = run_docsift(&config_path, &["process"]);
    assert!(success);
    assert!(stdout.contains("1 duplicates"), "stdout: {}", stdout);

    // The duplicate never reached the sorted tree, and its incoming copy
    // is gone.
    assert!(find_sorted(&config_path, "copy").is_empty());
    let root = config_path.parent().unwrap().parent().unwrap();
    assert!(!root.join("incoming").join("copy.py").exists());
}

#[test]
fn test_process_single_file_by_path() {
    let (_tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);
    let path = drop_file(&config_path, "notes.txt", "Some plain meeting notes.");

    let (stdout, stderr, success) =
        run_docsift(&config_path, &["process", path.to_str().unwrap()]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Ingested into"), "stdout: {}", stdout);
    assert!(!path.exists());
}

#[test]
fn test_process_empty_incoming_is_clean() {
    let (_tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);

    let (stdout, stderr, success) = run_docsift(&config_path, &["process"]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("0 ingested"));
}

#[test]
fn test_stats_counts_files_and_chunks() {
    let (_tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);
    drop_file(&config_path, "pipeline.py", PYTHON_SNIPPET);
    run_docsift(&config_path, &["process"]);

    let (stdout, stderr, success) = run_docsift(&config_path, &["stats"]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Files:  1"), "stdout: {}", stdout);
    assert!(stdout.contains("By category:"), "stdout: {}", stdout);
}

#[test]
fn test_reconcile_purges_deleted_file() {
    let (_tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);
    drop_file(&config_path, "pipeline.py", PYTHON_SNIPPET);
    run_docsift(&config_path, &["process"]);

    let placed = find_sorted(&config_path, "pipeline");
    assert_eq!(placed.len(), 1);
    fs::remove_file(&placed[0]).unwrap();

    let (stdout, stderr, success) = run_docsift(&config_path, &["reconcile"]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("1 missing files purged"), "stdout: {}", stdout);

    let (stdout, _, _) = run_docsift(&config_path, &["stats"]);
    assert!(stdout.contains("Files:  0"), "stdout: {}", stdout);
}

#[test]
fn test_reconcile_clean_corpus_reports_nothing() {
    let (_tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);
    drop_file(&config_path, "pipeline.py", PYTHON_SNIPPET);
    run_docsift(&config_path, &["process"]);

    let (stdout, stderr, success) = run_docsift(&config_path, &["reconcile"]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("0 missing files purged"));
    assert!(stdout.contains("0 re-indexed"));
}

#[test]
fn test_rebuild_registers_manually_placed_files() {
    let (_tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);

    // A file dropped straight into the sorted tree, bypassing ingestion.
    let docs = sorted_root(&config_path).join("Documentation");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("manual.md"), "# Manual\n\nInstallation guide.").unwrap();

    let (stdout, stderr, success) = run_docsift(&config_path, &["rebuild"]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("1 registered"), "stdout: {}", stdout);

    // Second rebuild finds it already known.
    let (stdout, _, success) = run_docsift(&config_path, &["rebuild"]);
    assert!(success);
    assert!(stdout.contains("0 registered"), "stdout: {}", stdout);
    assert!(stdout.contains("1 already known"), "stdout: {}", stdout);
}

#[test]
fn test_ask_without_model_reports_no_matches() {
    let (_tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);

    // Embeddings are disabled in this environment, so retrieval is empty.
    let (stdout, stderr, success) = run_docsift(&config_path, &["ask", "what is the budget?"]);
    assert!(success, "stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("No matching documents"), "stdout: {}", stdout);
    assert!(stdout.contains("Confidence: 0%"), "stdout: {}", stdout);
}

#[test]
fn test_name_collision_gets_suffix() {
    let (_tmp, config_path) = setup_test_env();
    run_docsift(&config_path, &["init"]);

    drop_file(&config_path, "notes.txt", "First set of meeting notes.");
    run_docsift(&config_path, &["process"]);
    drop_file(&config_path, "notes.txt", "Different notes, same filename.");
    let (stdout, _, success) = run_docsift(&config_path, &["process"]);
    assert!(success);
    assert!(stdout.contains("1 ingested"), "stdout: {}", stdout);

    let mut placed = find_sorted(&config_path, "notes");
    placed.sort();
    assert_eq!(placed.len(), 2, "placed: {:?}", placed);
    let names: Vec<String> = placed
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert!(names.contains(&"notes.txt".to_string()));
    assert!(names.contains(&"notes_1.txt".to_string()));
}

#[test]
fn test_bad_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env();
    let bad = config_path.parent().unwrap().join("bad.toml");
    fs::write(
        &bad,
        r#"[db]
path = "/tmp/x.sqlite"

[paths]
incoming = "/tmp/in"
sorted = "/tmp/out"

[chunking]
size = 100
overlap = 200
"#,
    )
    .unwrap();

    let (_, stderr, success) = run_docsift(&bad, &["init"]);
    assert!(!success);
    assert!(stderr.contains("overlap"), "stderr: {}", stderr);
}
