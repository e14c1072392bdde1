use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn buzz_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_buzz"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/buzz.sqlite"

[pipeline]
city = "Toronto"
limit = 10

[extraction]
provider = "heuristic"

[enrichment]
provider = "disabled"

[embedding]
provider = "disabled"

[export]
output = "{root}/public/data.json"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("buzz.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_buzz(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = buzz_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run buzz binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn read_export(root: &Path) -> serde_json::Value {
    let body = fs::read_to_string(root.join("public").join("data.json")).unwrap();
    serde_json::from_str(&body).unwrap()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_buzz(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("buzz.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_buzz(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_buzz(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_run_mock_data_stores_and_exports() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_buzz(&config_path, &["run", "--mock-data"]);
    assert!(success, "run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("scraped:         3"), "{}", stdout);
    assert!(stdout.contains("stored:          3"), "{}", stdout);
    assert!(stdout.contains("errors:          0"), "{}", stdout);

    let export = read_export(tmp.path());
    let restaurants = export["restaurants"].as_array().unwrap();
    assert_eq!(restaurants.len(), 3);
    assert!(export["date"].as_str().unwrap().ends_with('Z'));

    let ids: Vec<&str> = restaurants
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"pai-northern-thai-kitchen"));
    assert!(ids.contains(&"the-burgers-priest"));

    let scores: Vec<f64> = restaurants
        .iter()
        .map(|r| r["buzz_score"].as_f64().unwrap())
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_run_twice_does_not_duplicate() {
    let (_tmp, config_path) = setup_test_env();

    run_buzz(&config_path, &["run", "--mock-data"]);
    let (_, _, success) = run_buzz(&config_path, &["run", "--mock-data"]);
    assert!(success);

    let (stdout, stderr, success) = run_buzz(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Restaurants:  3"), "{}", stdout);
    assert!(stdout.contains("Metrics rows: 3"), "{}", stdout);
    assert!(stdout.contains("social"), "{}", stdout);
}

#[test]
fn test_dry_run_leaves_no_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_buzz(&config_path, &["run", "--mock-data", "--dry-run"]);
    assert!(success, "dry run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("stored:          3"));
    assert!(!tmp.path().join("data").join("buzz.sqlite").exists());
    assert!(!tmp.path().join("public").join("data.json").exists());
}

#[test]
fn test_output_override() {
    let (tmp, config_path) = setup_test_env();
    let out = tmp.path().join("elsewhere").join("today.json");

    let (_, stderr, success) = run_buzz(
        &config_path,
        &["run", "--mock-data", "--dry-run", "--output", out.to_str().unwrap()],
    );
    assert!(success, "{}", stderr);

    let export: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(export["restaurants"].as_array().unwrap().len(), 3);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_buzz(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
