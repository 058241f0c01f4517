//! End-to-end integration tests for the complete tracking flow.
//!
//! Tests the full pipeline: ingest → status → report
//! against a temporary database, driving the compiled binary.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tempfile::TempDir;

fn oblivionis_binary() -> String {
    env!("CARGO_BIN_EXE_oblivionis").to_string()
}

/// Writes a config file pointing at a database inside `temp`.
fn write_config(temp: &Path) -> (PathBuf, PathBuf) {
    let db_file = temp.join("oblivionis.db");
    let config_file = temp.join("config.toml");
    std::fs::write(
        &config_file,
        format!("database_path = \"{}\"\nworkers = 2\n", db_file.display()),
    )
    .unwrap();
    (config_file, db_file)
}

fn run(temp: &Path, config: &Path, args: &[&str], stdin: Option<&str>) -> Output {
    let mut child = Command::new(oblivionis_binary())
        .env("HOME", temp)
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(config)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to run oblivionis");

    {
        let mut pipe = child.stdin.take().unwrap();
        if let Some(input) = stdin {
            pipe.write_all(input.as_bytes()).unwrap();
        }
    }

    let output = child.wait_with_output().unwrap();
    assert!(
        output.status.success(),
        "oblivionis {args:?} should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn event(member: &str, name: &str, at: DateTime<Utc>, before: &str, after: &str) -> String {
    format!(
        r#"{{"member_id":"{member}","member_name":"{name}","observed_at":"{}","before":[{before}],"after":[{after}]}}"#,
        ts(at)
    )
}

/// Test a start/stop pair becomes a recorded session visible to every command.
#[test]
fn test_ingest_then_status_and_report() {
    let temp = TempDir::new().unwrap();
    let (config, db_file) = write_config(temp.path());

    let stop = Utc::now() - Duration::seconds(1);
    let start = stop - Duration::seconds(600);
    let hades = r#"{"type":"playing","name":"Hades"}"#;
    let input = [
        event("80351110224678912", "nelly", start, "", hades),
        event("80351110224678912", "nelly", stop, hades, ""),
    ]
    .join("\n");

    let output = run(temp.path(), &config, &["ingest"], Some(&input));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Events read:        2"), "{stdout}");
    assert!(stdout.contains("Sessions completed: 1"), "{stdout}");
    assert!(db_file.exists());

    let output = run(temp.path(), &config, &["status"], None);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Users:      1"), "{stdout}");
    assert!(stdout.contains("Activities: 1"), "{stdout}");

    let output = run(temp.path(), &config, &["report", "--week", "--json"], None);
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["games"][0]["name"], "Hades");
    assert_eq!(report["games"][0]["seconds"], 600);
    assert_eq!(report["members"][0]["name"], "nelly");
    assert_eq!(report["totals"]["sessions"], 1);
}

/// Test the Steam Deck game title is recorded instead of the device name.
#[test]
fn test_ingest_normalizes_steam_deck_sessions() {
    let temp = TempDir::new().unwrap();
    let (config, _db_file) = write_config(temp.path());

    let stop = Utc::now() - Duration::seconds(1);
    let start = stop - Duration::seconds(120);
    let deck = format!(
        r#"{{"type":"playing","name":"Steam Deck","details":"Playing Celeste","start":"{}"}}"#,
        ts(start)
    );
    let input = event("1", "ada", stop, &deck, "");

    run(temp.path(), &config, &["ingest", "-"], Some(&input));

    let output = run(temp.path(), &config, &["report", "--week", "--json"], None);
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["games"][0]["name"], "Celeste");
    assert_eq!(report["games"][0]["seconds"], 120);
}

/// Test ingest handles invalid JSON gracefully.
#[test]
fn test_ingest_skips_malformed_lines() {
    let temp = TempDir::new().unwrap();
    let (config, _db_file) = write_config(temp.path());

    let input = "not valid json\n{\"member_id\":\"\",\"member_name\":\"x\"}\n\n";
    let output = run(temp.path(), &config, &["ingest"], Some(input));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Events read:        0"), "{stdout}");
    assert!(stdout.contains("Malformed lines:    2"), "{stdout}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("malformed"), "{stderr}");
}

/// Test a stop with no known start is reported but not recorded.
#[test]
fn test_ingest_unresolvable_stop() {
    let temp = TempDir::new().unwrap();
    let (config, _db_file) = write_config(temp.path());

    let hades = r#"{"type":"playing","name":"Hades"}"#;
    let input = event("1", "ada", Utc::now(), hades, "");
    let output = run(temp.path(), &config, &["ingest"], Some(&input));

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Unresolved stops:   1"), "{stdout}");

    let output = run(temp.path(), &config, &["status"], None);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No activities recorded."), "{stdout}");
}

/// Test the environment overrides the database path from the config file.
#[test]
fn test_env_overrides_database_path() {
    let temp = TempDir::new().unwrap();
    let (config, db_file) = write_config(temp.path());
    let env_db = temp.path().join("nested").join("from-env.db");

    let output = Command::new(oblivionis_binary())
        .env("HOME", temp.path())
        .env("OB_DATABASE_PATH", &env_db)
        .arg("--config")
        .arg(&config)
        .arg("status")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("from-env.db"), "{stdout}");
    assert!(env_db.exists());
    assert!(!db_file.exists());
}

/// Test an invalid member filter is rejected.
#[test]
fn test_report_rejects_blank_member() {
    let temp = TempDir::new().unwrap();
    let (config, _db_file) = write_config(temp.path());

    let output = Command::new(oblivionis_binary())
        .env("HOME", temp.path())
        .arg("--config")
        .arg(&config)
        .args(["report", "--member", " "])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid --member"), "{stderr}");
}
