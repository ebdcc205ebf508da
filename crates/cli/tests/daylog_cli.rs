use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

fn write_config(root: &Path) -> PathBuf {
    let config_path = root.join("daylog.toml");
    let body = format!(
        "[calendar]\ntimezone = \"utc\"\n\n[timeline]\npage_limit = 2\n\n[store]\ndb_path = {:?}\njournal_path = {:?}\n",
        root.join("daylog.db").display().to_string(),
        root.join("pushes.jsonl").display().to_string(),
    );
    fs::write(&config_path, body).expect("write config");
    config_path
}

fn daylog(home: &Path, config: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_daylog"));
    cmd.arg("--config")
        .arg(config)
        .env("HOME", home)
        .env_remove("DAYLOG_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

fn run_ok(cmd: &mut Command) -> Output {
    let output = cmd.output().expect("run daylog");
    assert!(
        output.status.success(),
        "daylog failed\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is json")
}

fn record(home: &Path, config: &Path, id: &str, start: &str) -> Value {
    let output = run_ok(
        daylog(home, config)
            .arg("record")
            .arg("--id")
            .arg(id)
            .arg("--title")
            .arg(format!("work on {id}"))
            .arg("--start")
            .arg(start)
            .arg("--event")
            .arg("keyboard:typed notes"),
    );
    json(&output)
}

#[test]
fn record_then_query_pages_increments_and_detail() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = write_config(tmp.path());

    let first = record(tmp.path(), &config, "a", "2024-06-01T09:00:00Z");
    let second = record(tmp.path(), &config, "b", "2024-06-02T09:00:00Z");
    record(tmp.path(), &config, "c", "2024-06-02T15:00:00Z");
    assert_eq!(first["id"], "a");
    assert!(second["version"].as_u64().unwrap() > first["version"].as_u64().unwrap());

    // page_limit = 2: newest two rows, both on 2024-06-02
    let page = json(&run_ok(
        daylog(tmp.path(), &config).args(["page", "--format", "json"]),
    ));
    let buckets = page.as_array().expect("bucket array");
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0]["date"], "2024-06-02");
    let ids: Vec<_> = buckets[0]["activities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec!["c", "b"]);

    let older = json(&run_ok(
        daylog(tmp.path(), &config).args(["page", "--offset", "2", "--format", "json"]),
    ));
    assert_eq!(older[0]["date"], "2024-06-01");

    let since = json(&run_ok(daylog(tmp.path(), &config).args([
        "since",
        &first["version"].to_string(),
        "--format",
        "json",
    ])));
    assert_eq!(since.as_array().unwrap().len(), 2);

    let detail = json(&run_ok(
        daylog(tmp.path(), &config).args(["show", "a", "--format", "json"]),
    ));
    assert_eq!(detail["event_summaries"][0]["summary"], "typed notes");

    // every record appended one push line
    let journal = fs::read_to_string(tmp.path().join("pushes.jsonl")).expect("journal");
    assert_eq!(journal.lines().count(), 3);
}

#[test]
fn show_unknown_id_fails() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = write_config(tmp.path());
    let output = daylog(tmp.path(), &config)
        .args(["show", "missing"])
        .output()
        .expect("run daylog");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no activity with id missing"));
}

#[test]
fn page_rejects_inverted_date_range() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = write_config(tmp.path());
    let output = daylog(tmp.path(), &config)
        .args(["page", "--from", "2024-06-03", "--to", "2024-06-01"])
        .output()
        .expect("run daylog");
    assert!(!output.status.success());
}

#[test]
fn config_prints_effective_paths() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = write_config(tmp.path());
    let output = run_ok(daylog(tmp.path(), &config).arg("config"));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("page_limit = 2"));
    assert!(stdout.contains("# db: "));
    assert!(stdout.contains("pushes.jsonl"));
}

#[test]
fn watch_renders_first_page_and_quits() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let config = write_config(tmp.path());
    record(tmp.path(), &config, "a", "2024-06-01T09:00:00Z");

    let mut child = daylog(tmp.path(), &config)
        .args(["watch", "--height", "5"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn watch");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(b"quit\n")
        .expect("write quit");
    let output = child.wait_with_output().expect("wait for watch");
    assert!(
        output.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("── 2024-06-01 (1) ──"));
    assert!(stdout.contains("[a]"));
    assert!(stdout.contains("bottom: end"));
}
