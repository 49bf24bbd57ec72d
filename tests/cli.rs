//! End-to-end tests for the `csync` binary.

use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Site {
    _dir: TempDir,
    root: PathBuf,
}

impl Site {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(".contentsync");
        Self { _dir: dir, root }
    }

    fn csync(&self) -> Command {
        let mut cmd = Command::cargo_bin("csync").unwrap();
        cmd.env_remove("CONTENTSYNC_DB")
            .env_remove("CONTENTSYNC_ROOT")
            .env_remove("RUST_LOG")
            .env("CONTENTSYNC_ACTOR", "test")
            .arg("--root")
            .arg(&self.root);
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.csync().arg("--json").args(args).output().unwrap();
        assert!(
            output.status.success(),
            "csync {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    fn init(&self) {
        self.csync().arg("init").assert().success();
        self.csync()
            .args(["type", "add", "page", "-p", "title", "-p", "related"])
            .assert()
            .success();
    }
}

fn write_page(path: &Path, id: i64, key: &str, name: &str, related: &str) {
    let node = serde_json::json!({
        "id": id,
        "key": key,
        "name": name,
        "node_type_alias": "page",
        "published": true,
        "updated": "2020-01-01T00:00:00Z",
        "properties": [
            { "alias": "title", "value": name },
            { "alias": "related", "value": related },
        ],
    });
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(&node).unwrap()).unwrap();
}

#[test]
fn test_version() {
    let output = Command::cargo_bin("csync")
        .unwrap()
        .arg("version")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("csync version"));
}

#[test]
fn test_init_creates_sync_root() {
    let site = Site::new();
    site.csync().arg("init").assert().success();

    assert!(site.root.join("settings.json").is_file());
    assert!(site.root.join("live.db").is_file());
    assert!(site.root.join("content").is_dir());
}

#[test]
fn test_init_twice_fails_with_database_category() {
    let site = Site::new();
    site.csync().arg("init").assert().success();
    site.csync().arg("init").assert().code(2);
    site.csync().args(["init", "--force"]).assert().success();
}

#[test]
fn test_uninitialized_reports_structured_error() {
    let site = Site::new();
    let output = site.csync().args(["--json", "status"]).output().unwrap();

    assert_eq!(output.status.code(), Some(2));
    let err: Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(err["error"]["code"], "NOT_INITIALIZED");
}

#[test]
fn test_type_list_after_add() {
    let site = Site::new();
    site.init();

    let listed = site.json(&["type", "list"]);
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["types"][0]["alias"], "page");
}

#[test]
fn test_import_resolves_references_and_records_pairs() {
    let site = Site::new();
    site.init();

    let home_key = "6f1c1a52-9b3e-4d0a-8c5e-2f7d7a1b9c01";
    let about_key = "0b8f2c7e-5a4d-4e1f-9c3b-7d6e5f4a3b21";
    let content = site.root.join("content");
    write_page(&content.join("Home.content"), 1050, home_key, "Home", "");
    write_page(
        &content.join("Home").join("About.content"),
        1051,
        about_key,
        "About",
        home_key,
    );

    let imported = site.json(&["import"]);
    let identities = &imported["report"]["content"]["identities"];
    assert_eq!(identities["created"], 2);
    assert!(imported["report"]["content"]["references"].is_object());

    let pairs = site.json(&["pairs"]);
    assert_eq!(pairs["total"], 2);

    let status = site.json(&["status"]);
    assert_eq!(status["status"]["live"]["content"], 2);
    assert_eq!(status["status"]["live"]["published"], 2);

    // A second run leaves everything as it is.
    let again = site.json(&["import"]);
    assert_eq!(again["report"]["content"]["identities"]["created"], 0);
    assert_eq!(again["report"]["content"]["identities"]["up_to_date"], 2);
}

#[test]
fn test_export_after_import_writes_tree() {
    let site = Site::new();
    site.init();

    let key = "9d2e4f60-1a3b-4c5d-8e7f-0a1b2c3d4e5f";
    write_page(&site.root.join("content").join("Home.content"), 1, key, "Home", "");
    site.json(&["import"]);

    fs::remove_dir_all(site.root.join("content")).unwrap();
    let exported = site.json(&["export"]);
    assert_eq!(exported["stats"]["content_files"], 1);

    let written: Value =
        serde_json::from_str(&fs::read_to_string(site.root.join("content").join("Home.content")).unwrap())
            .unwrap();
    // The exporter writes the originating identity, not the local one.
    assert_eq!(written["key"], key);
}

#[test]
fn test_history_lists_import_events() {
    let site = Site::new();
    site.init();

    let key = "3c4d5e6f-7a8b-4c9d-8e0f-1a2b3c4d5e6f";
    write_page(&site.root.join("content").join("Home.content"), 1, key, "Home", "");
    site.json(&["import"]);

    // The first node created in a fresh store gets id 1.
    let history = site.json(&["history", "1"]);
    let events = history["events"].as_array().unwrap();
    assert!(!events.is_empty());
    assert_eq!(events.last().unwrap()["event_type"], "node_created");
    assert_eq!(events.last().unwrap()["actor"], "test");

    let none = site.json(&["history", "999"]);
    assert_eq!(none["count"], 0);
}

#[test]
fn test_start_runs_sequence() {
    let site = Site::new();
    site.init();

    let started = site.json(&["start"]);
    assert_eq!(started["success"], true);
    assert_eq!(started["report"]["events"], "save");
}
