//! E2E tests for the store-facing commands: status, rebuild, game.

use assert_cmd::Command;
use chrono::{DateTime, TimeZone, Utc};
use chron_core::{EntityKind, Store, Update};
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn chron_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("chron"));
    cmd.current_dir(dir);
    cmd.env("CHRON_LOG", "error");
    cmd.env("CHRON_CONFIG", dir.join("absent.toml"));
    cmd.env("CHRON_DATABASE", db_path(dir));
    cmd
}

fn db_path(dir: &Path) -> PathBuf {
    dir.join("data/chron.sqlite3")
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_600_000_000 + secs, 0).single().expect("valid ts")
}

fn seed_games(dir: &Path) {
    let store = Store::open(&db_path(dir)).expect("open store");
    let updates = [
        (json!({"id": "g1", "season": 11, "day": 3, "inning": 0, "gameStart": true}), 10),
        (json!({"id": "g1", "season": 11, "day": 3, "inning": 9, "gameComplete": true}), 30),
        (json!({"id": "g2", "season": 11, "day": 4, "inning": 0}), 20),
    ]
    .into_iter()
    .map(|(payload, secs)| Update::keyed_by_id(EntityKind::Game, payload, at(secs)).expect("id"))
    .collect::<Vec<_>>();
    store.merge_batch(&updates).expect("merge");
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("command should not crash");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON")
}

#[test]
fn status_on_fresh_store_reports_zero_counts() {
    let dir = TempDir::new().expect("temp dir");
    let status = json_stdout(chron_cmd(dir.path()).args(["status", "--json"]));

    assert_eq!(status["games"], 0);
    assert_eq!(status["idol_hours"], 0);
    assert!(status["last_rebuild_at"].is_null());
    let updates = status["updates"].as_object().expect("updates map");
    assert_eq!(updates.len(), 8);
    assert!(updates.values().all(|count| count == 0));
    assert!(db_path(dir.path()).exists());
}

#[test]
fn rebuild_projects_seeded_games() {
    let dir = TempDir::new().expect("temp dir");
    seed_games(dir.path());

    let report = json_stdout(chron_cmd(dir.path()).args(["rebuild", "--json"]));
    assert_eq!(report["update_count"], 3);
    assert_eq!(report["game_count"], 2);

    let status = json_stdout(chron_cmd(dir.path()).args(["status", "--json"]));
    assert_eq!(status["games"], 2);
    assert_eq!(status["updates"]["game"], 3);
    assert!(status["last_rebuild_at"].is_string());
}

#[test]
fn rebuild_text_output() {
    let dir = TempDir::new().expect("temp dir");
    seed_games(dir.path());

    chron_cmd(dir.path())
        .args(["rebuild"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rebuild: updates=3 games=2"));
}

#[test]
fn game_prints_aggregate() {
    let dir = TempDir::new().expect("temp dir");
    seed_games(dir.path());
    chron_cmd(dir.path()).args(["rebuild"]).assert().success();

    let game = json_stdout(chron_cmd(dir.path()).args(["game", "g1"]));
    assert_eq!(game["game_id"], "g1");
    assert_eq!(game["season"], 11);
    assert_eq!(game["last_update"]["inning"], 9);
    assert!(game["start"].is_string());
    assert!(game["end"].is_string());
}

#[test]
fn unknown_game_fails() {
    let dir = TempDir::new().expect("temp dir");
    chron_cmd(dir.path())
        .args(["game", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no aggregate for game nope"));
}

#[test]
fn broken_config_names_the_file() {
    let dir = TempDir::new().expect("temp dir");
    let config = dir.path().join("broken.toml");
    fs::write(&config, "[poll\nplayer_chunk_size = ").expect("write config");

    chron_cmd(dir.path())
        .args(["status", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken.toml"));
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = TempDir::new().expect("temp dir");
    let config = dir.path().join("nowhere.toml");

    chron_cmd(dir.path())
        .args(["status", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere.toml"))
        .stderr(predicate::str::contains("does not exist"));
    assert!(!db_path(dir.path()).exists());
}

#[test]
fn config_file_sets_store_path() {
    let dir = TempDir::new().expect("temp dir");
    let config = dir.path().join("chron.toml");
    let custom = dir.path().join("custom.sqlite3");
    fs::write(
        &config,
        format!("[store]\npath = \"{}\"\n", custom.display()),
    )
    .expect("write config");

    chron_cmd(dir.path())
        .env_remove("CHRON_DATABASE")
        .args(["status", "--config"])
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.sqlite3"));
    assert!(custom.exists());
}
