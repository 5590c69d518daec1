//! Concurrency tests for the pillbox binary.
//!
//! These tests verify that multiple processes marking doses on the same
//! prescription at the same time never overwrite each other's updates.

use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use tempfile::TempDir;

fn setup_test_dir() -> TempDir {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = format!(
        "[data]\ndata_dir = {:?}\n\n[schedule]\ncurrent_slot_only = false\n",
        temp_dir.path().join("data").display().to_string()
    );
    fs::write(temp_dir.path().join("config.toml"), config).expect("Failed to write config");
    temp_dir
}

fn cli(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("pillbox").expect("Failed to find pillbox binary");
    cmd.arg("--config")
        .arg(dir.join("config.toml"))
        .arg("--user")
        .arg("alice");
    cmd
}

fn add_prescription(dir: &Path, medicines: usize) -> String {
    let mut cmd = cli(dir);
    cmd.arg("add").arg("--doctor").arg("Dr. Rao");
    for i in 0..medicines {
        cmd.arg("--medicine")
            .arg(format!("Medicine {}:1 tablet:1:7:morning:Mon,Tue,Wed,Thu,Fri,Sat,Sun", i + 1));
    }
    let output = cmd.output().expect("Failed to run add");
    assert!(output.status.success());

    String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .find_map(|l| l.trim().strip_prefix("ID: ").map(str::to_string))
        .expect("No id in output")
}

fn stored_counts(dir: &Path, id: &str) -> Vec<u64> {
    let raw = fs::read_to_string(dir.join("data/prescriptions.json")).unwrap();
    let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
    doc[id]["medicines"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["takenCount"].as_u64().unwrap())
        .collect()
}

#[test]
fn test_concurrent_toggles_on_one_prescription() {
    let temp_dir = setup_test_dir();
    let dir: PathBuf = temp_dir.path().to_path_buf();
    let id = add_prescription(&dir, 6);

    let handles: Vec<_> = (1..=6)
        .map(|position| {
            let dir = dir.clone();
            let id = id.clone();
            thread::spawn(move || {
                let position = position.to_string();
                cli(&dir)
                    .args(["take", id.as_str(), position.as_str()])
                    .args(["--date", "2025-03-03", "--slot", "morning"])
                    .assert()
                    .success();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("thread panicked");
    }

    assert_eq!(stored_counts(&dir, &id), vec![1; 6]);
}

#[test]
fn test_concurrent_readers_and_writers() {
    let temp_dir = setup_test_dir();
    let dir: PathBuf = temp_dir.path().to_path_buf();
    let id = add_prescription(&dir, 1);

    let writer = {
        let dir = dir.clone();
        let id = id.clone();
        thread::spawn(move || {
            for day in 3..=9 {
                let date = format!("2025-03-{:02}", day);
                cli(&dir)
                    .args(["take", id.as_str(), "1", "--date", date.as_str(), "--slot", "morning"])
                    .assert()
                    .success();
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let dir = dir.clone();
            thread::spawn(move || {
                for _ in 0..5 {
                    cli(&dir).arg("list").assert().success();
                    cli(&dir).arg("adherence").assert().success();
                }
            })
        })
        .collect();

    writer.join().expect("writer panicked");
    for reader in readers {
        reader.join().expect("reader panicked");
    }

    assert_eq!(stored_counts(&dir, &id), vec![7]);
}
