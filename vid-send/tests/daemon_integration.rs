//! Integration tests for the vid-send daemon

use assert_cmd::Command;
use libvidcast::{Database, Platform, PlatformContent, PlatformStatus, Upload};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Setup test environment with config and database
async fn setup_test_env() -> (TempDir, String, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("test.db");

    let config_content = format!(
        r#"
[database]
path = "{}"

[scheduling]
poll_interval = 1
"#,
        db_path.display().to_string().replace('\\', "/")
    );

    fs::write(&config_path, config_content).unwrap();

    // Initialize database
    let _db = Database::new(db_path.to_str().unwrap()).await.unwrap();

    (
        temp_dir,
        config_path.to_str().unwrap().to_string(),
        db_path.to_str().unwrap().to_string(),
    )
}

/// Create a scheduled upload that is due for processing
async fn create_due_upload(db_path: &str, dir: &TempDir) -> String {
    let db = Database::new(db_path).await.unwrap();
    let now = chrono::Utc::now().timestamp();

    let video = dir.path().join(format!("{}.mp4", uuid::Uuid::new_v4()));
    fs::write(&video, b"video bytes").unwrap();

    let mut upload = Upload::new(video.to_str().unwrap().to_string(), None);
    upload.content.insert(
        Platform::Tiktok,
        PlatformContent {
            title: "Due clip".to_string(),
            description: String::new(),
            hashtags: vec![],
        },
    );
    let upload_id = upload.id.clone();
    db.create_upload(&upload).await.unwrap();

    let child = PlatformStatus::new_draft(
        upload_id.clone(),
        Platform::Tiktok,
        "personal".to_string(),
        None,
    );
    db.create_platform_status(&child).await.unwrap();

    db.schedule_upload(&upload_id, now - 10).await.unwrap();
    upload_id
}

// BASIC FUNCTIONALITY TESTS

#[tokio::test]
async fn test_daemon_starts_with_config() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    let mut cmd = Command::cargo_bin("vid-send").unwrap();

    cmd.env("VIDCAST_CONFIG", &config_path)
        .arg("--once")
        .assert()
        .success();
}

#[tokio::test]
async fn test_daemon_requires_valid_config() {
    let temp_dir = TempDir::new().unwrap();
    let invalid_config = temp_dir.path().join("invalid.toml");

    fs::write(&invalid_config, "invalid toml content [[[").unwrap();

    let mut cmd = Command::cargo_bin("vid-send").unwrap();

    cmd.env("VIDCAST_CONFIG", invalid_config.to_str().unwrap())
        .arg("--once")
        .assert()
        .failure();
}

#[tokio::test]
async fn test_missing_config_fails() {
    let temp_dir = TempDir::new().unwrap();
    let nonexistent = temp_dir.path().join("nonexistent.toml");

    let mut cmd = Command::cargo_bin("vid-send").unwrap();

    cmd.env("VIDCAST_CONFIG", nonexistent.to_str().unwrap())
        .arg("--once")
        .assert()
        .failure();
}

#[tokio::test]
async fn test_once_flag_exits_immediately() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    let mut cmd = Command::cargo_bin("vid-send").unwrap();

    cmd.env("VIDCAST_CONFIG", &config_path)
        .arg("--once")
        .assert()
        .success()
        .stderr(predicate::str::contains("vid-send daemon starting"))
        .stderr(predicate::str::contains("processed one cycle, exiting"))
        .stderr(predicate::str::contains("vid-send daemon stopped"));
}

#[tokio::test]
async fn test_custom_poll_interval() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    let mut cmd = Command::cargo_bin("vid-send").unwrap();

    cmd.env("VIDCAST_CONFIG", &config_path)
        .arg("--once")
        .arg("--poll-interval")
        .arg("30")
        .assert()
        .success()
        .stderr(predicate::str::contains("Poll interval: 30s"));
}

#[tokio::test]
async fn test_poll_interval_from_config() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    let mut cmd = Command::cargo_bin("vid-send").unwrap();

    cmd.env("VIDCAST_CONFIG", &config_path)
        .arg("--once")
        .assert()
        .success()
        .stderr(predicate::str::contains("Poll interval: 1s"));
}

// UPLOAD PROCESSING TESTS

#[tokio::test]
async fn test_processes_due_uploads() {
    let (temp_dir, config_path, db_path) = setup_test_env().await;
    let _upload_id = create_due_upload(&db_path, &temp_dir).await;

    let mut cmd = Command::cargo_bin("vid-send").unwrap();

    cmd.env("VIDCAST_CONFIG", &config_path)
        .arg("--once")
        .assert()
        .success()
        .stderr(predicate::str::contains("Found 1 scheduled upload(s) due"));
}

#[tokio::test]
async fn test_no_uploads_due() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    let mut cmd = Command::cargo_bin("vid-send").unwrap();

    cmd.env("VIDCAST_CONFIG", &config_path)
        .arg("--once")
        .assert()
        .success()
        .stderr(predicate::str::contains("scheduled upload(s) due").not());
}

#[tokio::test]
async fn test_no_platforms_enabled_warns() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    let mut cmd = Command::cargo_bin("vid-send").unwrap();

    cmd.env("VIDCAST_CONFIG", &config_path)
        .arg("--once")
        .arg("--verbose")
        .assert()
        .success()
        .stderr(predicate::str::contains(
            "No platforms are enabled in configuration",
        ));
}
