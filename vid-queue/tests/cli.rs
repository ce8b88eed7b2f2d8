//! Integration tests for the vid-queue CLI

use assert_cmd::Command;
use libvidcast::{Database, PostStatus};
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

async fn setup_test_env() -> (TempDir, String, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let db_path = temp_dir.path().join("test.db");

    let config_content = format!(
        r#"
[database]
path = "{}"
"#,
        db_path.display().to_string().replace('\\', "/")
    );
    fs::write(&config_path, config_content).unwrap();

    let _db = Database::new(db_path.to_str().unwrap()).await.unwrap();

    (
        temp_dir,
        config_path.to_str().unwrap().to_string(),
        db_path.to_str().unwrap().to_string(),
    )
}

fn vid_queue(config_path: &str) -> Command {
    let mut cmd = Command::cargo_bin("vid-queue").unwrap();
    cmd.env("VIDCAST_CONFIG", config_path);
    cmd
}

fn add_upload(config_path: &str, dir: &TempDir) -> String {
    let video = dir.path().join(format!("{}.mp4", uuid::Uuid::new_v4()));
    fs::write(&video, b"video bytes").unwrap();

    let output = vid_queue(config_path)
        .arg("add")
        .arg(video.to_str().unwrap())
        .arg("--platforms")
        .arg("youtube,tiktok")
        .arg("--title")
        .arg("CLI test clip")
        .output()
        .unwrap();

    assert!(output.status.success());
    String::from_utf8(output.stdout).unwrap().trim().to_string()
}

#[tokio::test]
async fn test_add_creates_upload_with_platform_rows() {
    let (temp_dir, config_path, db_path) = setup_test_env().await;
    let upload_id = add_upload(&config_path, &temp_dir);

    let db = Database::new(&db_path).await.unwrap();
    let upload = db.get_upload(&upload_id).await.unwrap().unwrap();
    assert_eq!(upload.status, PostStatus::Draft);
    assert_eq!(upload.content.len(), 2);

    let children = db.platform_statuses(&upload_id).await.unwrap();
    assert_eq!(children.len(), 2);
    assert!(children.iter().all(|c| c.account == "personal"));
}

#[tokio::test]
async fn test_add_rejects_missing_video() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    vid_queue(&config_path)
        .arg("add")
        .arg("/nonexistent/video.mp4")
        .arg("--platforms")
        .arg("youtube")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("not found"));
}

#[tokio::test]
async fn test_add_rejects_unknown_platform() {
    let (temp_dir, config_path, _db_path) = setup_test_env().await;
    let video = temp_dir.path().join("clip.mp4");
    fs::write(&video, b"video bytes").unwrap();

    vid_queue(&config_path)
        .arg("add")
        .arg(video.to_str().unwrap())
        .arg("--platforms")
        .arg("vimeo")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("vimeo"));
}

#[tokio::test]
async fn test_enqueue_then_schedule_clears_position() {
    let (temp_dir, config_path, db_path) = setup_test_env().await;
    let upload_id = add_upload(&config_path, &temp_dir);

    vid_queue(&config_path)
        .arg("enqueue")
        .arg(&upload_id)
        .assert()
        .success()
        .stdout(predicate::str::contains("position 1"));

    vid_queue(&config_path)
        .arg("schedule")
        .arg(&upload_id)
        .arg("2h")
        .assert()
        .success();

    let db = Database::new(&db_path).await.unwrap();
    let upload = db.get_upload(&upload_id).await.unwrap().unwrap();
    assert_eq!(upload.status, PostStatus::Scheduled);
    assert!(upload.scheduled_time.is_some());
    assert_eq!(upload.queue_position, None);
}

#[tokio::test]
async fn test_clear_queue_resets_queued_uploads() {
    let (temp_dir, config_path, db_path) = setup_test_env().await;
    let queued = add_upload(&config_path, &temp_dir);
    let scheduled = add_upload(&config_path, &temp_dir);

    vid_queue(&config_path)
        .arg("enqueue")
        .arg(&queued)
        .assert()
        .success();
    vid_queue(&config_path)
        .arg("schedule")
        .arg(&scheduled)
        .arg("2h")
        .assert()
        .success();

    vid_queue(&config_path)
        .arg("clear-queue")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 1 queued upload(s)"));

    let db = Database::new(&db_path).await.unwrap();
    let cleared = db.get_upload(&queued).await.unwrap().unwrap();
    assert_eq!(cleared.status, PostStatus::Draft);
    assert_eq!(cleared.queue_position, None);

    // The scheduled upload is untouched
    let untouched = db.get_upload(&scheduled).await.unwrap().unwrap();
    assert_eq!(untouched.status, PostStatus::Scheduled);
}

#[tokio::test]
async fn test_clear_schedule_resets_scheduled_uploads() {
    let (temp_dir, config_path, db_path) = setup_test_env().await;
    let scheduled = add_upload(&config_path, &temp_dir);

    vid_queue(&config_path)
        .arg("schedule")
        .arg(&scheduled)
        .arg("2h")
        .assert()
        .success();

    vid_queue(&config_path)
        .arg("clear-schedule")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 1 scheduled upload(s)"));

    let db = Database::new(&db_path).await.unwrap();
    let cleared = db.get_upload(&scheduled).await.unwrap().unwrap();
    assert_eq!(cleared.status, PostStatus::Draft);
    assert_eq!(cleared.scheduled_time, None);
}

#[tokio::test]
async fn test_schedule_rejects_bad_time() {
    let (temp_dir, config_path, _db_path) = setup_test_env().await;
    let upload_id = add_upload(&config_path, &temp_dir);

    vid_queue(&config_path)
        .arg("schedule")
        .arg(&upload_id)
        .arg("not a time")
        .assert()
        .failure()
        .code(3);
}

#[tokio::test]
async fn test_status_shows_platform_rows() {
    let (temp_dir, config_path, _db_path) = setup_test_env().await;
    let upload_id = add_upload(&config_path, &temp_dir);

    vid_queue(&config_path)
        .arg("status")
        .arg(&upload_id)
        .assert()
        .success()
        .stdout(predicate::str::contains("youtube"))
        .stdout(predicate::str::contains("tiktok"));
}

#[tokio::test]
async fn test_status_unknown_upload() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    vid_queue(&config_path)
        .arg("status")
        .arg("no-such-id")
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("Unknown upload"));
}

#[tokio::test]
async fn test_retry_requires_failed_upload() {
    let (temp_dir, config_path, _db_path) = setup_test_env().await;
    let upload_id = add_upload(&config_path, &temp_dir);

    vid_queue(&config_path)
        .arg("retry")
        .arg(&upload_id)
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("only failed uploads"));
}

#[tokio::test]
async fn test_retry_resets_failed_platforms_and_enqueues() {
    let (temp_dir, config_path, db_path) = setup_test_env().await;
    let upload_id = add_upload(&config_path, &temp_dir);

    let db = Database::new(&db_path).await.unwrap();
    db.update_upload_status(&upload_id, PostStatus::Failed)
        .await
        .unwrap();
    let children = db.platform_statuses(&upload_id).await.unwrap();
    db.mark_platform_failed(children[0].id.unwrap(), "network down")
        .await
        .unwrap();

    vid_queue(&config_path)
        .arg("retry")
        .arg(&upload_id)
        .assert()
        .success()
        .stdout(predicate::str::contains("Reset 1 failed platform(s)"));

    let upload = db.get_upload(&upload_id).await.unwrap().unwrap();
    assert_eq!(upload.status, PostStatus::Queued);

    let children = db.platform_statuses(&upload_id).await.unwrap();
    assert!(children.iter().all(|c| c.status != PostStatus::Failed));
}

#[tokio::test]
async fn test_list_empty() {
    let (_temp_dir, config_path, _db_path) = setup_test_env().await;

    vid_queue(&config_path)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No uploads"));
}

#[tokio::test]
async fn test_list_json_output() {
    let (temp_dir, config_path, _db_path) = setup_test_env().await;
    let upload_id = add_upload(&config_path, &temp_dir);

    let output = vid_queue(&config_path)
        .arg("list")
        .arg("--format")
        .arg("json")
        .output()
        .unwrap();

    assert!(output.status.success());
    let uploads: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(uploads[0]["id"], upload_id.as_str());
}
