//! Integration tests for the gallerycast binary
//!
//! Collaborating HTTP services (the gallery feed and the Mastodon instance)
//! are served by wiremock; each test gets its own config, token file and
//! database in a temporary directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

struct TestEnv {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl TestEnv {
    fn new(feed_url: &str, instance: &str) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let db_path = temp_dir.path().join("data").join("gallerycast.db");
        let token_path = temp_dir.path().join("mastodon.token");

        fs::write(&token_path, "test-token\n").unwrap();
        fs::write(
            &config_path,
            format!(
                r#"
[database]
path = "{}"

[gallery]
feed_url = "{}"
client_id = "client123"
timeout = "2s"

[mastodon]
instance = "{}"
token_file = "{}"
timeout = "2s"
"#,
                escape_path_for_toml(&db_path.to_string_lossy()),
                feed_url,
                instance,
                escape_path_for_toml(&token_path.to_string_lossy()),
            ),
        )
        .unwrap();

        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    fn offline() -> Self {
        Self::new("http://127.0.0.1:9/feed.json", "http://127.0.0.1:9")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("gallerycast").unwrap();
        cmd.env("GALLERYCAST_CONFIG", &self.config_path)
            .env_remove("GALLERYCAST_CLIENT_ID")
            .env_remove("GALLERYCAST_DB_PATH")
            .env_remove("GALLERYCAST_LOG_FORMAT");
        cmd
    }

    fn stats(&self) -> Value {
        let output = self
            .cmd()
            .args(["stats", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

async fn mount_feed(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/3/gallery/top/top/0.json"))
        .and(header("Authorization", "Client-ID client123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "new0001", "title": "Newer image", "cover": "cov0001", "nsfw": null},
                {"id": "old0001", "title": "Older image", "link": "http://i.imgur.com/old0001.png",
                 "nsfw": true}
            ],
            "success": true,
            "status": 200
        })))
        .mount(server)
        .await;
}

fn feed_url(server: &MockServer) -> String {
    format!("{}/3/gallery/top/top/0.json", server.uri())
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("gallerycast")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("poll"))
        .stdout(predicate::str::contains("process"))
        .stdout(predicate::str::contains("refresh-limits"))
        .stdout(predicate::str::contains("stats"));
}

#[test]
fn test_missing_config_is_configuration_error() {
    let temp_dir = TempDir::new().unwrap();

    Command::cargo_bin("gallerycast")
        .unwrap()
        .env(
            "GALLERYCAST_CONFIG",
            temp_dir.path().join("does-not-exist.toml"),
        )
        .arg("stats")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_invalid_output_format_is_invalid_input() {
    let env = TestEnv::offline();

    env.cmd()
        .args(["stats", "--format", "yaml"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid format"));
}

#[test]
fn test_stats_on_fresh_database() {
    let env = TestEnv::offline();

    env.cmd()
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("available: 0"))
        .stdout(predicate::str::contains("remaining calls: 180"))
        .stdout(predicate::str::contains("refreshed: never"));

    let stats = env.stats();
    assert_eq!(stats["queue"]["available"], 0);
    assert_eq!(stats["seen_markers"], 0);
    assert_eq!(stats["quota"]["chars_reserved_per_media"], 23);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_poll_enqueues_each_item_once() {
    let gallery = MockServer::start().await;
    mount_feed(&gallery).await;
    let env = TestEnv::new(&feed_url(&gallery), "http://127.0.0.1:9");

    env.cmd()
        .arg("poll")
        .assert()
        .success()
        .stdout(predicate::str::contains("enqueued 2, skipped 0"));

    env.cmd()
        .arg("poll")
        .assert()
        .success()
        .stdout(predicate::str::contains("enqueued 0, skipped 2"));

    assert_eq!(env.stats()["queue"]["available"], 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_poll_fails_when_feed_is_down() {
    let gallery = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&gallery)
        .await;
    let env = TestEnv::new(&feed_url(&gallery), "http://127.0.0.1:9");

    env.cmd()
        .arg("poll")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("503"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_poll_then_process_publishes_and_marks() {
    let gallery = MockServer::start().await;
    mount_feed(&gallery).await;
    let mastodon = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses"))
        .and(header("Authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "109"})))
        .expect(2)
        .mount(&mastodon)
        .await;
    let env = TestEnv::new(&feed_url(&gallery), &mastodon.uri());

    env.cmd().arg("poll").assert().success();
    env.cmd()
        .arg("process")
        .assert()
        .success()
        .stdout(predicate::str::contains("posted old0001 as 109"))
        .stdout(predicate::str::contains("posted 2 of 2 leased"));

    let stats = env.stats();
    assert_eq!(stats["queue"]["available"], 0);
    assert_eq!(stats["queue"]["leased"], 0);
    assert_eq!(stats["seen_markers"], 2);

    // Published items are not queued again
    env.cmd()
        .arg("poll")
        .assert()
        .success()
        .stdout(predicate::str::contains("enqueued 0, skipped 2"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_post_exits_non_zero_and_cools_down() {
    let gallery = MockServer::start().await;
    mount_feed(&gallery).await;
    let mastodon = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/statuses"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mastodon)
        .await;
    let env = TestEnv::new(&feed_url(&gallery), &mastodon.uri());

    env.cmd().arg("poll").assert().success();
    env.cmd().arg("process").assert().code(1);

    let stats = env.stats();
    assert!(stats["quota"]["cooldown_until"].is_i64());
    assert_eq!(stats["seen_markers"], 0);

    // A second run inside the cooldown does not touch the platform
    env.cmd()
        .arg("process")
        .assert()
        .success()
        .stdout(predicate::str::contains("cooling down"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_refresh_limits_stores_quota() {
    let mastodon = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/verify_credentials"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-RateLimit-Remaining", "250")
                .set_body_json(json!({"id": "1"})),
        )
        .mount(&mastodon)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/instance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "configuration": {"statuses": {"characters_reserved_per_url": 24}}
        })))
        .mount(&mastodon)
        .await;
    let env = TestEnv::new("http://127.0.0.1:9/feed.json", &mastodon.uri());

    env.cmd()
        .arg("refresh-limits")
        .assert()
        .success()
        .stdout(predicate::str::contains("remaining calls: 250"))
        .stdout(predicate::str::contains("chars reserved per media: 24"));

    let stats = env.stats();
    assert_eq!(stats["quota"]["remaining_calls"], 250);
    assert!(stats["quota"]["refreshed_at"].is_i64());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_quota_below_floor_skips_processing() {
    let mastodon = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/verify_credentials"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-RateLimit-Remaining", "12")
                .set_body_json(json!({"id": "1"})),
        )
        .mount(&mastodon)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/instance"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "configuration": {"statuses": {"characters_reserved_per_url": 23}}
        })))
        .mount(&mastodon)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1"})))
        .expect(0)
        .mount(&mastodon)
        .await;
    let env = TestEnv::new("http://127.0.0.1:9/feed.json", &mastodon.uri());

    env.cmd().arg("refresh-limits").assert().success();
    env.cmd()
        .arg("process")
        .assert()
        .success()
        .stdout(predicate::str::contains("12 calls remaining"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_token_exits_with_auth_code() {
    let mastodon = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mastodon)
        .await;
    let env = TestEnv::new("http://127.0.0.1:9/feed.json", &mastodon.uri());

    env.cmd()
        .arg("refresh-limits")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Authentication failed"));
}
