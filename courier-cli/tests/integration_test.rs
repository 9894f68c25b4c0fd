//! End-to-end tests for the `courier` binary.

use assert_cmd::Command;
use predicates::prelude::*;

const WELCOME: &str = "<mjml><mj-body><mj-section><mj-column>\
    <mj-text>Welcome, {{Name}}!</mj-text>\
    <mj-button href=\"{{AppUrl}}\">Open</mj-button>\
    </mj-column></mj-section></mj-body></mjml>";

fn courier(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("courier").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("COURIER_CONFIG")
        .env("COURIER_LOG_LEVEL", "off");
    cmd
}

#[test]
fn test_render_text_part() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("templates")).unwrap();
    std::fs::write(dir.path().join("templates/welcome.mjml"), WELCOME).unwrap();

    courier(&dir)
        .args(["render", "welcome", "--part", "text"])
        .args(["--var", "Name=Ada", "--var", "AppUrl=http://localhost:8080"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Welcome, Ada!"))
        .stdout(predicate::str::contains("Open (http://localhost:8080)"));
}

#[test]
fn test_render_missing_variable_fails() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("welcome.mjml"), WELCOME).unwrap();

    courier(&dir)
        .args(["render", "welcome", "--dir", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error:"));
}

#[test]
fn test_config_masks_password() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("courier.toml"),
        "[smtp]\nhost = \"relay.example.com\"\nusername = \"courier\"\npassword = \"hunter2\"\n",
    )
    .unwrap();

    courier(&dir)
        .args(["--config", "courier.toml", "config"])
        .env("COURIER_SMTP__PORT", "2525")
        .assert()
        .success()
        .stdout(predicate::str::contains("relay.example.com"))
        .stdout(predicate::str::contains("port = 2525"))
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn test_enqueue_in_memory() {
    let dir = tempfile::tempdir().unwrap();

    courier(&dir)
        .env("COURIER_QUEUE__BACKEND", "memory")
        .args(["enqueue", "--to", "Ada <ada@example.com>", "-s", "Hello", "-t", "welcome"])
        .args(["--class", "critical", "--var", "Name=Ada"])
        .assert()
        .success()
        .stdout(predicate::str::contains("queued"))
        .stdout(predicate::str::contains("(critical)"));
}

#[test]
fn test_enqueue_rejects_bad_recipient() {
    let dir = tempfile::tempdir().unwrap();

    courier(&dir)
        .env("COURIER_QUEUE__BACKEND", "memory")
        .args(["enqueue", "--to", "not an address", "-s", "Hello", "-t", "welcome"])
        .assert()
        .failure();
}
