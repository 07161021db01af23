//! `ctk-cli run` end to end through the `assert_cmd` binary harness:
//! create a backtest run, read its status back, transition it, delete it.
//!
//! DB-backed, skipped if DATABASE_URL is not set.

use assert_cmd::prelude::*;
use predicates::prelude::*;

fn db_url() -> Option<String> {
    match std::env::var(ctk_db::ENV_DB_URL) {
        Ok(v) => Some(v),
        Err(_) => {
            eprintln!("SKIP: {} not set", ctk_db::ENV_DB_URL);
            None
        }
    }
}

#[tokio::test]
async fn run_create_status_set_status_delete_round_trip() -> anyhow::Result<()> {
    let Some(url) = db_url() else { return Ok(()) };

    let pool = ctk_db::connect(&url, 2).await?;
    ctk_db::migrate(&pool).await?;

    let mut create = assert_cmd::Command::cargo_bin("ctk-cli")?;
    let output = create
        .env(ctk_db::ENV_DB_URL, &url)
        .args([
            "run",
            "create",
            "--kind",
            "backtest",
            "--name",
            "cli-lifecycle-test",
            "--symbols",
            "BTC-USD",
            "--timeframe",
            "1m",
            "--strategy-name",
            "momentum_breakout_v2",
            "--strategy-version",
            "v2",
            "--starting-capital",
            "50000.00",
            "--start",
            "2026-01-01T00:00:00Z",
            "--end",
            "2026-01-02T00:00:00Z",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(output)?;
    let run_id = stdout
        .lines()
        .find_map(|l| l.strip_prefix("run_id="))
        .expect("run_id printed")
        .to_string();
    assert!(stdout.contains("status=queued"));
    assert!(stdout.contains("config_hash="));

    let mut status = assert_cmd::Command::cargo_bin("ctk-cli")?;
    status
        .env(ctk_db::ENV_DB_URL, &url)
        .args(["run", "status", "--run-id", &run_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("status=queued"));

    let mut set_status = assert_cmd::Command::cargo_bin("ctk-cli")?;
    set_status
        .env(ctk_db::ENV_DB_URL, &url)
        .args(["run", "set-status", "--run-id", &run_id, "--status", "paused"])
        .assert()
        .success()
        .stdout(predicate::str::contains("status=paused"));

    let mut delete = assert_cmd::Command::cargo_bin("ctk-cli")?;
    delete
        .env(ctk_db::ENV_DB_URL, &url)
        .args(["run", "delete", "--run-id", &run_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted=true"));

    Ok(())
}

#[tokio::test]
async fn run_create_rejects_unknown_strategy() -> anyhow::Result<()> {
    let Some(url) = db_url() else { return Ok(()) };

    let mut cmd = assert_cmd::Command::cargo_bin("ctk-cli")?;
    cmd.env(ctk_db::ENV_DB_URL, &url)
        .args([
            "run",
            "create",
            "--kind",
            "backtest",
            "--name",
            "cli-bad-strategy",
            "--symbols",
            "BTC-USD",
            "--timeframe",
            "1m",
            "--strategy-name",
            "not_a_real_strategy",
            "--strategy-version",
            "v1",
            "--starting-capital",
            "1000.00",
            "--start",
            "2026-01-01T00:00:00Z",
            "--end",
            "2026-01-02T00:00:00Z",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unresolved strategy"));

    Ok(())
}

#[test]
fn db_status_runs_without_panicking_when_unconfigured() {
    if std::env::var(ctk_db::ENV_DB_URL).is_ok() {
        return;
    }
    let mut cmd = assert_cmd::Command::cargo_bin("ctk-cli").unwrap();
    cmd.env_remove(ctk_db::ENV_DB_URL)
        .args(["db", "status"])
        .assert()
        .failure();
}
