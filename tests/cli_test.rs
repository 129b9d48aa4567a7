mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use common::{SERVICE_ADDRESS, payment, write_payments, write_roster};
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_replay_prints_transfers() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("payments.jsonl");
    let roster = dir.path().join("roster.json");
    write_payments(
        &input,
        &[payment(1, 100, None), payment(2, 25, Some("message=hello"))],
    )?;
    write_roster(&roster, &["alice", "bob", "carol"])?;

    let mut cmd = Command::new(cargo_bin!("soak"));
    cmd.arg("replay")
        .arg(&input)
        .arg("--roster")
        .arg(&roster)
        .arg("--address")
        .arg(SERVICE_ADDRESS)
        .arg("--config")
        .arg(dir.path().join("missing.toml"));

    cmd.assert()
        .success()
        .stdout(predicate::str::starts_with("to,amount,metadata"))
        .stdout(predicate::str::contains("alice@switchcraft.kst,33,"))
        .stdout(predicate::str::contains("carol@switchcraft.kst,33,"))
        .stdout(predicate::str::contains(
            "kpayer0001,25,\"error=message requires per-recipient minimum of 10, got 8\"",
        ));

    Ok(())
}

#[test]
fn test_replay_skips_malformed_lines() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("payments.jsonl");
    let roster = dir.path().join("roster.json");
    write_payments(&input, &[payment(1, 10, None)])?;
    let mut file = std::fs::OpenOptions::new().append(true).open(&input)?;
    writeln!(file, "{{\"id\": ")?;
    write_roster(&roster, &["alice"])?;

    let mut cmd = Command::new(cargo_bin!("soak"));
    cmd.arg("replay")
        .arg(&input)
        .arg("--roster")
        .arg(&roster)
        .arg("--address")
        .arg(SERVICE_ADDRESS)
        .arg("--config")
        .arg(dir.path().join("missing.toml"));

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("alice@switchcraft.kst,10,"))
        .stderr(predicate::str::contains("Error reading payment"));

    Ok(())
}

#[test]
fn test_replay_with_missing_roster_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("payments.jsonl");
    write_payments(&input, &[payment(1, 10, None)])?;

    let mut cmd = Command::new(cargo_bin!("soak"));
    cmd.arg("replay")
        .arg(&input)
        .arg("--roster")
        .arg(dir.path().join("absent.json"))
        .arg("--config")
        .arg(dir.path().join("missing.toml"));

    cmd.assert().failure();

    Ok(())
}

#[cfg(not(feature = "broker-nats"))]
#[test]
fn test_run_without_broker_support_exits_with_broker_status() {
    let dir = tempdir().unwrap();
    let mut cmd = Command::new(cargo_bin!("soak"));
    cmd.arg("run").arg("--config").arg(dir.path().join("missing.toml"));

    cmd.assert().code(3);
}

#[test]
fn test_replay_rejects_unusable_backoff() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input = dir.path().join("payments.jsonl");
    let roster = dir.path().join("roster.json");
    let config = dir.path().join("config.toml");
    write_payments(&input, &[payment(1, 10, None)])?;
    write_roster(&roster, &["alice"])?;
    std::fs::write(&config, "[backoff]\nfactor = -1.5\n")?;

    let mut cmd = Command::new(cargo_bin!("soak"));
    cmd.arg("replay")
        .arg(&input)
        .arg("--roster")
        .arg(&roster)
        .arg("--address")
        .arg(SERVICE_ADDRESS)
        .arg("--config")
        .arg(&config);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("backoff.factor"));

    Ok(())
}
