#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: create a payment that settles immediately
    let mut csv1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv1, "op, reference, amount, currency, method, details, metadata").unwrap();
    writeln!(csv1, "create, first, 100, USD, wallet, , ").unwrap();

    let mut cmd1 = Command::new(cargo_bin!("payflow"));
    cmd1.env_remove("RUST_LOG")
        .arg(csv1.path())
        .arg("--db-path")
        .arg(&db_path);

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains(",completed,100,USD,100,0,"));

    // 2. Second run: a new payment plus a reused reference
    let mut csv2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv2, "op, reference, amount, currency, method, details, metadata").unwrap();
    writeln!(csv2, "create, second, 50, USD, wallet, , ").unwrap();
    writeln!(csv2, "create, first, 75, USD, wallet, , ").unwrap();

    let mut cmd2 = Command::new(cargo_bin!("payflow"));
    cmd2.env_remove("RUST_LOG")
        .arg(csv2.path())
        .arg("--db-path")
        .arg(&db_path);

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);
    let stderr2 = String::from_utf8_lossy(&output2.stderr);

    // The payment from the first run was recovered and its reference is still taken
    let rows: Vec<&str> = stdout2.lines().skip(1).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows[0].starts_with("first,"));
    assert!(rows[0].contains(",completed,100,USD,100,0,"));
    assert!(rows[1].starts_with("second,"));
    assert!(stderr2.contains("already in use"));
}
