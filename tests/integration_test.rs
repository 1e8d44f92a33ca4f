//! Integration tests for the rewards ledger CLI.
//!
//! These tests run the actual binary and verify output against expected CSV files.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write;

/// Get path to test data file
fn test_data_path(filename: &str) -> String {
    format!("tests/data/{}", filename)
}

/// Run the binary with the given arguments and return stdout
fn run_ledger(args: &[&str]) -> String {
    let mut cmd = Command::cargo_bin("rewards-ledger").unwrap();
    let assert = cmd.args(args).assert().success();
    String::from_utf8(assert.get_output().stdout.clone()).unwrap()
}

/// Normalize CSV for comparison (trim whitespace, drop blank lines)
fn normalize_csv(csv: &str) -> Vec<String> {
    csv.lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

#[test]
fn test_reference_balances() {
    let output = run_ledger(&[&test_data_path("reference.csv")]);
    let expected = fs::read_to_string(test_data_path("expected_reference_balances.csv")).unwrap();

    assert_eq!(normalize_csv(&output), normalize_csv(&expected));
}

#[test]
fn test_mixed_case_and_offsets_match_reference() {
    let output = run_ledger(&[&test_data_path("mixed_case_offsets.csv")]);
    let expected = fs::read_to_string(test_data_path("expected_reference_balances.csv")).unwrap();

    assert_eq!(normalize_csv(&output), normalize_csv(&expected));
}

#[test]
fn test_spend_prints_records_then_balances() {
    let output = run_ledger(&[&test_data_path("reference.csv"), "--spend", "5000"]);
    let mut sections = output.split("\n\n");

    let spends: Vec<String> = sections
        .next()
        .unwrap()
        .lines()
        .map(|line| line.rsplitn(2, ',').nth(1).unwrap().to_string())
        .collect();
    assert_eq!(
        spends,
        vec!["payer,points", "DANNON,-100", "UNILEVER,-200", "MILLER COORS,-4700"]
    );

    let balances = normalize_csv(sections.next().unwrap());
    assert_eq!(balances, vec!["payer,points", "DANNON,1000", "MILLER COORS,5300"]);
}

#[test]
fn test_spend_timestamps_are_utc() {
    let output = run_ledger(&[&test_data_path("reference.csv"), "--spend", "10"]);
    let record = output.lines().nth(1).unwrap();
    assert!(record.starts_with("DANNON,-10,"));
    assert!(record.ends_with('Z'), "Expected UTC timestamp in: {}", record);
}

#[test]
fn test_overspend_fails() {
    let mut cmd = Command::cargo_bin("rewards-ledger").unwrap();
    cmd.args([test_data_path("reference.csv").as_str(), "--spend", "1000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Insufficient points"));
}

#[test]
fn test_negative_instruction_without_history_fails() {
    let mut cmd = Command::cargo_bin("rewards-ledger").unwrap();
    cmd.arg(test_data_path("overdraft.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Insufficient points"));
}

#[test]
fn test_bad_row_fails_with_row_number() {
    let mut cmd = Command::cargo_bin("rewards-ledger").unwrap();
    cmd.arg(test_data_path("bad_row.csv"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("row 3"));
}

#[test]
fn test_zero_spend_is_rejected() {
    let mut cmd = Command::cargo_bin("rewards-ledger").unwrap();
    cmd.args([test_data_path("reference.csv").as_str(), "--spend", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed input"));
}

#[test]
fn test_generated_input_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "payer,points,timestamp").unwrap();
    for hour in 0..24 {
        writeln!(file, "ACME,10,2021-03-01T{:02}:00:00Z", hour).unwrap();
    }
    writeln!(file, "ACME,-40,2021-03-01T23:30:00Z").unwrap();
    file.flush().unwrap();

    let output = run_ledger(&[file.path().to_str().unwrap()]);
    assert_eq!(normalize_csv(&output), vec!["payer,points", "ACME,200"]);
}

#[test]
fn test_empty_input_prints_header_only() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "payer,points,timestamp").unwrap();
    file.flush().unwrap();

    let output = run_ledger(&[file.path().to_str().unwrap()]);
    assert_eq!(normalize_csv(&output), vec!["payer,points"]);
}

#[test]
fn test_missing_file_error() {
    let mut cmd = Command::cargo_bin("rewards-ledger").unwrap();
    cmd.arg("nonexistent.csv")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error").or(predicate::str::contains("Error")));
}

#[test]
fn test_missing_argument_error() {
    let mut cmd = Command::cargo_bin("rewards-ledger").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Missing input file"));
}
