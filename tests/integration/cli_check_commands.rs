#![allow(missing_docs)]

use std::fs;
use std::path::PathBuf;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use sombra_consistency::store::builder::StoreBuilder;
use sombra_consistency::store::PropertyValue;
use tempfile::TempDir;

fn seeded_dir(builder: &StoreBuilder) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("graph");
    builder.write_to(&path).expect("write stores");
    (dir, path)
}

fn damaged() -> StoreBuilder {
    let mut b = StoreBuilder::demo();
    if let Some(value) = b.property_value_mut(0, 0) {
        *value = PropertyValue::ShortString("Lovelac".into());
    }
    b
}

#[test]
fn seed_demo_then_check_is_clean() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("demo");
    cargo_bin_cmd!("sombra-check")
        .args(["--quiet", "seed-demo"])
        .arg(&path)
        .assert()
        .success();

    let output = cargo_bin_cmd!("sombra-check")
        .args(["--quiet", "check"])
        .arg(&path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).expect("utf8 stdout");
    assert!(stdout.contains("Store is consistent"), "{stdout}");
}

#[test]
fn seed_demo_refuses_existing_store() {
    let (_dir, path) = seeded_dir(&StoreBuilder::demo());
    cargo_bin_cmd!("sombra-check")
        .args(["--quiet", "seed-demo"])
        .arg(&path)
        .assert()
        .code(1);
}

#[test]
fn inconsistent_store_exits_with_two() {
    let (_dir, path) = seeded_dir(&damaged());
    let output = cargo_bin_cmd!("sombra-check")
        .args(["--theme", "plain", "check", "--execution-order", "sequential"])
        .arg(&path)
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).expect("utf8 stdout");
    assert!(stdout.contains("IndexValueMismatch"), "{stdout}");
    assert!(stdout.contains("Index: 1"), "{stdout}");
    assert!(stdout.contains("By record type"), "{stdout}");
    assert!(stdout.contains("Findings"), "{stdout}");
    assert!(stdout.contains("E "), "{stdout}");
}

#[test]
fn json_summary_carries_counts_and_findings() {
    let (_dir, path) = seeded_dir(&damaged());
    let output = cargo_bin_cmd!("sombra-check")
        .args(["check", "--format", "json", "--threads", "2"])
        .arg(&path)
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let summary: Value = serde_json::from_slice(&output).expect("json summary");
    assert_eq!(summary["consistent"], false);
    assert_eq!(summary["errors"], 1);
    assert_eq!(summary["counts"]["Index"], 1);
    assert_eq!(summary["findings"][0]["kind"], "index_value_mismatch");
    assert_eq!(summary["findings"][0]["field"], "node 0");
}

#[test]
fn config_file_enables_owner_audit() {
    let mut b = StoreBuilder::demo();
    let mut stray = sombra_consistency::store::PropertyRecord::new(0);
    stray.blocks.push(sombra_consistency::store::PropertyBlock {
        key: 1,
        value: PropertyValue::Int(3),
    });
    b.push_property(stray);
    let (dir, path) = seeded_dir(&b);

    cargo_bin_cmd!("sombra-check")
        .args(["--quiet", "check"])
        .arg(&path)
        .env_remove("SOMBRA_CHECK_CONFIG")
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path())
        .assert()
        .success();

    let config = dir.path().join("check.toml");
    fs::write(
        &config,
        "check_property_owners = true\nexecution_order = \"sequential\"\n",
    )
    .expect("write config");
    let output = cargo_bin_cmd!("sombra-check")
        .args(["check", "--format", "json", "--config"])
        .arg(&config)
        .arg(&path)
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let summary: Value = serde_json::from_slice(&output).expect("json summary");
    assert_eq!(summary["kinds"]["orphan_property_chain"], 1);
}

#[test]
fn bad_config_and_missing_store_exit_with_one() {
    let dir = TempDir::new().expect("tempdir");
    let config = dir.path().join("check.toml");
    fs::write(&config, "worker_threads = 0\n").expect("write config");
    let (_stores, path) = seeded_dir(&StoreBuilder::demo());
    cargo_bin_cmd!("sombra-check")
        .args(["check", "--config"])
        .arg(&config)
        .arg(&path)
        .assert()
        .code(1);

    cargo_bin_cmd!("sombra-check")
        .args(["check"])
        .arg(dir.path().join("nowhere"))
        .assert()
        .code(1);
}
