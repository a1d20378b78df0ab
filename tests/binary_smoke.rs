//! Binary smoke tests. Every run points JUNCTION_MOVE_CONFIG at a temp file so no user state is touched.

use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use tempfile::tempdir;

fn bin(config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("junction_move"));
    cmd.env("JUNCTION_MOVE_CONFIG", config);
    cmd
}

fn write_config(dir: &Path) -> std::path::PathBuf {
    let p = dir.join("config.xml");
    fs::write(&p, "<config><log_level>quiet</log_level></config>").unwrap();
    p
}

#[test]
fn print_config_names_explicit_path() {
    let td = tempdir().unwrap();
    let cfg = td.path().join("custom.xml");
    let out = bin(&cfg).arg("--print-config").output().expect("spawn binary");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("custom.xml"), "{stdout}");
    assert!(!cfg.exists(), "--print-config must not create files");
}

#[test]
fn scan_json_reports_counts() {
    let td = tempdir().unwrap();
    let cfg = write_config(td.path());
    let data = td.path().join("data");
    fs::create_dir_all(data.join("x")).unwrap();
    fs::write(data.join("one"), b"12345").unwrap();
    fs::write(data.join("x/two"), b"123").unwrap();

    let out = bin(&cfg).args(["--json", "scan"]).arg(&data).output().unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["total_files"], 2);
    assert_eq!(v["total_bytes"], 8);
}

#[test]
fn status_of_plain_directory_is_pending() {
    let td = tempdir().unwrap();
    let cfg = write_config(td.path());
    let src = td.path().join("src");
    fs::create_dir(&src).unwrap();

    let out = bin(&cfg)
        .arg("status")
        .arg(&src)
        .arg(td.path().join("tgt"))
        .output()
        .unwrap();
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("state: pending"));
}

#[test]
fn restore_of_plain_directory_exits_with_validation_code() {
    let td = tempdir().unwrap();
    let cfg = write_config(td.path());
    let src = td.path().join("src");
    let tgt = td.path().join("tgt");
    fs::create_dir(&src).unwrap();
    fs::create_dir(&tgt).unwrap();

    bin(&cfg).arg("restore").arg(&src).arg(&tgt).assert().code(2);
    assert!(src.is_dir());
}

#[test]
fn invalid_threads_fail_before_any_work() {
    let td = tempdir().unwrap();
    let cfg = write_config(td.path());
    bin(&cfg)
        .args(["--threads", "0", "scan"])
        .arg(td.path())
        .assert()
        .failure();
}
