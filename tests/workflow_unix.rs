//! End-to-end workflows driven through a portable `cp`/`sh` copy command.
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use assert_fs::prelude::*;
use junction_move::copy::CopyTool;
use junction_move::fs_ops::{available_space, link};
use junction_move::progress::{ChannelReporter, NullReporter};
use junction_move::state::{self, markers, MigrationState};
use junction_move::workflow::RollbackStatus;
use junction_move::{migrate, repair, restore, CancelToken, WorkflowSettings};

fn cp_settings() -> WorkflowSettings {
    WorkflowSettings {
        copy_tool: CopyTool::parse("cp -a {source}/. {target}").unwrap(),
        sample_interval: Duration::from_millis(100),
        ..WorkflowSettings::default()
    }
}

fn seed(dir: &Path) {
    fs::create_dir_all(dir.join("sub/deeper")).unwrap();
    fs::write(dir.join("a.txt"), b"alpha").unwrap();
    fs::write(dir.join("sub/b.bin"), vec![7u8; 64 * 1024]).unwrap();
    fs::write(dir.join("sub/deeper/c.txt"), b"gamma").unwrap();
}

fn no_markers(dir: &Path) -> bool {
    fs::read_dir(dir)
        .unwrap()
        .flatten()
        .all(|e| !markers::is_marker_name(&e.file_name()))
}

#[test]
fn migrate_then_restore_round_trip() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let src = tmp.child("library");
    src.create_dir_all().unwrap();
    seed(src.path());
    let tgt = tmp.child("bigdisk/library");
    let settings = cp_settings();

    let (rep, prx, lrx) = ChannelReporter::new();
    let out = migrate(src.path(), tgt.path(), &settings, &CancelToken::new(), &rep);
    drop(rep);
    assert!(out.success, "migrate failed: {:?}", out.error);
    assert_eq!(out.exit_code(), 0);
    assert!(link::points_to(src.path(), tgt.path()));
    assert_eq!(fs::read(src.path().join("sub/deeper/c.txt")).unwrap(), b"gamma");
    assert!(link::find_backups(src.path()).is_empty());
    assert!(!markers::has_marker(tgt.path(), markers::MIGRATE_LOCK));
    assert_eq!(state::detect(src.path(), tgt.path()), MigrationState::Migrated);

    let percents: Vec<f64> = prx.iter().map(|u| u.percent).collect();
    assert!(percents.windows(2).all(|w| w[0] <= w[1]), "{percents:?}");
    assert_eq!(percents.last().copied(), Some(100.0));
    let logs: Vec<String> = lrx.iter().collect();
    assert!(logs.iter().any(|l| l == "[1/6] Validating paths"));
    assert!(logs.iter().any(|l| l == "[6/6] Cleaning up backup"));

    let out = restore(src.path(), tgt.path(), &settings, &CancelToken::new(), &NullReporter);
    assert!(out.success, "restore failed: {:?}", out.error);
    assert!(!link::is_link(src.path()));
    assert_eq!(fs::read(src.path().join("a.txt")).unwrap(), b"alpha");
    assert_eq!(fs::read(src.path().join("sub/b.bin")).unwrap().len(), 64 * 1024);
    assert!(!tgt.path().exists());
    assert!(no_markers(src.path()));
    assert_eq!(state::detect(src.path(), tgt.path()), MigrationState::Pending);
}

#[test]
fn restore_can_keep_target() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let src = tmp.child("proj");
    src.create_dir_all().unwrap();
    seed(src.path());
    let tgt = tmp.child("elsewhere/proj");
    let mut settings = cp_settings();

    assert!(migrate(src.path(), tgt.path(), &settings, &CancelToken::new(), &NullReporter).success);
    settings.keep_target_on_restore = true;
    let out = restore(src.path(), tgt.path(), &settings, &CancelToken::new(), &NullReporter);
    assert!(out.success, "{:?}", out.error);
    assert!(tgt.path().join("a.txt").exists());
    assert!(no_markers(tgt.path()));
    assert!(no_markers(src.path()));
}

#[test]
fn non_empty_target_with_other_name_is_adjusted() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let src = tmp.child("photos");
    src.create_dir_all().unwrap();
    seed(src.path());
    let drive = tmp.child("drive");
    drive.child("unrelated.txt").write_str("x").unwrap();

    let out = migrate(src.path(), drive.path(), &cp_settings(), &CancelToken::new(), &NullReporter);
    assert!(out.success, "{:?}", out.error);
    let expected = drive.path().join("photos");
    assert_eq!(out.final_target.as_deref(), Some(expected.as_path()));
    assert!(link::points_to(src.path(), &expected));
    assert!(drive.child("unrelated.txt").path().exists());
}

#[test]
fn interrupted_migration_is_resumed() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let src = tmp.child("music");
    src.create_dir_all().unwrap();
    seed(src.path());
    let tgt = tmp.child("nas/music");
    tgt.create_dir_all().unwrap();
    tgt.child("a.txt").write_str("partial").unwrap();
    markers::create_migrate_lock(tgt.path(), src.path()).unwrap();

    let out = migrate(src.path(), tgt.path(), &cp_settings(), &CancelToken::new(), &NullReporter);
    assert!(out.success, "{:?}", out.error);
    assert!(link::is_link(src.path()));
    assert_eq!(fs::read(tgt.path().join("a.txt")).unwrap(), b"alpha");
}

#[test]
fn target_inside_source_is_rejected() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let src = tmp.child("data");
    src.create_dir_all().unwrap();
    seed(src.path());

    let out = migrate(
        src.path(),
        &src.path().join("nested"),
        &cp_settings(),
        &CancelToken::new(),
        &NullReporter,
    );
    assert!(!out.success);
    assert_eq!(out.exit_code(), 2);
    assert!(!link::is_link(src.path()));
    assert!(src.path().join("a.txt").exists());
}

#[test]
fn shortfall_stops_before_copy() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let src = tmp.child("archive");
    src.create_dir_all().unwrap();
    seed(src.path());
    // sparse: reports more bytes than the volume has free without using them
    let free = available_space(tmp.path()).unwrap();
    let huge = fs::File::create(src.path().join("disk.img")).unwrap();
    huge.set_len(free.saturating_add(1 << 30)).unwrap();
    drop(huge);
    let tgt = tmp.child("cold/archive");
    let settings = WorkflowSettings {
        copy_tool: CopyTool::parse("sh -c 'touch {target}/copy_ran; exit 9; : {source}'").unwrap(),
        ..cp_settings()
    };

    let out = migrate(src.path(), tgt.path(), &settings, &CancelToken::new(), &NullReporter);
    assert!(!out.success);
    assert_eq!(out.exit_code(), 3, "{:?}", out.error);
    assert!(!tgt.child("copy_ran").path().exists());
    assert!(!tgt.child("a.txt").path().exists());
    assert!(!markers::has_marker(tgt.path(), markers::MIGRATE_LOCK));
    assert!(link::find_backups(src.path()).is_empty());
    assert!(!link::is_link(src.path()));
    assert!(src.path().join("a.txt").exists());
}

#[test]
fn failing_copy_rolls_back() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let src = tmp.child("docs");
    src.create_dir_all().unwrap();
    seed(src.path());
    let tgt = tmp.child("out/docs");
    let settings = WorkflowSettings {
        copy_tool: CopyTool::parse("sh -c 'exit 3; : {source} {target}'").unwrap(),
        ..cp_settings()
    };

    let out = migrate(src.path(), tgt.path(), &settings, &CancelToken::new(), &NullReporter);
    assert!(!out.success);
    assert_eq!(out.exit_code(), 6);
    assert_eq!(out.rollback, RollbackStatus::Succeeded);
    assert!(!link::is_link(src.path()));
    assert!(src.path().join("sub/b.bin").exists());
    assert!(!markers::has_marker(tgt.path(), markers::MIGRATE_LOCK));
}

#[test]
fn cancellation_kills_copy_and_keeps_source() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let src = tmp.child("vm");
    src.create_dir_all().unwrap();
    seed(src.path());
    let tgt = tmp.child("fast/vm");
    let settings = WorkflowSettings {
        copy_tool: CopyTool::parse("sh -c 'sleep 30 & sleep 30; wait; : {source} {target}'").unwrap(),
        ..cp_settings()
    };
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(700));
        trigger.cancel();
    });

    let started = Instant::now();
    let out = migrate(src.path(), tgt.path(), &settings, &cancel, &NullReporter);
    canceller.join().unwrap();

    assert!(out.cancelled);
    assert_eq!(out.exit_code(), 130);
    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(!link::is_link(src.path()));
    assert!(src.path().join("a.txt").exists());
    assert!(!markers::has_marker(tgt.path(), markers::MIGRATE_LOCK));
}

#[test]
fn repair_fixes_dangling_link() {
    let tmp = assert_fs::TempDir::new().unwrap();
    let gone = tmp.child("old_drive/games");
    let tgt = tmp.child("new_drive/games");
    tgt.create_dir_all().unwrap();
    tgt.child("save.dat").write_str("progress").unwrap();
    let src = tmp.child("games");
    link::create_link(src.path(), gone.path()).unwrap();
    assert_eq!(state::detect(src.path(), tgt.path()), MigrationState::Inconsistent);

    let out = repair(src.path(), tgt.path(), &cp_settings(), &NullReporter);
    assert!(out.success, "{:?}", out.error);
    assert!(link::points_to(src.path(), tgt.path()));
    assert_eq!(fs::read_to_string(src.path().join("save.dat")).unwrap(), "progress");
    assert_eq!(state::detect(src.path(), tgt.path()), MigrationState::Migrated);
}
