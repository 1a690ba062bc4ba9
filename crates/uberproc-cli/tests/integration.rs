#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn uberproc(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("uberproc").unwrap();
    cmd.current_dir(dir.path())
        .env("UBERPROC_CONFIG", dir.path().join("no-settings.yaml"))
        .env("UBERPROC_BIN", dir.path().join("bin"))
        .env_remove("RUST_LOG");
    cmd
}

fn write_par(dir: &TempDir, text: &str) -> PathBuf {
    let path = dir.path().join("run.par");
    std::fs::write(&path, text).unwrap();
    path
}

fn touch(dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, name).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[test]
fn overwrite_and_use_existing_conflict() {
    let dir = TempDir::new().unwrap();
    touch(&dir, "A2010001000000.L2_LAC");
    let par = write_par(&dir, "[main]\nifile=A2010001000000.L2_LAC\n[l2bin]\n");
    uberproc(&dir)
        .arg(&par)
        .args(["--overwrite", "--use_existing"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("conflicting options"));
}

#[test]
fn unknown_section_is_rejected() {
    let dir = TempDir::new().unwrap();
    let par = write_par(&dir, "[main]\nifile=A2010001000000.L2_LAC\n[l4gen]\n");
    uberproc(&dir)
        .arg(&par)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown target type 'l4gen'"));
}

#[test]
fn ofile_is_reserved() {
    let dir = TempDir::new().unwrap();
    let par = write_par(
        &dir,
        "[main]\nifile=A2010001000000.L2_LAC\n[l2bin]\nofile=mine.L3b\n",
    );
    uberproc(&dir)
        .arg(&par)
        .assert()
        .failure()
        .stderr(predicate::str::contains("'ofile' may not be set"));
}

#[test]
fn missing_parameter_file_fails() {
    let dir = TempDir::new().unwrap();
    uberproc(&dir)
        .arg("absent.par")
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("error:"));
}

#[test]
fn missing_input_fails_before_running() {
    let dir = TempDir::new().unwrap();
    let par = write_par(&dir, "[main]\nifile=A2010001000000.L2_LAC\n[l2bin]\n");
    uberproc(&dir)
        .arg(&par)
        .assert()
        .failure()
        .stderr(predicate::str::contains("input file not found"));
}

// ---------------------------------------------------------------------------
// Full runs against stand-in programs
// ---------------------------------------------------------------------------

#[cfg(unix)]
mod runs {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// A stand-in that writes the file named by `ofile=` (directly or inside
    /// a `par=` file) and exits with `status`.
    fn fake_program(dir: &TempDir, name: &str, status: i32) {
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let script = format!(
            r#"#!/bin/sh
out=""
for arg in "$@"; do
  case "$arg" in
    ofile=*) out="${{arg#ofile=}}" ;;
    par=*) out=$(sed -n 's/^ofile=//p' "${{arg#par=}}") ;;
  esac
done
if [ -n "$out" ]; then echo "{name}" > "$out"; fi
exit {status}
"#
        );
        let path = bin.join(name);
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn modis_programs(dir: &TempDir, l1b_status: i32) {
        fake_program(dir, "modis_L0_to_L1A", 0);
        fake_program(dir, "modis_GEO", 0);
        fake_program(dir, "modis_L1B", l1b_status);
    }

    fn level1b_par(dir: &TempDir) -> PathBuf {
        touch(dir, "A2010001003500.L0_LAC");
        write_par(
            dir,
            "[main]\nifile=A2010001003500.L0_LAC\nodir=out\n[level 1b]\n",
        )
    }

    fn out(dir: &TempDir, name: &str) -> PathBuf {
        dir.path().join("out").join(name)
    }

    #[test]
    fn level0_to_level1b() {
        let dir = TempDir::new().unwrap();
        modis_programs(&dir, 0);
        let par = level1b_par(&dir);

        uberproc(&dir)
            .arg(&par)
            .assert()
            .success()
            .stdout(predicate::str::contains("A2010001003500.L1B_LAC"))
            .stdout(predicate::str::contains("3 program run(s), 2 intermediate file(s) removed"));

        assert!(out(&dir, "A2010001003500.L1B_LAC").is_file());
        assert!(!out(&dir, "A2010001003500.L1A_LAC").exists());
        assert!(!out(&dir, "A2010001003500.GEO").exists());
    }

    #[test]
    fn failing_program_exits_nonzero() {
        let dir = TempDir::new().unwrap();
        modis_programs(&dir, 3);
        let par = level1b_par(&dir);

        uberproc(&dir)
            .arg(&par)
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("modis_L1B exited with status 3"));
        assert!(!out(&dir, "A2010001003500.L1A_LAC").exists());
    }

    #[test]
    fn keepfiles_then_use_existing_reruns_nothing() {
        let dir = TempDir::new().unwrap();
        modis_programs(&dir, 0);
        let par = level1b_par(&dir);
        uberproc(&dir).arg(&par).arg("--keepfiles").assert().success();
        assert!(out(&dir, "A2010001003500.GEO").is_file());

        // Any program run now would fail.
        for program in ["modis_L0_to_L1A", "modis_GEO", "modis_L1B"] {
            fake_program(&dir, program, 9);
        }
        uberproc(&dir)
            .arg(&par)
            .args(["--keepfiles", "--use_existing"])
            .assert()
            .success()
            .stdout(predicate::str::contains("0 program run(s)"));
    }

    #[test]
    fn use_existing_after_cleanup_reruns_nothing() {
        let dir = TempDir::new().unwrap();
        modis_programs(&dir, 0);
        let par = level1b_par(&dir);
        uberproc(&dir).arg(&par).assert().success();
        assert!(!out(&dir, "A2010001003500.L1A_LAC").exists());

        for program in ["modis_L0_to_L1A", "modis_GEO", "modis_L1B"] {
            fake_program(&dir, program, 9);
        }
        uberproc(&dir)
            .arg(&par)
            .arg("--use_existing")
            .assert()
            .success()
            .stdout(predicate::str::contains("0 program run(s), 0 intermediate file(s) removed"));
    }

    #[test]
    fn existing_output_without_flags_fails() {
        let dir = TempDir::new().unwrap();
        modis_programs(&dir, 0);
        let par = level1b_par(&dir);
        std::fs::create_dir_all(dir.path().join("out")).unwrap();
        std::fs::write(out(&dir, "A2010001003500.L1A_LAC"), "old").unwrap();

        uberproc(&dir)
            .arg(&par)
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));
        assert!(!out(&dir, "A2010001003500.GEO").exists());
    }

    #[test]
    fn l2bin_batch_with_tar_archive() {
        let dir = TempDir::new().unwrap();
        fake_program(&dir, "l2bin", 0);
        for name in [
            "A2010001000000.L2_LAC",
            "A2010001000500.L2_LAC",
            "A2010001001000.L2_LAC",
        ] {
            touch(&dir, name);
        }
        let par = write_par(
            &dir,
            "[main]\nifile=A2010001000000.L2_LAC,A2010001000500.L2_LAC A2010001001000.L2_LAC\nodir=out\n[l2bin]\nresolve=9\n",
        );

        uberproc(&dir)
            .arg(&par)
            .arg("--tar=products.tar.gz")
            .assert()
            .success()
            .stdout(predicate::str::contains("1 program run(s)"));
        assert!(out(&dir, "A20100012010001.L3b").is_file());
        assert!(dir.path().join("products.tar.gz").is_file());
    }

    #[test]
    fn debug_writes_log_in_work_dir() {
        let dir = TempDir::new().unwrap();
        modis_programs(&dir, 0);
        let par = level1b_par(&dir);
        uberproc(&dir).arg(&par).arg("--debug").assert().success();

        let work_dir = dir.path().join("out/.uberproc");
        let logs: Vec<_> = std::fs::read_dir(&work_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("uberproc_") && n.ends_with(".log"))
            .collect();
        assert_eq!(logs.len(), 1);
        let text = std::fs::read_to_string(work_dir.join(&logs[0])).unwrap();
        assert!(text.contains("modis_L1B"));
    }

    #[test]
    fn program_not_found_is_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("bin")).unwrap();
        let par = level1b_par(&dir);
        uberproc(&dir)
            .arg(&par)
            .env("PATH", dir.path().join("bin"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("program not found: modis_L0_to_L1A"));
    }
}
