//! Integration tests for the imagepipe binary.
//!
//! Each test points `--config` at a file inside a temp directory so caches
//! and logs never touch the real home directory.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn imagepipe(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_imagepipe"))
        .args(args)
        .current_dir(cwd)
        .env("RUST_LOG", "warn")
        .output()
        .expect("binary should run")
}

/// Writes a config whose cache and log directories live under `root`.
fn write_config(root: &Path) -> PathBuf {
    let path = root.join("config.ini");
    let content = format!(
        "[cache]\ndirectory = {}\nsmall_directory = {}\n\n[logging]\ndirectory = {}\n",
        root.join("cache").display(),
        root.join("cache-small").display(),
        root.join("logs").display(),
    );
    std::fs::write(&path, content).unwrap();
    path
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_config_init_then_show() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("nested").join("config.ini");
    let config = config.to_str().unwrap();

    let init = imagepipe(&["config", "init", "--config", config], dir.path());
    assert!(init.status.success());
    assert!(Path::new(config).exists());

    let show = imagepipe(&["config", "show", "--config", config], dir.path());
    assert!(show.status.success());
    let text = stdout(&show);
    assert!(text.contains("[pool]"));
    assert!(text.contains("[cache]"));
}

#[test]
fn test_config_init_keeps_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let before = std::fs::read_to_string(&config).unwrap();

    let init = imagepipe(&["config", "init", "--config", config.to_str().unwrap()], dir.path());
    assert!(init.status.success());
    assert!(stdout(&init).contains("already exists"));
    assert_eq!(std::fs::read_to_string(&config).unwrap(), before);
}

#[test]
fn test_invalid_config_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.ini");
    std::fs::write(&config, "[pool]\nmin_bucket_size = 0\n").unwrap();

    let show = imagepipe(&["config", "show", "--config", config.to_str().unwrap()], dir.path());
    assert_eq!(show.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&show.stderr).contains("Configuration error"));
}

#[test]
fn test_fetch_data_uri_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let out = dir.path().join("out.gif");

    let fetch = imagepipe(
        &[
            "fetch",
            "data:,GIF89a",
            "--output",
            out.to_str().unwrap(),
            "--stats",
            "--config",
            config.to_str().unwrap(),
        ],
        dir.path(),
    );
    assert!(fetch.status.success(), "{}", String::from_utf8_lossy(&fetch.stderr));
    assert_eq!(std::fs::read(&out).unwrap(), b"GIF89a");
    assert!(stdout(&fetch).contains("gif image"));
}

#[test]
fn test_fetch_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());
    let missing = dir.path().join("missing.png");

    let fetch = imagepipe(
        &[
            "fetch",
            missing.to_str().unwrap(),
            "--config",
            config.to_str().unwrap(),
        ],
        dir.path(),
    );
    assert_eq!(fetch.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&fetch.stderr).contains("Request failed"));
}

#[test]
fn test_cache_only_miss_reports_no_result() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path());

    let fetch = imagepipe(
        &[
            "fetch",
            "data:,never-cached",
            "--cache-only",
            "--config",
            config.to_str().unwrap(),
        ],
        dir.path(),
    );
    assert_eq!(fetch.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&fetch.stderr).contains("No image available"));
}
