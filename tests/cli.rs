use std::fs;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Output;

use assert_cmd::Command;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Workspace {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data").join("notes.txt"), b"remember").unwrap();
        fs::create_dir(dir.path().join("dest")).unwrap();
        fs::create_dir(dir.path().join("run")).unwrap();
        Workspace { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_config(&self, sources: &[PathBuf], destination: &Path) -> PathBuf {
        // a closed local port, so that mailing fails fast
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let sources: Vec<String> = sources
            .iter()
            .map(|source| source.display().to_string())
            .collect();
        let config = format!(
            "[source]\n{}\n\n[destination]\n{}\n\n\
             [smtp_settings]\nhost=127.0.0.1\nport={}\ntimeout=2s\n\n\
             [smtp_auth]\nusername=backup\npassword=secret\n\n\
             [smtp_headers]\nfrom=backup@example.org\nto=ops@example.org\nsubject=Backup\n",
            sources.join("\n"),
            destination.display(),
            port
        );
        let path = self.path("job.ini");
        fs::write(&path, config).unwrap();
        path
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::cargo_bin("backit")
            .unwrap()
            .current_dir(self.path("run"))
            .args(args)
            .output()
            .unwrap()
    }

    fn files(&self, name: &str) -> Vec<String> {
        let mut files: Vec<String> = fs::read_dir(self.path(name))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        files
    }
}

#[test]
fn no_arguments_prints_usage_and_fails() {
    let workspace = Workspace::new();
    let output = workspace.run(&[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--keeplog"));
}

#[test]
fn help_flag_prints_usage_and_fails() {
    let workspace = Workspace::new();
    for flag in ["-h", "--help"] {
        let output = workspace.run(&[flag]);
        assert_eq!(output.status.code(), Some(1));
        assert!(String::from_utf8_lossy(&output.stderr).contains("--sendlog"));
    }
}

#[test]
fn unreadable_config_fails() {
    let workspace = Workspace::new();
    let config = workspace.path("absent.ini");
    let output = workspace.run(&[config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    assert!(workspace.files("run").is_empty());
}

#[test]
fn missing_destination_exits_before_any_side_effect() {
    let workspace = Workspace::new();
    let config = workspace.write_config(&[workspace.path("data")], &workspace.path("nowhere"));
    let output = workspace.run(&[config.to_str().unwrap(), "--keeplog"]);

    assert_eq!(output.status.code(), Some(1));
    assert!(workspace.files("run").is_empty());
    assert!(workspace.files("dest").is_empty());
    assert!(!workspace.path("nowhere").exists());
}

#[test]
fn backup_writes_archive_and_kept_log() {
    let workspace = Workspace::new();
    let config = workspace.write_config(
        &[workspace.path("data"), workspace.path("missing.txt")],
        &workspace.path("dest"),
    );
    let output = workspace.run(&[config.to_str().unwrap(), "--keeplog"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Completed in: "));

    let archives = workspace.files("dest");
    assert_eq!(archives.len(), 1);
    assert!(archives[0].starts_with("archive-") && archives[0].ends_with(".tar.gz"));

    let logs = workspace.files("run");
    assert_eq!(logs.len(), 1);
    assert!(logs[0].starts_with("log_") && logs[0].ends_with(".txt"));
    let log = fs::read_to_string(workspace.path("run").join(&logs[0])).unwrap();
    assert!(log.contains("Backup Status: SUCCESS"));
    assert!(log.contains("missing.txt"));
    assert!(log.contains("data/notes.txt"));
    assert!(log.contains(&format!("{}: ", archives[0])));
}

#[test]
fn log_is_removed_by_default() {
    let workspace = Workspace::new();
    let config = workspace.write_config(&[workspace.path("data")], &workspace.path("dest"));
    let output = workspace.run(&[config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(0));
    assert!(workspace.files("run").is_empty());
    assert_eq!(workspace.files("dest").len(), 1);
}

#[test]
fn failed_backup_still_exits_cleanly() {
    let workspace = Workspace::new();
    let config = workspace.write_config(&[workspace.path("gone")], &workspace.path("dest"));
    let output = workspace.run(&[config.to_str().unwrap(), "--showlog"]);

    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("Backup Status: FAILED"));
    assert!(workspace.files("dest").is_empty());
}

#[test]
fn mail_failure_does_not_touch_the_log() {
    let workspace = Workspace::new();
    let config = workspace.write_config(&[workspace.path("data")], &workspace.path("dest"));
    let output = workspace.run(&[
        config.to_str().unwrap(),
        "--sendlog",
        "--keeplog",
        "--showlog",
    ]);

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Backup Status: SUCCESS"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("e-mail status: FAILED"));

    let logs = workspace.files("run");
    assert_eq!(logs.len(), 1);
    let log = fs::read_to_string(workspace.path("run").join(&logs[0])).unwrap();
    assert!(log.contains("Backup Status: SUCCESS"));
}

#[test]
fn logdir_is_created_when_missing() {
    let workspace = Workspace::new();
    let config = workspace.write_config(&[workspace.path("data")], &workspace.path("dest"));
    let logdir = workspace.path("logs");
    let output = workspace.run(&[
        config.to_str().unwrap(),
        "--keeplog",
        "--logdir",
        logdir.to_str().unwrap(),
    ]);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(workspace.files("logs").len(), 1);
    assert!(workspace.files("run").is_empty());
}
