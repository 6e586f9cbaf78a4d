use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use log::{debug, info};
use thiserror::Error;

use crate::backup::ArchiveMember;
use crate::helper::{self, DirectoryEntry};

const RULE_WIDTH: usize = 45;

#[derive(Debug, Error)]
pub enum LogError {
    #[error("unable to write log file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to read log file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BackupStatus {
    Success,
    Failed,
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupStatus::Success => f.write_str("SUCCESS"),
            BackupStatus::Failed => f.write_str("FAILED"),
        }
    }
}

/// Report of one backup job, written to the log file.
#[derive(Clone, Debug)]
pub struct BackupLog {
    pub status: BackupStatus,
    pub sources: Vec<PathBuf>,
    pub removed_sources: Vec<PathBuf>,
    pub destination: PathBuf,
    pub started: DateTime<Local>,
    pub completed: DateTime<Local>,
    pub archive_path: PathBuf,
    pub members: Vec<ArchiveMember>,
    pub destination_listing: Vec<DirectoryEntry>,
    pub error: Option<String>,
}

impl BackupLog {
    pub fn file_name(timestamp: &str) -> String {
        format!("log_{}.txt", timestamp)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), LogError> {
        let write_error = |err| LogError::Write {
            path: path.to_path_buf(),
            source: err,
        };
        let mut file = File::create(path).map_err(write_error)?;
        file.write_all(self.to_string().as_bytes())
            .map_err(write_error)?;
        file.sync_all().map_err(write_error)?;
        debug!("log written to {}", path.display());

        Ok(())
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for BackupLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(RULE_WIDTH);

        writeln!(f)?;
        writeln!(f, "Backup Log")?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "Backup Status: {}", self.status)?;
        writeln!(f, "Source(s): {}", join_paths(&self.sources))?;
        if !self.removed_sources.is_empty() {
            writeln!(f, "Removed Source(s): {}", join_paths(&self.removed_sources))?;
        }
        writeln!(f, "Destination: {}", self.destination.display())?;
        writeln!(f, "Started: {}", helper::timestamp(&self.started))?;
        writeln!(f, "Completed: {}", helper::timestamp(&self.completed))?;
        writeln!(f, "Archive Name: {}", self.archive_path.display())?;
        if let Some(error) = &self.error {
            writeln!(f, "Error: {}", error)?;
        }

        writeln!(f)?;
        writeln!(f, "Archive Contents")?;
        writeln!(f, "{}", rule)?;
        for member in &self.members {
            writeln!(f, "{}", member)?;
        }

        writeln!(f)?;
        writeln!(f, "Destination Directory: {}", self.destination.display())?;
        writeln!(f, "{}", rule)?;
        for entry in &self.destination_listing {
            writeln!(f, "{}", entry)?;
        }

        Ok(())
    }
}

pub fn read_log(path: &Path) -> Result<String, LogError> {
    fs::read_to_string(path).map_err(|err| LogError::Read {
        path: path.to_path_buf(),
        source: err,
    })
}

/// Deletes the log file. A log that is already gone is not worth reporting.
pub fn remove_log(path: &Path) {
    if fs::remove_file(path).is_ok() {
        info!("removed: {}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::MemberKind;

    fn sample_log() -> BackupLog {
        let now = Local::now();
        BackupLog {
            status: BackupStatus::Success,
            sources: vec![PathBuf::from("/etc/hosts"), PathBuf::from("/srv/www")],
            removed_sources: Vec::new(),
            destination: PathBuf::from("/mnt/backup"),
            started: now,
            completed: now,
            archive_path: PathBuf::from("/mnt/backup/archive-Oct-19-26-14-03-07.tar.gz"),
            members: vec![ArchiveMember {
                name: String::from("etc/hosts"),
                size: 220,
                kind: MemberKind::File,
                mtime: 1_700_000_000,
            }],
            destination_listing: vec![DirectoryEntry {
                file_name: String::from("archive-Oct-19-26-14-03-07.tar.gz"),
                size: 1_048_576,
            }],
            error: None,
        }
    }

    #[test]
    fn sections_appear_once_and_in_order() {
        let text = sample_log().to_string();

        let header = text.find("Backup Log").unwrap();
        let contents = text.find("Archive Contents").unwrap();
        let listing = text.find("Destination Directory").unwrap();
        assert!(header < contents && contents < listing);
        assert_eq!(text.matches("Archive Contents").count(), 1);
        assert_eq!(text.matches("Destination Directory").count(), 1);

        assert!(text.contains("Backup Status: SUCCESS\n"));
        assert!(text.contains("Source(s): /etc/hosts, /srv/www\n"));
        assert!(text.contains("archive-Oct-19-26-14-03-07.tar.gz: 1.0 MB\n"));
        assert!(!text.contains("Removed Source(s)"));
        assert!(!text.contains("Error:"));
    }

    #[test]
    fn members_follow_the_contents_header() {
        let text = sample_log().to_string();
        let lines: Vec<&str> = text.lines().collect();
        let index = lines
            .iter()
            .position(|line| *line == "Archive Contents")
            .unwrap();
        assert!(lines[index + 2].ends_with("etc/hosts"));
    }

    #[test]
    fn empty_archive_renders_an_empty_contents_section() {
        let mut log = sample_log();
        log.members.clear();
        let text = log.to_string();

        let contents = text.find("Archive Contents").unwrap();
        let listing = text.find("Destination Directory").unwrap();
        let between = &text[contents..listing];
        assert_eq!(between.lines().count(), 3);
    }

    #[test]
    fn failures_carry_the_error_and_removed_sources() {
        let mut log = sample_log();
        log.status = BackupStatus::Failed;
        log.removed_sources = vec![PathBuf::from("/missing/file2")];
        log.error = Some(String::from("disk full"));
        let text = log.to_string();

        assert!(text.contains("Backup Status: FAILED\n"));
        assert!(text.contains("Removed Source(s): /missing/file2\n"));
        assert!(text.contains("Error: disk full\n"));
    }

    #[test]
    fn log_is_written_read_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BackupLog::file_name("Oct-19-26-14-03-07"));
        let log = sample_log();

        log.write_to(&path).unwrap();
        assert_eq!(read_log(&path).unwrap(), log.to_string());

        remove_log(&path);
        assert!(!path.exists());
        // already gone, nothing to report
        remove_log(&path);
    }

    #[test]
    fn writing_into_a_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("log.txt");
        assert!(matches!(
            sample_log().write_to(&path),
            Err(LogError::Write { .. })
        ));
    }
}
