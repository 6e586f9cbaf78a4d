use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{info, warn};

use crate::formatter::Formatter;

/// Timestamp used in archive and log file names, e.g. `Oct-19-26-14-03-07`.
pub const TIMESTAMP_FORMAT: &str = "%b-%d-%y-%H-%M-%S";

pub fn timestamp(time: &DateTime<Local>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Creates `directory` and its parents. An already existing directory is
/// not an error.
pub fn create_dir_idempotent<P: AsRef<Path>>(directory: P) -> io::Result<()> {
    let directory = directory.as_ref();
    if directory.is_dir() {
        info!("directory already exists: {}", directory.display());
        return Ok(());
    }
    fs::create_dir_all(directory)
}

#[derive(Clone, Debug, PartialEq)]
pub struct DirectoryEntry {
    pub file_name: String,
    pub size: u64,
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.file_name,
            Formatter::format_megabytes(self.size)
        )
    }
}

/// Regular files directly inside `directory`, sorted by name. Anything
/// unreadable is skipped, so a missing directory gives an empty listing.
pub fn list_directory_with_sizes<P: AsRef<Path>>(directory: P) -> Vec<DirectoryEntry> {
    let directory = directory.as_ref();
    let read_dir = match fs::read_dir(directory) {
        Ok(read_dir) => read_dir,
        Err(err) => {
            warn!("unable to list directory {}: {}", directory.display(), err);
            return Vec::new();
        }
    };

    let mut entries: Vec<DirectoryEntry> = read_dir
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let metadata = fs::metadata(entry.path()).ok()?;
            if !metadata.is_file() {
                return None;
            }
            Some(DirectoryEntry {
                file_name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
            })
        })
        .collect();
    entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    entries
}
