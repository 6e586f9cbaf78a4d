use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::{error, info, warn};
use thiserror::Error;

use crate::backup::{ArchiveError, ArchiveResult, Backup};
use crate::configuration::Configuration;
use crate::formatter::Formatter;
use crate::helper;
use crate::mailer::{MailError, Mailer};
use crate::report::{self, BackupLog, BackupStatus, LogError};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("destination does not exist: {0}")]
    MissingDestination(PathBuf),
    #[error("none of the configured sources exist")]
    NoSources,
}

/// Why the archive stage produced no archive; recorded in the log.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// Errors that end a job before it completes.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("unable to prepare log directory '{path}': {source}")]
    LogDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Log(#[from] LogError),
}

#[derive(Clone, Debug)]
pub struct JobOptions {
    pub keep_log: bool,
    pub send_log: bool,
    pub show_log: bool,
    pub log_directory: PathBuf,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            keep_log: false,
            send_log: false,
            show_log: false,
            log_directory: PathBuf::from("."),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedSources {
    pub valid: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

impl ValidatedSources {
    /// Splits `sources` into the ones present on disk and the ones that are
    /// gone, both in their original order.
    pub fn partition(sources: &[PathBuf]) -> ValidatedSources {
        let (valid, removed): (Vec<PathBuf>, Vec<PathBuf>) = sources
            .iter()
            .cloned()
            .partition(|source| source.exists());
        ValidatedSources { valid, removed }
    }
}

#[derive(Debug)]
pub struct JobOutcome {
    pub status: BackupStatus,
    pub log_path: PathBuf,
    pub log_text: String,
    pub mail: Option<Result<(), MailError>>,
}

pub fn validate_destination(destination: &Path) -> Result<(), ValidationError> {
    if destination.is_dir() {
        Ok(())
    } else {
        Err(ValidationError::MissingDestination(destination.to_path_buf()))
    }
}

/// Runs one backup job: validate, archive, write the log, then mail, show
/// and clean up the log as requested by `options`.
pub fn run(configuration: &Configuration, options: &JobOptions) -> Result<JobOutcome, JobError> {
    let stamp = helper::timestamp(&Local::now());
    let archive_path = configuration
        .destination
        .join(Backup::archive_file_name(&stamp));
    let log_path = options.log_directory.join(BackupLog::file_name(&stamp));

    info!("config: {}", configuration.name);
    info!("source: {:?}", configuration.sources);
    info!("destination: {}", configuration.destination.display());
    info!(
        "SMTP server: {}:{}",
        configuration.smtp_settings.get("host").map_or("", String::as_str),
        configuration.smtp_settings.get("port").map_or("", String::as_str)
    );
    info!("e-mail: {:?}", configuration.smtp_headers);

    info!("sanity checking source and destination");
    if let Err(err) = validate_destination(&configuration.destination) {
        error!("{}", err);
        return Err(err.into());
    }

    let sources = ValidatedSources::partition(&configuration.sources);
    if !sources.removed.is_empty() {
        warn!("source does not exist: {:?}", sources.removed);
        warn!("source updated: {:?}", sources.valid);
    }

    let started = Local::now();
    let archive = run_archive(&archive_path, &sources);
    let completed = Local::now();

    let (status, members, error) = match archive {
        Ok(result) => {
            info!("backup status: {}", BackupStatus::Success);
            info!(
                "backup file: {} ({})",
                result.path.display(),
                Formatter::format_size(result.size, 2)
            );
            (BackupStatus::Success, result.members, None)
        }
        Err(err) => {
            error!("backup failed: {}", err);
            error!("backup status: {}", BackupStatus::Failed);
            (BackupStatus::Failed, Vec::new(), Some(err.to_string()))
        }
    };

    let log = BackupLog {
        status,
        sources: sources.valid,
        removed_sources: sources.removed,
        destination: configuration.destination.clone(),
        started,
        completed,
        archive_path,
        members,
        destination_listing: helper::list_directory_with_sizes(&configuration.destination),
        error,
    };
    helper::create_dir_idempotent(&options.log_directory).map_err(|source| {
        JobError::LogDirectory {
            path: options.log_directory.clone(),
            source,
        }
    })?;
    log.write_to(&log_path)?;
    let log_text = log.to_string();

    let mail = if options.send_log {
        info!("e-mail attachment: {}", log_path.display());
        let result = send_log(configuration, &log_path);
        match &result {
            Ok(_) => info!("e-mail status: SUCCESS"),
            Err(err) => {
                error!("e-mail status: FAILED");
                error!("{}", err);
            }
        }
        Some(result)
    } else {
        None
    };

    if options.show_log {
        match report::read_log(&log_path) {
            Ok(text) => println!("{}", text),
            Err(err) => error!("{}", err),
        }
    }

    if !options.keep_log {
        report::remove_log(&log_path);
    }

    Ok(JobOutcome {
        status,
        log_path,
        log_text,
        mail,
    })
}

fn run_archive(
    archive_path: &Path,
    sources: &ValidatedSources,
) -> Result<ArchiveResult, StageError> {
    if sources.valid.is_empty() {
        return Err(ValidationError::NoSources.into());
    }

    Backup::create_archive(archive_path, &sources.valid).map_err(|err| {
        if let Some(partial) = err.partial_archive() {
            warn!("incomplete archive left behind: {}", partial.display());
        }
        err.into()
    })
}

fn send_log(configuration: &Configuration, log_path: &Path) -> Result<(), MailError> {
    let settings = configuration.smtp_settings()?;
    let credential = configuration.smtp_credential()?;
    let headers = configuration.smtp_headers()?;

    let mut mailer = Mailer::connect(&settings)?;
    mailer.login(&credential)?;
    mailer.send_attachment(&headers, log_path, "")
}
