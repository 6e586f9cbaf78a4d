use std::collections::{HashMap, HashSet};
use std::env;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info};
use tar::{Archive, Builder, EntryType};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("unable to create archive '{path}' => already exists")]
    AlreadyExists { path: PathBuf },
    #[error("unable to create archive '{path}' => permission denied")]
    PermissionDenied { path: PathBuf },
    #[error("unable to create archive '{path}': {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to add '{source_path}' to archive '{path}' (archive may be incomplete): {source}")]
    Append {
        path: PathBuf,
        source_path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("'{first}' and '{second}' would both be stored as '{name}' in archive '{path}' (archive may be incomplete)")]
    Collision {
        path: PathBuf,
        name: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("unable to finish archive '{path}' (archive may be incomplete): {source}")]
    Finish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to read archive '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ArchiveError {
    /// Archive file left on disk by a failed run, if one may exist.
    pub fn partial_archive(&self) -> Option<&Path> {
        match self {
            ArchiveError::Append { path, .. }
            | ArchiveError::Collision { path, .. }
            | ArchiveError::Finish { path, .. } => Some(path),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MemberKind {
    File,
    Directory,
    Symlink,
    Other,
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemberKind::File => "file",
            MemberKind::Directory => "dir",
            MemberKind::Symlink => "symlink",
            MemberKind::Other => "other",
        };
        f.pad(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArchiveMember {
    pub name: String,
    pub size: u64,
    pub kind: MemberKind,
    /// Modification time in seconds since the epoch.
    pub mtime: u64,
}

impl fmt::Display for ArchiveMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mtime = match DateTime::from_timestamp(self.mtime as i64, 0) {
            Some(time) => time
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            None => self.mtime.to_string(),
        };
        write!(
            f,
            "{:<7} {:>12} {} {}",
            self.kind, self.size, mtime, self.name
        )
    }
}

#[derive(Clone, Debug)]
pub struct ArchiveResult {
    pub path: PathBuf,
    pub size: u64,
    pub members: Vec<ArchiveMember>,
}

pub struct Backup {}

/// What has gone into the archive so far.
struct Added {
    /// Identity of the archive file being written, never added to itself.
    archive: PathBuf,
    sources: HashSet<PathBuf>,
    /// Member name to the path it was taken from.
    names: HashMap<PathBuf, PathBuf>,
}

impl Backup {
    pub fn archive_file_name(timestamp: &str) -> String {
        format!("archive-{}.tar.gz", timestamp)
    }

    /// Writes every source into a new gzip compressed tarball at
    /// `archive_path`, then reads the member list back from it.
    pub fn create_archive<P: AsRef<Path>>(
        archive_path: &Path,
        sources: &[P],
    ) -> Result<ArchiveResult, ArchiveError> {
        let file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(archive_path)
        {
            Ok(file) => file,
            Err(why) => {
                let path = archive_path.to_path_buf();
                return Err(match why.kind() {
                    ErrorKind::AlreadyExists => ArchiveError::AlreadyExists { path },
                    ErrorKind::PermissionDenied => ArchiveError::PermissionDenied { path },
                    _ => ArchiveError::Create { path, source: why },
                });
            }
        };

        info!("creating archive: {}", archive_path.display());
        let mut tar = Builder::new(GzEncoder::new(file, Compression::default()));
        tar.follow_symlinks(false);

        let mut added = Added {
            archive: Backup::identity(archive_path).map_err(|err| ArchiveError::Create {
                path: archive_path.to_path_buf(),
                source: err,
            })?,
            sources: HashSet::new(),
            names: HashMap::new(),
        };
        for source in sources {
            Backup::append_source(&mut tar, archive_path, source.as_ref(), &mut added)?;
        }

        let finish = |err| ArchiveError::Finish {
            path: archive_path.to_path_buf(),
            source: err,
        };
        let file = tar.into_inner().map_err(finish)?.finish().map_err(finish)?;
        file.sync_all().map_err(finish)?;
        drop(file);

        let size = archive_path
            .metadata()
            .map_err(|err| ArchiveError::Read {
                path: archive_path.to_path_buf(),
                source: err,
            })?
            .len();
        let members = Backup::read_members(archive_path)?;
        info!("archived {} member(s)", members.len());

        Ok(ArchiveResult {
            path: archive_path.to_path_buf(),
            size,
            members,
        })
    }

    /// Reopens an archive read-only and lists its members in archive order.
    pub fn read_members(archive_path: &Path) -> Result<Vec<ArchiveMember>, ArchiveError> {
        let read_error = |err| ArchiveError::Read {
            path: archive_path.to_path_buf(),
            source: err,
        };

        let file = File::open(archive_path).map_err(read_error)?;
        let mut tar = Archive::new(GzDecoder::new(file));
        let mut members = Vec::new();
        for entry in tar.entries().map_err(read_error)? {
            let entry = entry.map_err(read_error)?;
            let header = entry.header();
            let kind = match header.entry_type() {
                EntryType::Regular | EntryType::Continuous => MemberKind::File,
                EntryType::Directory => MemberKind::Directory,
                EntryType::Symlink => MemberKind::Symlink,
                _ => MemberKind::Other,
            };
            members.push(ArchiveMember {
                name: entry.path().map_err(read_error)?.to_string_lossy().into_owned(),
                size: header.size().map_err(read_error)?,
                kind,
                mtime: header.mtime().map_err(read_error)?,
            });
        }

        Ok(members)
    }

    fn append_source<W: io::Write>(
        tar: &mut Builder<W>,
        archive_path: &Path,
        source: &Path,
        added: &mut Added,
    ) -> Result<(), ArchiveError> {
        let append_error = |path: &Path, err: io::Error| ArchiveError::Append {
            path: archive_path.to_path_buf(),
            source_path: path.to_path_buf(),
            source: err,
        };

        for entry in WalkDir::new(source)
            .follow_links(false)
            .follow_root_links(false)
            .sort_by_file_name()
        {
            let entry = entry.map_err(|err| append_error(source, err.into()))?;
            let path = entry.path();
            let name = Backup::member_name(path);
            if name.as_os_str().is_empty() {
                continue;
            }

            let identity = Backup::identity(path).map_err(|err| append_error(path, err))?;
            if identity == added.archive {
                debug!("skipping the archive itself: {}", path.display());
                continue;
            }
            if !added.sources.insert(identity.clone()) {
                continue;
            }
            if let Some(first) = added.names.get(&name) {
                return Err(ArchiveError::Collision {
                    path: archive_path.to_path_buf(),
                    name,
                    first: first.clone(),
                    second: path.to_path_buf(),
                });
            }

            debug!("adding {} as {}", path.display(), name.display());
            tar.append_path_with_name(path, &name)
                .map_err(|err| append_error(path, err))?;
            added.names.insert(name, path.to_path_buf());
        }

        Ok(())
    }

    /// Absolute path of `path` with its parent directories resolved. The last
    /// component is kept as is, so a symlink is not replaced by its target.
    fn identity(path: &Path) -> io::Result<PathBuf> {
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(file_name)) if parent.as_os_str().is_empty() => {
                Ok(env::current_dir()?.join(file_name))
            }
            (Some(parent), Some(file_name)) => Ok(fs::canonicalize(parent)?.join(file_name)),
            _ => fs::canonicalize(path),
        }
    }

    /// Name of a path inside the archive: the path without its root and
    /// without `.`/`..` components.
    pub fn member_name(path: &Path) -> PathBuf {
        path.components()
            .filter_map(|component| match component {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .collect()
    }
}
