use std::{
    collections::BTreeMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use thiserror::Error;

pub mod credential;
pub mod section;
pub mod smtp;

use credential::Credential;
use section::Section;
use smtp::{SmtpHeaders, SmtpSettings};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to read config: {0}")]
    Io(#[source] io::Error),
    #[error("invalid line {line}: '{content}'")]
    Syntax { line: usize, content: String },
    #[error("section [{0}] is defined more than once")]
    DuplicateSection(String),
    #[error("key '{key}' is defined more than once in section [{section}]")]
    DuplicateKey { section: String, key: String },
    #[error("missing section [{0}]")]
    MissingSection(String),
    #[error("section [destination] must contain exactly one directory, found {0}")]
    Destination(usize),
    #[error("missing key '{key}' in section [{section}]")]
    MissingKey { section: String, key: String },
    #[error("invalid value '{value}' for key '{key}' in section [{section}]")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Everything one backup job needs, read once from the config file.
#[derive(Clone, Debug)]
pub struct Configuration {
    pub name: String,
    pub sources: Vec<PathBuf>,
    pub destination: PathBuf,
    pub smtp_settings: BTreeMap<String, String>,
    pub smtp_auth: BTreeMap<String, String>,
    pub smtp_headers: BTreeMap<String, String>,
}

impl Configuration {
    pub const SECTION_SOURCE: &'static str = "source";
    pub const SECTION_DESTINATION: &'static str = "destination";
    pub const SECTION_SMTP_SETTINGS: &'static str = "smtp_settings";
    pub const SECTION_SMTP_AUTH: &'static str = "smtp_auth";
    pub const SECTION_SMTP_HEADERS: &'static str = "smtp_headers";

    pub fn load<P: AsRef<Path>>(filename: P) -> Result<Configuration, ConfigError> {
        let filename = filename.as_ref();
        let file = File::open(filename).map_err(|source| ConfigError::Read {
            path: filename.to_path_buf(),
            source,
        })?;

        let name = filename
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string_lossy().into_owned());

        Configuration::parse(name, BufReader::new(file))
    }

    pub fn parse<R: BufRead>(name: String, reader: R) -> Result<Configuration, ConfigError> {
        let sections = section::parse(reader)?;

        let sources = Self::section(&sections, Self::SECTION_SOURCE)?
            .lines()
            .iter()
            .map(|line| expand_home(line))
            .collect();

        let destinations = Self::section(&sections, Self::SECTION_DESTINATION)?.lines();
        if destinations.len() != 1 {
            return Err(ConfigError::Destination(destinations.len()));
        }
        let destination = expand_home(&destinations[0]);

        Ok(Configuration {
            name,
            sources,
            destination,
            smtp_settings: Self::key_values(&sections, Self::SECTION_SMTP_SETTINGS)?,
            smtp_auth: Self::key_values(&sections, Self::SECTION_SMTP_AUTH)?,
            smtp_headers: Self::key_values(&sections, Self::SECTION_SMTP_HEADERS)?,
        })
    }

    pub fn smtp_settings(&self) -> Result<SmtpSettings, ConfigError> {
        SmtpSettings::from_section(&self.smtp_settings)
    }

    pub fn smtp_credential(&self) -> Result<Credential, ConfigError> {
        Credential::from_section(&self.smtp_auth)
    }

    pub fn smtp_headers(&self) -> Result<SmtpHeaders, ConfigError> {
        SmtpHeaders::from_section(&self.smtp_headers)
    }

    fn section<'a>(sections: &'a [Section], name: &str) -> Result<&'a Section, ConfigError> {
        sections
            .iter()
            .find(|section| section.name == name)
            .ok_or_else(|| ConfigError::MissingSection(name.to_string()))
    }

    fn key_values(
        sections: &[Section],
        name: &str,
    ) -> Result<BTreeMap<String, String>, ConfigError> {
        Ok(Self::section(sections, name)?
            .entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone().unwrap_or_default()))
            .collect())
    }
}

pub(crate) fn required_value(
    section: &BTreeMap<String, String>,
    section_name: &str,
    key: &str,
) -> Result<String, ConfigError> {
    match section.get(key) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(ConfigError::MissingKey {
            section: section_name.to_string(),
            key: key.to_string(),
        }),
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(home_dir) = dirs::home_dir() {
        if path == "~" {
            return home_dir;
        }
        if let Some(rest) = path.strip_prefix("~/") {
            return home_dir.join(rest);
        }
    }
    PathBuf::from(path)
}
