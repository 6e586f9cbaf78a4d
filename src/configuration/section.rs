use std::io::BufRead;

use regex::Regex;

use super::ConfigError;

/// A named `[section]` of a configuration file, entries kept in file order.
#[derive(Clone, Debug, PartialEq)]
pub struct Section {
    pub name: String,
    pub entries: Vec<(String, Option<String>)>,
}

impl Section {
    pub fn new<S: Into<String>>(name: S) -> Section {
        Section {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Every entry as it was written, used by sections that only list paths.
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(key, value)| match value {
                Some(value) => format!("{}={}", key, value),
                None => key.clone(),
            })
            .collect()
    }

    fn push(&mut self, key: String, value: Option<String>) -> Result<(), ConfigError> {
        if self.entries.iter().any(|(k, _)| *k == key) {
            return Err(ConfigError::DuplicateKey {
                section: self.name.clone(),
                key,
            });
        }
        self.entries.push((key, value));
        Ok(())
    }
}

pub fn parse<R: BufRead>(reader: R) -> Result<Vec<Section>, ConfigError> {
    lazy_static! {
        static ref REGEX_SECTION: Regex = Regex::new(r"^\[\s*([^\]]+?)\s*\]$").unwrap();
    }

    let mut sections: Vec<Section> = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(ConfigError::Io)?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(captures) = REGEX_SECTION.captures(line) {
            let name = captures[1].to_string();
            if sections.iter().any(|section| section.name == name) {
                return Err(ConfigError::DuplicateSection(name));
            }
            sections.push(Section::new(name));
            continue;
        }

        let section = match sections.last_mut() {
            Some(section) => section,
            None => {
                return Err(ConfigError::Syntax {
                    line: index + 1,
                    content: line.to_string(),
                })
            }
        };
        match line.find('=') {
            Some(position_of_equal_sign) => {
                let key = line[..position_of_equal_sign].trim().to_string();
                let value = line[(position_of_equal_sign + 1)..].trim().to_string();
                if key.is_empty() {
                    return Err(ConfigError::Syntax {
                        line: index + 1,
                        content: line.to_string(),
                    });
                }
                section.push(key, Some(value))?;
            }
            None => section.push(line.to_string(), None)?,
        }
    }

    Ok(sections)
}
