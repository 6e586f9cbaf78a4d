use std::collections::BTreeMap;
use std::time::Duration;

use super::{required_value, ConfigError};

#[derive(Clone, Debug, PartialEq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl SmtpSettings {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn from_section(section: &BTreeMap<String, String>) -> Result<SmtpSettings, ConfigError> {
        let host = required_value(section, "smtp_settings", "host")?;
        let port = required_value(section, "smtp_settings", "port")?;
        let port = match port.parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                return Err(ConfigError::InvalidValue {
                    section: String::from("smtp_settings"),
                    key: String::from("port"),
                    value: port,
                })
            }
        };
        let timeout = match section.get("timeout") {
            Some(value) => match parse_duration0::parse(value.as_str()) {
                Ok(duration) => duration,
                Err(_) => {
                    return Err(ConfigError::InvalidValue {
                        section: String::from("smtp_settings"),
                        key: String::from("timeout"),
                        value: value.clone(),
                    })
                }
            },
            None => Self::DEFAULT_TIMEOUT,
        };

        Ok(SmtpSettings {
            host,
            port,
            timeout,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SmtpHeaders {
    pub from: String,
    /// One or more recipients, separated by commas.
    pub to: String,
    pub subject: String,
}

impl SmtpHeaders {
    pub fn from_section(section: &BTreeMap<String, String>) -> Result<SmtpHeaders, ConfigError> {
        Ok(SmtpHeaders {
            from: required_value(section, "smtp_headers", "from")?,
            to: required_value(section, "smtp_headers", "to")?,
            subject: required_value(section, "smtp_headers", "subject")?,
        })
    }

    pub fn recipients(&self) -> Vec<&str> {
        self.to
            .split(',')
            .map(str::trim)
            .filter(|recipient| !recipient.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn settings_default_the_timeout() {
        let settings =
            SmtpSettings::from_section(&section(&[("host", "mail.example.org"), ("port", "587")]))
                .unwrap();
        assert_eq!(settings.host, "mail.example.org");
        assert_eq!(settings.port, 587);
        assert_eq!(settings.timeout, SmtpSettings::DEFAULT_TIMEOUT);
    }

    #[test]
    fn settings_parse_a_human_timeout() {
        let settings = SmtpSettings::from_section(&section(&[
            ("host", "mail.example.org"),
            ("port", "25"),
            ("timeout", "2m"),
        ]))
        .unwrap();
        assert_eq!(settings.timeout, Duration::from_secs(120));
    }

    #[test]
    fn settings_reject_a_bad_port() {
        let result =
            SmtpSettings::from_section(&section(&[("host", "mail.example.org"), ("port", "smtp")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn headers_split_recipients() {
        let headers = SmtpHeaders::from_section(&section(&[
            ("from", "backup@example.org"),
            ("to", "ops@example.org, alice@example.org"),
            ("subject", "nightly"),
        ]))
        .unwrap();
        assert_eq!(
            headers.recipients(),
            vec!["ops@example.org", "alice@example.org"]
        );
    }
}
