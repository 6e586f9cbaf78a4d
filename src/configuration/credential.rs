use std::collections::BTreeMap;
use std::fmt;

use super::{required_value, ConfigError};

/// SMTP login taken from the `[smtp_auth]` section.
#[derive(Clone)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn from_section(section: &BTreeMap<String, String>) -> Result<Credential, ConfigError> {
        Ok(Credential {
            username: required_value(section, "smtp_auth", "username")?,
            password: required_value(section, "smtp_auth", "password")?,
        })
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}
