//! Server version numbers.

use crate::error::{ConfigError, Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

fn banner_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(regex) = PATTERN.get() {
        return Ok(regex);
    }
    let regex = Regex::new(r"PostgreSQL (\d+(?:\.\d+){0,3})").map_err(|e| ConfigError {
        message: format!("invalid banner pattern: {e}"),
        source: Some(Box::new(e)),
    })?;
    Ok(PATTERN.get_or_init(|| regex))
}

/// A dot-separated version number, e.g. `13.4`.
///
/// Missing components count as zero, so `13.4 == 13.4.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            build: 0,
            revision: 0,
        }
    }

    /// Parse a `version()` banner such as
    /// `PostgreSQL 10.12 on x86_64-pc-linux-gnu, compiled by gcc`.
    pub fn from_banner(banner: &str) -> Result<Self> {
        let captures = banner_pattern()?.captures(banner).ok_or_else(|| {
            Error::Config(ConfigError::new(format!(
                "unrecognized server version banner: {banner}"
            )))
        })?;
        captures[1].parse()
    }
}

impl FromStr for ServerVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Config(ConfigError::new(format!("invalid version string '{s}'")));
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }
        let mut parts = [0u32; 4];
        let mut count = 0;
        for piece in trimmed.split('.') {
            if count == parts.len() {
                return Err(invalid());
            }
            parts[count] = piece.parse().map_err(|_| invalid())?;
            count += 1;
        }
        Ok(Self {
            major: parts[0],
            minor: parts[1],
            build: parts[2],
            revision: parts[3],
        })
    }
}

impl TryFrom<String> for ServerVersion {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ServerVersion> for String {
    fn from(value: ServerVersion) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if self.build != 0 || self.revision != 0 {
            write!(f, ".{}", self.build)?;
        }
        if self.revision != 0 {
            write!(f, ".{}", self.revision)?;
        }
        Ok(())
    }
}
