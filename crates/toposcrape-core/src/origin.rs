//! # Origin
//!
//! The URL-like source a plan is scraped from. Schemes are open-ended
//! (`file`, `http`, `https`, or anything a scraper understands); only
//! `file` gets special treatment, via [`Origin::file_path`].

use crate::TopoError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

/// Parsed origin URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Origin(Url);

impl Origin {
    /// Parse an origin string.
    pub fn parse(s: &str) -> Result<Self, TopoError> {
        Url::parse(s)
            .map(Self)
            .map_err(|e| TopoError::InvalidOrigin(format!("{}: {}", s, e)))
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    #[must_use]
    pub fn as_url(&self) -> &Url {
        &self.0
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Filesystem path of a `file` origin.
    ///
    /// Reads the hierarchical path when the URL has one and falls back to
    /// the opaque part otherwise. Fails on other schemes and on empty paths.
    pub fn file_path(&self) -> Result<PathBuf, TopoError> {
        if self.0.scheme() != "file" {
            return Err(TopoError::InvalidOrigin(format!(
                "not a file origin: {}",
                self.0
            )));
        }

        let raw = if self.0.cannot_be_a_base() {
            self.0.path().to_string()
        } else {
            self.0
                .to_file_path()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_else(|()| self.0.path().to_string())
        };

        if raw.is_empty() || raw == "/" {
            return Err(TopoError::InvalidOrigin(format!(
                "empty file path: {}",
                self.0
            )));
        }
        Ok(PathBuf::from(raw))
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl FromStr for Origin {
    type Err = TopoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Origin {
    type Error = TopoError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        origin.0.into()
    }
}
