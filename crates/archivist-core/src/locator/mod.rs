//! Item locators: canonical identifiers for positions in the library.
//!
//! A locator is the item's URL with account-slot noise removed, so the same
//! item rendered under `/u/0/` and `/u/1/` compares equal.

mod canonical;

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::config::LibraryConfig;

pub use canonical::canonicalize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocatorError {
    #[error("empty locator")]
    Empty,
    #[error("not a URL: {0}")]
    NotUrl(String),
}

/// Canonical identifier of one library position. Equality is on the
/// canonical form only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemLocator {
    canonical: String,
}

impl ItemLocator {
    /// Parse and canonicalize a raw URL.
    pub fn parse(raw: &str) -> Result<Self, LocatorError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(LocatorError::Empty);
        }
        let canonical = canonicalize(raw)?;
        Ok(Self { canonical })
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Item id: the segment following `library.item_segment`, if this locator
    /// is on the library host.
    pub fn item_id(&self, library: &LibraryConfig) -> Option<String> {
        let url = Url::parse(&self.canonical).ok()?;
        if !url.host_str()?.eq_ignore_ascii_case(&library.host) {
            return None;
        }
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
        while let Some(seg) = segments.next() {
            if seg == library.item_segment {
                return segments.next().map(str::to_string);
            }
        }
        None
    }

    /// True when the locator points at a single item of the library (not a
    /// settings, search, or error page).
    pub fn is_library_item(&self, library: &LibraryConfig) -> bool {
        self.item_id(library).is_some()
    }
}

impl fmt::Display for ItemLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for ItemLocator {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
