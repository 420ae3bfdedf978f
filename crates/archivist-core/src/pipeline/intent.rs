//! Download intents: one queued request to fetch one library item.

use std::fmt;

use crate::collab::{Cookie, DownloadEvent};
use crate::locator::ItemLocator;

/// Pipeline-assigned intent number, increasing in enqueue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntentId(pub u64);

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadIntent {
    pub url: String,
    pub cookies: Vec<Cookie>,
    pub referer: String,
    /// Item page the download was started from; used for the date label fallback.
    pub origin: ItemLocator,
    pub suggested_name: Option<String>,
    /// Replace an existing file at the exact destination instead of numbering.
    pub overwrite: bool,
}

impl DownloadIntent {
    pub fn from_event(event: DownloadEvent, origin: ItemLocator) -> Self {
        Self {
            url: event.url,
            cookies: event.cookies,
            referer: origin.to_string(),
            origin,
            suggested_name: event.suggested_name,
            overwrite: false,
        }
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// `name=value; name2=value2`, or `None` without cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Headers for the transfer utility: `Cookie` (if any) and `Referer`.
    pub fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::with_capacity(2);
        if let Some(cookie) = self.cookie_header() {
            headers.push(("Cookie".to_string(), cookie));
        }
        headers.push(("Referer".to_string(), self.referer.clone()));
        headers
    }
}
