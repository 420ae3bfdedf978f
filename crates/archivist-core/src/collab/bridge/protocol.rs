//! Line-delimited JSON frames exchanged with the automation driver.
//!
//! Requests (archivist → driver), one per line:
//! `{"id":3,"op":"step_previous","timeout_ms":30000}`
//!
//! Responses (driver → archivist):
//! `{"id":3,"ok":true,"locator":"https://photos.google.com/photo/X"}`
//! `{"id":3,"ok":false,"error":"no previous item","timeout":false}`
//!
//! Events (driver → archivist, unsolicited):
//! `{"event":"download","url":"https://...","suggested_name":"IMG_1.jpg","cookies":[{"name":"SID","value":"..."}]}`

use serde::{Deserialize, Serialize};

use crate::collab::{Cookie, DownloadEvent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    CurrentLocator,
    JumpToNewest { timeout_ms: u64 },
    Goto { locator: String, timeout_ms: u64 },
    StepPrevious { timeout_ms: u64 },
    TriggerDownload,
    DateLabel { locator: String },
    Shutdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestFrame {
    pub id: u64,
    #[serde(flatten)]
    pub op: Op,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub locator: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    /// Set by the driver when the failure was its own wait timing out.
    #[serde(default)]
    pub timeout: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventFrame {
    Download {
        url: String,
        #[serde(default)]
        suggested_name: Option<String>,
        #[serde(default)]
        cookies: Vec<Cookie>,
    },
}

impl From<EventFrame> for DownloadEvent {
    fn from(frame: EventFrame) -> Self {
        match frame {
            EventFrame::Download {
                url,
                suggested_name,
                cookies,
            } => DownloadEvent {
                url,
                suggested_name,
                cookies,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Incoming {
    Event(EventFrame),
    Response(ResponseFrame),
}

/// Parses one line from the driver. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<Incoming>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}
