//! Date bucket resolution: which `<year>/<month>` an item is filed under.
//!
//! Strict cascade, first hit wins:
//! 1. original capture time tag
//! 2. creation time tag
//! 3. the date label shown on the item's page
//! 4. 1970/1 (quarantine bucket)
//!
//! Resolution never fails.

mod parse;

use std::fmt;

use crate::collab::DateLabelSource;
use crate::locator::ItemLocator;

pub use parse::{parse_page_label, parse_tag_date};

/// Where a bucket's date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
    OriginalCaptureTime,
    CreationTime,
    PageLabel,
    Default,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::OriginalCaptureTime => "original-capture-time",
            Provenance::CreationTime => "creation-time",
            Provenance::PageLabel => "page-label",
            Provenance::Default => "default",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved destination partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateBucket {
    pub year: i32,
    /// Calendar month, 1–12.
    pub month: u32,
    pub provenance: Provenance,
}

impl DateBucket {
    pub const DEFAULT_YEAR: i32 = 1970;
    pub const DEFAULT_MONTH: u32 = 1;

    pub fn new(year: i32, month: u32, provenance: Provenance) -> Self {
        Self {
            year,
            month,
            provenance,
        }
    }

    pub fn fallback() -> Self {
        Self::new(Self::DEFAULT_YEAR, Self::DEFAULT_MONTH, Provenance::Default)
    }
}

impl fmt::Display for DateBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.year, self.month, self.provenance)
    }
}

/// Date tags read from a file. Values are raw tag strings
/// (e.g. `2020:05:17 10:11:12+02:00`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaTags {
    pub original_capture_time: Option<String>,
    pub creation_time: Option<String>,
}

/// Steps 1–2 of the cascade.
pub fn bucket_from_tags(tags: &MediaTags) -> Option<DateBucket> {
    let from = |raw: &Option<String>, provenance| {
        raw.as_deref()
            .and_then(parse_tag_date)
            .map(|(year, month)| DateBucket::new(year, month, provenance))
    };
    from(&tags.original_capture_time, Provenance::OriginalCaptureTime)
        .or_else(|| from(&tags.creation_time, Provenance::CreationTime))
}

/// Full cascade with an already fetched page label.
pub fn resolve_with_label(tags: Option<&MediaTags>, label: Option<&str>) -> DateBucket {
    if let Some(bucket) = tags.and_then(bucket_from_tags) {
        return bucket;
    }
    label
        .and_then(parse_page_label)
        .map(|(year, month)| DateBucket::new(year, month, Provenance::PageLabel))
        .unwrap_or_else(DateBucket::fallback)
}

/// Full cascade; the page is only asked for its label when the tags give no date.
pub async fn resolve<S>(tags: Option<&MediaTags>, pages: &S, origin: &ItemLocator) -> DateBucket
where
    S: DateLabelSource + ?Sized,
{
    if let Some(bucket) = tags.and_then(bucket_from_tags) {
        return bucket;
    }
    let label = pages.fetch_visible_date_label(origin).await;
    if label.is_none() {
        tracing::debug!(origin = %origin, "no date label on page");
    }
    resolve_with_label(None, label.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(original: Option<&str>, created: Option<&str>) -> MediaTags {
        MediaTags {
            original_capture_time: original.map(str::to_string),
            creation_time: created.map(str::to_string),
        }
    }

    #[test]
    fn original_capture_time_wins() {
        let b = resolve_with_label(
            Some(&tags(Some("2019:07:04 12:00:00"), Some("2021:01:01 00:00:00"))),
            Some("May 17, 2020"),
        );
        assert_eq!(b, DateBucket::new(2019, 7, Provenance::OriginalCaptureTime));
    }

    #[test]
    fn creation_time_only() {
        let b = resolve_with_label(Some(&tags(None, Some("2021:03:09 08:15:00"))), None);
        assert_eq!(b, DateBucket::new(2021, 3, Provenance::CreationTime));
    }

    #[test]
    fn unparsable_tag_falls_through() {
        let b = resolve_with_label(
            Some(&tags(Some("0000:00:00 00:00:00"), Some("garbage"))),
            Some("Sun, May 17, 2020, 10:11 AM"),
        );
        assert_eq!(b, DateBucket::new(2020, 5, Provenance::PageLabel));
    }

    #[test]
    fn empty_tags_and_bad_label_default() {
        let b = resolve_with_label(Some(&MediaTags::default()), Some("Yesterday"));
        assert_eq!(b, DateBucket::new(1970, 1, Provenance::Default));
        assert_eq!(resolve_with_label(None, None), DateBucket::fallback());
    }

    struct FixedLabel(Option<&'static str>, std::sync::atomic::AtomicUsize);

    #[async_trait::async_trait]
    impl DateLabelSource for FixedLabel {
        async fn fetch_visible_date_label(&self, _origin: &ItemLocator) -> Option<String> {
            self.1.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.0.map(str::to_string)
        }
    }

    #[tokio::test]
    async fn page_is_not_queried_when_tags_resolve() {
        let origin = ItemLocator::parse("https://photos.google.com/photo/A").unwrap();
        let pages = FixedLabel(Some("May 17, 2020"), Default::default());
        let b = resolve(Some(&tags(Some("2018:02:03 04:05:06"), None)), &pages, &origin).await;
        assert_eq!(b.provenance, Provenance::OriginalCaptureTime);
        assert_eq!(pages.1.load(std::sync::atomic::Ordering::SeqCst), 0);

        let b = resolve(None, &pages, &origin).await;
        assert_eq!(b, DateBucket::new(2020, 5, Provenance::PageLabel));
        assert_eq!(pages.1.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
