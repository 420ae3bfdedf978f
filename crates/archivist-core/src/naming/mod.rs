//! Local filename derivation for downloaded items.
//!
//! Prefers the name suggested by the download event, falls back to the last
//! segment of the source URL, and sanitizes the result for Linux filesystems.

mod path;
mod sanitize;

pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename;

/// Default filename when neither the suggested name nor the URL yields anything usable.
pub const DEFAULT_FILENAME: &str = "download.bin";

/// Derives a safe filename for a downloaded item.
///
/// - `derive_filename(Some("IMG_0001.JPG"), url)` → `"IMG_0001.JPG"`
/// - `derive_filename(None, "https://cdn.example.com/a/b/video.mp4?x=1")` → `"video.mp4"`
pub fn derive_filename(suggested: Option<&str>, url: &str) -> String {
    let candidate = suggested
        .map(sanitize_filename)
        .filter(|s| is_usable(s))
        .or_else(|| {
            filename_from_url_path(url)
                .map(|s| sanitize_filename(&s))
                .filter(|s| is_usable(s))
        });

    candidate.unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

fn is_usable(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".."
}
