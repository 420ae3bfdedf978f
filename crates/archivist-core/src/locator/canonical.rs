//! URL canonicalization for item locators.

use super::LocatorError;

/// Query parameters that select an account slot rather than an item.
const ACCOUNT_QUERY_KEYS: &[&str] = &["authuser"];

/// Canonicalizes a library URL.
///
/// - Removes `/u/<digits>/` account-slot segments anywhere in the path
/// - Drops the fragment and account-selecting query parameters
/// - Drops a trailing slash (except for the root path)
/// - Lowercases scheme and host (via `url`)
pub fn canonicalize(raw: &str) -> Result<String, LocatorError> {
    let mut parsed =
        url::Url::parse(raw).map_err(|e| LocatorError::NotUrl(format!("{raw}: {e}")))?;

    let segments: Vec<String> = parsed
        .path_segments()
        .map(|s| s.map(str::to_string).collect())
        .unwrap_or_default();

    let mut kept: Vec<&str> = Vec::with_capacity(segments.len());
    let mut i = 0;
    while i < segments.len() {
        let seg = segments[i].as_str();
        let next_is_slot = segments
            .get(i + 1)
            .map(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
            .unwrap_or(false);
        if seg == "u" && next_is_slot {
            i += 2;
            continue;
        }
        if !seg.is_empty() {
            kept.push(seg);
        }
        i += 1;
    }
    parsed.set_path(&format!("/{}", kept.join("/")));

    let query: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !ACCOUNT_QUERY_KEYS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if query.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(query);
    }
    parsed.set_fragment(None);

    Ok(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_account_slot() {
        assert_eq!(
            canonicalize("https://photos.google.com/u/0/photo/X").unwrap(),
            "https://photos.google.com/photo/X"
        );
        assert_eq!(
            canonicalize("https://photos.google.com/u/12/album/A/photo/X").unwrap(),
            "https://photos.google.com/album/A/photo/X"
        );
    }

    #[test]
    fn keeps_non_numeric_u_segment() {
        assert_eq!(
            canonicalize("https://photos.google.com/u/abc/photo/X").unwrap(),
            "https://photos.google.com/u/abc/photo/X"
        );
    }

    #[test]
    fn drops_fragment_trailing_slash_and_authuser() {
        assert_eq!(
            canonicalize("https://Photos.Google.com/photo/X/?authuser=1#info").unwrap(),
            "https://photos.google.com/photo/X"
        );
        assert_eq!(
            canonicalize("https://photos.google.com/photo/X?key=v&authuser=0").unwrap(),
            "https://photos.google.com/photo/X?key=v"
        );
    }

    #[test]
    fn root_path() {
        assert_eq!(
            canonicalize("https://photos.google.com").unwrap(),
            "https://photos.google.com/"
        );
    }
}
