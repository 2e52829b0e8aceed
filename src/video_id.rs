//! Video identifier extraction.
//!
//! Accepts the URL shapes YouTube documents for a single video (watch pages,
//! `youtu.be` short links, embeds, shorts and live links) as well as a bare
//! identifier. Extraction is pure and total: anything unrecognized is `None`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

/// Length of every YouTube video identifier.
pub const VIDEO_ID_LEN: usize = 11;

/// Path prefixes that carry the identifier as the following segment.
const ID_PATH_PREFIXES: &[&str] = &["embed", "shorts", "live", "v", "e"];

/// An 11-character YouTube video identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl VideoId {
    /// Validate a bare identifier.
    pub fn new(raw: &str) -> Option<Self> {
        if is_valid_id(raw) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical watch URL for this video.
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VideoId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<VideoId> for String {
    fn from(id: VideoId) -> Self {
        id.0
    }
}

impl TryFrom<String> for VideoId {
    type Error = InvalidVideoId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_valid_id(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidVideoId(value))
        }
    }
}

impl FromStr for VideoId {
    type Err = InvalidVideoId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        extract(s).ok_or_else(|| InvalidVideoId(s.to_string()))
    }
}

/// A string that is neither a video identifier nor a recognized video URL.
#[derive(Debug, Clone, thiserror::Error)]
#[error("not a YouTube video reference: {0}")]
pub struct InvalidVideoId(pub String);

fn is_valid_id(s: &str) -> bool {
    s.len() == VIDEO_ID_LEN
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_youtube_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == "youtube.com"
        || host.ends_with(".youtube.com")
        || host == "youtube-nocookie.com"
        || host.ends_with(".youtube-nocookie.com")
}

fn is_short_link_host(host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    host == "youtu.be" || host == "www.youtu.be"
}

/// Extract a video identifier from a URL or bare identifier.
pub fn extract(input: &str) -> Option<VideoId> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Some(id) = VideoId::new(input) {
        return Some(id);
    }

    let lowered = input.to_ascii_lowercase();
    let with_scheme = if lowered.starts_with("http://") || lowered.starts_with("https://") {
        input.to_string()
    } else if lowered.contains("youtube.com")
        || lowered.contains("youtu.be")
        || lowered.contains("youtube-nocookie.com")
    {
        format!("https://{}", input)
    } else {
        return None;
    };

    let url = Url::parse(&with_scheme).ok()?;
    let host = url.host_str()?;

    if is_short_link_host(host) {
        let segment = url.path_segments()?.next()?;
        return VideoId::new(segment);
    }

    if !is_youtube_host(host) {
        return None;
    }

    if url.path() == "/watch" || url.path() == "/watch/" {
        return url
            .query_pairs()
            .find(|(k, _)| k == "v")
            .and_then(|(_, v)| VideoId::new(v.trim()));
    }

    let mut segments = url.path_segments()?;
    let prefix = segments.next()?;
    if ID_PATH_PREFIXES.contains(&prefix) {
        return segments.next().and_then(VideoId::new);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Option<String> {
        extract(s).map(String::from)
    }

    #[test]
    fn test_bare_identifier() {
        assert_eq!(id("dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(id("  abc12345678 ").as_deref(), Some("abc12345678"));
    }

    #[test]
    fn test_watch_urls() {
        assert_eq!(
            id("https://www.youtube.com/watch?v=dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            id("https://m.youtube.com/watch?feature=share&v=dQw4w9WgXcQ&t=42").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            id("youtube.com/watch?v=dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn test_short_links() {
        assert_eq!(id("https://youtu.be/dQw4w9WgXcQ").as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(
            id("youtu.be/dQw4w9WgXcQ?si=tracking").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn test_embed_and_friends() {
        assert_eq!(
            id("https://www.youtube.com/embed/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            id("https://www.youtube-nocookie.com/embed/dQw4w9WgXcQ?start=3").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            id("https://youtube.com/shorts/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
        assert_eq!(
            id("https://www.youtube.com/live/dQw4w9WgXcQ").as_deref(),
            Some("dQw4w9WgXcQ")
        );
    }

    #[test]
    fn test_rejects_unrecognized_input() {
        assert_eq!(id(""), None);
        assert_eq!(id("not a url"), None);
        assert_eq!(id("https://example.com/watch?v=dQw4w9WgXcQ"), None);
        assert_eq!(id("https://www.youtube.com/channel/UCxyz"), None);
        assert_eq!(id("https://www.youtube.com/watch?v=short"), None);
        assert_eq!(id("https://www.youtube.com/watch?v=dQw4w9WgXcQextra"), None);
        assert_eq!(id("https://youtu.be/"), None);
        assert_eq!(id("dQw4w9WgXc!"), None);
    }

    #[test]
    fn test_extraction_is_total() {
        let inputs = [
            "https://",
            "youtube.com",
            "https://www.youtube.com/watch",
            "https://www.youtube.com/watch?v=",
            "://youtu.be//",
            "\u{1F600}\u{1F600}\u{1F600}",
            "https://youtu.be/\u{00e9}\u{00e9}\u{00e9}\u{00e9}\u{00e9}\u{00e9}",
            "http://[::1]:80/embed/dQw4w9WgXcQ",
        ];
        for input in inputs {
            if let Some(found) = extract(input) {
                assert_eq!(found.as_str().len(), VIDEO_ID_LEN);
            }
        }
    }

    #[test]
    fn test_serde_rejects_invalid_id() {
        let ok: VideoId = serde_json::from_str("\"abc12345678\"").unwrap();
        assert_eq!(ok.as_str(), "abc12345678");
        assert!(serde_json::from_str::<VideoId>("\"abc\"").is_err());
    }

    #[test]
    fn test_from_str_accepts_urls() {
        let parsed: VideoId = "https://youtu.be/abc12345678".parse().unwrap();
        assert_eq!(parsed.watch_url(), "https://www.youtube.com/watch?v=abc12345678");
        assert!("nope".parse::<VideoId>().is_err());
    }
}
