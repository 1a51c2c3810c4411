//! Video-ID validation and extraction from bare IDs or URLs.
//!
//! Follows the same segment-then-validate strategy used throughout the
//! corpus for platform URL parsing: locate a candidate ID segment, then
//! validate it against the fixed-length/charset rule independently.

/// Errors that can occur while resolving a video ID from user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoIdError {
    /// Input was neither a bare ID nor a recognizable video URL.
    NotFound,
    /// A candidate ID segment was found but failed format validation.
    InvalidFormat,
}

impl std::fmt::Display for VideoIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoIdError::NotFound => write!(f, "video id not found in input"),
            VideoIdError::InvalidFormat => write!(f, "video id has invalid format"),
        }
    }
}

impl std::error::Error for VideoIdError {}

pub type VideoIdResult<T> = Result<T, VideoIdError>;

const ID_LEN: usize = 11;

/// Resolve a video ID from either a bare 11-character ID or a URL
/// containing one, per spec's `^[A-Za-z0-9_-]{11}$` rule.
pub fn resolve_video_id(input: &str) -> VideoIdResult<String> {
    let input = input.trim();

    if is_valid_video_id(input) {
        return Ok(input.to_string());
    }

    if let Some(id) = extract_from_url(input) {
        return validate(id);
    }

    Err(VideoIdError::NotFound)
}

/// Check if a string matches the video-ID format exactly.
pub fn is_valid_video_id(s: &str) -> bool {
    s.len() == ID_LEN && s.chars().all(is_valid_id_char)
}

fn is_valid_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn validate(id: String) -> VideoIdResult<String> {
    if is_valid_video_id(&id) {
        Ok(id)
    } else {
        Err(VideoIdError::InvalidFormat)
    }
}

/// Extract a path-embedded 11-character token from a URL-shaped input.
fn extract_from_url(url: &str) -> Option<String> {
    let markers = ["?v=", "&v=", "/embed/", "/v/", "/shorts/", "youtu.be/"];

    for marker in markers {
        if let Some(pos) = url.find(marker) {
            let start = pos + marker.len();
            if start >= url.len() {
                continue;
            }
            let remaining = &url[start..];
            if let Some(segment) = first_segment(remaining) {
                return Some(segment);
            }
        }
    }

    None
}

fn first_segment(segment: &str) -> Option<String> {
    let delimiters = ['&', '#', '?', '/'];
    let end = segment
        .find(|c| delimiters.contains(&c))
        .unwrap_or(segment.len());
    let candidate = segment[..end].trim();
    if candidate.is_empty() {
        None
    } else {
        Some(candidate.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_id_round_trips() {
        assert_eq!(
            resolve_video_id("dQw4w9WgXcQ").unwrap(),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn extracts_from_watch_url() {
        assert_eq!(
            resolve_video_id("https://youtube.com/watch?v=dQw4w9WgXcQ&list=PL1").unwrap(),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn extracts_from_short_url() {
        assert_eq!(
            resolve_video_id("https://youtu.be/dQw4w9WgXcQ?t=30").unwrap(),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn extracts_from_shorts_url() {
        assert_eq!(
            resolve_video_id("https://youtube.com/shorts/dQw4w9WgXcQ").unwrap(),
            "dQw4w9WgXcQ"
        );
    }

    #[test]
    fn rejects_too_short() {
        assert_eq!(resolve_video_id("abc123"), Err(VideoIdError::NotFound));
    }

    #[test]
    fn rejects_too_long_segment_from_url() {
        assert_eq!(
            resolve_video_id("https://youtu.be/abc123def456789"),
            Err(VideoIdError::InvalidFormat)
        );
    }

    #[test]
    fn rejects_invalid_chars() {
        assert!(!is_valid_video_id("abc123def!!"));
    }

    #[test]
    fn ten_and_twelve_char_ids_rejected() {
        assert!(!is_valid_video_id("abcdefghi9")); // 10 chars
        assert!(!is_valid_video_id("abcdefghi901")); // 12 chars
    }
}
