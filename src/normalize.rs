//! Canonicalization of the YouTube URL spellings accepted by `/download`.

use std::fmt;

use url::Url;

const WATCH_URL_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// A URL of the exact form `https://www.youtube.com/watch?v=<id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedVideoUrl(String);

impl NormalizedVideoUrl {
    fn from_id(id: &str) -> Option<Self> {
        is_valid_video_id(id).then(|| Self(format!("{WATCH_URL_PREFIX}{id}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn video_id(&self) -> &str {
        &self.0[WATCH_URL_PREFIX.len()..]
    }
}

impl fmt::Display for NormalizedVideoUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VideoUrlNormalizer {
    pub accept_shorts: bool,
}

impl Default for VideoUrlNormalizer {
    fn default() -> Self {
        Self {
            accept_shorts: true,
        }
    }
}

impl VideoUrlNormalizer {
    /// Returns `None` for anything that is not a recognized video URL,
    /// including input that does not parse as an absolute URL.
    pub fn normalize(&self, input: &str) -> Option<NormalizedVideoUrl> {
        let parsed = Url::parse(input.trim()).ok()?;
        let host = parsed
            .host_str()
            .map(|host| host.to_ascii_lowercase())
            .unwrap_or_default();

        if host == "youtu.be" {
            return NormalizedVideoUrl::from_id(path_segment(&parsed, 0)?);
        }

        if let (Some("embed"), Some(id)) = (path_segment(&parsed, 0), path_segment(&parsed, 1)) {
            return NormalizedVideoUrl::from_id(id);
        }

        if let Some((_, id)) = parsed.query_pairs().find(|(key, _)| key == "v") {
            return NormalizedVideoUrl::from_id(&id);
        }

        if self.accept_shorts
            && let (Some("shorts"), Some(id)) = (path_segment(&parsed, 0), path_segment(&parsed, 1))
        {
            return NormalizedVideoUrl::from_id(id);
        }

        None
    }
}

/// Normalizes with the default rules (shorts links accepted).
pub fn normalize_youtube_url(input: &str) -> Option<NormalizedVideoUrl> {
    VideoUrlNormalizer::default().normalize(input)
}

fn path_segment(url: &Url, index: usize) -> Option<&str> {
    url.path_segments()?.nth(index)
}

fn is_valid_video_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "https://www.youtube.com/watch?v=abc123";

    fn normalized(input: &str) -> Option<String> {
        normalize_youtube_url(input).map(|url| url.to_string())
    }

    #[test]
    fn short_link_is_canonicalized() {
        assert_eq!(
            normalized("https://youtu.be/abc123").as_deref(),
            Some(CANONICAL)
        );
        assert_eq!(
            normalized("https://youtu.be/abc123?si=tracking").as_deref(),
            Some(CANONICAL)
        );
    }

    #[test]
    fn embed_link_is_canonicalized() {
        assert_eq!(
            normalized("https://www.youtube.com/embed/abc123").as_deref(),
            Some(CANONICAL)
        );
    }

    #[test]
    fn watch_link_keeps_only_video_param() {
        assert_eq!(
            normalized("https://m.youtube.com/watch?list=PL1&v=abc123&t=42").as_deref(),
            Some(CANONICAL)
        );
    }

    #[test]
    fn shorts_link_depends_on_option() {
        let input = "https://www.youtube.com/shorts/abc123";
        assert_eq!(normalized(input).as_deref(), Some(CANONICAL));

        let strict = VideoUrlNormalizer {
            accept_shorts: false,
        };
        assert_eq!(strict.normalize(input), None);
    }

    #[test]
    fn host_rule_wins_over_query_param() {
        assert_eq!(
            normalized("https://youtu.be/abc123?v=other").as_deref(),
            Some(CANONICAL)
        );
    }

    #[test]
    fn bare_embed_path_falls_through_to_query_param() {
        assert_eq!(
            normalized("https://www.youtube.com/embed?v=abc123").as_deref(),
            Some(CANONICAL)
        );
        assert_eq!(
            normalized("https://www.youtube.com/shorts?v=abc123").as_deref(),
            Some(CANONICAL)
        );
        assert_eq!(normalized("https://www.youtube.com/embed"), None);
    }

    #[test]
    fn normalization_is_idempotent() {
        for input in [
            "https://youtu.be/abc123",
            "https://www.youtube.com/embed/abc123",
            "https://www.youtube.com/watch?v=abc123",
            "https://www.youtube.com/shorts/abc123",
        ] {
            let once = normalize_youtube_url(input).unwrap();
            let twice = normalize_youtube_url(once.as_str()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn unrecognized_inputs() {
        for input in [
            "not a url",
            "",
            "youtube.com/watch?v=abc123",
            "https://www.youtube.com/",
            "https://youtu.be/",
            "https://www.youtube.com/embed/",
            "https://www.youtube.com/watch?v=",
            "https://www.youtube.com/watch?v=abc%20123",
            "https://example.com/channel/abc123",
        ] {
            assert_eq!(normalized(input), None, "input {input:?}");
        }
    }

    #[test]
    fn video_id_accessor() {
        let url = normalize_youtube_url("https://youtu.be/dQw4w9WgXcQ").unwrap();
        assert_eq!(url.video_id(), "dQw4w9WgXcQ");
    }
}
