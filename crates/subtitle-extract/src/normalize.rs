//! Post-extraction text cleanup: tag/speaker/bracket stripping plus
//! adjacent-phrase deduplication for the repeated "word word" pattern
//! auto-captions tend to produce.

use std::sync::OnceLock;

use regex::Regex;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn speaker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(SPEAKER_\d+:|>{2,3}\s*)").unwrap())
}

fn bracket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Clean a single raw segment's text. Returns `None` if the segment is
/// empty once cleaned (caller drops the segment).
pub fn clean_segment_text(raw: &str) -> Option<String> {
    let mut text = tag_re().replace_all(raw, "").to_string();
    text = speaker_re().replace(&text, "").to_string();
    text = bracket_re().replace_all(&text, "").to_string();
    text = whitespace_re().replace_all(&text, " ").trim().to_string();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Adjacent-phrase dedup: at each word position try phrase lengths 4, 3, 2
/// (longest first); if `words[i..i+L] == words[i+L..i+2L]` (case
/// insensitive), keep the first occurrence and skip the repeat.
pub fn dedup_adjacent_phrases(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let lower: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();

    let mut out: Vec<&str> = Vec::with_capacity(words.len());
    let mut i = 0;
    while i < words.len() {
        let mut matched = false;
        for l in [4usize, 3, 2] {
            if i + 2 * l <= words.len() && lower[i..i + l] == lower[i + l..i + 2 * l] {
                out.extend_from_slice(&words[i..i + l]);
                i += 2 * l;
                matched = true;
                break;
            }
        }
        if !matched {
            out.push(words[i]);
            i += 1;
        }
    }

    out.join(" ")
}

/// Clean every segment's text and concatenate into `plain_text`, applying
/// adjacent-phrase dedup to the final concatenation.
pub fn build_plain_text(cleaned_segment_texts: &[String]) -> String {
    let joined = cleaned_segment_texts.join(" ");
    dedup_adjacent_phrases(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_angle_bracket_tags() {
        assert_eq!(
            clean_segment_text("<b>Hello</b> world"),
            Some("Hello world".to_string())
        );
    }

    #[test]
    fn strips_speaker_markers() {
        assert_eq!(
            clean_segment_text("SPEAKER_1: hello there"),
            Some("hello there".to_string())
        );
        assert_eq!(
            clean_segment_text(">> hello there"),
            Some("hello there".to_string())
        );
    }

    #[test]
    fn strips_bracketed_annotations() {
        assert_eq!(
            clean_segment_text("[music playing] hello (laughs)"),
            Some("hello".to_string())
        );
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(
            clean_segment_text("hello    there   world"),
            Some("hello there world".to_string())
        );
    }

    #[test]
    fn empty_after_cleaning_is_dropped() {
        assert_eq!(clean_segment_text("<b></b>"), None);
        assert_eq!(clean_segment_text("[music]"), None);
    }

    #[test]
    fn dedup_removes_four_word_repeat() {
        let text = "the quick brown fox the quick brown fox jumps";
        assert_eq!(dedup_adjacent_phrases(text), "the quick brown fox jumps");
    }

    #[test]
    fn dedup_removes_two_word_repeat() {
        let text = "hello world hello world today";
        assert_eq!(dedup_adjacent_phrases(text), "hello world today");
    }

    #[test]
    fn dedup_is_case_insensitive() {
        let text = "Hello World hello world today";
        assert_eq!(dedup_adjacent_phrases(text), "Hello World today");
    }

    #[test]
    fn dedup_leaves_non_repeating_text_alone() {
        let text = "the quick brown fox jumps over the lazy dog";
        assert_eq!(dedup_adjacent_phrases(text), text);
    }

    #[test]
    fn dedup_prefers_longest_phrase_match() {
        // "a b a b" could match as two 2-word repeats of "a b", or fail a
        // 4-word check first (which requires 8 words) - with only 4 words
        // the 2-word match at position 0 should apply.
        let text = "a b a b";
        assert_eq!(dedup_adjacent_phrases(text), "a b");
    }
}
