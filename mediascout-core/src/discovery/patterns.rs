use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use tracing::trace;
use url::Url;

use super::normalize::normalize;
use super::types::RawCandidate;

/// One recognizer: a compiled pattern plus the capture group holding the URL.
#[derive(Debug)]
pub struct RecognizerRule {
    pub id: &'static str,
    pub pattern: Regex,
    pub group: usize,
}

impl RecognizerRule {
    fn new(id: &'static str, pattern: &str, group: usize) -> Self {
        let pattern = RegexBuilder::new(pattern)
            .size_limit(32 * (1 << 20))
            .build()
            .expect("recognizer pattern is a valid regex");
        Self { id, pattern, group }
    }
}

// Character classes below exclude the delimiters that end a URL inside
// markup. Repetitions are bounded and never nested.
const EXTENSIONS: &str = "m3u8|mp4|mpd|webm|ts|m4s|mkv|mp3|aac|ogg|ism";

static RULES: Lazy<Vec<RecognizerRule>> = Lazy::new(|| {
    vec![
        RecognizerRule::new(
            "direct_url",
            &format!(
                r#"(?i)((?:https?:)?//[^ \t\r\n"'<>]{{1,1024}}?\.(?:{EXTENSIONS})(?:\?[^ \t\r\n"'<>]{{0,1024}})?)(?:["' \t\r\n<>]|$)"#
            ),
            1,
        ),
        RecognizerRule::new(
            "attribute",
            &format!(
                r#"(?i)\b(?:data-src|src|href|source)\s*=\s*["']([^ \t\r\n"'<>]{{1,1024}}?\.(?:{EXTENSIONS})(?:\?[^ \t\r\n"'<>]{{0,1024}})?)["']"#
            ),
            1,
        ),
        RecognizerRule::new(
            "manifest_key",
            r#"(?i)\b(?:video_url|url|file|source|src|hls|manifest)["']?\s*:\s*["']([^ \t\r\n"'<>]{1,1024}?(?:\.m3u8|/manifest\.mpd)(?:\?[^ \t\r\n"'<>]{0,1024})?)["']"#,
            1,
        ),
        RecognizerRule::new(
            "player_load",
            r#"(?i)\bplayer\s*\.\s*load\s*\(\s*["']([^ \t\r\n"'<>]{1,1024})["']"#,
            1,
        ),
    ]
});

/// Runs every recognizer over a block of page text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Raw matches of all rules, rule by rule, in text order. Overlapping
    /// matches from different rules are all reported.
    pub fn extract<'t>(&self, text: &'t str) -> impl Iterator<Item = RawCandidate> + 't {
        RULES.iter().flat_map(move |rule| {
            rule.pattern
                .captures_iter(text)
                .filter_map(move |captures| captures.get(rule.group))
                .map(move |matched| RawCandidate {
                    text: matched.as_str().to_string(),
                    source_pattern_id: rule.id,
                })
        })
    }

    /// Extracted matches normalized against `base`, deduplicated, first
    /// occurrence order kept. Matches that fail normalization are dropped.
    pub fn candidates(&self, text: &str, base: &Url) -> Vec<Url> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for raw in self.extract(text) {
            match normalize(&raw.text, base) {
                Ok(url) => {
                    if seen.insert(url.as_str().to_string()) {
                        ordered.push(url);
                    }
                }
                Err(err) => {
                    trace!(
                        raw = %raw.text,
                        rule = raw.source_pattern_id,
                        error = %err,
                        "discarded raw match"
                    );
                }
            }
        }
        ordered
    }
}
