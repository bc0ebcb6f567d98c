//! Sentence recovery around a matched span, and match-type classification.

use regex::Regex;

use crate::config::{SentenceSettings, SynonymFilterSettings};
use crate::core::rows::MatchType;

const TERMINATOR_PATTERN: &str = r#"[.!?]+["')\]]*(?:\s+|$)"#;
const LINE_BREAK_PATTERN: &str = r"[\r\n]+";

#[derive(Debug, Clone, PartialEq)]
pub struct SentenceExtraction {
    pub sentence: String,
    pub match_type: MatchType,
    /// Set when the whole text had to be used as the sentence.
    pub degraded: Option<String>,
}

impl SentenceExtraction {
    fn fallback(text: &str, reason: impl Into<String>) -> Self {
        Self {
            sentence: text.trim().to_string(),
            match_type: MatchType::Unknown,
            degraded: Some(reason.into()),
        }
    }
}

pub struct SentenceExtractor {
    boundary: Regex,
    fuzzy_threshold: f64,
    filter: SynonymFilterSettings,
}

struct Boundary {
    /// Byte offset where the preceding sentence ends (terminator included).
    sentence_end: usize,
    /// Byte offset where the following sentence begins.
    next_start: usize,
    match_start: usize,
}

impl SentenceExtractor {
    pub fn new(settings: &SentenceSettings, filter: &SynonymFilterSettings) -> Self {
        let pattern = if settings.line_breaks_are_boundaries {
            format!("{}|{}", TERMINATOR_PATTERN, LINE_BREAK_PATTERN)
        } else {
            TERMINATOR_PATTERN.to_string()
        };

        Self {
            boundary: Regex::new(&pattern).expect("sentence boundary pattern is valid"),
            fuzzy_threshold: settings.fuzzy_threshold,
            filter: filter.clone(),
        }
    }

    /// Recover the sentence containing the character span `[span_start, span_end)`
    /// and classify the span text against `labels` (preferred label first, then synonyms).
    pub fn extract(
        &self,
        text: &str,
        span_start: usize,
        span_end: usize,
        labels: &[&str],
    ) -> SentenceExtraction {
        let Some((byte_start, byte_end)) = byte_span(text, span_start, span_end) else {
            return SentenceExtraction::fallback(
                text,
                format!("span {}..{} outside document bounds", span_start, span_end),
            );
        };

        let boundaries = self.boundaries(text);
        if boundaries.is_empty() {
            return SentenceExtraction::fallback(text, "no sentence boundary found");
        }

        let start = boundaries
            .iter()
            .rev()
            .find(|b| b.next_start <= byte_start)
            .map_or(0, |b| b.next_start);
        let end = boundaries
            .iter()
            .find(|b| b.match_start >= byte_end)
            .map_or(text.len(), |b| b.sentence_end);

        let sentence = text[start..end].trim();
        if sentence.is_empty() {
            return SentenceExtraction::fallback(text, "empty sentence around span");
        }

        let surface = &text[byte_start..byte_end];
        SentenceExtraction {
            sentence: sentence.to_string(),
            match_type: classify_match(surface, labels, &self.filter, self.fuzzy_threshold),
            degraded: None,
        }
    }

    fn boundaries(&self, text: &str) -> Vec<Boundary> {
        self.boundary
            .find_iter(text)
            .filter_map(|m| {
                let matched = m.as_str();
                let is_line_break = matched.contains('\n') || matched.contains('\r');
                // "e.g. aspirin" style abbreviations: lower-case continuation is not a new sentence.
                let continues_lowercase = text[m.end()..]
                    .chars()
                    .next()
                    .is_some_and(char::is_lowercase);
                if continues_lowercase && !is_line_break {
                    return None;
                }
                Some(Boundary {
                    sentence_end: m.start() + matched.trim_end().len(),
                    next_start: m.end(),
                    match_start: m.start(),
                })
            })
            .collect()
    }
}

/// Classify `surface` against candidate labels with precedence
/// exact > case-insensitive > fuzzy > unknown.
pub fn classify_match(
    surface: &str,
    labels: &[&str],
    filter: &SynonymFilterSettings,
    fuzzy_threshold: f64,
) -> MatchType {
    let surface = surface.trim();
    if surface.is_empty() || labels.is_empty() {
        return MatchType::Unknown;
    }

    if labels.iter().any(|label| label.trim() == surface) {
        return MatchType::Exact;
    }

    let lowered = surface.to_lowercase();
    if labels.iter().any(|label| label.trim().to_lowercase() == lowered) {
        return MatchType::CaseInsensitive;
    }

    let fuzzy = labels.iter().any(|label| {
        filter.collapses(label, surface)
            || strsim::normalized_levenshtein(&label.trim().to_lowercase(), &lowered) >= fuzzy_threshold
    });
    if fuzzy {
        return MatchType::Fuzzy;
    }

    MatchType::Unknown
}

/// Convert a character span to byte offsets, or `None` if it does not fit the text.
fn byte_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    if start > end {
        return None;
    }

    let mut byte_start = None;
    let mut byte_end = None;
    for (char_idx, (byte_idx, _)) in text.char_indices().enumerate() {
        if char_idx == start {
            byte_start = Some(byte_idx);
        }
        if char_idx == end {
            byte_end = Some(byte_idx);
            break;
        }
    }

    let char_count = text.chars().count();
    if start == char_count {
        byte_start = Some(text.len());
    }
    if end == char_count {
        byte_end = Some(text.len());
    }

    Some((byte_start?, byte_end?))
}
