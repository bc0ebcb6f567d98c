use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One raw detection produced by the external annotator.
///
/// Spans are character offsets into the document text, end-exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub document_id: String,
    pub span_start: usize,
    pub span_end: usize,
    pub matched_text: String,
    pub candidate_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl Mention {
    pub fn new(
        document_id: impl Into<String>,
        span_start: usize,
        span_end: usize,
        matched_text: impl Into<String>,
        candidate_id: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            span_start,
            span_end,
            matched_text: matched_text.into(),
            candidate_id: candidate_id.into(),
            confidence: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// How closely a matched surface form agrees with the term's label or synonyms.
///
/// Variants are ordered by precedence: a classifier reports the first one that holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    CaseInsensitive,
    Fuzzy,
    #[default]
    Unknown,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact_match",
            MatchType::CaseInsensitive => "case_insensitive_match",
            MatchType::Fuzzy => "fuzzy_match",
            MatchType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entity occurrence per (document, term) after merging its mentions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedRow {
    pub document_id: String,
    pub object_id: String,
    pub preferred_term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_category: Option<String>,
    pub matched_terms: Vec<String>,
    pub span_start: usize,
    pub span_end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence: Option<String>,
    #[serde(default)]
    pub match_type: MatchType,
    pub levenshtein_distance: usize,
    /// Jaccard distance between retained surface form and preferred term.
    #[serde(default)]
    pub jaccard_index: f64,
    #[serde(default)]
    pub monge_elkan: f64,
    /// Jaccard similarity between the retained surface form and its sentence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_sentence_similarity: Option<f64>,
    pub mention_count: usize,
    #[serde(default)]
    pub unresolved: bool,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl ConsolidatedRow {
    /// Surface form chosen to represent the row.
    pub fn primary_term(&self) -> &str {
        self.matched_terms.first().map(String::as_str).unwrap_or(&self.preferred_term)
    }

    /// Turn the row back into raw mentions, one per retained surface form,
    /// so consolidation can be re-applied to its own output.
    pub fn to_mentions(&self) -> Vec<Mention> {
        self.matched_terms
            .iter()
            .map(|surface| Mention {
                document_id: self.document_id.clone(),
                span_start: self.span_start,
                span_end: self.span_end,
                matched_text: surface.clone(),
                candidate_id: self.object_id.clone(),
                confidence: None,
                extra: self.extra.clone(),
            })
            .collect()
    }
}

/// Derived `is-a` relation from a matched term to one of its ancestors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AncestorEdge {
    pub subject_id: String,
    pub predicate: String,
    pub object_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_label: Option<String>,
    pub provenance: String,
}

/// A row of the final output table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "row_type", rename_all = "snake_case")]
pub enum OutputRow {
    Entity(ConsolidatedRow),
    Ancestor(AncestorEdge),
}

impl OutputRow {
    pub fn document_id(&self) -> &str {
        match self {
            OutputRow::Entity(row) => &row.document_id,
            OutputRow::Ancestor(edge) => &edge.provenance,
        }
    }

    pub fn as_entity(&self) -> Option<&ConsolidatedRow> {
        match self {
            OutputRow::Entity(row) => Some(row),
            OutputRow::Ancestor(_) => None,
        }
    }
}

/// Per-term document statistic over the corpus in scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusStats {
    pub term_id: String,
    pub document_count: usize,
    pub total_documents: usize,
    pub ratio: f64,
}
