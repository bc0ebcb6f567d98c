use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::config::SynonymFilterSettings;
use crate::core::rows::{ConsolidatedRow, MatchType, Mention};
use crate::core::similarity;
use crate::error::PipelineWarning;
use crate::ontology::{OntologyGraph, Term};

const EXTRA_SEPARATOR: &str = " | ";
const PREFERRED_FORM: &str = "preferred_form";

#[derive(Debug, Default)]
pub struct Consolidation {
    pub rows: Vec<ConsolidatedRow>,
    pub warnings: Vec<PipelineWarning>,
}

pub struct RowConsolidator<'a> {
    ontology: &'a dyn OntologyGraph,
    filter: &'a SynonymFilterSettings,
}

struct Group {
    document_id: String,
    object_id: String,
    term: Option<Term>,
    surfaces: Vec<String>,
    span: (usize, usize),
    confidence: Option<f32>,
    mention_count: usize,
    extra: BTreeMap<String, Vec<String>>,
}

impl<'a> RowConsolidator<'a> {
    pub fn new(ontology: &'a dyn OntologyGraph, filter: &'a SynonymFilterSettings) -> Self {
        Self { ontology, filter }
    }

    /// Merge mentions into one row per `(document_id, canonical object_id)`,
    /// in order of each group's first appearance.
    pub fn consolidate(&self, mentions: &[Mention]) -> Consolidation {
        let mut groups: Vec<Group> = Vec::new();
        let mut index: HashMap<(String, String), usize> = HashMap::new();
        let mut warnings = Vec::new();

        for mention in mentions {
            let term = self.ontology.resolve(&mention.candidate_id);
            let object_id = match &term {
                Some(term) => term.curie.clone(),
                None => mention.candidate_id.clone(),
            };

            let key = (mention.document_id.clone(), object_id.clone());
            let slot = match index.get(&key) {
                Some(&slot) => slot,
                None => {
                    if term.is_none() {
                        warn!(
                            "Unresolved term {} in document {}, keeping row flagged",
                            mention.candidate_id, mention.document_id
                        );
                        warnings.push(PipelineWarning::UnresolvedTerm {
                            document_id: mention.document_id.clone(),
                            candidate_id: mention.candidate_id.clone(),
                        });
                    }
                    groups.push(Group {
                        document_id: mention.document_id.clone(),
                        object_id,
                        term,
                        surfaces: Vec::new(),
                        span: (mention.span_start, mention.span_end),
                        confidence: mention.confidence,
                        mention_count: 0,
                        extra: BTreeMap::new(),
                    });
                    index.insert(key, groups.len() - 1);
                    groups.len() - 1
                }
            };

            let group = &mut groups[slot];
            group.mention_count += 1;

            if group.mention_count > 1 {
                if let Some(confidence) = mention.confidence {
                    if group.confidence.map_or(true, |best| confidence > best) {
                        group.span = (mention.span_start, mention.span_end);
                        group.confidence = Some(confidence);
                    }
                }
            }

            self.retain_surface(&mut group.surfaces, &mention.matched_text);

            for (key, value) in &mention.extra {
                let values = group.extra.entry(key.clone()).or_default();
                for part in value.split(EXTRA_SEPARATOR) {
                    if !part.is_empty() && !values.iter().any(|v| v == part) {
                        values.push(part.to_string());
                    }
                }
            }
        }

        debug!("Consolidated {} mentions into {} rows", mentions.len(), groups.len());

        Consolidation {
            rows: groups.into_iter().map(|group| self.finish(group)).collect(),
            warnings,
        }
    }

    fn retain_surface(&self, surfaces: &mut Vec<String>, candidate: &str) {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            return;
        }

        let duplicate = if self.filter.enabled {
            surfaces.iter().any(|kept| self.filter.collapses(kept, candidate))
        } else {
            surfaces.iter().any(|kept| kept == candidate)
        };

        if !duplicate {
            surfaces.push(candidate.to_string());
        }
    }

    fn finish(&self, group: Group) -> ConsolidatedRow {
        let Group {
            document_id,
            object_id,
            term,
            mut surfaces,
            span,
            mention_count,
            extra,
            ..
        } = group;

        if surfaces.is_empty() {
            // Every mention had a blank surface form; fall back to the term label.
            surfaces.push(
                term.as_ref()
                    .map(|t| t.preferred_label.clone())
                    .filter(|label| !label.is_empty())
                    .unwrap_or_else(|| object_id.clone()),
            );
        }

        // Unresolved rows fall back to the annotator's preferred form, then the surface.
        let preferred_term = term
            .as_ref()
            .map(|t| t.preferred_label.clone())
            .filter(|label| !label.is_empty())
            .or_else(|| {
                extra
                    .get(PREFERRED_FORM)
                    .and_then(|forms| forms.first())
                    .cloned()
            })
            .unwrap_or_else(|| surfaces[0].clone());

        let extra: BTreeMap<String, String> = extra
            .into_iter()
            .map(|(key, values)| (key, values.join(EXTRA_SEPARATOR)))
            .collect();

        let object_category = term
            .as_ref()
            .and_then(|t| t.category.clone())
            .or_else(|| extra.get("object_category").cloned());

        let surface = surfaces[0].to_lowercase();
        let preferred = preferred_term.to_lowercase();
        let levenshtein_distance = strsim::levenshtein(&surface, &preferred);
        let jaccard_index = similarity::jaccard_distance(&surface, &preferred);
        let monge_elkan = similarity::monge_elkan_distance(&surface, &preferred);

        ConsolidatedRow {
            document_id,
            object_id,
            preferred_term,
            object_category,
            matched_terms: surfaces,
            span_start: span.0,
            span_end: span.1,
            sentence: None,
            match_type: MatchType::Unknown,
            levenshtein_distance,
            jaccard_index,
            monge_elkan,
            object_sentence_similarity: None,
            mention_count,
            unresolved: term.is_none(),
            extra,
        }
    }
}
