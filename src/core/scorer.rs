use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::core::rows::{ConsolidatedRow, CorpusStats};
use crate::error::{PipelineError, Result};

/// Fraction of the corpus' documents in which each object id appears.
pub fn score(rows: &[ConsolidatedRow], total_documents: usize) -> Result<BTreeMap<String, CorpusStats>> {
    score_by(rows, total_documents, |row| vec![row.object_id.clone()])
}

/// Same statistic keyed by lower-cased retained surface form.
pub fn score_matched_terms(
    rows: &[ConsolidatedRow],
    total_documents: usize,
) -> Result<BTreeMap<String, CorpusStats>> {
    score_by(rows, total_documents, |row| {
        row.matched_terms.iter().map(|t| t.to_lowercase()).collect()
    })
}

fn score_by<F>(rows: &[ConsolidatedRow], total_documents: usize, keys: F) -> Result<BTreeMap<String, CorpusStats>>
where
    F: Fn(&ConsolidatedRow) -> Vec<String>,
{
    let observed: HashSet<&str> = rows.iter().map(|r| r.document_id.as_str()).collect();
    if total_documents == 0 || total_documents < observed.len() {
        return Err(PipelineError::InvalidCorpusSize {
            total: total_documents,
            observed: observed.len(),
        });
    }

    let mut documents: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for row in rows {
        for key in keys(row) {
            documents.entry(key).or_default().insert(row.document_id.as_str());
        }
    }

    Ok(documents
        .into_iter()
        .map(|(term_id, docs)| {
            let stats = CorpusStats {
                term_id: term_id.clone(),
                document_count: docs.len(),
                total_documents,
                ratio: docs.len() as f64 / total_documents as f64,
            };
            (term_id, stats)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rows::MatchType;
    use std::collections::BTreeMap as Map;

    fn row(document_id: &str, object_id: &str, surface: &str) -> ConsolidatedRow {
        ConsolidatedRow {
            document_id: document_id.to_string(),
            object_id: object_id.to_string(),
            preferred_term: surface.to_string(),
            object_category: None,
            matched_terms: vec![surface.to_string()],
            span_start: 0,
            span_end: surface.chars().count(),
            sentence: None,
            match_type: MatchType::Unknown,
            levenshtein_distance: 0,
            jaccard_index: 0.0,
            monge_elkan: 0.0,
            object_sentence_similarity: None,
            mention_count: 1,
            unresolved: false,
            extra: Map::new(),
        }
    }

    #[test]
    fn test_counts_distinct_documents() {
        let rows = vec![
            row("doc1", "T1", "diabetes"),
            row("doc1", "T1", "Diabetes"),
            row("doc2", "T1", "diabetes"),
            row("doc2", "T2", "insulin"),
        ];

        let stats = score(&rows, 4).unwrap();
        assert_eq!(stats["T1"].document_count, 2);
        assert_eq!(stats["T1"].ratio, 0.5);
        assert_eq!(stats["T2"].ratio, 0.25);
    }

    #[test]
    fn test_ratio_bounds() {
        let rows = vec![
            row("doc1", "T1", "a"),
            row("doc2", "T1", "a"),
            row("doc2", "T2", "b"),
        ];

        let stats = score(&rows, 2).unwrap();
        for s in stats.values() {
            assert!(s.ratio > 0.0 && s.ratio <= 1.0);
        }
        assert_eq!(stats["T1"].ratio, 1.0);
        assert!(stats["T2"].ratio < 1.0);
    }

    #[test]
    fn test_invalid_corpus_sizes() {
        let rows = vec![row("doc1", "T1", "a"), row("doc2", "T1", "a")];

        assert!(matches!(
            score(&rows, 0),
            Err(PipelineError::InvalidCorpusSize { total: 0, .. })
        ));
        assert!(matches!(
            score(&rows, 1),
            Err(PipelineError::InvalidCorpusSize { total: 1, observed: 2 })
        ));
    }

    #[test]
    fn test_matched_terms_are_case_folded() {
        let rows = vec![row("doc1", "T1", "Diabetes"), row("doc2", "T1", "diabetes")];

        let stats = score_matched_terms(&rows, 2).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats["diabetes"].document_count, 2);
    }
}
