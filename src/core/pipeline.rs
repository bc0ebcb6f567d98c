use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Configuration;
use crate::core::consolidator::RowConsolidator;
use crate::core::expander::AncestorExpander;
use crate::core::rows::{ConsolidatedRow, CorpusStats, Mention, OutputRow};
use crate::core::scorer;
use crate::core::sentence::SentenceExtractor;
use crate::core::similarity;
use crate::error::{PipelineError, PipelineWarning, Result};
use crate::handlers::DocumentStore;
use crate::ontology::{OntologyGraph, Term};

#[derive(Debug, Clone)]
pub struct DocumentResult {
    pub document_id: String,
    pub rows: Vec<OutputRow>,
    pub warnings: Vec<PipelineWarning>,
    pub processing_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub config_name: String,
    pub started_at: DateTime<Utc>,
    pub total_documents: usize,
    pub documents_processed: usize,
    pub documents_skipped: usize,
    #[serde(default)]
    pub skipped_documents: Vec<String>,
    pub unresolved_terms: usize,
    pub degraded_extractions: usize,
    pub entity_rows: usize,
    pub ancestor_edges: usize,
    pub processing_time_seconds: f64,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f,
            "Run Summary ({}):\n\
             Corpus Documents: {}\n\
             Documents Processed: {}\n\
             Documents Skipped: {}\n\
             Unresolved Terms: {}\n\
             Degraded Sentence Extractions: {}\n\
             Entity Rows: {}\n\
             Ancestor Edges: {}\n\
             Processing Time: {:.2}s",
            self.run_id,
            self.total_documents,
            self.documents_processed,
            self.documents_skipped,
            self.unresolved_terms,
            self.degraded_extractions,
            self.entity_rows,
            self.ancestor_edges,
            self.processing_time_seconds
        )
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub rows: Vec<OutputRow>,
    pub object_stats: BTreeMap<String, CorpusStats>,
    pub matched_term_stats: BTreeMap<String, CorpusStats>,
    pub warnings: Vec<PipelineWarning>,
    pub summary: RunSummary,
}

impl PipelineOutput {
    pub fn entity_rows(&self) -> impl Iterator<Item = &ConsolidatedRow> {
        self.rows.iter().filter_map(OutputRow::as_entity)
    }
}

enum WorkerOutcome {
    Done(DocumentResult),
    Skipped { document_id: String },
    Cancelled,
}

/// Runs consolidation, sentence extraction and ancestor expansion per document
/// on a worker pool, then scores the merged rows.
pub struct PostProcessor {
    config: Configuration,
    ontology: Arc<dyn OntologyGraph>,
    sentence_extractor: SentenceExtractor,
    progress: Option<ProgressBar>,
}

impl PostProcessor {
    pub fn new(config: Configuration, ontology: Arc<dyn OntologyGraph>) -> Self {
        let sentence_extractor = SentenceExtractor::new(&config.sentence, &config.synonym_filter);
        Self {
            config,
            ontology,
            sentence_extractor,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Process every document that has mentions and score the merged output.
    ///
    /// Results keep the order in which documents first appear in `mentions`.
    /// `cancel` is checked before each document starts.
    pub fn run(
        &self,
        mentions: Vec<Mention>,
        documents: &DocumentStore,
        cancel: &AtomicBool,
    ) -> Result<PipelineOutput> {
        let start_time = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();

        let groups = group_by_document(mentions);
        info!(
            "Run {} starting: {} documents with mentions, {} loaded documents",
            run_id,
            groups.len(),
            documents.len()
        );

        if let Some(progress) = &self.progress {
            progress.set_length(groups.len() as u64);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.pipeline.workers)
            .build()
            .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;

        let outcomes: Vec<WorkerOutcome> = pool.install(|| {
            groups
                .par_iter()
                .map(|(document_id, doc_mentions)| {
                    if cancel.load(Ordering::Relaxed) {
                        return Ok(WorkerOutcome::Cancelled);
                    }

                    let outcome =
                        match self.process_document(document_id, doc_mentions, documents.get(document_id)) {
                            Ok(result) => Ok(WorkerOutcome::Done(result)),
                            Err(e) if e.is_document_scoped() => {
                                warn!("Skipping document {}: {}", document_id, e);
                                Ok(WorkerOutcome::Skipped {
                                    document_id: document_id.clone(),
                                })
                            }
                            Err(e) => Err(e),
                        };

                    if let Some(progress) = &self.progress {
                        progress.inc(1);
                    }
                    outcome
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut rows = Vec::new();
        let mut warnings = Vec::new();
        let mut skipped_documents = Vec::new();
        let mut processed = 0;
        let mut cancelled = false;

        for outcome in outcomes {
            match outcome {
                WorkerOutcome::Done(result) => {
                    processed += 1;
                    rows.extend(result.rows);
                    warnings.extend(result.warnings);
                }
                WorkerOutcome::Skipped { document_id } => skipped_documents.push(document_id),
                WorkerOutcome::Cancelled => cancelled = true,
            }
        }

        if cancelled {
            let completed = processed + skipped_documents.len();
            warn!("Run {} cancelled after {} documents", run_id, completed);
            return Err(PipelineError::Cancelled { completed });
        }

        let total_documents = self
            .config
            .pipeline
            .total_documents
            .unwrap_or_else(|| documents.len());

        let entity_rows: Vec<ConsolidatedRow> =
            rows.iter().filter_map(OutputRow::as_entity).cloned().collect();
        let object_stats = scorer::score(&entity_rows, total_documents)?;
        let matched_term_stats = scorer::score_matched_terms(&entity_rows, total_documents)?;

        let unresolved_terms = warnings
            .iter()
            .filter(|w| matches!(w, PipelineWarning::UnresolvedTerm { .. }))
            .count();
        let degraded_extractions = warnings
            .iter()
            .filter(|w| matches!(w, PipelineWarning::SentenceExtractionDegraded { .. }))
            .count();

        let summary = RunSummary {
            run_id,
            config_name: self.config.name.clone(),
            started_at,
            total_documents,
            documents_processed: processed,
            documents_skipped: skipped_documents.len(),
            skipped_documents,
            unresolved_terms,
            degraded_extractions,
            entity_rows: entity_rows.len(),
            ancestor_edges: rows.len() - entity_rows.len(),
            processing_time_seconds: start_time.elapsed().as_secs_f64(),
        };

        info!(
            "Run {} completed: {} rows ({} entities, {} ancestor edges) in {:.2}s",
            summary.run_id,
            rows.len(),
            summary.entity_rows,
            summary.ancestor_edges,
            summary.processing_time_seconds
        );

        Ok(PipelineOutput {
            rows,
            object_stats,
            matched_term_stats,
            warnings,
            summary,
        })
    }

    /// Consolidate, attach sentences and expand ancestors for one document.
    pub fn process_document(
        &self,
        document_id: &str,
        mentions: &[Mention],
        text: Option<&str>,
    ) -> Result<DocumentResult> {
        let start_time = Instant::now();

        let text = text.ok_or_else(|| PipelineError::DocumentUnavailable {
            document_id: document_id.to_string(),
            reason: "no text loaded for document".to_string(),
        })?;

        let consolidation = RowConsolidator::new(self.ontology.as_ref(), &self.config.synonym_filter)
            .consolidate(mentions);
        let mut warnings = consolidation.warnings;
        let mut rows = consolidation.rows;

        for row in &mut rows {
            let term = if row.unresolved {
                None
            } else {
                self.ontology.term(&row.object_id)
            };

            let extraction = {
                let labels = labels_for(row, term.as_ref());
                self.sentence_extractor
                    .extract(text, row.span_start, row.span_end, &labels)
            };

            if let Some(reason) = extraction.degraded {
                debug!(
                    "Sentence extraction degraded for {} in {}: {}",
                    row.object_id, document_id, reason
                );
                warnings.push(PipelineWarning::SentenceExtractionDegraded {
                    document_id: document_id.to_string(),
                    object_id: row.object_id.clone(),
                    reason,
                });
            }

            row.object_sentence_similarity = Some(similarity::jaccard_similarity(
                &row.primary_term().to_lowercase(),
                &extraction.sentence.to_lowercase(),
            ));
            row.sentence = Some(extraction.sentence);
            row.match_type = extraction.match_type;
        }

        let rows = AncestorExpander::new(self.ontology.as_ref(), &self.config.ontology.ancestor_predicate)
            .expand(rows, self.config.pipeline.need_ancestors)?;

        let processing_time = start_time.elapsed().as_secs_f64();
        debug!(
            "Document {} processed: {} mentions -> {} rows in {:.3}s",
            document_id,
            mentions.len(),
            rows.len(),
            processing_time
        );

        Ok(DocumentResult {
            document_id: document_id.to_string(),
            rows,
            warnings,
            processing_time_seconds: processing_time,
        })
    }
}

fn labels_for<'r>(row: &'r ConsolidatedRow, term: Option<&'r Term>) -> Vec<&'r str> {
    match term {
        Some(term) => std::iter::once(term.preferred_label.as_str())
            .chain(term.synonyms.iter().map(String::as_str))
            .filter(|label| !label.is_empty())
            .collect(),
        None => vec![row.preferred_term.as_str()],
    }
}

fn group_by_document(mentions: Vec<Mention>) -> Vec<(String, Vec<Mention>)> {
    let mut groups: Vec<(String, Vec<Mention>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for mention in mentions {
        match index.get(&mention.document_id) {
            Some(&slot) => groups[slot].1.push(mention),
            None => {
                index.insert(mention.document_id.clone(), groups.len());
                groups.push((mention.document_id.clone(), vec![mention]));
            }
        }
    }

    groups
}
