use thiserror::Error;

/// Errors raised by the post-processing pipeline.
///
/// `MalformedGraph` and `InvalidCorpusSize` are structural and abort a run.
/// `DocumentUnavailable` is caught at the document-worker boundary and only
/// skips that document.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Malformed ontology graph: {0}")]
    MalformedGraph(String),

    #[error("Invalid corpus size: total_documents={total}, documents observed in rows={observed}")]
    InvalidCorpusSize { total: usize, observed: usize },

    #[error("Document {document_id} unavailable: {reason}")]
    DocumentUnavailable { document_id: String, reason: String },

    #[error("Run cancelled after {completed} documents")]
    Cancelled { completed: usize },

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Table error: {0}")]
    Csv(#[from] csv::Error),
}

impl PipelineError {
    /// Whether the error only affects the document being processed.
    pub fn is_document_scoped(&self) -> bool {
        matches!(self, PipelineError::DocumentUnavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Recoverable conditions collected during a run and reported in the summary.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    UnresolvedTerm {
        document_id: String,
        candidate_id: String,
    },
    SentenceExtractionDegraded {
        document_id: String,
        object_id: String,
        reason: String,
    },
}

impl std::fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineWarning::UnresolvedTerm { document_id, candidate_id } => {
                write!(f, "unresolved term {} in document {}", candidate_id, document_id)
            }
            PipelineWarning::SentenceExtractionDegraded { document_id, object_id, reason } => {
                write!(
                    f,
                    "sentence extraction degraded for {} in document {}: {}",
                    object_id, document_id, reason
                )
            }
        }
    }
}
