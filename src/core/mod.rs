pub mod rows;
pub mod consolidator;
pub mod sentence;
pub mod expander;
pub mod scorer;
pub mod similarity;
pub mod pipeline;

pub use rows::{AncestorEdge, ConsolidatedRow, CorpusStats, MatchType, Mention, OutputRow};
pub use consolidator::{Consolidation, RowConsolidator};
pub use sentence::{SentenceExtraction, SentenceExtractor};
pub use expander::AncestorExpander;
pub use pipeline::{PipelineOutput, PostProcessor, RunSummary};
