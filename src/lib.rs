pub mod config;
pub mod core;
pub mod error;
pub mod handlers;
pub mod ontology;
pub mod utils;

pub use config::Configuration;
pub use core::{PipelineOutput, PostProcessor};
pub use error::{PipelineError, PipelineWarning};
pub use handlers::{DocumentProcessor, DocumentStore, MentionReader};
pub use ontology::{InMemoryOntology, KgxLoader, OntologyGraph, Term};
