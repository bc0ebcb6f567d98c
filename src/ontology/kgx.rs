//! Loading of KGX node/edge TSV tables into an [`InMemoryOntology`].

use std::fs::File;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::OntologySettings;
use crate::error::{PipelineError, Result};
use crate::ontology::{InMemoryOntology, Term};

const NODES_SUFFIX: &str = "_nodes.tsv";
const EDGES_SUFFIX: &str = "_edges.tsv";

pub struct KgxLoader {
    hierarchy_predicates: Vec<String>,
    synonym_suffix: String,
}

impl KgxLoader {
    pub fn new(settings: &OntologySettings) -> Self {
        Self {
            hierarchy_predicates: settings.hierarchy_predicates.clone(),
            synonym_suffix: settings.synonym_suffix.clone(),
        }
    }

    /// Load one ontology from an edges table and an optional nodes table.
    pub fn load(&self, nodes: Option<&Path>, edges: &Path) -> Result<InMemoryOntology> {
        let mut ontology = InMemoryOntology::new().with_synonym_suffix(self.synonym_suffix.clone());

        if let Some(nodes) = nodes {
            self.read_nodes(nodes, &mut ontology)?;
        }
        self.read_edges(edges, &mut ontology)?;

        let stats = ontology.statistics();
        info!(
            "Ontology loaded from {}: {} terms, {} subclass edges",
            edges.display(),
            stats.total_terms,
            stats.subclass_edges
        );
        Ok(ontology)
    }

    /// Load every `<name>_nodes.tsv` / `<name>_edges.tsv` table found under `dir`
    /// into a single merged ontology.
    pub fn load_directory(&self, dir: &Path) -> Result<InMemoryOntology> {
        let mut ontology = InMemoryOntology::new().with_synonym_suffix(self.synonym_suffix.clone());
        let mut node_files = Vec::new();
        let mut edge_files = Vec::new();

        for entry in WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                PipelineError::MalformedGraph(format!("cannot read ontology directory {}: {}", dir.display(), e))
            })?;
            let name = entry.file_name().to_string_lossy();
            if name.ends_with(NODES_SUFFIX) {
                node_files.push(entry.path().to_path_buf());
            } else if name.ends_with(EDGES_SUFFIX) {
                edge_files.push(entry.path().to_path_buf());
            }
        }

        if edge_files.is_empty() {
            return Err(PipelineError::MalformedGraph(format!(
                "no *{} tables found in {}",
                EDGES_SUFFIX,
                dir.display()
            )));
        }

        for path in &node_files {
            self.read_nodes(path, &mut ontology)?;
        }
        for path in &edge_files {
            self.read_edges(path, &mut ontology)?;
        }

        let stats = ontology.statistics();
        info!(
            "Ontology directory {} loaded: {} node tables, {} edge tables, {} terms, {} subclass edges",
            dir.display(),
            node_files.len(),
            edge_files.len(),
            stats.total_terms,
            stats.subclass_edges
        );
        Ok(ontology)
    }

    fn read_nodes(&self, path: &Path, ontology: &mut InMemoryOntology) -> Result<usize> {
        let mut reader = tsv_reader(path)?;
        let headers = reader.headers()?.clone();

        let id_col = required_column(&headers, "id", path)?;
        let name_col = column(&headers, "name");
        let category_col = column(&headers, "category");
        let synonym_col = column(&headers, "synonym");

        let mut count = 0;
        for record in reader.records() {
            let record = record?;
            let id = record.get(id_col).unwrap_or("").trim();
            if id.is_empty() {
                continue;
            }

            let name = name_col.and_then(|c| record.get(c)).unwrap_or("").trim();
            let mut term = Term::new(id, name);

            if let Some(category) = category_col
                .and_then(|c| record.get(c))
                .and_then(|v| v.split('|').map(str::trim).find(|s| !s.is_empty()))
            {
                term = term.with_category(category);
            }

            if let Some(synonyms) = synonym_col.and_then(|c| record.get(c)) {
                term = term.with_synonyms(
                    synonyms.split('|').map(str::trim).filter(|s| !s.is_empty()),
                );
            }

            ontology.add_term(term);
            count += 1;
        }

        debug!("Read {} nodes from {}", count, path.display());
        Ok(count)
    }

    fn read_edges(&self, path: &Path, ontology: &mut InMemoryOntology) -> Result<usize> {
        let mut reader = tsv_reader(path)?;
        let headers = reader.headers()?.clone();

        let subject_col = required_column(&headers, "subject", path)?;
        let predicate_col = required_column(&headers, "predicate", path)?;
        let object_col = required_column(&headers, "object", path)?;

        let mut count = 0;
        for record in reader.records() {
            let record = record?;
            let predicate = record.get(predicate_col).unwrap_or("").trim();
            if !self.hierarchy_predicates.iter().any(|p| p == predicate) {
                continue;
            }

            let subject = record.get(subject_col).unwrap_or("").trim();
            let object = record.get(object_col).unwrap_or("").trim();
            if subject.is_empty() || object.is_empty() {
                continue;
            }

            ontology.add_parent(subject, object);
            count += 1;
        }

        debug!("Read {} hierarchy edges from {}", count, path.display());
        Ok(count)
    }
}

fn tsv_reader(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path).map_err(|e| {
        PipelineError::MalformedGraph(format!("cannot open {}: {}", path.display(), e))
    })?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_reader(file))
}

fn column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn required_column(headers: &csv::StringRecord, name: &str, path: &Path) -> Result<usize> {
    column(headers, name).ok_or_else(|| {
        PipelineError::MalformedGraph(format!("{} has no '{}' column", path.display(), name))
    })
}
