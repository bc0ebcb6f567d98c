use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

pub mod kgx;

pub use kgx::KgxLoader;

/// An ontology concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Term {
    pub curie: String,
    pub preferred_label: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Term {
    pub fn new(curie: impl Into<String>, preferred_label: impl Into<String>) -> Self {
        Self {
            curie: curie.into(),
            preferred_label: preferred_label.into(),
            synonyms: Vec::new(),
            category: None,
        }
    }

    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Read-only access to a term hierarchy.
///
/// Implementors only need parent and term lookups; ancestor traversal and
/// candidate resolution are provided on top of them.
pub trait OntologyGraph: Send + Sync {
    /// Direct parents of a term, or `None` when the identifier is unknown.
    fn parents(&self, term_id: &str) -> Option<Vec<String>>;

    fn term(&self, term_id: &str) -> Option<Term>;

    /// Suffix the term list appends to synonym entries of a curie.
    fn synonym_suffix(&self) -> &str {
        "_SYNONYM"
    }

    fn canonical_id<'a>(&self, candidate_id: &'a str) -> &'a str {
        let suffix = self.synonym_suffix();
        if suffix.is_empty() {
            return candidate_id;
        }
        candidate_id.strip_suffix(suffix).unwrap_or(candidate_id)
    }

    fn resolve(&self, candidate_id: &str) -> Option<Term> {
        self.term(self.canonical_id(candidate_id))
    }

    /// Transitive ancestors of `term_id`, nearest first, each listed once.
    ///
    /// Fails with [`PipelineError::MalformedGraph`] when a parent chain loops
    /// back onto the path being walked.
    fn get_ancestors(&self, term_id: &str) -> Result<Vec<String>> {
        let Some(root_parents) = self.parents(term_id) else {
            warn!("Unknown ontology term {}, no ancestors returned", term_id);
            return Ok(Vec::new());
        };

        struct Frame {
            node: String,
            parents: Vec<String>,
            next: usize,
        }

        let mut ancestors = Vec::new();
        let mut finished: HashSet<String> = HashSet::new();
        let mut on_path: HashSet<String> = HashSet::new();
        on_path.insert(term_id.to_string());

        let mut stack = vec![Frame {
            node: term_id.to_string(),
            parents: root_parents,
            next: 0,
        }];

        loop {
            let step = match stack.last_mut() {
                None => break,
                Some(frame) if frame.next < frame.parents.len() => {
                    let parent = frame.parents[frame.next].clone();
                    frame.next += 1;
                    Some((frame.node.clone(), parent))
                }
                Some(_) => None,
            };

            match step {
                Some((child, parent)) => {
                    if on_path.contains(&parent) {
                        return Err(PipelineError::MalformedGraph(format!(
                            "cycle detected while walking ancestors of {}: {} -> {}",
                            term_id, child, parent
                        )));
                    }
                    if finished.contains(&parent) {
                        continue;
                    }
                    ancestors.push(parent.clone());
                    on_path.insert(parent.clone());
                    let grandparents = self.parents(&parent).unwrap_or_default();
                    stack.push(Frame {
                        node: parent,
                        parents: grandparents,
                        next: 0,
                    });
                }
                None => {
                    if let Some(frame) = stack.pop() {
                        on_path.remove(&frame.node);
                        finished.insert(frame.node);
                    }
                }
            }
        }

        debug!("Found {} ancestors for {}", ancestors.len(), term_id);
        Ok(ancestors)
    }
}

/// Ontology held entirely in memory: a term table plus child → parent edges.
#[derive(Debug, Clone)]
pub struct InMemoryOntology {
    terms: HashMap<String, Term>,
    parents: HashMap<String, Vec<String>>,
    synonym_suffix: String,
}

impl Default for InMemoryOntology {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryOntology {
    pub fn new() -> Self {
        Self {
            terms: HashMap::new(),
            parents: HashMap::new(),
            synonym_suffix: "_SYNONYM".to_string(),
        }
    }

    pub fn with_synonym_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.synonym_suffix = suffix.into();
        self
    }

    /// Insert a term; a later term with the same curie merges synonyms and
    /// keeps the first non-empty label.
    pub fn add_term(&mut self, term: Term) {
        match self.terms.get_mut(&term.curie) {
            Some(existing) => {
                if existing.preferred_label.is_empty() {
                    existing.preferred_label = term.preferred_label;
                }
                if existing.category.is_none() {
                    existing.category = term.category;
                }
                for synonym in term.synonyms {
                    if !existing.synonyms.contains(&synonym) {
                        existing.synonyms.push(synonym);
                    }
                }
            }
            None => {
                self.terms.insert(term.curie.clone(), term);
            }
        }
    }

    pub fn add_parent(&mut self, child: &str, parent: &str) {
        let parents = self.parents.entry(child.to_string()).or_default();
        if !parents.iter().any(|p| p == parent) {
            parents.push(parent.to_string());
        }
        self.parents.entry(parent.to_string()).or_default();
    }

    pub fn contains(&self, term_id: &str) -> bool {
        self.terms.contains_key(term_id) || self.parents.contains_key(term_id)
    }

    pub fn statistics(&self) -> OntologyStats {
        let nodes: HashSet<&String> = self.terms.keys().chain(self.parents.keys()).collect();
        let roots = nodes
            .iter()
            .filter(|id| self.parents.get(id.as_str()).map_or(true, Vec::is_empty))
            .count();

        OntologyStats {
            total_terms: self.terms.len(),
            total_nodes: nodes.len(),
            subclass_edges: self.parents.values().map(Vec::len).sum(),
            root_nodes: roots,
        }
    }
}

impl OntologyGraph for InMemoryOntology {
    fn parents(&self, term_id: &str) -> Option<Vec<String>> {
        match self.parents.get(term_id) {
            Some(parents) => Some(parents.clone()),
            None if self.terms.contains_key(term_id) => Some(Vec::new()),
            None => None,
        }
    }

    fn term(&self, term_id: &str) -> Option<Term> {
        self.terms.get(term_id).cloned()
    }

    fn synonym_suffix(&self) -> &str {
        &self.synonym_suffix
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyStats {
    pub total_terms: usize,
    pub total_nodes: usize,
    pub subclass_edges: usize,
    pub root_nodes: usize,
}

impl std::fmt::Display for OntologyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f,
            "Ontology Statistics:\n\
             Labelled Terms: {}\n\
             Hierarchy Nodes: {}\n\
             Subclass Edges: {}\n\
             Root Nodes: {}",
            self.total_terms,
            self.total_nodes,
            self.subclass_edges,
            self.root_nodes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> InMemoryOntology {
        let mut ont = InMemoryOntology::new();
        ont.add_term(Term::new("MONDO:3", "type 2 diabetes"));
        ont.add_term(Term::new("MONDO:2", "diabetes mellitus"));
        ont.add_term(Term::new("MONDO:1", "disease"));
        ont.add_parent("MONDO:3", "MONDO:2");
        ont.add_parent("MONDO:2", "MONDO:1");
        ont
    }

    #[test]
    fn test_ancestors_of_chain_nearest_first() {
        let ont = chain();
        assert_eq!(ont.get_ancestors("MONDO:3").unwrap(), vec!["MONDO:2", "MONDO:1"]);
        assert_eq!(ont.get_ancestors("MONDO:2").unwrap(), vec!["MONDO:1"]);
    }

    #[test]
    fn test_root_and_unknown_terms_have_no_ancestors() {
        let ont = chain();
        assert!(ont.get_ancestors("MONDO:1").unwrap().is_empty());
        assert!(ont.get_ancestors("NOPE:42").unwrap().is_empty());
    }

    #[test]
    fn test_three_node_cycle_is_malformed() {
        let mut ont = InMemoryOntology::new();
        ont.add_parent("A", "B");
        ont.add_parent("B", "C");
        ont.add_parent("C", "A");

        match ont.get_ancestors("A") {
            Err(PipelineError::MalformedGraph(msg)) => assert!(msg.contains("cycle")),
            other => panic!("expected MalformedGraph, got {:?}", other),
        }
    }

    #[test]
    fn test_self_loop_is_malformed() {
        let mut ont = InMemoryOntology::new();
        ont.add_parent("A", "A");
        assert!(matches!(ont.get_ancestors("A"), Err(PipelineError::MalformedGraph(_))));
    }

    #[test]
    fn test_diamond_lists_shared_ancestor_once() {
        let mut ont = InMemoryOntology::new();
        ont.add_parent("D", "B");
        ont.add_parent("D", "C");
        ont.add_parent("B", "A");
        ont.add_parent("C", "A");

        let ancestors = ont.get_ancestors("D").unwrap();
        assert_eq!(ancestors, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_resolve_strips_synonym_suffix() {
        let ont = chain();
        let term = ont.resolve("MONDO:2_SYNONYM").unwrap();
        assert_eq!(term.preferred_label, "diabetes mellitus");
        assert!(ont.resolve("MONDO:999").is_none());
    }

    #[test]
    fn test_add_term_merges_synonyms() {
        let mut ont = InMemoryOntology::new();
        ont.add_term(Term::new("X:1", "neoplasm").with_synonyms(["tumor"]));
        ont.add_term(Term::new("X:1", "").with_synonyms(["tumor", "tumour"]));

        let term = ont.term("X:1").unwrap();
        assert_eq!(term.preferred_label, "neoplasm");
        assert_eq!(term.synonyms, vec!["tumor", "tumour"]);
    }

    #[test]
    fn test_statistics() {
        let stats = chain().statistics();
        assert_eq!(stats.total_terms, 3);
        assert_eq!(stats.subclass_edges, 2);
        assert_eq!(stats.root_nodes, 1);
    }
}
