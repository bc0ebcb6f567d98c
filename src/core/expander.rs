use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::core::rows::{AncestorEdge, ConsolidatedRow, OutputRow};
use crate::error::Result;
use crate::ontology::OntologyGraph;

pub struct AncestorExpander<'a> {
    ontology: &'a dyn OntologyGraph,
    predicate: &'a str,
}

impl<'a> AncestorExpander<'a> {
    pub fn new(ontology: &'a dyn OntologyGraph, predicate: &'a str) -> Self {
        Self { ontology, predicate }
    }

    /// Emit each row followed by one edge per transitive ancestor of its term.
    ///
    /// Edges for a `(document_id, object_id)` pair are emitted once, after the
    /// first row carrying that pair. Unresolved rows get no edges.
    pub fn expand(&self, rows: Vec<ConsolidatedRow>, need_ancestors: bool) -> Result<Vec<OutputRow>> {
        if !need_ancestors {
            return Ok(rows.into_iter().map(OutputRow::Entity).collect());
        }

        let mut cache: HashMap<String, Vec<String>> = HashMap::new();
        let mut expanded: HashSet<(String, String)> = HashSet::new();
        let mut output = Vec::with_capacity(rows.len());
        let mut edge_count = 0;

        for row in rows {
            let key = (row.document_id.clone(), row.object_id.clone());
            let needs_edges = !row.unresolved && expanded.insert(key);

            let ancestors = if needs_edges {
                if !cache.contains_key(&row.object_id) {
                    let ancestors = self.ontology.get_ancestors(&row.object_id)?;
                    cache.insert(row.object_id.clone(), ancestors);
                }
                cache.get(&row.object_id).cloned().unwrap_or_default()
            } else {
                Vec::new()
            };

            let subject_id = row.object_id.clone();
            let provenance = row.document_id.clone();
            output.push(OutputRow::Entity(row));

            for ancestor in ancestors {
                let object_label = self
                    .ontology
                    .term(&ancestor)
                    .map(|t| t.preferred_label)
                    .filter(|label| !label.is_empty());

                output.push(OutputRow::Ancestor(AncestorEdge {
                    subject_id: subject_id.clone(),
                    predicate: self.predicate.to_string(),
                    object_id: ancestor,
                    object_label,
                    provenance: provenance.clone(),
                }));
                edge_count += 1;
            }
        }

        debug!("Expanded {} ancestor edges over {} cached terms", edge_count, cache.len());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SynonymFilterSettings;
    use crate::core::consolidator::RowConsolidator;
    use crate::core::rows::Mention;
    use crate::error::PipelineError;
    use crate::ontology::{InMemoryOntology, Term};

    fn ontology() -> InMemoryOntology {
        let mut ont = InMemoryOntology::new();
        ont.add_term(Term::new("T:3", "type 2 diabetes"));
        ont.add_term(Term::new("T:2", "diabetes"));
        ont.add_term(Term::new("T:1", "disease"));
        ont.add_term(Term::new("T:9", "metabolic disease"));
        ont.add_parent("T:3", "T:2");
        ont.add_parent("T:3", "T:9");
        ont.add_parent("T:2", "T:1");
        ont.add_parent("T:9", "T:1");
        ont
    }

    fn rows(ont: &InMemoryOntology, mentions: &[Mention]) -> Vec<ConsolidatedRow> {
        let filter = SynonymFilterSettings::default();
        RowConsolidator::new(ont, &filter).consolidate(mentions).rows
    }

    #[test]
    fn test_passthrough_without_ancestors() {
        let ont = ontology();
        let input = rows(&ont, &[Mention::new("doc1", 0, 5, "T2D", "T:3")]);
        let output = AncestorExpander::new(&ont, "biolink:subclass_of")
            .expand(input.clone(), false)
            .unwrap();

        assert_eq!(output, input.into_iter().map(OutputRow::Entity).collect::<Vec<_>>());
    }

    #[test]
    fn test_edges_follow_their_row_and_match_closure() {
        let ont = ontology();
        let input = rows(
            &ont,
            &[
                Mention::new("doc1", 0, 5, "T2D", "T:3"),
                Mention::new("doc1", 10, 18, "diabetes", "T:2"),
            ],
        );

        let output = AncestorExpander::new(&ont, "biolink:subclass_of")
            .expand(input, true)
            .unwrap();

        assert_eq!(output.len(), 2 + 3 + 1);
        assert!(matches!(&output[0], OutputRow::Entity(r) if r.object_id == "T:3"));

        let mut targets: Vec<String> = output[1..4]
            .iter()
            .map(|row| match row {
                OutputRow::Ancestor(edge) => {
                    assert_eq!(edge.subject_id, "T:3");
                    assert_eq!(edge.provenance, "doc1");
                    edge.object_id.clone()
                }
                other => panic!("expected edge, got {:?}", other),
            })
            .collect();
        targets.sort();
        assert_eq!(targets, vec!["T:1", "T:2", "T:9"]);

        assert!(matches!(&output[4], OutputRow::Entity(r) if r.object_id == "T:2"));
        match &output[5] {
            OutputRow::Ancestor(edge) => {
                assert_eq!(edge.object_id, "T:1");
                assert_eq!(edge.object_label.as_deref(), Some("disease"));
            }
            other => panic!("expected edge, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_row_pairs_are_expanded_once() {
        let ont = ontology();
        let mut input = rows(&ont, &[Mention::new("doc1", 0, 8, "diabetes", "T:2")]);
        input.push(input[0].clone());

        let output = AncestorExpander::new(&ont, "biolink:subclass_of")
            .expand(input, true)
            .unwrap();

        let edges = output.iter().filter(|r| r.as_entity().is_none()).count();
        assert_eq!(edges, 1);
    }

    #[test]
    fn test_root_and_unresolved_rows_have_no_edges() {
        let ont = ontology();
        let input = rows(
            &ont,
            &[
                Mention::new("doc1", 0, 7, "disease", "T:1"),
                Mention::new("doc1", 10, 15, "gizmo", "X:1"),
            ],
        );

        let output = AncestorExpander::new(&ont, "biolink:subclass_of")
            .expand(input, true)
            .unwrap();
        assert_eq!(output.len(), 2);
    }

    #[test]
    fn test_cycle_aborts_expansion() {
        let mut ont = InMemoryOntology::new();
        ont.add_term(Term::new("A", "a"));
        ont.add_parent("A", "B");
        ont.add_parent("B", "C");
        ont.add_parent("C", "A");

        let input = rows(&ont, &[Mention::new("doc1", 0, 1, "a", "A")]);
        let result = AncestorExpander::new(&ont, "biolink:subclass_of").expand(input, true);
        assert!(matches!(result, Err(PipelineError::MalformedGraph(_))));
    }
}
