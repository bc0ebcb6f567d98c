use std::fs;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use ontology_ner_postprocess::config::{Configuration, OutputFormat};
use ontology_ner_postprocess::core::{MatchType, OutputRow, PostProcessor};
use ontology_ner_postprocess::handlers::{DocumentProcessor, MentionReader};
use ontology_ner_postprocess::ontology::KgxLoader;
use ontology_ner_postprocess::utils::{validate_output_rows, TableSerializer};
use tempfile::tempdir;

const NODES: &str = "id\tname\tcategory\tsynonym\n\
T1\tdiabetes\tbiolink:Disease\tdiabetes mellitus\n\
T0\tmetabolic disease\tbiolink:Disease\t\n";

const EDGES: &str = "subject\tpredicate\tobject\n\
T1\tbiolink:subclass_of\tT0\n\
T1\tbiolink:related_to\tT9\n";

const DOCUMENTS: &str = "id\ttext\n\
doc1\tDiabetes is common. Many adults have diabetes today.\n\
doc2\tWe studied diabetes in mice. Results were mixed.\n";

const MENTIONS: &str = "Document ID\tType\tStart Position\tEnd Position\tMatched Term\tEntity ID\tOrigin\n\
doc1\tbiolink:Disease\t37\t45\tdiabetes\tT1\tMONDO\n\
doc1\tbiolink:Disease\t0\t8\tDiabetes\tT1_SYNONYM\tMONDO\n\
doc2\tbiolink:Disease\t11\t19\tdiabetes\tT1\tMONDO\n";

#[tokio::test]
async fn test_mentions_to_scored_table() {
    let dir = tempdir().unwrap();
    let ontology_dir = dir.path().join("ontology");
    fs::create_dir(&ontology_dir).unwrap();
    fs::write(ontology_dir.join("mondo_nodes.tsv"), NODES).unwrap();
    fs::write(ontology_dir.join("mondo_edges.tsv"), EDGES).unwrap();
    fs::write(dir.path().join("corpus.tsv"), DOCUMENTS).unwrap();
    fs::write(dir.path().join("mentions.tsv"), MENTIONS).unwrap();

    let mut config = Configuration::default();
    config.pipeline.need_ancestors = true;
    config.pipeline.workers = 2;

    let ontology = KgxLoader::new(&config.ontology)
        .load_directory(&ontology_dir)
        .unwrap();
    let mentions = MentionReader::read(dir.path().join("mentions.tsv")).unwrap();
    let store = DocumentProcessor::new()
        .load_store(&dir.path().join("corpus.tsv"))
        .await
        .unwrap();
    assert_eq!(store.len(), 2);

    let processor = PostProcessor::new(config, Arc::new(ontology));
    let output = processor
        .run(mentions, &store, &AtomicBool::new(false))
        .unwrap();

    let entities: Vec<_> = output.entity_rows().collect();
    assert_eq!(entities.len(), 2);
    for entity in &entities {
        assert_eq!(entity.object_id, "T1");
        assert_eq!(entity.matched_terms, vec!["diabetes"]);
        assert_eq!(entity.object_category.as_deref(), Some("biolink:Disease"));
    }

    let doc1 = entities[0];
    assert_eq!(doc1.document_id, "doc1");
    assert_eq!(doc1.mention_count, 2);
    assert_eq!(doc1.sentence.as_deref(), Some("Many adults have diabetes today."));
    assert_eq!(doc1.match_type, MatchType::Exact);

    let edges: Vec<_> = output
        .rows
        .iter()
        .filter_map(|row| match row {
            OutputRow::Ancestor(edge) => Some(edge),
            OutputRow::Entity(_) => None,
        })
        .collect();
    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|e| e.object_id == "T0"));
    assert!(validate_output_rows(&output.rows).is_empty());

    let stats = &output.object_stats["T1"];
    assert_eq!(stats.document_count, 2);
    assert_eq!(stats.ratio, 1.0);
    assert_eq!(output.matched_term_stats["diabetes"].ratio, 1.0);
    assert_eq!(output.summary.documents_skipped, 0);

    let table = TableSerializer::new(OutputFormat::Tsv)
        .serialize_rows(&output)
        .unwrap();
    assert_eq!(table.lines().count(), 5);
    assert!(table.lines().next().unwrap().ends_with("\torigin"));
}
