use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::config::OutputFormat;
use crate::core::pipeline::{PipelineOutput, RunSummary};
use crate::core::rows::{ConsolidatedRow, CorpusStats, OutputRow};

const ROW_COLUMNS: &[&str] = &[
    "row_type",
    "document_id",
    "subject_id",
    "predicate",
    "object_id",
    "object_label",
    "object_category",
    "matched_terms",
    "span_start",
    "span_end",
    "mention_count",
    "match_type",
    "levenshtein_distance",
    "jaccard_index",
    "monge_elkan",
    "object_doc_ratio",
    "matched_term_doc_ratio",
    "unresolved",
    "sentence",
    "object_sentence_%",
];

const STATS_COLUMNS: &[&str] = &["stat_type", "term_id", "document_count", "total_documents", "ratio"];

const MULTI_VALUE_SEPARATOR: &str = " | ";

#[derive(Serialize)]
struct ScoredRow<'a> {
    #[serde(flatten)]
    row: &'a OutputRow,
    #[serde(skip_serializing_if = "Option::is_none")]
    object_doc_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    matched_term_doc_ratio: Option<f64>,
}

#[derive(Serialize)]
struct RowsReport<'a> {
    summary: &'a RunSummary,
    rows: Vec<ScoredRow<'a>>,
}

#[derive(Serialize)]
struct StatsReport<'a> {
    object: Vec<&'a CorpusStats>,
    matched_term: Vec<&'a CorpusStats>,
}

/// Writes the output table and the corpus statistics table.
pub struct TableSerializer {
    format: OutputFormat,
}

impl TableSerializer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn serialize_rows(&self, output: &PipelineOutput) -> Result<String> {
        match self.format {
            OutputFormat::Tsv => self.rows_tsv(output),
            OutputFormat::Json => self.rows_json(output),
        }
    }

    pub fn serialize_stats(&self, output: &PipelineOutput) -> Result<String> {
        match self.format {
            OutputFormat::Tsv => self.stats_tsv(output),
            OutputFormat::Json => {
                let report = StatsReport {
                    object: output.object_stats.values().collect(),
                    matched_term: output.matched_term_stats.values().collect(),
                };
                serde_json::to_string_pretty(&report).context("Failed to serialize statistics to JSON")
            }
        }
    }

    fn rows_json(&self, output: &PipelineOutput) -> Result<String> {
        let rows = output
            .rows
            .iter()
            .map(|row| {
                let (object_doc_ratio, matched_term_doc_ratio) = match row.as_entity() {
                    Some(entity) => ratios(entity, output),
                    None => (None, None),
                };
                ScoredRow {
                    row,
                    object_doc_ratio,
                    matched_term_doc_ratio,
                }
            })
            .collect();

        let report = RowsReport {
            summary: &output.summary,
            rows,
        };
        serde_json::to_string_pretty(&report).context("Failed to serialize rows to JSON")
    }

    fn rows_tsv(&self, output: &PipelineOutput) -> Result<String> {
        let extra_columns: BTreeSet<&str> = output
            .entity_rows()
            .flat_map(|row| row.extra.keys().map(String::as_str))
            .filter(|key| !ROW_COLUMNS.contains(key))
            .collect();

        let mut writer = tsv_writer();
        let header: Vec<&str> = ROW_COLUMNS.iter().copied().chain(extra_columns.iter().copied()).collect();
        writer.write_record(&header)?;

        for row in &output.rows {
            let mut record: Vec<String> = match row {
                OutputRow::Entity(entity) => {
                    let (object_ratio, term_ratio) = ratios(entity, output);
                    vec![
                        "entity".to_string(),
                        entity.document_id.clone(),
                        String::new(),
                        String::new(),
                        entity.object_id.clone(),
                        entity.preferred_term.clone(),
                        entity.object_category.clone().unwrap_or_default(),
                        entity.matched_terms.join(MULTI_VALUE_SEPARATOR),
                        entity.span_start.to_string(),
                        entity.span_end.to_string(),
                        entity.mention_count.to_string(),
                        entity.match_type.to_string(),
                        entity.levenshtein_distance.to_string(),
                        entity.jaccard_index.to_string(),
                        entity.monge_elkan.to_string(),
                        object_ratio.map(|r| r.to_string()).unwrap_or_default(),
                        term_ratio.map(|r| r.to_string()).unwrap_or_default(),
                        entity.unresolved.to_string(),
                        entity.sentence.as_deref().map(single_line).unwrap_or_default(),
                        entity
                            .object_sentence_similarity
                            .map(|s| s.to_string())
                            .unwrap_or_default(),
                    ]
                }
                OutputRow::Ancestor(edge) => {
                    let mut record = vec![String::new(); ROW_COLUMNS.len()];
                    record[0] = "ancestor".to_string();
                    record[1] = edge.provenance.clone();
                    record[2] = edge.subject_id.clone();
                    record[3] = edge.predicate.clone();
                    record[4] = edge.object_id.clone();
                    record[5] = edge.object_label.clone().unwrap_or_default();
                    record
                }
            };

            let extra = row.as_entity().map(|e| &e.extra);
            for column in &extra_columns {
                let value = extra
                    .and_then(|extra| extra.get(*column))
                    .map(|v| single_line(v))
                    .unwrap_or_default();
                record.push(value);
            }

            writer.write_record(&record)?;
        }

        into_string(writer)
    }

    fn stats_tsv(&self, output: &PipelineOutput) -> Result<String> {
        let mut writer = tsv_writer();
        writer.write_record(STATS_COLUMNS)?;

        let sections: [(&str, &BTreeMap<String, CorpusStats>); 2] = [
            ("object", &output.object_stats),
            ("matched_term", &output.matched_term_stats),
        ];
        for (stat_type, stats) in sections {
            for stat in stats.values() {
                writer.write_record([
                    stat_type.to_string(),
                    stat.term_id.clone(),
                    stat.document_count.to_string(),
                    stat.total_documents.to_string(),
                    stat.ratio.to_string(),
                ])?;
            }
        }

        into_string(writer)
    }
}

fn ratios(entity: &ConsolidatedRow, output: &PipelineOutput) -> (Option<f64>, Option<f64>) {
    let object_ratio = output.object_stats.get(&entity.object_id).map(|s| s.ratio);
    let term_ratio = output
        .matched_term_stats
        .get(&entity.primary_term().to_lowercase())
        .map(|s| s.ratio);
    (object_ratio, term_ratio)
}

fn tsv_writer() -> csv::Writer<Vec<u8>> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Never)
        .from_writer(Vec::new())
}

fn into_string(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer.into_inner().context("Failed to flush TSV output")?;
    String::from_utf8(bytes).context("TSV output is not valid UTF-8")
}

/// Tabs and line breaks would break the unquoted TSV layout.
fn single_line(value: &str) -> String {
    value
        .split(['\t', '\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Structural checks on an output table.
pub fn validate_output_rows(rows: &[OutputRow]) -> Vec<String> {
    let mut issues = Vec::new();
    let mut seen_entities: HashSet<(&str, &str)> = HashSet::new();
    let mut current_subject: Option<(&str, &str)> = None;

    for (i, row) in rows.iter().enumerate() {
        match row {
            OutputRow::Entity(entity) => {
                if entity.object_id.is_empty() {
                    issues.push(format!("Row {}: Empty object id", i));
                }
                if entity.matched_terms.is_empty() {
                    issues.push(format!("Row {}: No matched terms for {}", i, entity.object_id));
                }
                if entity.span_start > entity.span_end {
                    issues.push(format!(
                        "Row {}: Span start {} after span end {}",
                        i, entity.span_start, entity.span_end
                    ));
                }
                seen_entities.insert((entity.document_id.as_str(), entity.object_id.as_str()));
                current_subject = Some((entity.document_id.as_str(), entity.object_id.as_str()));
            }
            OutputRow::Ancestor(edge) => {
                if edge.predicate.is_empty() {
                    issues.push(format!("Row {}: Empty predicate", i));
                }
                if edge.object_id.is_empty() {
                    issues.push(format!("Row {}: Empty ancestor id", i));
                }
                if edge.subject_id == edge.object_id {
                    issues.push(format!("Row {}: {} is its own ancestor", i, edge.subject_id));
                }
                let key = (edge.provenance.as_str(), edge.subject_id.as_str());
                if current_subject != Some(key) {
                    if seen_entities.contains(&key) {
                        issues.push(format!("Row {}: Ancestor edge separated from its entity row", i));
                    } else {
                        issues.push(format!(
                            "Row {}: Ancestor edge for {} has no entity row in {}",
                            i, edge.subject_id, edge.provenance
                        ));
                    }
                }
            }
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rows::{AncestorEdge, MatchType};
    use chrono::Utc;

    fn entity(document_id: &str, object_id: &str, surface: &str) -> ConsolidatedRow {
        ConsolidatedRow {
            document_id: document_id.to_string(),
            object_id: object_id.to_string(),
            preferred_term: surface.to_lowercase(),
            object_category: Some("biolink:Disease".to_string()),
            matched_terms: vec![surface.to_string()],
            span_start: 0,
            span_end: surface.chars().count(),
            sentence: Some("Diabetes\tis common.\nReally.".to_string()),
            match_type: MatchType::CaseInsensitive,
            levenshtein_distance: 0,
            jaccard_index: 0.0,
            monge_elkan: 0.0,
            object_sentence_similarity: Some(0.25),
            mention_count: 2,
            unresolved: false,
            extra: BTreeMap::from([("origin".to_string(), "MONDO | HP".to_string())]),
        }
    }

    fn edge(document_id: &str, subject_id: &str, object_id: &str) -> OutputRow {
        OutputRow::Ancestor(AncestorEdge {
            subject_id: subject_id.to_string(),
            predicate: "biolink:subclass_of".to_string(),
            object_id: object_id.to_string(),
            object_label: Some("disease".to_string()),
            provenance: document_id.to_string(),
        })
    }

    fn stat(term_id: &str, ratio: f64) -> (String, CorpusStats) {
        (
            term_id.to_string(),
            CorpusStats {
                term_id: term_id.to_string(),
                document_count: 1,
                total_documents: 2,
                ratio,
            },
        )
    }

    fn output() -> PipelineOutput {
        PipelineOutput {
            rows: vec![OutputRow::Entity(entity("doc1", "T:2", "Diabetes")), edge("doc1", "T:2", "T:1")],
            object_stats: BTreeMap::from([stat("T:2", 0.5)]),
            matched_term_stats: BTreeMap::from([stat("diabetes", 0.5)]),
            warnings: Vec::new(),
            summary: RunSummary {
                run_id: "run".to_string(),
                config_name: "test".to_string(),
                started_at: Utc::now(),
                total_documents: 2,
                documents_processed: 1,
                documents_skipped: 0,
                skipped_documents: Vec::new(),
                unresolved_terms: 0,
                degraded_extractions: 0,
                entity_rows: 1,
                ancestor_edges: 1,
                processing_time_seconds: 0.0,
            },
        }
    }

    #[test]
    fn test_tsv_rows_carry_ratios_and_extra_columns() {
        let tsv = TableSerializer::new(OutputFormat::Tsv).serialize_rows(&output()).unwrap();
        let lines: Vec<&str> = tsv.lines().collect();
        assert_eq!(lines.len(), 3);

        let header: Vec<&str> = lines[0].split('\t').collect();
        assert_eq!(header.last(), Some(&"origin"));

        let entity: Vec<&str> = lines[1].split('\t').collect();
        assert_eq!(entity.len(), header.len());
        assert_eq!(entity[0], "entity");
        assert_eq!(entity[13], "0");
        assert_eq!(entity[15], "0.5");
        assert_eq!(entity[16], "0.5");
        assert_eq!(entity[18], "Diabetes is common. Really.");
        assert_eq!(entity[19], "0.25");
        assert_eq!(entity[20], "MONDO | HP");

        let ancestor: Vec<&str> = lines[2].split('\t').collect();
        assert_eq!(ancestor[0], "ancestor");
        assert_eq!(ancestor[2], "T:2");
        assert_eq!(ancestor[4], "T:1");
        assert_eq!(ancestor[19], "");
        assert_eq!(ancestor[20], "");
    }

    #[test]
    fn test_json_rows_are_tagged() {
        let json = TableSerializer::new(OutputFormat::Json).serialize_rows(&output()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["summary"]["run_id"], "run");
        assert_eq!(value["rows"][0]["row_type"], "entity");
        assert_eq!(value["rows"][0]["object_doc_ratio"], 0.5);
        assert_eq!(value["rows"][1]["row_type"], "ancestor");
        assert!(value["rows"][1].get("object_doc_ratio").is_none());
    }

    #[test]
    fn test_stats_tsv() {
        let tsv = TableSerializer::new(OutputFormat::Tsv).serialize_stats(&output()).unwrap();
        let lines: Vec<&str> = tsv.lines().collect();
        assert_eq!(lines[0], "stat_type\tterm_id\tdocument_count\ttotal_documents\tratio");
        assert_eq!(lines[1], "object\tT:2\t1\t2\t0.5");
        assert_eq!(lines[2], "matched_term\tdiabetes\t1\t2\t0.5");
    }

    #[test]
    fn test_validate_output_rows() {
        let valid = output().rows;
        assert!(validate_output_rows(&valid).is_empty());

        let mut broken = entity("doc1", "T:3", "x");
        broken.matched_terms.clear();
        let rows = vec![
            OutputRow::Entity(broken),
            edge("doc1", "T:2", "T:1"),
            edge("doc1", "T:3", "T:3"),
        ];

        let issues = validate_output_rows(&rows);
        assert_eq!(issues.len(), 3);
        assert!(issues[0].contains("No matched terms"));
        assert!(issues[1].contains("has no entity row"));
        assert!(issues[2].contains("its own ancestor"));
    }
}
