//! Reader for annotator mention tables (OGER-style TSV).
//!
//! Header names are lower-cased with spaces replaced by `_`, so both
//! `start position` and `start_position` are accepted. Columns that are not
//! part of the mention schema pass through into `Mention::extra`.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

use crate::core::rows::Mention;

const DOCUMENT_ID: &[&str] = &["document_id"];
const START: &[&str] = &["start_position", "start", "span_start"];
const END: &[&str] = &["end_position", "end", "span_end"];
const MATCHED_TEXT: &[&str] = &["matched_term", "matched_text"];
const CANDIDATE_ID: &[&str] = &["object_id", "entity_id", "candidate_id"];
const CONFIDENCE: &[&str] = &["confidence", "score"];

const PREFERRED_FORM: &str = "preferred_form";
const MATCH_FIELD: &str = "match_field";

/// Passthrough columns stored under a different key.
const RENAMED: &[(&str, &str)] = &[("type", "object_category")];

struct Columns {
    document_id: usize,
    start: usize,
    end: usize,
    matched_text: usize,
    candidate_id: usize,
    confidence: Option<usize>,
    extra: Vec<(usize, String)>,
}

impl Columns {
    fn from_headers(headers: &[String]) -> Result<Self> {
        let find = |aliases: &[&str]| headers.iter().position(|h| aliases.contains(&h.as_str()));
        let require = |aliases: &[&str]| {
            find(aliases).with_context(|| format!("Mention table has no '{}' column", aliases[0]))
        };

        let document_id = require(DOCUMENT_ID)?;
        let start = require(START)?;
        let end = require(END)?;
        let matched_text = require(MATCHED_TEXT)?;
        let candidate_id = require(CANDIDATE_ID)?;
        let confidence = find(CONFIDENCE);

        let known = [Some(document_id), Some(start), Some(end), Some(matched_text), Some(candidate_id), confidence];
        let extra = headers
            .iter()
            .enumerate()
            .filter(|(idx, name)| !name.is_empty() && !known.contains(&Some(*idx)))
            .map(|(idx, name)| {
                let key = RENAMED
                    .iter()
                    .find(|(from, _)| *from == name.as_str())
                    .map_or(name.as_str(), |(_, to)| *to);
                (idx, key.to_string())
            })
            .collect();

        Ok(Self {
            document_id,
            start,
            end,
            matched_text,
            candidate_id,
            confidence,
            extra,
        })
    }
}

pub struct MentionReader;

impl MentionReader {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Vec<Mention>> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open mention table: {}", path.display()))?;
        let mentions = Self::from_reader(file)
            .with_context(|| format!("Failed to read mention table: {}", path.display()))?;
        info!("Read {} mentions from {}", mentions.len(), path.display());
        Ok(mentions)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Vec<Mention>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .quoting(false)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read header row")?
            .iter()
            .map(normalize_header)
            .collect();
        let columns = Columns::from_headers(&headers)?;

        let mut mentions = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let line = idx + 2;
            let record = record.with_context(|| format!("Malformed record at line {}", line))?;
            let field = |col: usize| record.get(col).unwrap_or("").trim();

            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }

            let document_id = field(columns.document_id);
            let candidate_id = field(columns.candidate_id);
            if document_id.is_empty() || candidate_id.is_empty() {
                bail!("Line {}: document id and object id are required", line);
            }

            let span_start: usize = field(columns.start)
                .parse()
                .with_context(|| format!("Line {}: invalid start position '{}'", line, field(columns.start)))?;
            let span_end: usize = field(columns.end)
                .parse()
                .with_context(|| format!("Line {}: invalid end position '{}'", line, field(columns.end)))?;

            let mut mention = Mention::new(
                document_id,
                span_start,
                span_end,
                field(columns.matched_text),
                candidate_id,
            );

            if let Some(col) = columns.confidence {
                let raw = field(col);
                if !raw.is_empty() {
                    let confidence: f32 = raw
                        .parse()
                        .with_context(|| format!("Line {}: invalid confidence '{}'", line, raw))?;
                    mention = mention.with_confidence(confidence);
                }
            }

            for (col, key) in &columns.extra {
                let value = field(*col);
                if value.is_empty() {
                    continue;
                }
                if key == PREFERRED_FORM {
                    let (label, synonym_of) = split_preferred_form(value);
                    if !label.is_empty() {
                        mention = mention.with_extra(PREFERRED_FORM, label);
                    }
                    if let Some(synonym_of) = synonym_of {
                        mention = mention.with_extra(MATCH_FIELD, synonym_of);
                    }
                } else {
                    mention = mention.with_extra(key.clone(), value);
                }
            }

            mentions.push(mention);
        }

        Ok(mentions)
    }
}

/// OGER writes synonym hits as `label [SYNONYM_OF:canonical]`.
fn split_preferred_form(value: &str) -> (&str, Option<&str>) {
    match value.split_once("[SYNONYM_OF:") {
        Some((label, rest)) => {
            let synonym_of = rest.trim_end().trim_end_matches(']').trim();
            (label.trim(), Some(synonym_of).filter(|s| !s.is_empty()))
        }
        None => (value.trim(), None),
    }
}

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const OGER: &str = "Document ID\tType\tStart Position\tEnd Position\tMatched Term\tPreferred Form\tEntity ID\tSentence ID\tOrigin\tUMLS CUI\n\
doc1\tbiolink:Disease\t10\t18\tdiabetes\tdiabetes mellitus\tMONDO:0005015\t1\tMONDO\tC0011849\n\
\n\
doc1\tbiolink:Disease\t30\t38\tDiabetes\tdiabetes [SYNONYM_OF:diabetes mellitus]\tMONDO:0005015_SYNONYM\t2\tMONDO\t\n";

    #[test]
    fn test_reads_oger_headers() {
        let mentions = MentionReader::from_reader(OGER.as_bytes()).unwrap();
        assert_eq!(mentions.len(), 2);

        let first = &mentions[0];
        assert_eq!(first.document_id, "doc1");
        assert_eq!((first.span_start, first.span_end), (10, 18));
        assert_eq!(first.matched_text, "diabetes");
        assert_eq!(first.candidate_id, "MONDO:0005015");
        assert_eq!(first.confidence, None);
        assert_eq!(first.extra["object_category"], "biolink:Disease");
        assert_eq!(first.extra["preferred_form"], "diabetes mellitus");
        assert_eq!(first.extra["umls_cui"], "C0011849");

        assert_eq!(mentions[1].candidate_id, "MONDO:0005015_SYNONYM");
        assert_eq!(mentions[1].extra["preferred_form"], "diabetes");
        assert_eq!(mentions[1].extra["match_field"], "diabetes mellitus");
        assert!(!first.extra.contains_key("match_field"));
        assert!(!mentions[1].extra.contains_key("umls_cui"));
    }

    #[test]
    fn test_reads_aliases_and_confidence() {
        let table = "document_id\tspan_start\tspan_end\tmatched_text\tcandidate_id\tscore\n\
doc2\t0\t6\tcancer\tT:1\t0.75\n";
        let mentions = MentionReader::from_reader(table.as_bytes()).unwrap();
        assert_eq!(mentions[0].confidence, Some(0.75));
        assert!(mentions[0].extra.is_empty());
    }

    #[test]
    fn test_rejects_bad_positions() {
        let table = "document_id\tstart\tend\tmatched_term\tobject_id\ndoc1\tten\t18\tx\tT:1\n";
        let err = MentionReader::from_reader(table.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("invalid start position"));
    }

    #[test]
    fn test_missing_required_column() {
        let table = "document_id\tstart\tend\tobject_id\ndoc1\t0\t1\tT:1\n";
        assert!(MentionReader::from_reader(table.as_bytes()).is_err());
    }

    #[test]
    fn test_read_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(OGER.as_bytes()).unwrap();

        let mentions = MentionReader::read(file.path()).unwrap();
        assert_eq!(mentions.len(), 2);
    }
}
