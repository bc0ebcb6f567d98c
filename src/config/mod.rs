use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use anyhow::{Result, Context};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub ontology: OntologySettings,
    #[serde(default)]
    pub synonym_filter: SynonymFilterSettings,
    #[serde(default)]
    pub sentence: SentenceSettings,
    #[serde(default)]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default)]
    pub need_ancestors: bool,
    /// Number of document workers; 0 uses the available hardware concurrency.
    #[serde(default)]
    pub workers: usize,
    /// Corpus size used for document ratios. Defaults to the number of loaded documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_documents: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologySettings {
    #[serde(default = "default_hierarchy_predicates")]
    pub hierarchy_predicates: Vec<String>,
    #[serde(default = "default_ancestor_predicate")]
    pub ancestor_predicate: String,
    #[serde(default = "default_synonym_suffix")]
    pub synonym_suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynonymFilterSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub case_insensitive: bool,
    #[serde(default = "default_plural_suffixes")]
    pub strip_suffixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceSettings {
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    #[serde(default = "default_true")]
    pub line_breaks_are_boundaries: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Tsv,
    Json,
}

fn default_hierarchy_predicates() -> Vec<String> {
    vec!["biolink:subclass_of".to_string(), "rdfs:subClassOf".to_string()]
}
fn default_ancestor_predicate() -> String { "biolink:subclass_of".to_string() }
fn default_synonym_suffix() -> String { "_SYNONYM".to_string() }
fn default_plural_suffixes() -> Vec<String> { vec!["s".to_string()] }
fn default_fuzzy_threshold() -> f64 { 0.8 }
fn default_true() -> bool { true }

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            need_ancestors: false,
            workers: 0,
            total_documents: None,
        }
    }
}

impl Default for OntologySettings {
    fn default() -> Self {
        Self {
            hierarchy_predicates: default_hierarchy_predicates(),
            ancestor_predicate: default_ancestor_predicate(),
            synonym_suffix: default_synonym_suffix(),
        }
    }
}

impl Default for SynonymFilterSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            case_insensitive: true,
            strip_suffixes: default_plural_suffixes(),
        }
    }
}

impl Default for SentenceSettings {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
            line_breaks_are_boundaries: true,
        }
    }
}

impl SynonymFilterSettings {
    /// Normalized form used to decide whether two surface forms collapse.
    pub fn normalize(&self, surface: &str) -> String {
        let mut normalized = if self.case_insensitive {
            surface.trim().to_lowercase()
        } else {
            surface.trim().to_string()
        };

        for suffix in &self.strip_suffixes {
            let suffix = if self.case_insensitive {
                suffix.to_lowercase()
            } else {
                suffix.clone()
            };
            if suffix.is_empty() {
                continue;
            }
            if normalized.ends_with(&suffix) && normalized.len() > suffix.len() {
                normalized.truncate(normalized.len() - suffix.len());
                break;
            }
        }

        normalized
    }

    pub fn collapses(&self, a: &str, b: &str) -> bool {
        self.normalize(a) == self.normalize(b)
    }
}

impl Configuration {
    /// Load configuration from a YAML or JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.ontology.hierarchy_predicates.is_empty() {
            anyhow::bail!("No hierarchy predicates defined for the ontology");
        }

        if self.ontology.ancestor_predicate.trim().is_empty() {
            anyhow::bail!("Ancestor predicate must not be empty");
        }

        if !(0.0..=1.0).contains(&self.sentence.fuzzy_threshold) {
            anyhow::bail!(
                "Fuzzy threshold must be between 0 and 1, got {}",
                self.sentence.fuzzy_threshold
            );
        }

        if let Some(0) = self.pipeline.total_documents {
            anyhow::bail!("total_documents must be greater than zero");
        }

        Ok(())
    }

    /// Create an example configuration
    pub fn example() -> Self {
        Configuration {
            name: "Example NER post-processing config".to_string(),
            description: "Consolidate OGER annotations and attach ontology ancestors".to_string(),
            version: "1.0".to_string(),
            pipeline: PipelineSettings {
                need_ancestors: true,
                workers: 4,
                total_documents: None,
            },
            ontology: OntologySettings::default(),
            synonym_filter: SynonymFilterSettings::default(),
            sentence: SentenceSettings::default(),
            output_format: OutputFormat::Tsv,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            name: "default".to_string(),
            description: String::new(),
            version: "1.0".to_string(),
            pipeline: PipelineSettings::default(),
            ontology: OntologySettings::default(),
            synonym_filter: SynonymFilterSettings::default(),
            sentence: SentenceSettings::default(),
            output_format: OutputFormat::default(),
        }
    }
}
