pub mod mentions;

pub use mentions::MentionReader;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[async_trait]
pub trait DocumentHandler: Send + Sync {
    /// Load every document held in `path`.
    async fn load(&self, path: &Path) -> Result<Vec<ProcessedDocument>>;
}

/// Plain text file; the document id is the file stem.
pub struct TextHandler;

#[async_trait]
impl DocumentHandler for TextHandler {
    async fn load(&self, path: &Path) -> Result<Vec<ProcessedDocument>> {
        let text = read_decoded(path).await?;
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("Cannot derive a document id from {}", path.display()))?
            .to_string();

        Ok(vec![ProcessedDocument {
            id,
            source: path.display().to_string(),
            text,
        }])
    }
}

/// Tab-separated file with an `id` (or `document_id`) column and a `text` column.
pub struct TsvHandler;

#[async_trait]
impl DocumentHandler for TsvHandler {
    async fn load(&self, path: &Path) -> Result<Vec<ProcessedDocument>> {
        let content = read_decoded(path).await?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .quoting(false)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read header of {}", path.display()))?
            .clone();
        let position = |names: &[&str]| {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
        };
        let id_col = position(&["id", "document_id", "document id"])
            .with_context(|| format!("{} has no id column", path.display()))?;
        let text_col = position(&["text"])
            .with_context(|| format!("{} has no text column", path.display()))?;

        let mut documents = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record
                .with_context(|| format!("Malformed record at line {} of {}", line + 2, path.display()))?;
            let id = record.get(id_col).unwrap_or("").trim();
            if id.is_empty() {
                continue;
            }
            documents.push(ProcessedDocument {
                id: id.to_string(),
                source: path.display().to_string(),
                text: record.get(text_col).unwrap_or("").to_string(),
            });
        }

        Ok(documents)
    }
}

/// Reads a file and decodes it using its BOM, falling back to UTF-8.
async fn read_decoded(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read text file: {}", path.display()))?;

    let encoding = if let Some((enc, _)) = encoding_rs::Encoding::for_bom(&bytes) {
        enc
    } else {
        encoding_rs::UTF_8
    };

    let (text, _, had_errors) = encoding.decode(&bytes);
    if had_errors {
        warn!("Encoding errors detected in file: {}", path.display());
    }

    Ok(text.into_owned())
}

pub struct DocumentProcessor {
    handlers: HashMap<String, Box<dyn DocumentHandler>>,
}

impl Default for DocumentProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentProcessor {
    pub fn new() -> Self {
        let mut handlers: HashMap<String, Box<dyn DocumentHandler>> = HashMap::new();

        handlers.insert("txt".to_string(), Box::new(TextHandler));
        handlers.insert("text".to_string(), Box::new(TextHandler));
        handlers.insert("md".to_string(), Box::new(TextHandler));
        handlers.insert("tsv".to_string(), Box::new(TsvHandler));

        Self { handlers }
    }

    /// Load a single file, or every supported file under a directory.
    pub async fn process(&self, path: &Path) -> Result<Vec<ProcessedDocument>> {
        if !path.is_dir() {
            let handler = self.get_handler(path)?;
            return handler.load(path).await;
        }

        let mut documents = Vec::new();
        let entries = WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file());

        for entry in entries {
            let file = entry.path();
            match self.handler_for_extension(file) {
                Some(handler) => {
                    debug!("Loading documents from {}", file.display());
                    documents.extend(handler.load(file).await?);
                }
                None => debug!("Skipping unsupported file {}", file.display()),
            }
        }

        Ok(documents)
    }

    /// Load `path` into a store keyed by document id.
    pub async fn load_store(&self, path: &Path) -> Result<DocumentStore> {
        let documents = self.process(path).await?;
        let mut store = DocumentStore::new();
        for document in documents {
            if store.contains(&document.id) {
                warn!("Duplicate document id {} in {}; keeping the first", document.id, document.source);
                continue;
            }
            store.insert(document.id, document.text);
        }
        info!("Loaded {} documents from {}", store.len(), path.display());
        Ok(store)
    }

    fn handler_for_extension(&self, path: &Path) -> Option<&dyn DocumentHandler> {
        let extension = path.extension()?.to_str()?.to_lowercase();
        self.handlers.get(&extension).map(|h| h.as_ref())
    }

    fn get_handler(&self, path: &Path) -> Result<&dyn DocumentHandler> {
        self.handler_for_extension(path)
            .or_else(|| self.handlers.get("txt").map(|h| h.as_ref()))
            .with_context(|| format!("No handler found for {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub id: String,
    pub source: String,
    pub text: String,
}

/// Document texts keyed by document id.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    texts: HashMap<String, String>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, text: impl Into<String>) {
        self.texts.insert(id.into(), text.into());
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.texts.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.texts.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}
