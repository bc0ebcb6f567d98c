use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use ontology_ner_postprocess::{
    config::{Configuration, OutputFormat},
    core::PostProcessor,
    handlers::{DocumentProcessor, MentionReader},
    ontology::{InMemoryOntology, KgxLoader, OntologyGraph},
    utils::{validate_output_rows, TableSerializer},
};

#[derive(Parser)]
#[command(
    name = "ontorun-post",
    about = "Consolidate NER annotations against an ontology and score term salience",
    long_about = None,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Args, Clone)]
struct OntologyArgs {
    /// Directory of KGX <name>_nodes.tsv / <name>_edges.tsv tables
    #[arg(long, conflicts_with_all = ["nodes", "edges"])]
    ontology_dir: Option<PathBuf>,

    /// KGX nodes table
    #[arg(long)]
    nodes: Option<PathBuf>,

    /// KGX edges table
    #[arg(long)]
    edges: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Post-process a mention table into entity rows, ancestor edges and corpus statistics
    Run {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Mention table produced by the annotator
        #[arg(short, long)]
        mentions: PathBuf,

        /// Document text: a .txt file, an id/text TSV, or a directory of them
        #[arg(long)]
        documents: PathBuf,

        #[command(flatten)]
        ontology: OntologyArgs,

        /// Output table path
        #[arg(short, long)]
        output: PathBuf,

        /// Corpus statistics output path
        #[arg(long)]
        stats_output: Option<PathBuf>,

        /// Output format (overrides config)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormatArg>,

        /// Emit ancestor edges for every entity row
        #[arg(long)]
        need_ancestors: bool,

        /// Number of document workers (overrides config, 0 = all cores)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Corpus size used for document ratios (overrides config)
        #[arg(long)]
        total_documents: Option<usize>,

        /// Check the output table for structural issues
        #[arg(long)]
        validate: bool,
    },

    /// Print the ancestors of an ontology term
    Ancestors {
        /// Term identifier
        term_id: String,

        #[command(flatten)]
        ontology: OntologyArgs,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show ontology statistics
    Stats {
        #[command(flatten)]
        ontology: OntologyArgs,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Generate example configuration
    GenerateConfig {
        /// Output path for example configuration
        #[arg(short, long, default_value = "example_config.yaml")]
        output: PathBuf,

        /// Format (yaml or json)
        #[arg(short, long, value_enum, default_value = "yaml")]
        format: ConfigFormat,
    },
}

#[derive(clap::ValueEnum, Clone)]
enum OutputFormatArg {
    Tsv,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(format: OutputFormatArg) -> Self {
        match format {
            OutputFormatArg::Tsv => Self::Tsv,
            OutputFormatArg::Json => Self::Json,
        }
    }
}

#[derive(clap::ValueEnum, Clone)]
enum ConfigFormat {
    Yaml,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        tracing::Level::DEBUG
    } else if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            config,
            mentions,
            documents,
            ontology,
            output,
            stats_output,
            format,
            need_ancestors,
            workers,
            total_documents,
            validate,
        } => {
            let overrides = RunOverrides {
                format,
                need_ancestors,
                workers,
                total_documents,
            };
            run_command(config, mentions, documents, ontology, output, stats_output, overrides, validate).await
        }
        Commands::Ancestors { term_id, ontology, config } => ancestors_command(term_id, ontology, config),
        Commands::Stats { ontology, config } => stats_command(ontology, config),
        Commands::Validate { config } => validate_command(config),
        Commands::GenerateConfig { output, format } => generate_config_command(output, format).await,
    }
}

struct RunOverrides {
    format: Option<OutputFormatArg>,
    need_ancestors: bool,
    workers: Option<usize>,
    total_documents: Option<usize>,
}

fn load_config(path: Option<&PathBuf>) -> Result<Configuration> {
    let config = match path {
        Some(path) => Configuration::from_file(path)?,
        None => Configuration::default(),
    };
    config.validate()?;
    Ok(config)
}

fn load_ontology(args: &OntologyArgs, config: &Configuration) -> Result<InMemoryOntology> {
    let loader = KgxLoader::new(&config.ontology);

    let ontology = match (&args.ontology_dir, &args.edges) {
        (Some(dir), _) => loader
            .load_directory(dir)
            .with_context(|| format!("Failed to load ontology directory {}", dir.display()))?,
        (None, Some(edges)) => loader
            .load(args.nodes.as_deref(), edges)
            .with_context(|| format!("Failed to load ontology from {}", edges.display()))?,
        (None, None) => anyhow::bail!("Provide --ontology-dir or --edges (with optional --nodes)"),
    };

    Ok(ontology)
}

#[allow(clippy::too_many_arguments)]
async fn run_command(
    config_path: Option<PathBuf>,
    mentions_path: PathBuf,
    documents_path: PathBuf,
    ontology_args: OntologyArgs,
    output: PathBuf,
    stats_output: Option<PathBuf>,
    overrides: RunOverrides,
    validate: bool,
) -> Result<()> {
    println!("{}", "Starting NER post-processing...".bright_blue().bold());

    let mut config = load_config(config_path.as_ref())?;

    if let Some(format) = overrides.format {
        config.output_format = format.into();
    }
    if overrides.need_ancestors {
        config.pipeline.need_ancestors = true;
    }
    if let Some(workers) = overrides.workers {
        config.pipeline.workers = workers;
    }
    if let Some(total) = overrides.total_documents {
        config.pipeline.total_documents = Some(total);
    }
    config.validate()?;

    println!(" Configuration: {}", config.name.bright_green());

    let ontology = load_ontology(&ontology_args, &config)?;
    println!(" Ontology terms: {}", ontology.statistics().total_terms.to_string().bright_cyan());

    let mentions = MentionReader::read(&mentions_path)?;
    println!(" Mentions: {}", mentions.len().to_string().bright_cyan());

    let store = DocumentProcessor::new().load_store(&documents_path).await?;
    println!(" Documents: {}", store.len().to_string().bright_cyan());

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} documents ({elapsed})")?
            .progress_chars("=> "),
    );

    let format = config.output_format;
    let processor = PostProcessor::new(config, Arc::new(ontology)).with_progress(progress.clone());

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after in-flight documents");
            flag.store(true, Ordering::Relaxed);
        }
    });

    let worker_cancel = cancel.clone();
    let result = tokio::task::spawn_blocking(move || processor.run(mentions, &store, &worker_cancel))
        .await
        .context("Document worker pool panicked")?;
    progress.finish_and_clear();

    let pipeline_output = match result {
        Ok(output) => output,
        Err(e) => {
            error!(" Post-processing failed: {}", e);
            return Err(e.into());
        }
    };

    for warning in &pipeline_output.warnings {
        info!("{}", warning);
    }

    if validate {
        let issues = validate_output_rows(&pipeline_output.rows);
        if !issues.is_empty() {
            warn!(" Validation issues: {}", issues.join(", "));
        }
    }

    let serializer = TableSerializer::new(format);
    let table = serializer.serialize_rows(&pipeline_output)?;
    tokio::fs::write(&output, table)
        .await
        .with_context(|| format!("Failed to write output table: {}", output.display()))?;
    println!(" Output written to: {}", output.display().to_string().bright_green());

    if let Some(stats_path) = &stats_output {
        let stats = serializer.serialize_stats(&pipeline_output)?;
        tokio::fs::write(stats_path, stats)
            .await
            .with_context(|| format!("Failed to write statistics: {}", stats_path.display()))?;
        println!(" Statistics written to: {}", stats_path.display().to_string().bright_green());
    }

    let summary = &pipeline_output.summary;
    println!("\n{}", " Run Summary".bright_green().bold());
    println!("{}", summary);

    if summary.documents_skipped > 0 {
        println!(
            " {} skipped: {}",
            summary.documents_skipped.to_string().bright_yellow(),
            summary.skipped_documents.join(", ")
        );
    }

    if summary.documents_skipped > 0 || summary.unresolved_terms > 0 || summary.degraded_extractions > 0 {
        println!(" {} completed with warnings", "Post-processing".bright_yellow());
    } else {
        println!(" {} completed successfully!", "Post-processing".bright_green());
    }

    Ok(())
}

fn ancestors_command(term_id: String, ontology_args: OntologyArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_ref())?;
    let ontology = load_ontology(&ontology_args, &config)?;

    let canonical = ontology.canonical_id(&term_id);
    let label = ontology
        .term(canonical)
        .map(|t| t.preferred_label)
        .unwrap_or_default();
    println!("{} {}", canonical.bright_cyan().bold(), label);

    let ancestors = ontology.get_ancestors(canonical)?;
    if ancestors.is_empty() {
        println!(" No ancestors");
        return Ok(());
    }

    for ancestor in ancestors {
        let label = ontology
            .term(&ancestor)
            .map(|t| t.preferred_label)
            .unwrap_or_default();
        println!("  {} {} {}", config.ontology.ancestor_predicate, ancestor.bright_cyan(), label);
    }

    Ok(())
}

fn stats_command(ontology_args: OntologyArgs, config_path: Option<PathBuf>) -> Result<()> {
    println!("{}", " Ontology Statistics".bright_blue().bold());

    let config = load_config(config_path.as_ref())?;
    let ontology = load_ontology(&ontology_args, &config)?;
    println!("{}", ontology.statistics());

    Ok(())
}

fn validate_command(config_path: PathBuf) -> Result<()> {
    println!("{}", " Validating configuration...".bright_blue().bold());

    match Configuration::from_file(&config_path) {
        Ok(config) => match config.validate() {
            Ok(()) => {
                println!(" Configuration is valid!");
                println!(" Name: {}", config.name.bright_green());
                println!(" Version: {}", config.version);
                println!(" Need ancestors: {}", config.pipeline.need_ancestors);
                println!(" Hierarchy predicates: {}", config.ontology.hierarchy_predicates.join(", "));
                println!(" Synonym filter enabled: {}", config.synonym_filter.enabled);
                Ok(())
            }
            Err(e) => {
                error!(" Configuration validation failed: {}", e);
                Err(e)
            }
        },
        Err(e) => {
            error!(" Failed to load configuration: {}", e);
            Err(e)
        }
    }
}

async fn generate_config_command(output_path: PathBuf, format: ConfigFormat) -> Result<()> {
    println!("{}", " Generating example configuration...".bright_blue().bold());

    let config = Configuration::example();

    let content = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(&config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
    };

    tokio::fs::write(&output_path, content).await?;

    println!(" Example configuration generated at: {}", output_path.display().to_string().bright_green());
    println!(" Edit the file to customize for your use case");

    Ok(())
}
