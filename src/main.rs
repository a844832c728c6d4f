//! cvflow command line entry point
//!
//! Drives the pipeline components against a running extraction service.

use chrono::Utc;
use clap::{Parser, Subcommand};
use cvflow::config::PipelineConfig;
use cvflow::document::{format_file_size, DocumentFile};
use cvflow::error::{PipelineError, PipelineResult};
use cvflow::events::{ChannelEventSink, EventSink};
use cvflow::export::ResultExporter;
use cvflow::matching::BatchTenderMatcher;
use cvflow::observability::init_default_logging;
use cvflow::tracker::{FileStatus, FileUploadTracker, ParseTarget};
use cvflow::workflow::{SequentialWorkflowEngine, Stage};
use cvflow::{ExtractionService, HttpExtractionService};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// CV parsing, tender matching and expert profile generation
#[derive(Parser)]
#[command(name = "cvflow")]
#[command(about = "Client-side orchestration for the CV processing service")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a batch of CVs
    Parse {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Use the structured (Europass) parser
        #[arg(long)]
        structured: bool,
        /// Write each parsed record as JSON into this directory
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Match a tender against the candidate store
    Match {
        file: PathBuf,
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Run the four-step expert profile workflow
    Profile {
        #[arg(long)]
        cv: PathBuf,
        #[arg(long)]
        tender: PathBuf,
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Parse a CV and export the merge fields of the Europass template
    Europass {
        file: PathBuf,
        #[arg(long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose > 0 && std::env::var("LOG_LEVEL").is_err() {
        let level = if cli.verbose > 1 { "TRACE" } else { "DEBUG" };
        std::env::set_var("LOG_LEVEL", level);
    }
    init_default_logging();

    info!("Starting cvflow v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let (events, notifier) = spawn_notifier();
    let result = match cli.command {
        Commands::Parse {
            files,
            structured,
            output,
        } => run_parse(&config, events.clone(), files, structured, output).await,
        Commands::Match { file, output } => {
            run_match(&config, events.clone(), &file, output).await
        }
        Commands::Profile { cv, tender, output } => {
            run_profile(&config, events.clone(), &cv, &tender, output).await
        }
        Commands::Europass { file, output } => {
            run_europass(&config, events.clone(), &file, output).await
        }
        Commands::Config { show } => handle_config_command(&config, show),
    };

    // The notifier exits once the last sink handle is gone
    drop(events);
    if let Err(e) = notifier.await {
        error!("Notifier task failed: {}", e);
    }

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(config_path: &Option<PathBuf>) -> PipelineResult<PipelineConfig> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(PipelineConfig::load_from_file(path)?)
        }
        None => {
            for path_str in ["cvflow.toml", "config/cvflow.toml"] {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(PipelineConfig::load_from_file(&path)?);
                }
            }

            info!("No configuration file found, using defaults");
            let config = PipelineConfig::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn build_service(config: &PipelineConfig) -> PipelineResult<Arc<dyn ExtractionService>> {
    Ok(Arc::new(HttpExtractionService::from_config(config)?))
}

/// Print user notifications as events arrive
fn spawn_notifier() -> (Arc<dyn EventSink>, JoinHandle<()>) {
    let (sink, mut receiver) = ChannelEventSink::new();
    let handle = tokio::spawn(async move {
        while let Some(record) = receiver.recv().await {
            if record.event.is_failure() {
                eprintln!("{}", record.message());
            } else {
                println!("{}", record.message());
            }
        }
    });
    (Arc::new(sink), handle)
}

async fn read_documents(paths: &[PathBuf]) -> PipelineResult<Vec<DocumentFile>> {
    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let document = DocumentFile::from_path(path).await?;
        info!(
            file = %document.name,
            size = %format_file_size(document.size()),
            "Read document"
        );
        documents.push(document);
    }
    Ok(documents)
}

fn exporter(
    config: &PipelineConfig,
    events: &Arc<dyn EventSink>,
    output: &Path,
) -> ResultExporter {
    ResultExporter::new(&config.export)
        .with_events(events.clone())
        .with_output_dir(output)
}

async fn run_parse(
    config: &PipelineConfig,
    events: Arc<dyn EventSink>,
    paths: Vec<PathBuf>,
    structured: bool,
    output: Option<PathBuf>,
) -> PipelineResult<()> {
    let documents = read_documents(&paths).await?;
    let target = if structured {
        ParseTarget::Structured
    } else {
        ParseTarget::Candidate
    };

    let tracker = FileUploadTracker::new(build_service(config)?, target)
        .with_events(events.clone())
        .with_admission_policy(config.admission_policy());
    tracker.submit(documents).await;

    for entry in tracker.files().await {
        match entry.status {
            FileStatus::Completed => println!("{}: completed", entry.name),
            _ => println!(
                "{}: {}",
                entry.name,
                entry.error.as_deref().unwrap_or("not processed")
            ),
        }
    }

    if let Some(output) = output {
        let exporter = exporter(config, &events, &output);
        for entry in tracker.completed().await {
            let stem = Path::new(&entry.name)
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| entry.id.to_string());
            let artifact = exporter.export_json(&entry.result, &stem)?;
            exporter.write(&artifact).await?;
        }
    }

    let summary = tracker.summary().await;
    info!(
        completed = summary.completed,
        failed = summary.error,
        "Parse finished"
    );
    Ok(())
}

async fn run_match(
    config: &PipelineConfig,
    events: Arc<dyn EventSink>,
    path: &Path,
    output: Option<PathBuf>,
) -> PipelineResult<()> {
    let tender = DocumentFile::from_path(path).await?;

    let matcher = BatchTenderMatcher::new(build_service(config)?)
        .with_events(events.clone())
        .with_admission_policy(config.admission_policy());
    let submission = matcher.submit(tender).await?;

    if let Some(result) = &submission.result {
        for scored in &result.matches {
            println!("{:>6}  {}", scored.score.to_string(), scored.candidate.full_name());
        }
        for pick in &result.curated {
            println!("* {} ({}): {}", pick.name, pick.score, pick.rationale);
        }

        if let Some(output) = output {
            let exporter = exporter(config, &events, &output);
            let artifact = exporter.export_json(result, "tender_matches")?;
            exporter.write(&artifact).await?;
        }
    }

    match submission.error {
        Some(error) => Err(PipelineError::invalid_input(error)),
        None => Ok(()),
    }
}

async fn run_profile(
    config: &PipelineConfig,
    events: Arc<dyn EventSink>,
    cv: &Path,
    tender: &Path,
    output: Option<PathBuf>,
) -> PipelineResult<()> {
    let cv = DocumentFile::from_path(cv).await?;
    let tender = DocumentFile::from_path(tender).await?;

    let mut engine = SequentialWorkflowEngine::new(build_service(config)?)
        .with_events(events.clone())
        .with_admission_policy(config.admission_policy())
        .with_redo_policy(config.workflow.redo_policy);
    engine.set_cv(cv).await?;
    engine.set_tender(tender).await?;

    let outcome = engine.run_all().await;

    if let Some(output) = output {
        let exporter = exporter(config, &events, &output);
        for stage in Stage::ALL {
            if let Some(artifact) = exporter.export_stage(engine.session(), stage)? {
                exporter.write(&artifact).await?;
            }
        }
    }

    Ok(outcome?)
}

async fn run_europass(
    config: &PipelineConfig,
    events: Arc<dyn EventSink>,
    path: &Path,
    output: Option<PathBuf>,
) -> PipelineResult<()> {
    let document = DocumentFile::from_path(path).await?;

    let tracker = FileUploadTracker::new(build_service(config)?, ParseTarget::Structured)
        .with_events(events.clone())
        .with_admission_policy(config.admission_policy());
    let report = tracker.submit(vec![document]).await;
    if let Some(rejection) = report.rejected.into_iter().next() {
        return Err(rejection.into());
    }

    let parsed = report.accepted.first().copied();
    let entry = match parsed {
        Some(id) => tracker.get(id).await,
        None => None,
    };
    let record = entry
        .as_ref()
        .and_then(|entry| entry.result.as_ref())
        .and_then(|result| result.as_structured())
        .cloned();

    match record {
        Some(record) => {
            let output = output.unwrap_or_else(|| config.export.output_dir.clone());
            let exporter = exporter(config, &events, &output);
            let data = exporter.template_data(&record, Utc::now().date_naive());
            let artifact = exporter.export_template_data(&data)?;
            let written = exporter.write(&artifact).await?;
            println!("{}", written.display());
            Ok(())
        }
        None => Err(PipelineError::invalid_input(
            entry
                .and_then(|entry| entry.error)
                .unwrap_or_else(|| "Structured parsing failed".to_string()),
        )),
    }
}

fn handle_config_command(config: &PipelineConfig, show: bool) -> PipelineResult<()> {
    if show {
        let rendered = toml::to_string_pretty(config)
            .map_err(|e| PipelineError::internal_error(e.to_string()))?;
        println!("Current configuration:");
        println!("{rendered}");
    }

    info!(
        base_url = %config.resolve_base_url()?,
        "Configuration validation complete"
    );
    Ok(())
}
