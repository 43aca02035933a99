//! fundproof CLI
//!
//! Usage:
//!   fundproof check <file> --declared identity --category medicine
//!   fundproof process [document-id...]
//!   fundproof worker
//!   fundproof sweep

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fundproof_core::{
    AppConfig, CampaignCategory, DocumentType, ExtractedData, LoggingConfig, PgVerificationStore,
    RejectionReason, VerificationDetails, VerificationStore,
};
use fundproof_extractor::RuleBasedNer;
use fundproof_ocr::{DocumentTextSource, OcrPipeline};
use fundproof_verify::decision::early_rejection;
use fundproof_verify::{
    build_notifier, fingerprint, CampaignStatusAggregator, DecisionEngine, QueueConfig,
    VerificationOrchestrator, VerificationOutcome, VerificationQueue,
};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "fundproof")]
#[command(about = "Crowdfunding document verification")]
#[command(version)]
struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a local file without touching the database
    Check {
        /// JPEG, PNG or PDF file
        file: PathBuf,
        /// Document type claimed by the uploader
        #[arg(long)]
        declared: DocumentType,
        /// Category of the campaign the document belongs to
        #[arg(long, default_value = "general")]
        category: CampaignCategory,
    },
    /// Verify stored documents (ids from arguments, or one per stdin line)
    Process { ids: Vec<Uuid> },
    /// Run the worker pool, reading document ids from stdin
    Worker {
        /// Seconds between campaign lifecycle sweeps
        #[arg(long, default_value_t = 3600)]
        sweep_interval: u64,
    },
    /// Close campaigns that reached their goal or expired
    Sweep,
}

/// Output of `check`
#[derive(Serialize)]
struct CheckReport {
    file: PathBuf,
    declared: DocumentType,
    category: CampaignCategory,
    fingerprint: Option<String>,
    outcome: VerificationOutcome,
    details: VerificationDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    extracted: Option<ExtractedData>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Check {
            file,
            declared,
            category,
        } => {
            let report = check(&config, file, declared, category).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Process { ids } => {
            let ids = if ids.is_empty() {
                read_stdin_ids().await?
            } else {
                ids
            };
            let queue = start_queue(&config).await?;
            for id in ids {
                queue.submit_verification(id)?;
            }
            queue.shutdown().await;
        }
        Commands::Worker { sweep_interval } => {
            run_worker(&config, Duration::from_secs(sweep_interval.max(1))).await?;
        }
        Commands::Sweep => {
            let store = connect(&config).await?;
            let changes = CampaignStatusAggregator::new(store)
                .sweep_lifecycle(chrono::Utc::now())
                .await?;
            println!("{}", serde_json::to_string_pretty(&changes)?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path.clone())?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("fundproof={}", config.level).into());

    if config.json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<Arc<dyn VerificationStore>> {
    let store =
        PgVerificationStore::new(&config.database.postgres_url, config.database.pool_size)
            .await?;
    Ok(Arc::new(store))
}

async fn start_queue(config: &AppConfig) -> anyhow::Result<VerificationQueue> {
    let store = connect(config).await?;
    let orchestrator = VerificationOrchestrator::new(
        store,
        Arc::new(OcrPipeline::from_config(&config.ocr)),
        Arc::new(RuleBasedNer::new()),
        build_notifier(&config.notify)?,
    )
    .with_site_url(config.notify.site_url.clone())
    .with_max_attempts(config.worker.max_attempts);

    Ok(VerificationQueue::start(
        Arc::new(orchestrator),
        QueueConfig::from_config(&config.worker),
    ))
}

async fn check(
    config: &AppConfig,
    file: PathBuf,
    declared: DocumentType,
    category: CampaignCategory,
) -> anyhow::Result<CheckReport> {
    let pipeline = OcrPipeline::from_config(&config.ocr);
    let source = file.clone();
    let read = tokio::task::spawn_blocking(move || pipeline.read_text(&source))
        .await
        .context("OCR task failed")?;

    let unreadable = |error: Option<String>| CheckReport {
        file: file.clone(),
        declared,
        category,
        fingerprint: None,
        outcome: VerificationOutcome::Rejected {
            reason: RejectionReason::Unreadable,
        },
        details: early_rejection(RejectionReason::Unreadable, error),
        extracted: None,
    };

    let text = match read {
        Ok(text) => text,
        Err(e) => return Ok(unreadable(Some(e.to_string()))),
    };
    let Some(hash) = fingerprint(&text) else {
        return Ok(unreadable(None));
    };

    let decision = DecisionEngine::new(Arc::new(RuleBasedNer::new()))
        .decide(&text, declared, category)?;

    Ok(CheckReport {
        file,
        declared,
        category,
        fingerprint: Some(hash),
        outcome: decision.outcome(),
        details: decision.details,
        extracted: Some(decision.extracted),
    })
}

async fn run_worker(config: &AppConfig, sweep_interval: Duration) -> anyhow::Result<()> {
    let queue = start_queue(config).await?;
    let aggregator = CampaignStatusAggregator::new(connect(config).await?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(sweep_interval);
    tracing::info!("worker ready, reading document ids from stdin");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Some(id) = parse_id(&line) {
                    queue.submit_verification(id)?;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = aggregator.sweep_lifecycle(chrono::Utc::now()).await {
                    tracing::warn!(error = %e, "lifecycle sweep failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, finishing queued jobs");
                break;
            }
        }
    }

    queue.shutdown().await;
    Ok(())
}

async fn read_stdin_ids() -> anyhow::Result<Vec<Uuid>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ids = Vec::new();
    while let Some(line) = lines.next_line().await? {
        ids.extend(parse_id(&line));
    }
    Ok(ids)
}

fn parse_id(line: &str) -> Option<Uuid> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match line.parse() {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!(input = line, error = %e, "ignoring invalid document id");
            None
        }
    }
}
