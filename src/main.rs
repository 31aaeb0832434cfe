use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dialogue_sentinel::audit::{AuditExport, AuditStore, SqliteAuditLog};
use dialogue_sentinel::config::{Config, LogFormat};
use dialogue_sentinel::conversation::{Speaker, Turn};
use dialogue_sentinel::pipeline::SafetyPipeline;
use dialogue_sentinel::providers::{
    ClaimVerifier, CrisisModule, HttpClaimVerifier, HttpCrisisModule, HttpHumanNotifier,
    HumanNotifier,
};

#[derive(Parser)]
#[command(name = "dialogue-sentinel", version, about = "Conversational-safety pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read turns as JSON lines from stdin and print one decision per turn
    Run {
        /// Conversation identifier for all stdin turns
        #[arg(long, default_value = "stdin")]
        conversation_id: String,
    },
    /// Replay a recorded transcript file through the pipeline
    Replay {
        /// Path to a JSON array of turns
        file: PathBuf,
        /// Conversation identifier for the replay
        #[arg(long, default_value = "replay")]
        conversation_id: String,
    },
    /// Audit log operations
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },
    /// Append a correction to a recorded decision
    Correct {
        /// Decision identifier being corrected
        decision_id: String,
        /// Why the decision was wrong or incomplete
        reason: String,
    },
}

#[derive(Subcommand)]
enum AuditCommand {
    /// Print the most recent decisions, newest first
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Dump the whole log as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Load a previously exported log, skipping entries that already exist
    Import {
        /// Path to an export file
        file: PathBuf,
    },
}

/// Wire shape for one stdin/replay turn.
#[derive(Debug, Deserialize)]
struct TurnInput {
    speaker: Speaker,
    text: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    info!(version = env!("CARGO_PKG_VERSION"), "Dialogue Sentinel starting...");

    // Initialize the audit store
    let audit = match SqliteAuditLog::new(&config.database).await {
        Ok(log) => {
            info!(path = %config.database.path.display(), "Audit database initialized");
            Arc::new(log)
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize audit database");
            return Err(e.into());
        }
    };

    match cli.command {
        Command::Run { conversation_id } => {
            let pipeline = build_pipeline(&config, audit.clone())?;
            run_stdin(&pipeline, &conversation_id).await?;
        }
        Command::Replay { file, conversation_id } => {
            let pipeline = build_pipeline(&config, audit.clone())?;
            replay_file(&pipeline, &file, &conversation_id).await?;
        }
        Command::Audit { command } => match command {
            AuditCommand::Recent { limit } => {
                let decisions = audit.recent_decisions(limit).await?;
                println!("{}", serde_json::to_string_pretty(&decisions)?);
            }
            AuditCommand::Export { output } => {
                let export = audit.export().await?;
                let body = serde_json::to_string_pretty(&export)?;
                match output {
                    Some(path) => {
                        tokio::fs::write(&path, body).await?;
                        info!(path = %path.display(), "Audit log exported");
                    }
                    None => println!("{}", body),
                }
            }
            AuditCommand::Import { file } => {
                let body = tokio::fs::read_to_string(&file).await?;
                let export: AuditExport = serde_json::from_str(&body)?;
                audit.import(&export).await?;
                info!(
                    decisions = export.decisions.len(),
                    corrections = export.corrections.len(),
                    "Audit log imported"
                );
            }
        },
        Command::Correct { decision_id, reason } => {
            let pipeline = build_pipeline(&config, audit.clone())?;
            let correction = pipeline.record_correction(&decision_id, &reason).await?;
            println!("{}", serde_json::to_string_pretty(&correction)?);
        }
    }

    Ok(())
}

/// Assemble the pipeline, attaching whichever external collaborators are
/// configured. Missing URLs leave the pipeline heuristic-only.
fn build_pipeline(config: &Config, audit: Arc<SqliteAuditLog>) -> anyhow::Result<SafetyPipeline> {
    let mut pipeline = SafetyPipeline::new(config.clone(), audit);

    if let Some(url) = &config.providers.verifier_url {
        let verifier: Arc<dyn ClaimVerifier> =
            Arc::new(HttpClaimVerifier::new(url, config.request.clone())?);
        info!(base_url = %url, "Claim verifier attached");
        pipeline = pipeline.with_verifier(verifier);
    }
    if let Some(url) = &config.providers.crisis_url {
        let crisis: Arc<dyn CrisisModule> =
            Arc::new(HttpCrisisModule::new(url, config.request.clone())?);
        info!(base_url = %url, "Crisis module attached");
        pipeline = pipeline.with_crisis_module(crisis);
    }
    if let Some(url) = &config.providers.notifier_url {
        let notifier: Arc<dyn HumanNotifier> =
            Arc::new(HttpHumanNotifier::new(url, config.request.clone())?);
        info!(base_url = %url, "Human notifier attached");
        pipeline = pipeline.with_notifier(notifier);
    }

    Ok(pipeline)
}

/// Process JSON-line turns from stdin until EOF.
async fn run_stdin(pipeline: &SafetyPipeline, conversation_id: &str) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!(conversation_id = %conversation_id, "Reading turns from stdin...");

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let input: TurnInput = match serde_json::from_str(trimmed) {
            Ok(input) => input,
            Err(e) => {
                warn!(error = %e, "Skipping malformed turn line");
                continue;
            }
        };
        let turn = Turn::new(input.speaker, input.text);
        match pipeline.process_turn(conversation_id, turn).await {
            Ok(outcome) => println!("{}", serde_json::to_string(&outcome)?),
            Err(e) => warn!(error = %e, "Turn rejected"),
        }
    }

    info!("Stdin closed, shutting down");
    Ok(())
}

/// Replay a JSON transcript file turn by turn.
async fn replay_file(
    pipeline: &SafetyPipeline,
    file: &PathBuf,
    conversation_id: &str,
) -> anyhow::Result<()> {
    let body = tokio::fs::read_to_string(file).await?;
    let inputs: Vec<TurnInput> = serde_json::from_str(&body)?;

    info!(
        conversation_id = %conversation_id,
        turns = inputs.len(),
        path = %file.display(),
        "Replaying transcript"
    );

    for input in inputs {
        let turn = Turn::new(input.speaker, input.text);
        let outcome = pipeline.process_turn(conversation_id, turn).await?;
        println!("{}", serde_json::to_string(&outcome)?);
    }

    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
