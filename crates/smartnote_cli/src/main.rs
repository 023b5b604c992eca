//! SmartNote command-line driver.
//!
//! # Responsibility
//! - Wire `smartnote_core` services over a local SQLite file.
//! - Print every generation result as a JSON outcome envelope.
//!
//! # Usage
//!
//! ```bash
//! SMARTNOTE_API_KEY=... smartnote --user <uuid> init-note "Title" "Body..."
//! smartnote --user <uuid> summarize <note-id>
//! smartnote --user <uuid> tags <note-id> --regenerate
//! smartnote --stub-reply "rust, notes" preview-tags "Some draft text..."
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use serde::Serialize;
use smartnote_core::ai::mock::StubGenerationBackend;
use smartnote_core::{
    default_log_level, init_logging, open_db, GenerationBackend, GenerationOutcome,
    GenerationService, GenerationSettings, HttpBackendConfig, HttpGenerationBackend,
    NoteService, OperationType, SharedConnection, SqliteNoteRepository, StaticIdentity,
};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "smartnote")]
#[command(about = "AI summaries and tags for notes")]
#[command(version)]
struct Args {
    /// SQLite database file
    #[arg(long, env = "SMARTNOTE_DB", default_value = "smartnote.db")]
    db: PathBuf,

    /// Acting user id; omit to run unauthenticated
    #[arg(long, env = "SMARTNOTE_USER")]
    user: Option<Uuid>,

    /// Directory for rolling log files
    #[arg(long, env = "SMARTNOTE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[arg(long, env = "SMARTNOTE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Answer every model call with this text instead of calling the API
    #[arg(long)]
    stub_reply: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a note owned by the acting user
    InitNote { title: String, body: String },
    /// Generate (or regenerate) the summary of a note
    Summarize {
        note_id: String,
        #[arg(long)]
        regenerate: bool,
    },
    /// Generate (or regenerate) the tags of a note
    Tags {
        note_id: String,
        #[arg(long)]
        regenerate: bool,
    },
    /// Suggest tags for unsaved text
    PreviewTags { content: String },
    /// Show today's regeneration quota
    Quota {
        #[arg(value_enum)]
        operation: QuotaOperation,
    },
    /// Show recent usage records and today's totals
    Usage {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum QuotaOperation {
    Summary,
    Tags,
}

impl From<QuotaOperation> for OperationType {
    fn from(value: QuotaOperation) -> Self {
        match value {
            QuotaOperation::Summary => Self::Summary,
            QuotaOperation::Tags => Self::Tags,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    if let Some(log_dir) = &args.log_dir {
        let log_dir = std::path::absolute(log_dir).context("resolving log directory")?;
        let level = args.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, &log_dir.to_string_lossy(), true)?;
    }

    let conn = SharedConnection::new(
        open_db(&args.db).with_context(|| format!("opening {}", args.db.display()))?,
    );
    let identity = Arc::new(match args.user {
        Some(user) => StaticIdentity::user(user),
        None => StaticIdentity::anonymous(),
    });
    let backend: Arc<dyn GenerationBackend> = match &args.stub_reply {
        Some(text) => Arc::new(StubGenerationBackend::text(text.clone())),
        None => Arc::new(HttpGenerationBackend::new(HttpBackendConfig::from_env())?),
    };
    info!(
        "event=cli_start module=cli status=ok db={} stub={}",
        args.db.display(),
        args.stub_reply.is_some()
    );

    let generation = GenerationService::with_sqlite(
        conn.clone(),
        identity.clone(),
        backend,
        GenerationSettings::from_env(),
    );

    let succeeded = match args.command {
        Command::InitNote { title, body } => {
            let notes = NoteService::new(Arc::new(SqliteNoteRepository::new(conn)), identity);
            let note = notes.create_note(title, body)?;
            print_json(&note)?;
            true
        }
        Command::Summarize {
            note_id,
            regenerate,
        } => {
            if regenerate {
                print_outcome(GenerationOutcome::from(
                    generation.regenerate_summary(&note_id).await,
                ))?
            } else {
                print_outcome(GenerationOutcome::from(
                    generation.generate_summary(&note_id).await,
                ))?
            }
        }
        Command::Tags {
            note_id,
            regenerate,
        } => {
            if regenerate {
                print_outcome(GenerationOutcome::from(
                    generation.regenerate_tags(&note_id).await,
                ))?
            } else {
                print_outcome(GenerationOutcome::from(
                    generation.generate_tags(&note_id).await,
                ))?
            }
        }
        Command::PreviewTags { content } => {
            print_outcome(GenerationOutcome::from(
                generation.preview_tags(&content).await,
            ))?
        }
        Command::Quota { operation } => {
            print_outcome(GenerationOutcome::from(
                generation.regeneration_status(operation.into()),
            ))?
        }
        Command::Usage { limit } => {
            let user = args.user.context("usage requires --user")?;
            let usage = generation.usage();
            print_json(&serde_json::json!({
                "today": usage.today_totals(user)?,
                "recent": usage.recent(user, limit)?,
            }))?;
            true
        }
    };

    // Background usage writes must land before the process exits.
    generation.usage().flush().await;

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}

fn print_outcome<T: Serialize>(outcome: GenerationOutcome<T>) -> Result<bool> {
    print_json(&outcome)?;
    Ok(outcome.success)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
