//! CLI command definitions for transcription-queue.
//!
//! Recordings live in the SQLite store named by `--database-url`. Jobs live
//! only inside a `process` run: it admits recordings, runs the worker pool
//! and drains the queue before exiting.

use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics::{export_metrics, init_metrics};
use crate::pipeline::{Pipeline, PipelineConfig, PipelineStats};
use crate::recording::{Recording, RecordingStatus};

/// How long `process` waits between checks while the queue is full.
const BACKPRESSURE_POLL: Duration = Duration::from_millis(50);

/// Recording transcription queue.
#[derive(Parser)]
#[command(name = "transcription-queue")]
#[command(about = "Queue uploaded recordings for transcription and track their status")]
#[command(version)]
#[command(
    long_about = "transcription-queue admits uploaded recordings into a bounded in-memory job queue, \
                  transcribes them with a fixed pool of workers and records each result as \
                  ready or failed.\n\nExample usage:\n  transcription-queue add --audio uploads/standup.wav\n  \
                  transcription-queue process --all --workers 4"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// SQLite URL of the recording store.
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Register an uploaded recording (status: pending_upload).
    Add(AddArgs),

    /// Admit recordings, transcribe them and wait until all are resolved.
    #[command(alias = "run")]
    Process(ProcessArgs),

    /// Show one recording.
    Show(ShowArgs),

    /// List recordings, optionally filtered by status.
    #[command(alias = "ls")]
    List(ListArgs),

    /// Mark recordings stuck in `transcribing` by a dead process as failed.
    FailOrphaned(FailOrphanedArgs),
}

/// Arguments for `add`.
#[derive(Parser, Debug)]
pub struct AddArgs {
    /// Storage key of the uploaded audio.
    #[arg(short, long)]
    pub audio: String,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `process`.
#[derive(Parser, Debug)]
pub struct ProcessArgs {
    /// Recording IDs to admit. Pending recordings are confirmed, failed ones retried.
    #[arg(required_unless_present = "all")]
    pub ids: Vec<Uuid>,

    /// Admit every pending and failed recording.
    #[arg(long, conflicts_with = "ids")]
    pub all: bool,

    /// Number of workers (overrides TRANSCRIBE_WORKERS).
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Queue capacity (overrides TRANSCRIBE_QUEUE_CAPACITY).
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// Per-recording transcription deadline in seconds, 0 for none
    /// (overrides TRANSCRIBE_TIMEOUT_SECS).
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Transcription service endpoint (overrides TRANSCRIBER_URL).
    #[arg(long)]
    pub transcriber_url: Option<String>,

    /// Fail recordings left in `transcribing` before admitting.
    #[arg(long)]
    pub fail_orphaned: bool,

    /// Print Prometheus metrics after the run.
    #[arg(long)]
    pub metrics: bool,

    /// Output JSON summary.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `show`.
#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Recording ID.
    pub id: Uuid,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `list`.
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Only list recordings in this status.
    #[arg(short, long)]
    pub status: Option<RecordingStatus>,

    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `fail-orphaned`.
#[derive(Parser, Debug)]
pub struct FailOrphanedArgs {
    /// Output JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For control over logging initialization, use `parse_cli()` and
/// `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    match cli.command {
        Commands::Add(args) => run_add_command(config, args).await,
        Commands::Process(args) => run_process_command(config, args).await,
        Commands::Show(args) => run_show_command(config, args).await,
        Commands::List(args) => run_list_command(config, args).await,
        Commands::FailOrphaned(args) => run_fail_orphaned_command(config, args).await,
    }
}

// ============================================================================
// Command implementations
// ============================================================================

async fn run_add_command(config: PipelineConfig, args: AddArgs) -> anyhow::Result<()> {
    if args.audio.trim().is_empty() {
        anyhow::bail!("--audio cannot be empty");
    }

    let pipeline = Pipeline::connect(config).await?;
    let recording = pipeline.service().register(&args.audio).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&recording)?);
    } else {
        println!("{}", recording.id);
    }
    Ok(())
}

/// One recording the queue would not take.
#[derive(Debug, Serialize)]
struct Rejection {
    id: Uuid,
    error: String,
}

#[derive(Debug, Serialize)]
struct ProcessSummary {
    admitted: usize,
    rejected: Vec<Rejection>,
    orphans_failed: usize,
    stats: PipelineStats,
    recordings: Vec<Recording>,
    duration_ms: u64,
}

fn apply_process_overrides(mut config: PipelineConfig, args: &ProcessArgs) -> PipelineConfig {
    if let Some(workers) = args.workers {
        config.num_workers = workers;
    }
    if let Some(capacity) = args.queue_capacity {
        config.queue_capacity = capacity;
    }
    if let Some(secs) = args.timeout_secs {
        config.transcription_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(url) = &args.transcriber_url {
        config.transcriber_url = url.clone();
    }
    // Orphans are failed explicitly below so they are counted and admitted.
    config.fail_orphaned_on_start = false;
    config
}

async fn run_process_command(config: PipelineConfig, args: ProcessArgs) -> anyhow::Result<()> {
    let fail_orphaned = args.fail_orphaned || config.fail_orphaned_on_start;
    let config = apply_process_overrides(config, &args);

    if args.metrics {
        init_metrics()?;
    }

    let start = std::time::Instant::now();
    let mut pipeline = Pipeline::connect(config).await?;

    let orphans_failed = if fail_orphaned {
        pipeline.service().fail_orphaned().await?.len()
    } else {
        0
    };

    let ids = if args.all {
        let repository = pipeline.service().repository();
        let mut ids: Vec<Uuid> = repository
            .list_by_status(RecordingStatus::PendingUpload)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.extend(
            repository
                .list_by_status(RecordingStatus::Failed)
                .await?
                .into_iter()
                .map(|r| r.id),
        );
        ids
    } else {
        args.ids.clone()
    };

    info!(count = ids.len(), "Admitting recordings");

    let root = CancellationToken::new();
    pipeline.start(&root).await?;

    let mut admitted = 0;
    let mut rejected = Vec::new();
    for id in &ids {
        // This process is the only producer, so waiting for room is enough
        // to keep admissions from bouncing off a full queue.
        while pipeline.queue().stats().remaining_capacity() == 0 {
            tokio::time::sleep(BACKPRESSURE_POLL).await;
        }

        match pipeline.service().admit(*id).await {
            Ok(_) => admitted += 1,
            Err(e) => {
                warn!(record_id = %id, error = %e, "Recording not admitted");
                rejected.push(Rejection {
                    id: *id,
                    error: e.to_string(),
                });
            }
        }
    }

    let stats = pipeline.drain().await?;

    let mut recordings = Vec::with_capacity(ids.len());
    for id in &ids {
        match pipeline.service().repository().get(*id).await {
            Ok(recording) => recordings.push(recording),
            Err(e) => warn!(record_id = %id, error = %e, "Could not reload recording"),
        }
    }

    let summary = ProcessSummary {
        admitted,
        rejected,
        orphans_failed,
        stats,
        recordings,
        duration_ms: start.elapsed().as_millis() as u64,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_process_summary(&summary);
    }

    if args.metrics {
        print!("{}", export_metrics());
    }

    Ok(())
}

fn print_process_summary(summary: &ProcessSummary) {
    println!("\n=== Transcription Results ===");
    println!("Admitted:        {}", summary.admitted);
    println!("Rejected:        {}", summary.rejected.len());
    if summary.orphans_failed > 0 {
        println!("Orphans failed:  {}", summary.orphans_failed);
    }
    println!("Completed:       {}", summary.stats.jobs_completed);
    println!("Failed:          {}", summary.stats.jobs_failed);
    if summary.stats.jobs_timed_out > 0 {
        println!("  timed out:     {}", summary.stats.jobs_timed_out);
    }
    if summary.stats.resolve_errors > 0 {
        println!("Resolve errors:  {}", summary.stats.resolve_errors);
    }
    println!("Avg job time:    {}ms", summary.stats.average_job_ms);
    println!("Wall time:       {}ms", summary.duration_ms);
    println!();

    for recording in &summary.recordings {
        println!(
            "  {}  {:<14} {}",
            recording.id,
            recording.status.as_str(),
            recording.audio_locator
        );
    }
    for rejection in &summary.rejected {
        println!("  {}  rejected: {}", rejection.id, rejection.error);
    }
}

async fn run_show_command(config: PipelineConfig, args: ShowArgs) -> anyhow::Result<()> {
    let pipeline = Pipeline::connect(config).await?;
    let recording = pipeline.service().repository().get(args.id).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&recording)?);
        return Ok(());
    }

    println!("ID:          {}", recording.id);
    println!("Audio:       {}", recording.audio_locator);
    println!("Status:      {}", recording.status);
    println!("Retries:     {}", recording.retry_count);
    println!("Created:     {}", recording.created_at.to_rfc3339());
    println!("Updated:     {}", recording.updated_at.to_rfc3339());
    if let Some(transcript) = &recording.transcript {
        println!("\n{}", transcript);
    }
    Ok(())
}

async fn run_list_command(config: PipelineConfig, args: ListArgs) -> anyhow::Result<()> {
    let pipeline = Pipeline::connect(config).await?;
    let repository = pipeline.service().repository();

    let statuses: Vec<RecordingStatus> = match args.status {
        Some(status) => vec![status],
        None => RecordingStatus::ALL.to_vec(),
    };

    let mut recordings = Vec::new();
    for status in statuses {
        recordings.extend(repository.list_by_status(status).await?);
    }
    recordings.sort_by_key(|r| r.created_at);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&recordings)?);
        return Ok(());
    }

    if recordings.is_empty() {
        println!("No recordings found.");
        return Ok(());
    }
    for recording in &recordings {
        println!(
            "{}  {:<14} retries={}  {}",
            recording.id,
            recording.status.as_str(),
            recording.retry_count,
            recording.audio_locator
        );
    }
    Ok(())
}

async fn run_fail_orphaned_command(
    config: PipelineConfig,
    args: FailOrphanedArgs,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::connect(config).await?;
    let failed = pipeline.service().fail_orphaned().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&failed)?);
    } else if failed.is_empty() {
        println!("No orphaned recordings.");
    } else {
        println!("Marked {} recording(s) as failed:", failed.len());
        for id in failed {
            println!("  {id}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_add_command() {
        let cli = Cli::try_parse_from(["transcription-queue", "add", "--audio", "uploads/a.wav"])
            .expect("should parse");

        assert_eq!(cli.log_level, "info");
        match cli.command {
            Commands::Add(args) => {
                assert_eq!(args.audio, "uploads/a.wav");
                assert!(!args.json);
            }
            _ => panic!("Expected Add command"),
        }
    }

    #[test]
    fn test_process_with_ids_and_overrides() {
        let id = Uuid::new_v4();
        let id_arg = id.to_string();
        let cli = Cli::try_parse_from([
            "transcription-queue",
            "process",
            id_arg.as_str(),
            "--workers",
            "8",
            "--queue-capacity",
            "16",
            "--timeout-secs",
            "0",
            "--fail-orphaned",
            "-j",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Process(args) => {
                assert_eq!(args.ids, vec![id]);
                assert!(!args.all);
                assert!(args.fail_orphaned);
                assert!(args.json);

                let config = apply_process_overrides(
                    PipelineConfig::default().with_transcription_timeout(Duration::from_secs(9)),
                    &args,
                );
                assert_eq!(config.num_workers, 8);
                assert_eq!(config.queue_capacity, 16);
                assert!(config.transcription_timeout.is_none());
            }
            _ => panic!("Expected Process command"),
        }
    }

    #[test]
    fn test_process_requires_ids_or_all() {
        assert!(Cli::try_parse_from(["transcription-queue", "process"]).is_err());

        let cli = Cli::try_parse_from(["transcription-queue", "run", "--all"])
            .expect("should parse with alias");
        match cli.command {
            Commands::Process(args) => assert!(args.all && args.ids.is_empty()),
            _ => panic!("Expected Process command"),
        }
    }

    #[test]
    fn test_process_rejects_ids_with_all() {
        let id = Uuid::new_v4().to_string();
        assert!(
            Cli::try_parse_from(["transcription-queue", "process", id.as_str(), "--all"]).is_err()
        );
    }

    #[test]
    fn test_invalid_uuid_rejected() {
        assert!(Cli::try_parse_from(["transcription-queue", "show", "not-a-uuid"]).is_err());
    }

    #[test]
    fn test_list_status_filter() {
        let cli = Cli::try_parse_from(["transcription-queue", "ls", "--status", "failed"])
            .expect("should parse");
        match cli.command {
            Commands::List(args) => assert_eq!(args.status, Some(RecordingStatus::Failed)),
            _ => panic!("Expected List command"),
        }

        assert!(Cli::try_parse_from(["transcription-queue", "list", "--status", "done"]).is_err());
    }

    #[test]
    fn test_global_database_url() {
        let cli = Cli::try_parse_from([
            "transcription-queue",
            "fail-orphaned",
            "--database-url",
            "sqlite://other.db",
            "--log-level",
            "debug",
        ])
        .expect("should parse");

        assert_eq!(cli.database_url.as_deref(), Some("sqlite://other.db"));
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::FailOrphaned(_)));
    }

    #[test]
    fn test_process_summary_serializes() {
        let summary = ProcessSummary {
            admitted: 1,
            rejected: vec![Rejection {
                id: Uuid::nil(),
                error: "Transcription service busy, try again later".to_string(),
            }],
            orphans_failed: 0,
            stats: Pipeline::new(
                PipelineConfig::default(),
                std::sync::Arc::new(crate::storage::InMemoryRecordingRepository::new()),
                std::sync::Arc::new(
                    crate::transcription::HttpTranscriber::new("http://localhost:1", None)
                        .expect("client should build"),
                ),
            )
            .expect("valid config")
            .stats(),
            recordings: vec![],
            duration_ms: 12,
        };

        let json = serde_json::to_string_pretty(&summary).expect("serialization should succeed");
        assert!(json.contains("\"admitted\": 1"));
        assert!(json.contains("busy"));
        assert!(json.contains("\"queue_capacity\": 100"));
    }
}
