//! CLI entrypoint for cohort
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use cohort_application::{
    CohortProgressNotifier, CompositeProgress, ConsensusCoordinator, NoProgress,
    RecoverOrphansUseCase, StateStore,
};
use cohort_domain::{CheckpointId, CohortId, OutputFormat, QuorumRule};
use cohort_infrastructure::{
    ConfigLoader, FileConfig, JsonlDecisionLog, JsonlLedger, ProcessBackend,
};
use cohort_presentation::{
    Cli, Command, ConsoleFormatter, ProgressReporter, RunArgs, SimpleProgress,
};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.show_config {
        ConfigLoader::print_config_sources();
        return Ok(());
    }

    // Held for the process lifetime so buffered log lines are flushed.
    let _log_guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    info!("Starting cohort");

    let config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?
    };
    check_config(&config)?;

    if !config.output.color {
        colored::control::set_override(false);
    }
    let format = cli
        .output
        .map(OutputFormat::from)
        .or(config.output.format)
        .unwrap_or_default();

    match cli.command {
        Some(Command::Run(args)) => {
            let progress: Arc<dyn CohortProgressNotifier> =
                if cli.quiet || !config.output.show_progress {
                    Arc::new(NoProgress)
                } else if std::io::stderr().is_terminal() {
                    Arc::new(ProgressReporter::new())
                } else {
                    Arc::new(SimpleProgress)
                };
            run(&config, args, format, progress).await
        }
        Some(Command::Status { cohort }) => status(&config, cohort.as_deref(), format).await,
        Some(Command::Recover) => recover(&config).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    }
}

fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    // Initialize logging based on verbosity level; RUST_LOG wins when set
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace", // -vvv or more
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .with_context(|| format!("--log-file {} has no file name", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("could not create log directory {}", dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .init();
    Ok(Some(guard))
}

/// Print config warnings; refuse to start on errors.
fn check_config(config: &FileConfig) -> Result<()> {
    let issues = config.validate();
    for issue in issues.iter().filter(|i| !i.is_error()) {
        eprintln!("Warning: {}", issue.message);
    }
    let errors: Vec<&str> = issues
        .iter()
        .filter(|i| i.is_error())
        .map(|i| i.message.as_str())
        .collect();
    if !errors.is_empty() {
        bail!("Invalid configuration:\n  {}", errors.join("\n  "));
    }
    Ok(())
}

async fn open_store(config: &FileConfig) -> Result<Arc<StateStore>> {
    let ledger = JsonlLedger::open(&config.ledger.path)
        .with_context(|| format!("could not open ledger {}", config.ledger.path.display()))?;
    let store = StateStore::open(Arc::new(ledger))
        .await
        .context("could not rebuild worker state from the ledger")?;
    Ok(Arc::new(store))
}

fn read_prompts(args: &RunArgs) -> Result<Vec<String>> {
    if let Some(prompt) = &args.prompt {
        return Ok(vec![prompt.clone()]);
    }
    if args.prompt_file.is_empty() {
        bail!("A prompt is required. Pass it inline or with --prompt-file.");
    }
    args.prompt_file
        .iter()
        .map(|path| {
            std::fs::read_to_string(path)
                .with_context(|| format!("could not read prompt file {}", path.display()))
        })
        .collect()
}

async fn run(
    config: &FileConfig,
    args: RunArgs,
    format: OutputFormat,
    progress: Arc<dyn CohortProgressNotifier>,
) -> Result<()> {
    let prompts = read_prompts(&args)?;
    let roles = if args.roles.is_empty() {
        config.cohort_roles()
    } else {
        args.roles.clone()
    };
    if roles.is_empty() {
        bail!("No worker roles to run. Configure [workers.<role>] sections or pass --role.");
    }

    let (mut settings, _) = config.to_settings();
    if let Some(rule) = &args.quorum {
        settings.cohort.quorum = rule
            .parse::<QuorumRule>()
            .map_err(|e| anyhow::anyhow!("--quorum: {}", e))?;
    }
    if let Some(secs) = args.timeout {
        settings.cohort.overall_timeout = Duration::from_secs(secs);
    }

    // === Dependency Injection ===
    let store = open_store(config).await?;
    let backend = Arc::new(ProcessBackend::in_temp_dir(
        settings.channel.large_input_threshold,
    )?);
    let coordinator = ConsensusCoordinator::new(store, backend, config.catalog(), settings);
    let coordinator = match &args.decisions {
        Some(path) => {
            let log = Arc::new(
                JsonlDecisionLog::new(path)
                    .with_context(|| format!("could not open decision log {}", path.display()))?,
            );
            // The decision log sees escalations and decisions next to the console output
            let decisions: Arc<dyn CohortProgressNotifier> = log.clone();
            let progress = CompositeProgress::new(vec![progress, decisions]);
            coordinator
                .with_applier(log)
                .with_progress(Arc::new(progress))
        }
        None => coordinator.with_progress(progress),
    };
    let coordinator = Arc::new(coordinator);

    let checkpoint = CheckpointId::new(
        args.checkpoint
            .clone()
            .unwrap_or_else(|| format!("cli-{}", chrono::Utc::now().format("%Y%m%dT%H%M%S"))),
    );
    let cohort_id = coordinator.start_cohort(checkpoint, roles, prompts).await?;
    info!(cohort_id = %cohort_id, "Cohort started");

    let report = tokio::select! {
        report = coordinator.wait_cohort(&cohort_id) => report?,
        _ = tokio::signal::ctrl_c() => {
            warn!(cohort_id = %cohort_id, "Interrupted, cancelling cohort");
            coordinator.cancel_cohort(&cohort_id)?;
            coordinator.wait_cohort(&cohort_id).await?
        }
    };

    let output = match format {
        OutputFormat::Text => ConsoleFormatter::format(&report),
        OutputFormat::Json => ConsoleFormatter::format_json(&report),
    };
    println!("{}", output);

    // Halt callers on a cohort without quorum
    coordinator
        .get_issues(&cohort_id)
        .with_context(|| format!("cohort {} did not reach quorum", cohort_id))?;
    Ok(())
}

async fn status(config: &FileConfig, cohort: Option<&str>, format: OutputFormat) -> Result<()> {
    let store = open_store(config).await?;
    let workers = match cohort {
        Some(id) => store.cohort_workers(&CohortId::from(id)),
        None => store.workers(),
    };

    let output = match format {
        OutputFormat::Text => ConsoleFormatter::format_workers(&workers),
        OutputFormat::Json => ConsoleFormatter::format_workers_json(&workers),
    };
    println!("{}", output);
    Ok(())
}

async fn recover(config: &FileConfig) -> Result<()> {
    let store = open_store(config).await?;
    let report = RecoverOrphansUseCase::new(store).execute().await?;

    if report.recovered.is_empty() {
        println!("No orphaned workers ({} already finished).", report.terminal);
    } else {
        println!("Marked {} orphaned workers as failed:", report.recovered.len());
        for worker_id in &report.recovered {
            println!("  {}", worker_id);
        }
    }
    Ok(())
}
