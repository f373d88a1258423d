//! Site-Audit main entry point
//!
//! This is the command-line interface for the audit pipeline: it starts
//! audits, runs the queue worker and the recovery monitor, and gives
//! operators views of stored jobs.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use site_audit::config::{load_config_with_hash, Config};
use site_audit::output::{load_statistics, print_job_table, print_statistics, write_markdown_report};
use site_audit::pipeline::{Pipeline, Worker};
use site_audit::recovery::RecoveryMonitor;
use site_audit::storage::{lock, open_storage, shared, SharedStorage, Storage};
use site_audit::AuditService;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Site-Audit: a polite website audit pipeline
///
/// Audits crawl a site, check its pages and links, and compile a report.
/// Stage work is queued in the audit database and run by `worker`.
#[derive(Parser, Debug)]
#[command(name = "site-audit")]
#[command(version)]
#[command(about = "A polite website audit pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the configuration and print it
    CheckConfig,

    /// Queue a new audit
    Start {
        /// Site to audit; https:// is assumed when no scheme is given
        url: String,

        /// Page limit for the crawl
        #[arg(long)]
        max_pages: Option<u32>,

        #[arg(long)]
        user_id: Option<String>,

        #[arg(long)]
        correlation_id: Option<String>,
    },

    /// Print an audit as the front end sees it
    Show {
        id: i64,

        /// Also print the operator-only technical detail
        #[arg(long)]
        technical: bool,
    },

    /// Run queued stage tasks
    Worker {
        /// Exit once the queue is empty
        #[arg(long)]
        until_idle: bool,

        /// Do not run the recovery monitor alongside the worker
        #[arg(long)]
        no_monitor: bool,
    },

    /// Run the recovery monitor until interrupted
    Monitor,

    /// List stuck audits
    Stuck,

    /// Show statistics and the most recent audits
    Status,

    /// Resume or fail one stuck audit
    Recover { id: i64 },

    /// Recover every stuck audit
    AutoRecover,

    /// Write an audit's report as markdown
    Export { id: i64, path: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);
    let config = Arc::new(config);

    if let Command::CheckConfig = cli.command {
        handle_check_config(&config);
        return Ok(());
    }

    let storage = open_shared_storage(&config)?;

    match cli.command {
        Command::CheckConfig => {}
        Command::Start {
            url,
            max_pages,
            user_id,
            correlation_id,
        } => {
            let service = AuditService::new(storage, Arc::clone(&config), config_hash);
            let started = service.start_audit(&url, max_pages, user_id, correlation_id)?;
            println!("{}", serde_json::to_string_pretty(&started)?);
        }
        Command::Show { id, technical } => handle_show(storage, config, &config_hash, id, technical)?,
        Command::Worker {
            until_idle,
            no_monitor,
        } => handle_worker(storage, config, until_idle, no_monitor).await?,
        Command::Monitor => {
            let monitor = RecoveryMonitor::new(storage, config.recovery.clone());
            monitor.run(shutdown_on_ctrl_c()).await;
        }
        Command::Stuck => {
            let monitor = RecoveryMonitor::new(storage, config.recovery.clone());
            print_job_table(&monitor.list_stuck()?);
        }
        Command::Status => {
            let stats = load_statistics(&*lock(&storage)?, config.recovery.status_limit)?;
            print_statistics(&stats);
            let monitor = RecoveryMonitor::new(storage, config.recovery.clone());
            print_job_table(&monitor.status()?);
        }
        Command::Recover { id } => {
            let monitor = RecoveryMonitor::new(storage, config.recovery.clone());
            let outcome = monitor.recover(id)?;
            println!("Audit {}: {} (status {})", id, outcome.action, outcome.job.status);
        }
        Command::AutoRecover => {
            let monitor = RecoveryMonitor::new(storage, config.recovery.clone());
            let outcomes = monitor.auto_recover()?;
            if outcomes.is_empty() {
                println!("No stuck audits.");
            }
            for outcome in outcomes {
                println!(
                    "Audit {}: {} (status {})",
                    outcome.job.id, outcome.action, outcome.job.status
                );
            }
        }
        Command::Export { id, path } => handle_export(&storage, id, &path)?,
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("site_audit=info,warn"),
            1 => EnvFilter::new("site_audit=debug,info"),
            2 => EnvFilter::new("site_audit=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_shared_storage(config: &Config) -> anyhow::Result<SharedStorage> {
    let path = Path::new(&config.storage.database_path);
    let storage = open_storage(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    Ok(shared(storage))
}

/// Token cancelled on Ctrl-C
fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        trigger.cancel();
    });
    token
}

/// Handles `check-config`: prints the effective configuration
fn handle_check_config(config: &Config) {
    println!("=== Site-Audit Configuration ===\n");

    println!("User Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nCrawler:");
    println!(
        "  Max pages: {} (limit {})",
        config.crawler.default_max_pages, config.crawler.max_pages_limit
    );
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Minimum time on page: {}ms", config.crawler.minimum_time_on_page);
    println!("  Stage timeout: {}s", config.crawler.stage_timeout);

    let external = &config.external_links;
    println!("\nExternal Links:");
    println!("  Max links: {}", external.max_links);
    println!(
        "  Chunks: size {}, {} in flight",
        external.chunk_size, external.max_concurrent_chunks
    );
    println!(
        "  Timeouts: {}s per chunk, {}s overall",
        external.chunk_timeout, external.global_timeout
    );

    println!("\nWorker:");
    println!("  Concurrent jobs: {}", config.worker.max_concurrent_jobs);
    println!(
        "  Stage attempts: {} (backoff {}s..{}s)",
        config.retry.stage_max_attempts, config.retry.stage_backoff_base, config.retry.stage_backoff_cap
    );

    println!("\nRecovery:");
    println!("  Stale after: {}s", config.recovery.stale_after);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    match &config.callback {
        Some(callback) => println!("\nCallback: {}", callback.url),
        None => println!("\nCallback: none"),
    }
    println!("False-positive rules: {}", config.false_positive.len());

    println!("\n✓ Configuration is valid");
}

/// Handles `show`: prints the front-end view of an audit
fn handle_show(
    storage: SharedStorage,
    config: Arc<Config>,
    config_hash: &str,
    id: i64,
    technical: bool,
) -> anyhow::Result<()> {
    let service = AuditService::new(storage.clone(), config, config_hash);
    let view = service.get_audit(id)?;
    println!("{}", serde_json::to_string_pretty(&view)?);

    if technical {
        let detail = lock(&storage)?
            .get_audit(id)?
            .and_then(|job| job.technical_detail);
        println!("\nTechnical detail:\n{}", detail.as_deref().unwrap_or("(none)"));
    }
    Ok(())
}

/// Handles `worker`: runs the queue, with the recovery monitor alongside
async fn handle_worker(
    storage: SharedStorage,
    config: Arc<Config>,
    until_idle: bool,
    no_monitor: bool,
) -> anyhow::Result<()> {
    let pipeline = Pipeline::from_config(storage.clone(), Arc::clone(&config))
        .context("failed to build the audit pipeline")?;
    let worker = Worker::new(Arc::new(pipeline));

    if until_idle {
        let stats = worker.run_until_idle().await?;
        println!(
            "Ran {} tasks: {} committed, {} rescheduled, {} failed, {} skipped",
            stats.tasks_run, stats.committed, stats.rescheduled, stats.failed, stats.skipped
        );
        return Ok(());
    }

    let shutdown = shutdown_on_ctrl_c();
    let monitor_handle = if no_monitor {
        None
    } else {
        let monitor = RecoveryMonitor::new(storage, config.recovery.clone());
        let token = shutdown.clone();
        Some(tokio::spawn(async move { monitor.run(token).await }))
    };

    let result = worker.run(shutdown.clone()).await;
    shutdown.cancel();
    if let Some(handle) = monitor_handle {
        if let Err(e) = handle.await {
            tracing::error!("Recovery monitor task failed: {}", e);
        }
    }

    let stats = result?;
    tracing::info!(
        "Worker finished: {} tasks, {} committed, {} failed",
        stats.tasks_run,
        stats.committed,
        stats.failed
    );
    Ok(())
}

/// Handles `export`: writes an audit's report as markdown
fn handle_export(storage: &SharedStorage, id: i64, path: &Path) -> anyhow::Result<()> {
    let job = lock(storage)?.get_audit(id)?;
    let Some(job) = job else {
        bail!("audit {} not found", id);
    };
    let Some(report) = job.report else {
        bail!("audit {} has no report yet (status {})", id, job.status);
    };

    write_markdown_report(&report, path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("✓ Report exported to: {}", path.display());
    Ok(())
}
