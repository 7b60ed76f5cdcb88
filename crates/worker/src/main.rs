use advice_core::advice::pipeline::AdvicePipeline;
use advice_core::advice::RunReport;
use advice_core::config::Settings;
use advice_core::scheduler::{ScheduleOptions, Scheduler};
use advice_core::storage::memory::MemoryDocumentStore;
use advice_core::storage::{open_store, DocumentKey, DocumentStore};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "advice_worker")]
struct Args {
    /// Read the real documents but keep every write in memory; prints the resulting ledger.
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one advice round now and exit.
    Run {
        /// Only consult this provider (catalog name).
        #[arg(long)]
        provider: Option<String>,
    },
    /// Keep running on the daily schedule until interrupted.
    Daemon {
        /// Local hour to fire at; overrides ADVICE_SCHEDULE_HOUR.
        #[arg(long)]
        hour: Option<u32>,

        /// Run immediately and then every N minutes instead of daily.
        #[arg(long)]
        interval_minutes: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let store = open_store(&settings)?;
    let store: Arc<dyn DocumentStore> = if args.dry_run {
        Arc::new(seed_memory_store(store.as_ref()).await?)
    } else {
        store
    };
    let pipeline = AdvicePipeline::from_settings(&settings, store)?;

    match args.command {
        Command::Run { provider } => {
            let result = match provider.as_deref() {
                Some(name) => pipeline.run_single(name).await,
                None => pipeline.run().await,
            };
            let report = match result {
                Ok(report) => report,
                Err(err) => {
                    sentry_anyhow::capture_anyhow(&err);
                    tracing::error!(error = %format!("{err:#}"), "advice run failed");
                    return Err(err);
                }
            };
            print_summary(&report)?;

            if args.dry_run {
                let ledger = pipeline.records().read().await?;
                tracing::info!(dry_run = true, "ledger after run follows");
                println!("{ledger}");
            }

            if !report.succeeded() {
                let err = anyhow::anyhow!("every provider failed (run_id={})", report.run_id);
                sentry_anyhow::capture_anyhow(&err);
                return Err(err);
            }
        }
        Command::Daemon {
            hour,
            interval_minutes,
        } => {
            let mut options = ScheduleOptions::from_settings(&settings);
            if let Some(hour) = hour {
                anyhow::ensure!(hour < 24, "--hour must be 0..=23 (got {hour})");
                options.hour = hour;
            }

            let scheduler = Scheduler::new(Arc::new(pipeline), options);
            match interval_minutes {
                Some(minutes) => {
                    tracing::warn!(minutes, "accelerated cadence; not for production");
                    scheduler.start_with_interval(Duration::from_secs(minutes.saturating_mul(60)))?;
                }
                None => scheduler.start()?,
            }
            tracing::info!(status = ?scheduler.status(), "advice worker running");

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            scheduler.stop();
            tracing::info!("advice worker shutting down");
        }
    }

    Ok(())
}

async fn seed_memory_store(source: &dyn DocumentStore) -> anyhow::Result<MemoryDocumentStore> {
    let mut memory = MemoryDocumentStore::new();
    for key in [DocumentKey::Holdings, DocumentKey::Advice] {
        let text = source
            .read(key)
            .await
            .with_context(|| format!("failed to read {key} for dry run"))?;
        memory = memory.with_document(key, text);
    }
    Ok(memory)
}

fn print_summary(report: &RunReport) -> anyhow::Result<()> {
    for outcome in report.outcomes() {
        match &outcome.error {
            None => tracing::info!(
                provider = %outcome.provider_name,
                ledger = ?outcome.ledger,
                "ok"
            ),
            Some(error) => tracing::warn!(provider = %outcome.provider_name, %error, "failed"),
        }
    }
    let summary = serde_json::json!({
        "run_id": report.run_id,
        "success": report.succeeded(),
        "success_count": report.success_count(),
        "total": report.results.len(),
        "results": report.outcomes(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
