use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod error;
mod loader;
mod metrics;
mod models;
mod refresh;
mod report;
mod store;

use config::{DashboardConfig, Overrides};
use metrics::PageId;
use models::NormalizedTable;
use refresh::Refresher;

#[derive(Parser)]
#[command(name = "sprint-metrics")]
#[command(about = "Sprint metrics for a task dataset", long_about = None)]
struct Cli {
    /// CSV location: an http(s) URL or a local path [env: DASHBOARD_SOURCE]
    #[arg(long, global = true)]
    source: Option<String>,
    /// Seconds to wait for one fetch [env: DASHBOARD_FETCH_TIMEOUT_SECS]
    #[arg(long, global = true)]
    fetch_timeout_secs: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the sprints in the dataset
    Sprints,
    /// Print the chart tables of one page
    Page {
        #[arg(long, default_value = "1")]
        page: PageId,
        /// Defaults to the earliest sprint
        #[arg(long)]
        sprint: Option<u32>,
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Write a markdown report covering all pages
    Report {
        #[arg(long)]
        sprint: Option<u32>,
        #[arg(long, default_value = "dashboard.md")]
        out: PathBuf,
    },
    /// Keep the dataset fresh and print a page after every refresh
    Watch {
        #[arg(long, default_value = "1")]
        page: PageId,
        #[arg(long)]
        sprint: Option<u32>,
        /// [env: DASHBOARD_REFRESH_SECS]
        #[arg(long)]
        refresh_secs: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Markdown,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let refresh_secs = match &cli.command {
        Commands::Watch { refresh_secs, .. } => *refresh_secs,
        _ => None,
    };
    let config = DashboardConfig::resolve(Overrides {
        source: cli.source,
        refresh_secs,
        fetch_timeout_secs: cli.fetch_timeout_secs,
    })?;

    let refresher = Refresher::start(config.source.clone(), config.fetch_timeout)
        .await
        .with_context(|| format!("initial load from {} failed", config.source))?;
    let store = refresher.store();

    match cli.command {
        Commands::Sprints => {
            let snapshot = store.get();
            if snapshot.table.is_empty() {
                println!("No tasks found in this dataset.");
                return Ok(());
            }
            for option in metrics::sprint_options(&snapshot.table) {
                println!("{}: {} tasks", option.label, option.task_count);
            }
        }
        Commands::Page {
            page,
            sprint,
            format,
        } => {
            let snapshot = store.get();
            println!("{}", render(&snapshot.table, page, sprint, format)?);
        }
        Commands::Report { sprint, out } => {
            let snapshot = store.get();
            let sprint = sprint
                .or_else(|| metrics::default_sprint(&snapshot.table))
                .unwrap_or(1);
            let report = report::build_report(
                &snapshot.table,
                sprint,
                &config.source.to_string(),
                snapshot.loaded_at,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Watch { page, sprint, .. } => {
            let refresher = Arc::new(refresher);
            let handle = refresher.spawn(config.refresh_interval);
            info!(
                interval_secs = config.refresh_interval.as_secs(),
                "watching {}", config.source
            );

            let mut updates = refresher.subscribe();
            let snapshot = store.get();
            println!("{}", render(&snapshot.table, page, sprint, Format::Markdown)?);
            loop {
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = store.get();
                        println!("{}", render(&snapshot.table, page, sprint, Format::Markdown)?);
                    }
                    result = tokio::signal::ctrl_c() => {
                        result.context("failed to listen for ctrl-c")?;
                        break;
                    }
                }
            }
            handle.abort();
        }
    }

    Ok(())
}

fn render(
    table: &NormalizedTable,
    page: PageId,
    sprint: Option<u32>,
    format: Format,
) -> anyhow::Result<String> {
    let sprint = sprint
        .or_else(|| metrics::default_sprint(table))
        .unwrap_or(1);
    let view = metrics::aggregate(table, sprint, page);
    match format {
        Format::Json => serde_json::to_string_pretty(&view).context("failed to encode page"),
        Format::Markdown => Ok(report::render_page(&view)),
    }
}
