use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};

use famreport_client::api::{BackendClient, DEFAULT_BACKEND_URL};
use famreport_client::driver::{self, CancelFlag, DriverConfig, DriverOutcome};
use famreport_client::prefs::LocalStore;
use famreport_client::widgets::WidgetStore;
use famreport_client::{MetricsSource, export, housekeeping};
use famreport_core::export::MetricList;
use famreport_core::fiscal::fiscal_year_for;
use famreport_core::geo::{state_counts, state_name};
use famreport_core::{EngagementKind, FiscalYear, WidgetId};

#[derive(Parser)]
#[command(name = "famreport")]
#[command(author, version, about = "Family engagement reporting client")]
#[command(propagate_version = true)]
struct Cli {
    /// Backend base URL
    #[arg(long, global = true, env = "FAMREPORT_BACKEND_URL", default_value = DEFAULT_BACKEND_URL)]
    backend_url: String,

    /// Fiscal year, e.g. "FY 2025", "2025" or "2024-2025" (default: current)
    #[arg(long, global = true)]
    fy: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show sync progress
    State,

    /// Page the CRM into the backend cache until complete
    Sync {
        /// Rewind the sync offset first
        #[arg(long)]
        reset: bool,

        /// Seconds between batches
        #[arg(long, default_value_t = 2)]
        interval: u64,

        /// Stop after this many failures in a row
        #[arg(long)]
        max_failures: Option<u32>,
    },

    /// Refresh engagement dates and notes for every cached family
    RefreshDates {
        #[arg(long, default_value_t = 0)]
        offset: u64,

        #[arg(long, default_value_t = 50)]
        batch_size: u64,

        #[arg(long, default_value_t = 2)]
        interval: u64,

        #[arg(long)]
        max_failures: Option<u32>,
    },

    /// Print the dashboard metrics as JSON
    Dashboard,

    /// Year-over-year comparison
    Yoy,

    /// Support calls by staff member
    Calls {
        /// Only count these staff members (repeatable)
        #[arg(long)]
        staff: Vec<String>,
    },

    /// List cached families
    Families {
        #[arg(long, default_value_t = 0)]
        skip: u64,

        #[arg(long, default_value_t = 100)]
        limit: u64,

        #[arg(long)]
        search: Option<String>,
    },

    /// Families per US state
    States,

    /// Custom widgets
    #[command(subcommand)]
    Widgets(WidgetCommands),

    /// Write a CSV file
    #[command(subcommand)]
    Export(ExportCommands),

    /// Clear the backend cache and local state (widgets are kept)
    ClearCache,
}

#[derive(Subcommand)]
enum WidgetCommands {
    List,
    Add {
        /// Engagement kind key or label, e.g. "butterfly_fund"
        kind: String,

        #[arg(long)]
        title: Option<String>,
    },
    Remove {
        id: String,
    },
    Refresh,
}

#[derive(Subcommand)]
enum ExportCommands {
    /// All cached families
    Families {
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// One dashboard list: engaged, newlyDiagnosed, newFamilies, firstTimeEngaged, reEngaged
    Metric {
        list: String,

        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Families in one state
    State {
        state: String,

        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

fn fiscal_year(raw: Option<&str>) -> anyhow::Result<FiscalYear> {
    match raw {
        Some(raw) => raw.parse::<FiscalYear>().with_context(|| format!("invalid fiscal year {raw:?}")),
        None => Ok(fiscal_year_for(Utc::now().date_naive())?),
    }
}

fn driver_config(interval: u64, max_failures: Option<u32>, batch_size: u64) -> DriverConfig {
    DriverConfig {
        poll_interval: Duration::from_secs(interval),
        max_consecutive_failures: max_failures,
        refresh_batch_size: batch_size,
    }
}

/// Cancel `flag` on Ctrl-C.
fn cancel_on_ctrl_c(flag: &CancelFlag) {
    let flag = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("stopping after the current request...");
            flag.cancel();
        }
    });
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    famreport_observability::init_with_default(famreport_observability::LogFormat::Pretty);

    let cli = Cli::parse();
    let client = BackendClient::new(&cli.backend_url);
    let fy = fiscal_year(cli.fy.as_deref())?;

    match cli.command {
        Commands::State => {
            let state = client.get_state().await?;
            println!(
                "processed {} of {} (cached {})",
                state.sync_state.last_synced_contact_count, state.sync_state.total_known, state.total_contacts
            );
        }

        Commands::Sync {
            reset,
            interval,
            max_failures,
        } => {
            if reset {
                let r = client.reset_sync().await?;
                println!("reset to offset {} ({} cached)", r.next_skip, r.cached_count);
            }
            let cancel = CancelFlag::new();
            cancel_on_ctrl_c(&cancel);
            let config = driver_config(interval, max_failures, 50);
            let outcome = driver::run_sync(&client, &config, &cancel, |s| {
                println!("{}/{} cached", s.cached_count, s.total_contacts);
            })
            .await;
            match outcome {
                DriverOutcome::Completed(s) => println!("sync complete: {} families", s.cached_count),
                DriverOutcome::Cancelled(_) => println!("sync cancelled; run again to resume"),
                DriverOutcome::GaveUp(e) => bail!("sync stopped after repeated failures: {e}"),
            }
        }

        Commands::RefreshDates {
            offset,
            batch_size,
            interval,
            max_failures,
        } => {
            let cancel = CancelFlag::new();
            cancel_on_ctrl_c(&cancel);
            let config = driver_config(interval, max_failures, batch_size);
            let outcome = driver::run_refresh(&client, &config, &cancel, offset, |s| {
                println!("{}/{} refreshed", s.next_offset, s.total_cached);
            })
            .await;
            match outcome {
                DriverOutcome::Completed(s) => println!("refresh complete: {} families", s.total_cached),
                DriverOutcome::Cancelled(last) => println!(
                    "refresh cancelled; resume with --offset {}",
                    last.map(|s| s.next_offset).unwrap_or(offset)
                ),
                DriverOutcome::GaveUp(e) => bail!("refresh stopped after repeated failures: {e}"),
            }
        }

        Commands::Dashboard => print_json(&client.dashboard(&fy).await?)?,

        Commands::Yoy => print_json(&client.yoy_comparison().await?)?,

        Commands::Calls { staff } => print_json(&client.support_calls(&fy, &staff).await?)?,

        Commands::Families { skip, limit, search } => {
            let page = client.patient_families(skip, limit, search.as_deref()).await?;
            for f in &page.families {
                println!("{}\t{}\t{}", f.id, f.name, f.email.as_deref().unwrap_or(""));
            }
            println!("{} of {} families", page.families.len(), page.total);
        }

        Commands::States => {
            let groups = export::state_summary(&client, &fy).await?;
            for (code, count) in state_counts(&groups) {
                println!("{code}\t{}\t{count}", state_name(code).unwrap_or(code));
            }
        }

        Commands::Widgets(cmd) => {
            let storage = Arc::new(LocalStore::open_default()?);
            let widgets = WidgetStore::open(storage);
            match cmd {
                WidgetCommands::List => print_json(&widgets.list())?,
                WidgetCommands::Add { kind, title } => {
                    let kind: EngagementKind = kind.parse()?;
                    let w = widgets.add(kind, title.as_deref(), &fy, &client).await?;
                    print_json(&w)?;
                }
                WidgetCommands::Remove { id } => {
                    let id: WidgetId = id.parse()?;
                    if !widgets.remove(id)? {
                        println!("no widget {id}");
                    }
                }
                WidgetCommands::Refresh => {
                    let source: Arc<dyn MetricsSource> = Arc::new(client.clone());
                    print_json(&widgets.refresh(&fy, source).await?)?;
                }
            }
        }

        Commands::Export(cmd) => {
            let today = Utc::now().date_naive();
            let path = match cmd {
                ExportCommands::Families { out } => export::export_patient_families(&client, &out, today).await?,
                ExportCommands::Metric { list, out } => {
                    let list: MetricList = list.parse()?;
                    export::export_metric_families(&client, &fy, list, &out, today).await?
                }
                ExportCommands::State { state, out } => {
                    export::export_state_families(&client, &fy, &state, &out).await?
                }
            };
            println!("wrote {}", path.display());
        }

        Commands::ClearCache => {
            let storage = LocalStore::open_default()?;
            let deleted = housekeeping::clear_cache(&client, &storage).await?;
            println!(
                "cleared {} families and {} sync records",
                deleted.families, deleted.sync_states
            );
        }
    }

    Ok(())
}
