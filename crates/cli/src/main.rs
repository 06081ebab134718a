//! Deferred Maintenance CLI
//! Open, close and report maintenance Findings in JupiterOne for one or more CodeRepos.

mod discover;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use deferred_maintenance_core::application::report::{self, humanize_due, MaintenanceSummary};
use deferred_maintenance_core::application::{
    MaintenanceLifecycleManager, MaxAttempts, RetryExecutor, RetryPolicy, SkippedEntity,
};
use deferred_maintenance_core::domain::{
    parse_due_date, CloseInfo, CloseReason, DueWindow, MaintenanceContent, TargetEntity,
};
use deferred_maintenance_core::error::AppError;
use deferred_maintenance_core::port::id_provider::UuidProvider;
use deferred_maintenance_core::port::time_provider::SystemTimeProvider;
use deferred_maintenance_core::port::TimeProvider;
use deferred_maintenance_infra_jupiterone::{JupiterOneClient, JupiterOneConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_LOG_FILTER: &str =
    "deferred_maintenance=info,deferred_maintenance_core=info,deferred_maintenance_infra_jupiterone=info";

#[derive(Parser)]
#[command(name = "deferred-maintenance")]
#[command(about = "Manage maintenance Findings in JupiterOne for one or more CodeRepos", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// JupiterOne account id
    #[arg(long, env = "J1_ACCOUNT", hide_env_values = true, global = true)]
    account: Option<String>,

    /// JupiterOne API token
    #[arg(long, env = "J1_API_TOKEN", hide_env_values = true, global = true)]
    api_token: Option<String>,

    /// Use the JupiterOne dev environment (any non-falsey J1_DEV_ENABLED)
    #[arg(
        long,
        env = "J1_DEV_ENABLED",
        global = true,
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    dev: bool,

    /// Override the GraphQL endpoint
    #[arg(long, env = "J1_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Email recorded as createdBy/closedBy (defaults to the endpoint agent's)
    #[arg(long, env = "J1_EMAIL", global = true)]
    email: Option<String>,

    #[command(flatten)]
    retry: RetryArgs,
}

#[derive(Args)]
struct RetryArgs {
    /// Give up after this many attempts per remote call (default: retry forever)
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..))]
    max_attempts: Option<u32>,

    /// Delay before the first retry (ms)
    #[arg(long, global = true, default_value_t = 20_000)]
    retry_delay_ms: u64,

    /// Backoff multiplier applied after each failed attempt
    #[arg(long, global = true, default_value_t = 1.5)]
    retry_factor: f64,

    /// Upper bound on the delay between attempts (ms)
    #[arg(long, global = true, default_value_t = 70_000)]
    retry_max_delay_ms: u64,
}

impl RetryArgs {
    fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            initial_delay: Duration::from_millis(self.retry_delay_ms),
            factor: self.retry_factor,
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            max_attempts: self
                .max_attempts
                .map_or(MaxAttempts::Unbounded, MaxAttempts::bounded),
            jitter: true,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Open a maintenance Finding for every entity a J1QL query returns
    Open {
        /// J1QL query selecting the target entities
        #[arg(short, long)]
        query: String,

        /// A *very* short description (50 chars max, visible in the graph)
        #[arg(short, long)]
        short_description: String,

        /// Fuller description of the maintenance
        #[arg(short, long)]
        description: String,

        /// URL of the issue, Slack comment, etc.
        #[arg(short, long)]
        web_link: String,

        /// Due date relative to now: 7d, 30d, 60d, 90d, 180d or 365d
        #[arg(long, default_value = "7d")]
        due: DueWindow,

        /// Explicit due date (MM-DD-YYYY); overrides --due
        #[arg(long)]
        due_date: Option<String>,

        /// Show how many entities would be affected and stop
        #[arg(long)]
        dry_run: bool,
    },

    /// Close the maintenance Findings a J1QL query returns
    Close {
        /// J1QL query selecting maintenance Findings
        #[arg(short, long)]
        query: String,

        /// Why the maintenance is being closed
        #[arg(short, long, value_enum)]
        reason: ReasonArg,

        /// URL of the work performed (required unless the reason is ERROR)
        #[arg(short, long)]
        link: Option<String>,

        /// Show how many entities would be affected and stop
        #[arg(long)]
        dry_run: bool,
    },

    /// List open maintenance for the current code repo (default command)
    Report {
        /// Code repo name (default: current git checkout)
        #[arg(long)]
        repo: Option<String>,

        /// Also list open maintenance created by you
        #[arg(long)]
        mine: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ReasonArg {
    /// Work has been performed
    #[value(name = "COMPLETE")]
    Complete,
    /// Maintenance was opened in error
    #[value(name = "ERROR")]
    Error,
    /// Business accepts maintenance risk
    #[value(name = "RISK_ACCEPTED")]
    RiskAccepted,
}

impl From<ReasonArg> for CloseReason {
    fn from(arg: ReasonArg) -> Self {
        match arg {
            ReasonArg::Complete => CloseReason::Complete,
            ReasonArg::Error => CloseReason::Error,
            ReasonArg::RiskAccepted => CloseReason::RiskAccepted,
        }
    }
}

#[derive(Tabled)]
struct AppliedRow {
    target: String,
    finding: String,
    #[tabled(rename = "maintenanceId")]
    maintenance_id: String,
}

#[derive(Tabled)]
struct SkippedRow {
    entity: String,
    #[tabled(rename = "type")]
    entity_type: String,
    reason: String,
}

#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "maintenanceId")]
    maintenance_id: String,
    due: String,
    description: String,
    link: String,
}

fn init_logging() -> Result<()> {
    // JSON for log shippers, pretty otherwise; stdout is reserved for results
    let log_format = std::env::var("DM_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))?;

    match log_format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
    Ok(())
}

/// Wire the adapter, retry policy and manager from validated settings
fn build_manager(cli: &Cli) -> Result<MaintenanceLifecycleManager> {
    let mut config =
        JupiterOneConfig::new(cli.account.clone(), cli.api_token.clone())?.dev(cli.dev);
    if let Some(endpoint) = &cli.endpoint {
        config = config.with_endpoint(endpoint.clone());
    }
    info!(endpoint = %config.endpoint, account = %config.account, "Connecting to JupiterOne");

    let client = JupiterOneClient::new(config).context("Failed to create JupiterOne client")?;
    let policy = cli.retry.policy();
    info!(max_attempts = %policy.max_attempts, "Retry policy configured");

    Ok(MaintenanceLifecycleManager::new(
        Arc::new(client),
        RetryExecutor::new(policy),
        Arc::new(UuidProvider),
    ))
}

async fn gather_required(
    manager: &MaintenanceLifecycleManager,
    query: &str,
) -> Result<Vec<TargetEntity>> {
    let entities = manager.gather_entities(query).await?;
    if entities.is_empty() {
        return Err(AppError::Precondition("invalid query, or no results".to_string()).into());
    }
    println!(
        "Looks like this will impact: {}",
        format!("{} entities", entities.len()).bold()
    );
    Ok(entities)
}

fn print_skipped(skipped: &[SkippedEntity]) {
    if skipped.is_empty() {
        return;
    }
    println!();
    println!("{}", "Skipped:".yellow().bold());
    let rows: Vec<SkippedRow> = skipped
        .iter()
        .map(|s| SkippedRow {
            entity: s.entity_id.clone(),
            entity_type: s.entity_type.clone(),
            reason: s.reason.to_string(),
        })
        .collect();
    println!("{}", Table::new(rows));
}

fn print_report(title: String, rows: &[MaintenanceSummary], now: i64) {
    if rows.is_empty() {
        return;
    }
    println!("{}", title.cyan().bold());
    let rows: Vec<ReportRow> = rows
        .iter()
        .map(|r| ReportRow {
            maintenance_id: r.maintenance_id.clone(),
            due: r
                .due_date
                .map_or_else(|| "-".to_string(), |due| humanize_due(due, now)),
            description: r.short_description.clone(),
            link: r.web_link.clone(),
        })
        .collect();
    println!("{}", Table::new(rows));
    println!();
}

async fn run(cli: Cli) -> Result<()> {
    let clock = SystemTimeProvider;

    match cli.command {
        Some(Commands::Open {
            ref query,
            ref short_description,
            ref description,
            ref web_link,
            due,
            ref due_date,
            dry_run,
        }) => {
            let due_millis = match due_date {
                Some(date) => parse_due_date(date).map_err(AppError::from)?,
                None => due.due_at(clock.now_millis()),
            };
            let created_by = discover::discover_email(
                cli.email.clone(),
                Path::new(discover::AGENT_CONFIG_PATH),
            );
            let content = MaintenanceContent::new(
                short_description.as_str(),
                description.as_str(),
                web_link.as_str(),
                due_millis,
            )
            .map_err(AppError::from)?
            .with_created_by(created_by);

            let manager = build_manager(&cli)?;
            let entities = gather_required(&manager, query).await?;
            if dry_run {
                println!("skipping...");
                return Ok(());
            }

            let report = manager.apply_maintenance(&entities, &content).await?;

            println!("{}", "✓ Open OK".green().bold());
            println!();
            let rows: Vec<AppliedRow> = report
                .applied
                .iter()
                .map(|a| AppliedRow {
                    target: a.target_id.clone(),
                    finding: a.finding_id.clone(),
                    maintenance_id: report.maintenance_id.clone(),
                })
                .collect();
            println!("{}", Table::new(rows));
            print_skipped(&report.skipped);
        }

        Some(Commands::Close {
            ref query,
            reason,
            ref link,
            dry_run,
        }) => {
            let closed_by = discover::discover_email(
                cli.email.clone(),
                Path::new(discover::AGENT_CONFIG_PATH),
            );
            let close = CloseInfo::new(reason.into(), link.clone())
                .map_err(AppError::from)?
                .with_closed_by(closed_by);

            let manager = build_manager(&cli)?;
            let entities = gather_required(&manager, query).await?;
            if dry_run {
                println!("skipping...");
                return Ok(());
            }

            let report = manager.close_maintenance(&entities, &close).await?;

            println!(
                "{}",
                format!("✓ Close OK ({} closed)", report.closed.len())
                    .green()
                    .bold()
            );
            print_skipped(&report.skipped);
        }

        Some(Commands::Report { ref repo, mine }) => {
            report_open(&cli, repo.clone(), mine, &clock).await?;
        }

        None => {
            report_open(&cli, None, false, &clock).await?;
        }
    }

    Ok(())
}

async fn report_open(
    cli: &Cli,
    repo: Option<String>,
    mine: bool,
    clock: &dyn TimeProvider,
) -> Result<()> {
    let manager = build_manager(cli)?;
    println!("{}", "Gathering maintenance report...".cyan());

    let repo = match repo {
        Some(repo) => Some(repo),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            discover::discover_code_repo(&cwd, std::env::var("OUTERPWD").ok())
        }
    };
    let now = clock.now_millis();

    if let Some(repo) = repo {
        let rows = report::open_for_repo(&manager, &repo).await?;
        print_report(format!("{} maintenance needed:", repo), &rows, now);
    }

    if mine {
        let email = discover::discover_email(
            cli.email.clone(),
            Path::new(discover::AGENT_CONFIG_PATH),
        );
        match email {
            Some(email) => {
                let rows = report::open_created_by(&manager, &email).await?;
                print_report(format!("{} created open maintenance items:", email), &rows, now);
            }
            None => println!("{}", "No email configured; skipping personal report".yellow()),
        }
    }

    println!("{}", "OK".green().bold());
    Ok(())
}

/// 2 when nothing remote was attempted (bad input or config), 1 otherwise
fn exit_status(err: &anyhow::Error) -> u8 {
    let precondition = err
        .downcast_ref::<AppError>()
        .is_some_and(AppError::is_precondition);
    if precondition {
        2
    } else {
        1
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
    }
    info!("deferred-maintenance v{} starting", VERSION);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            ExitCode::from(exit_status(&e))
        }
    }
}
