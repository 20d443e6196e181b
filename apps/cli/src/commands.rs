//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use staffsync_core::backfill::{Interrupt, SkipReason};
use staffsync_core::pipeline::{self, ProgressReporter, RunPlan, RunSummary};
use staffsync_lms::{CanvasClient, HttpTransport};
use staffsync_shared::{AppConfig, EnvLayer, RunSettings, SettingsOverrides, load_config};
use tracing::{info, warn};

/// Name of the config file written by `config init`.
const CONFIG_FILE_NAME: &str = "staffsync.toml";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// fetch-canvas-staff: sync course staff from Canvas into site data files.
#[derive(Parser)]
#[command(
    name = "fetch-canvas-staff",
    version,
    about = "Fetch course staff (instructors, TAs, tutors) from Canvas and update site data.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Project root holding `.env.local`, `staffsync.toml`, and `src/data/`.
    #[arg(long, default_value = ".", global = true)]
    pub project_root: PathBuf,

    /// Defaults to `fetch` when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Fetch staff from Canvas and update the staff and bio files.
    Fetch(FetchArgs),

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Flags for `fetch`. Each overrides its environment variable.
#[derive(Args, Default)]
pub(crate) struct FetchArgs {
    /// Canvas host (overrides CANVAS_SERVER).
    #[arg(long)]
    pub server: Option<String>,

    /// Canvas API token (overrides CANVAS_TOKEN).
    #[arg(long)]
    pub token: Option<String>,

    /// Course id, course URL, or sis_course_id:<id> (overrides CANVAS_COURSE_ID).
    #[arg(long)]
    pub course: Option<String>,

    /// Skip email lookups (same as SKIP_EMAIL_FETCH=1).
    #[arg(long)]
    pub skip_emails: bool,

    /// Staff document path, relative to the project root.
    #[arg(long)]
    pub staff_out: Option<PathBuf>,

    /// Bio store path, relative to the project root.
    #[arg(long)]
    pub bio_out: Option<PathBuf>,

    /// Do everything except writing files.
    #[arg(long)]
    pub dry_run: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Write a staffsync.toml with defaults into the project root.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "staffsync=info,fetch_canvas_staff=info",
        1 => "staffsync=debug,fetch_canvas_staff=debug",
        _ => "staffsync=trace,fetch_canvas_staff=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let root = cli.project_root;
    match cli.command.unwrap_or_else(|| Command::Fetch(FetchArgs::default())) {
        Command::Fetch(args) => cmd_fetch(&root, args).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(&root),
            ConfigAction::Show => cmd_config_show(&root),
        },
    }
}

// ---------------------------------------------------------------------------
// fetch
// ---------------------------------------------------------------------------

async fn cmd_fetch(root: &Path, args: FetchArgs) -> Result<()> {
    // Configuration problems are fatal before any network activity.
    let env = EnvLayer::load(root)?;
    let config = load_config(root)?;
    let overrides = SettingsOverrides {
        server: args.server,
        token: args.token,
        course: args.course,
        skip_emails: args.skip_emails,
        staff_path: args.staff_out,
        bio_path: args.bio_out,
    };
    let settings = RunSettings::resolve(&config, &env, &overrides, root)?;
    let base_url = settings.base_url()?;

    info!(server = %base_url, course = %settings.course, "connecting to Canvas");

    let client = match CanvasClient::new(base_url, settings.token.clone()) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Canvas client unavailable, skipping staff fetch");
            println!("WARNING: Canvas client unavailable ({e}). Canvas data fetching will be skipped.");
            println!("The site will build with existing data or fallback values.");
            return Ok(());
        }
    };

    let transport = match HttpTransport::new() {
        Ok(transport) => Some(transport),
        Err(e) => {
            warn!(error = %e, "HTTP transport unavailable, email fetching will be skipped");
            None
        }
    };

    let plan = RunPlan::new(&settings, &client, args.dry_run);
    let interrupt = Interrupt::new();
    spawn_interrupt_listener(interrupt.clone());

    let reporter = CliProgress::new();
    let summary = pipeline::run(&client, transport.as_ref(), &plan, &interrupt, &reporter)
        .await
        .wrap_err("failed to fetch Canvas staff data")?;
    drop(reporter);

    print_summary(&plan, &summary);
    Ok(())
}

/// Ctrl-C stops the email backfill after the current member; outside of it
/// (or on a second press) the process exits.
fn spawn_interrupt_listener(interrupt: Interrupt) {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            if interrupt.request() {
                eprintln!("\nEmail fetching interrupted. Continuing with available data...");
            } else {
                eprintln!("\nInterrupted.");
                std::process::exit(130);
            }
        }
    });
}

fn print_summary(plan: &RunPlan, summary: &RunSummary) {
    let record = &summary.staff.record;
    let backfill = &summary.staff.backfill;

    println!();
    println!("  Course:      {}", record.course_name);
    if summary.staff_written {
        println!("  Staff data:  {}", plan.staff_path.display());
    } else {
        println!("  Staff data:  (dry run, not written)");
    }
    println!("  Instructors: {}", record.instructors.len());
    println!("  TAs:         {}", record.tas.len());
    println!("  Tutors:      {}", record.tutors.len());

    let emails = match backfill.skipped {
        Some(SkipReason::Disabled) => "skipped (SKIP_EMAIL_FETCH=1)".to_string(),
        Some(SkipReason::NoTransport) => "skipped (HTTP transport unavailable)".to_string(),
        Some(SkipReason::NothingToFetch) => "all staff already had addresses".to_string(),
        None => format!(
            "found {} of {} ({} failed){}",
            backfill.found,
            backfill.requested,
            backfill.failed,
            if backfill.interrupted { ", interrupted" } else { "" }
        ),
    };
    println!("  Emails:      {emails}");

    match &summary.bios {
        Some(update) => {
            if let Some(warning) = &update.warning {
                println!("  Warning:     {warning}");
            }
            if update.added.is_empty() {
                println!("  Bios:        all instructors already have entries");
            } else {
                println!(
                    "  Bios:        added {} new instructor(s): {}",
                    update.added.len(),
                    update.added.join(", ")
                );
            }
        }
        None => println!("  Bios:        no instructors to add"),
    }
    println!("  Time:        {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn lookup_started(&self, name: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Fetching email [{current}/{total}] {name}"));
    }

    fn lookup_finished(&self, name: &str, email: Option<&str>) {
        match email {
            Some(email) => self.spinner.println(format!("  ✓ {name}: {email}")),
            None => self.spinner.println(format!("  ✗ {name}")),
        }
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init(root: &Path) -> Result<()> {
    let path = root.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Err(eyre!("{} already exists", path.display()));
    }
    let content = toml::to_string_pretty(&AppConfig::default())?;
    std::fs::write(&path, content).wrap_err_with(|| format!("writing {}", path.display()))?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(root: &Path) -> Result<()> {
    let config = load_config(root)?;
    println!("{}", toml::to_string_pretty(&config)?);

    let env = EnvLayer::load(root)?;
    match RunSettings::resolve(&config, &env, &SettingsOverrides::default(), root) {
        Ok(settings) => println!("# resolved: {settings:?}"),
        Err(e) => println!("# not runnable: {e}"),
    }
    Ok(())
}
