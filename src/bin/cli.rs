//! bountywatch CLI
//!
//! Local entry point for the watcher, the inbound bot loop and the
//! inspection commands.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};

use bountywatch::{
    App,
    config::{load_credentials, read_config},
    error::{AppError, Result},
    models::{Config, Flags, Record, render_value},
    pipeline::{self, Compiled, CycleOutcome, Extractor},
    storage::{LocalStorage, Storage},
    utils::log as console,
};

/// bountywatch - bug-bounty program change notifier
#[derive(Parser, Debug)]
#[command(
    name = "bountywatch",
    version,
    about = "Watches bug-bounty listings and notifies Telegram subscribers"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "instance/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the inbound bot loop and the periodic watcher together
    Run,

    /// Answer inbound commands only
    Listen,

    /// Run extraction/broadcast cycles periodically
    Watch,

    /// Run a single extraction/broadcast cycle
    Cycle,

    /// Fetch the listing and print the extracted records
    Extract {
        /// Include archived, disabled and private programs too
        #[arg(short, long)]
        all: bool,

        /// Print a numbered, labelled listing instead of CSV lines
        #[arg(short, long)]
        debug: bool,
    },

    /// Compile the message a subscriber would get for two snapshot files
    Diff {
        /// Previous snapshot
        old: PathBuf,

        /// Current snapshot
        new: PathBuf,

        /// Subscriber flags, e.g. 1111
        #[arg(short, long, default_value = "1111")]
        flags: Flags,

        /// Entry display width
        #[arg(short, long)]
        width: Option<usize>,
    },

    /// Show stored snapshots
    History(HistoryArgs),

    /// Validate the configuration and credentials
    Validate,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    /// Number of most recent snapshots
    #[arg(short, long, default_value_t = 5, conflicts_with_all = ["from", "to"])]
    last: usize,

    /// First day of the range (YYYY-MM-DD)
    #[arg(long, requires = "to")]
    from: Option<NaiveDate>,

    /// Last day of the range, inclusive (YYYY-MM-DD)
    #[arg(long, requires = "from")]
    to: Option<NaiveDate>,

    /// Print snapshot contents
    #[arg(long)]
    show: bool,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool, config_level: &str) {
    let level = if verbose { "debug" } else { config_level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, fallback) = read_config(&cli.config)?;
    init_logging(cli.verbose, &config.logging.level);

    match fallback {
        Some(e) => log::warn!(
            "Config load failed from {}: {}. Using defaults.",
            cli.config.display(),
            e
        ),
        None => log::info!("Loaded configuration from {}", cli.config.display()),
    }

    match cli.command {
        Command::Run => {
            let app = App::from_config(config)?;
            log::info!("Listening for commands and watching for changes");
            app.run().await;
        }

        Command::Listen => {
            let app = App::from_config(config)?;
            app.listen().await;
        }

        Command::Watch => {
            let app = App::from_config(config)?;
            app.watch().await;
        }

        Command::Cycle => {
            let app = App::from_config(config)?;
            match app.cycle().await? {
                CycleOutcome::NoData => console::success("No data this cycle; nothing stored"),
                CycleOutcome::Broadcast {
                    records,
                    digest,
                    report,
                } => console::summary(
                    "Cycle complete",
                    &[
                        ("records", records.to_string()),
                        ("snapshot", digest),
                        ("sent", report.sent.to_string()),
                        ("failed", report.failed.to_string()),
                        ("skipped", report.skipped.to_string()),
                    ],
                ),
            }
        }

        Command::Extract { all, debug } => {
            let extractor = Extractor::from_config(&config.source, &config.browser)?
                .include_all(all || config.source.include_all);
            let Some(records) = extractor.extract().await else {
                return Err(AppError::validation(
                    "failed to fetch valid data from both API and browser",
                ));
            };
            print_records(&records, debug);
        }

        Command::Diff {
            old,
            new,
            flags,
            width,
        } => {
            let old = std::fs::read_to_string(&old)?;
            let new = std::fs::read_to_string(&new)?;
            let width = width.unwrap_or(config.broadcast.max_entry_width);
            let changes = pipeline::diff(&old, &new);
            match pipeline::compile(&flags, &changes, width) {
                Compiled::Message(text) => println!("{}", text),
                Compiled::NoChange => console::success("No visible change for these flags"),
            }
        }

        Command::History(args) => {
            let storage = LocalStorage::new(&config.paths.storage);
            show_history(&storage, &args).await?;
        }

        Command::Validate => validate(&config)?,
    }

    Ok(())
}

fn print_records(records: &[Record], debug: bool) {
    if !debug {
        for record in records {
            println!("{}", record.to_line());
        }
        return;
    }

    console::header(&format!("Total programs collected: {}", records.len()));
    for (idx, record) in records.iter().enumerate() {
        let fields: Vec<String> = record
            .fields()
            .map(|(name, value)| format!("{}: {}", name, render_value(value)))
            .collect();
        println!("{:02}. {}", idx + 1, fields.join(" | "));
    }
}

async fn show_history(storage: &dyn Storage, args: &HistoryArgs) -> Result<()> {
    let snapshots = match (args.from, args.to) {
        (Some(from), Some(to)) => {
            storage
                .snapshots_between(start_of_day(from), end_of_day(to))
                .await?
        }
        _ => storage.latest_snapshots(args.last).await?,
    };

    if snapshots.is_empty() {
        console::success("No snapshots stored");
        return Ok(());
    }

    for snapshot in &snapshots {
        println!(
            "{}  {}  {} lines",
            snapshot.taken_at.format("%Y-%m-%d %H:%M:%S"),
            snapshot.short_digest(),
            snapshot.data.lines().count()
        );
        if args.show {
            for line in snapshot.data.lines() {
                console::sub_item(line);
            }
        }
    }
    Ok(())
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_nano_opt(23, 59, 59, 999_999_999)
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|| start_of_day(date))
}

fn validate(config: &Config) -> Result<()> {
    console::header("Validating configuration");

    console::step(1, 2, "Configuration values");
    console::sub_item(&format!("Source: {}", config.source.base_url));
    console::sub_item(&format!(
        "Fields: {}",
        config
            .source
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    ));
    console::sub_item(&format!(
        "Retries: {} attempts, {} ms initial delay",
        config.source.max_attempts, config.source.retry_delay_ms
    ));
    console::sub_item(&format!(
        "Browser fallback: {}",
        if config.browser.enabled { "on" } else { "off" }
    ));
    console::success("Config OK");

    console::step(2, 2, "Credentials");
    load_credentials(&config.bot)?;
    console::success("Token and secret present");

    Ok(())
}
