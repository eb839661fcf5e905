//! hashdb - resolve hash constants against a HashDB server from the terminal
//!
//! Usage:
//!   hashdb lookup <value>                Resolve one hash value
//!   hashdb scan <image> --base 0x400000  Resolve every value in a raw image
//!   hashdb hunt <value>                  Find the algorithm behind a value
//!   hashdb configure                     Pick an algorithm and XOR key
//!   hashdb xor <value>                   Set the XOR key

mod terminal;

use std::io::{self, BufReader, Stdin, Stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hashdb_core::{
    parse_integer_literal, ui_channel, FileSettingsStore, HashDbClient, Session, SettingsScope,
    StartError, TaskHandle, TaskRunner, UiQueue, WorkflowKind, WorkflowState,
};

use terminal::TerminalHost;

/// How often the UI loop checks for queued work.
const UI_TICK: Duration = Duration::from_millis(20);

type Terminal = TerminalHost<BufReader<Stdin>, Stdout>;

#[derive(Parser)]
#[command(name = "hashdb")]
#[command(about = "Resolve hash constants against a HashDB server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Global settings file (JSON or TOML)
    #[arg(long, env = "HASHDB_SETTINGS", default_value = "hashdb.json")]
    settings: PathBuf,

    /// Project settings file; carries the algorithm and XOR key
    #[arg(long, env = "HASHDB_PROJECT")]
    project: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick the hash algorithm and XOR key
    Configure,
    /// Resolve one hash value
    Lookup {
        /// The value as a disassembler shows it (0x1234, 1234h, 0777, ...)
        #[arg(value_parser = parse_literal)]
        value: u64,
        /// Address the value was found at
        #[arg(long, value_parser = parse_literal)]
        address: Option<u64>,
    },
    /// Resolve every value in a raw memory image
    Scan {
        /// Raw image file
        image: PathBuf,
        /// Address the image is loaded at
        #[arg(long, value_parser = parse_literal, default_value = "0")]
        base: u64,
        /// First address to scan (defaults to the base)
        #[arg(long, value_parser = parse_literal)]
        start: Option<u64>,
        /// End of the scan, exclusive (defaults to the end of the image)
        #[arg(long, value_parser = parse_literal)]
        end: Option<u64>,
        /// Label each address with a ptr_ name
        #[arg(long)]
        convert: bool,
    },
    /// Find the algorithms that could have produced a value
    Hunt {
        #[arg(value_parser = parse_literal)]
        value: u64,
    },
    /// Set the XOR key applied before every lookup
    Xor {
        #[arg(value_parser = parse_literal)]
        value: u64,
    },
    /// Write the current settings
    Save {
        /// Write the global file instead of the project file
        #[arg(long)]
        global: bool,
    },
}

fn parse_literal(s: &str) -> Result<u64, String> {
    parse_integer_literal(s).map_err(|e| e.to_string())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Logs go to stderr so prompts stay readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let store = Arc::new(FileSettingsStore::new(&cli.settings, cli.project.clone()));
    let api = Arc::new(HashDbClient::new().context("Failed to create HashDB client")?);
    let runner = TaskRunner::new().context("Failed to start the worker runtime")?;
    let (ui, queue) = ui_channel();

    let session = Session::new(api, store, runner, ui);
    session
        .load_settings()
        .with_context(|| format!("Failed to load settings from {:?}", cli.settings))?;
    info!("Using HashDB API at {}", session.settings().api_url);

    let mut host: Terminal = TerminalHost::new(BufReader::new(io::stdin()), io::stdout());

    let kind = match cli.command {
        Commands::Save { global } => {
            let scope = if global {
                SettingsScope::Global
            } else {
                SettingsScope::Local
            };
            session.save_settings(scope).context("Failed to save settings")?;
            println!("Settings saved ({:?})", scope);
            return Ok(());
        }
        Commands::Xor { value } => {
            host.highlight(value, None);
            session.set_xor_from_selection(&mut host)?;
            persist(&session, cli.project.is_some())?;
            return Ok(());
        }
        Commands::Configure => {
            drive(session.configure(&mut host), queue, &mut host)?;
            WorkflowKind::Configure
        }
        Commands::Lookup { value, address } => {
            host.highlight(value, address);
            drive(session.lookup(&mut host), queue, &mut host)?;
            WorkflowKind::Lookup
        }
        Commands::Hunt { value } => {
            host.highlight(value, None);
            drive(session.hunt(&mut host), queue, &mut host)?;
            WorkflowKind::Hunt
        }
        Commands::Scan {
            image,
            base,
            start,
            end,
            convert,
        } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("Failed to read image {:?}", image))?;
            let image_end = base.saturating_add(bytes.len() as u64);
            let start = start.unwrap_or(base);
            let end = end.unwrap_or(image_end).min(image_end);
            host.load_image(base, bytes, start, end);
            drive(session.scan(&mut host, convert), queue, &mut host)?;
            WorkflowKind::Scan
        }
    };

    host.print_summary()?;

    if session.workflow_state(kind) == WorkflowState::Failed {
        bail!("{:?} failed", kind);
    }
    if matches!(kind, WorkflowKind::Configure | WorkflowKind::Hunt) {
        persist(&session, cli.project.is_some())?;
    }
    Ok(())
}

/// Act as the UI thread until the task and everything it queued are done.
fn drive(
    started: std::result::Result<TaskHandle, StartError>,
    mut queue: UiQueue,
    host: &mut Terminal,
) -> Result<()> {
    // Start failures have already been reported through the host
    let handle = started?;

    loop {
        let ran = queue.drain(host);
        if ran > 0 {
            debug!("Ran {} UI jobs", ran);
        }
        if handle.is_finished() {
            queue.drain(host);
            return Ok(());
        }
        std::thread::sleep(UI_TICK);
    }
}

/// Keep algorithm and XOR changes across runs when a project file is set.
fn persist(session: &Session, has_project: bool) -> Result<()> {
    if has_project {
        session
            .save_settings(SettingsScope::Local)
            .context("Failed to save project settings")?;
    } else {
        println!("No --project file given; settings were not saved");
    }
    Ok(())
}
