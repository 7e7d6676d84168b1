//! Tilde - raw-mode terminal substrate
//!
//! Full-screen placeholder editor. Ctrl-Q quits.

use std::io;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tilde::{config::Config, logging, terminal, Fatal};

#[derive(Parser)]
#[command(name = "tilde")]
#[command(about = "Raw-mode terminal editor shell - Ctrl-Q to quit")]
#[command(version)]
struct Cli {
    /// Write logs to this file
    #[arg(long, env = "TILDE_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Override config file path
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Skip the driver size query and always probe with the cursor
    #[arg(long)]
    force_cursor_probe: bool,
}

fn main() {
    match run() {
        Ok(()) => process::exit(0),
        Err(fatal) => {
            // stderr may be gone too; the exit status still reports the failure
            let _ = terminal::report_fatal(&mut io::stdout(), &mut io::stderr(), &fatal);
            process::exit(1);
        }
    }
}

fn run() -> Result<(), Fatal> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if cli.force_cursor_probe {
        config.force_cursor_probe = true;
    }
    if let Some(path) = cli.log_file {
        config.log_file = Some(path);
    }

    if let Some(path) = &config.log_file {
        logging::init_global(path)?;
    }

    terminal::run(&config)
}
