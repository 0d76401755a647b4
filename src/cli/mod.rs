pub mod classify;
pub mod init;
pub mod rules;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "extrato",
    about = "Classify bank statement exports and append them to a budgeting spreadsheet."
)]
pub struct Cli {
    /// Settings file (default: ~/.config/extrato/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a settings file with defaults and create the data directory.
    Init {
        /// Path for extrato data (default: ~/Documents/extrato)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Process every statement export in a directory as one batch.
    Run {
        /// Directory holding the CSV exports
        dir: PathBuf,
        /// Account label mixed into fingerprints (default from settings)
        #[arg(long)]
        source: Option<String>,
        /// Worksheet tab to write to (default: current month)
        #[arg(long)]
        worksheet: Option<String>,
        /// Classify and plan, but write nothing
        #[arg(long = "dry-run")]
        dry_run: bool,
        /// Move processed files into <DIR>/processados after success
        #[arg(long)]
        archive: bool,
        /// Write to a local JSON sheet instead of Google Sheets
        #[arg(long = "sheet-file")]
        sheet_file: Option<PathBuf>,
    },
    /// List categorization rules in match order.
    Rules,
    /// Show how a description would be categorized and routed.
    Classify {
        /// Transaction description, e.g. "UBER TRIP 123"
        description: String,
        /// Signed amount, e.g. -23.50
        #[arg(long, allow_hyphen_values = true)]
        amount: Option<String>,
    },
}
