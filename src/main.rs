mod categorizer;
mod cli;
mod dedup;
mod error;
mod fmt;
mod importer;
mod logging;
mod models;
mod pipeline;
mod retry;
mod settings;
mod sheet;
mod writer;

use clap::Parser;

use cli::run::RunArgs;
use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(config, data_dir),
        Commands::Run {
            dir,
            source,
            worksheet,
            dry_run,
            archive,
            sheet_file,
        } => cli::run::run(
            config,
            RunArgs {
                dir,
                source,
                worksheet,
                dry_run,
                archive,
                sheet_file,
            },
        ),
        Commands::Rules => cli::rules::list(config),
        Commands::Classify {
            description,
            amount,
        } => cli::classify::run(config, &description, amount.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
