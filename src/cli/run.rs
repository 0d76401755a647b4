use std::path::{Path, PathBuf};

use chrono::Local;
use colored::Colorize;
use comfy_table::{Cell, Table};
use tracing::{debug, warn};

use crate::dedup::FileLedgerStore;
use crate::error::{ExtratoError, Result};
use crate::importer::{archive_files, ARCHIVE_DIR};
use crate::logging;
use crate::models::Region;
use crate::pipeline::{Pipeline, RunReport, Stage};
use crate::settings::{load_settings, Settings};
use crate::sheet::local::LocalSheet;
use crate::sheet::SheetClient;
use crate::writer::SheetWriter;

pub struct RunArgs {
    pub dir: PathBuf,
    pub source: Option<String>,
    pub worksheet: Option<String>,
    pub dry_run: bool,
    pub archive: bool,
    pub sheet_file: Option<PathBuf>,
}

pub fn run(config: Option<&Path>, args: RunArgs) -> Result<()> {
    let settings = load_settings(config)?;
    match logging::init(&settings.log_dir()) {
        Ok(path) => debug!(log = %path.display(), "file logging enabled"),
        Err(e) => {
            logging::init_console();
            warn!("file logging disabled: {e}");
        }
    }

    let rules = settings.rule_set()?;
    let worksheet = args
        .worksheet
        .clone()
        .unwrap_or_else(|| settings.worksheet_name(Local::now().date_naive()));
    let source = args.source.clone().unwrap_or_else(|| settings.source.clone());
    let mut ledger = FileLedgerStore::new(settings.ledger_path());
    let mut sheet = open_sheet(&settings, args.sheet_file.as_deref())?;
    debug!(
        ledger = %ledger.path().display(),
        %worksheet,
        retry_delays = ?settings.retry.delays(),
        "starting run"
    );

    let report = {
        let writer = SheetWriter::new(
            sheet.as_mut(),
            &worksheet,
            &settings.layout,
            &settings.fixed_categories,
            &settings.retry,
        );
        Pipeline::new(&rules, &mut ledger, writer, &source)
            .dry_run(args.dry_run)
            .run(&args.dir)
    };

    print_summary(&report, &worksheet);
    let archive = args.archive
        && !args.dry_run
        && report.is_success()
        && !report.processed_files.is_empty();
    if let Some(e) = report.error {
        return Err(e);
    }

    if archive {
        let moved = archive_files(&args.dir, &report.processed_files)?;
        println!(
            "{} file(s) moved to {}",
            moved.len(),
            args.dir.join(ARCHIVE_DIR).display()
        );
    }
    Ok(())
}

fn open_sheet(settings: &Settings, sheet_file: Option<&Path>) -> Result<Box<dyn SheetClient>> {
    match sheet_file {
        Some(path) => {
            let sheet = LocalSheet::open(path)?;
            debug!(file = %sheet.path().display(), "using local sheet");
            Ok(Box::new(sheet))
        }
        None => remote_sheet(settings),
    }
}

#[cfg(feature = "google")]
fn remote_sheet(settings: &Settings) -> Result<Box<dyn SheetClient>> {
    use crate::sheet::google::GoogleSheets;
    use std::time::Duration;

    if settings.spreadsheet_id.trim().is_empty() {
        return Err(ExtratoError::Settings(
            "spreadsheet_id is not set (edit settings.json or pass --sheet-file)".into(),
        ));
    }
    let token = std::env::var(&settings.token_env)
        .ok()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ExtratoError::MissingToken(settings.token_env.clone()))?;
    let sheets = GoogleSheets::new(
        &settings.spreadsheet_id,
        &token,
        Duration::from_secs(settings.request_timeout_secs),
    )?;
    Ok(Box::new(sheets))
}

#[cfg(not(feature = "google"))]
fn remote_sheet(_settings: &Settings) -> Result<Box<dyn SheetClient>> {
    Err(ExtratoError::Other(
        "built without Google Sheets support; pass --sheet-file".into(),
    ))
}

fn print_summary(report: &RunReport, worksheet: &str) {
    let mut table = Table::new();
    table.set_header(vec!["", "Count"]);
    table.add_row(vec![Cell::new("Files read"), Cell::new(report.files_read)]);
    table.add_row(vec![Cell::new("Files skipped"), Cell::new(report.files_skipped)]);
    table.add_row(vec![Cell::new("Rows read"), Cell::new(report.rows_read)]);
    table.add_row(vec![Cell::new("Rows skipped"), Cell::new(report.rows_skipped)]);
    table.add_row(vec![Cell::new("Duplicates"), Cell::new(report.duplicates)]);
    for region in Region::ALL {
        table.add_row(vec![
            Cell::new(format!("→ {region}")),
            Cell::new(report.written_to(region)),
        ]);
    }

    let status = match (report.stage, report.failed_at) {
        (Stage::Done, _) if report.dry_run => "dry run".yellow().bold(),
        (Stage::Done, _) => "done".green().bold(),
        (_, Some(stage)) => format!("failed while {stage}").red().bold(),
        (stage, None) => stage.to_string().red().bold(),
    };
    println!("Worksheet {worksheet}\n{table}");
    println!("Status: {status}");

    let verb = if report.dry_run { "planned" } else { "written" };
    println!(
        "{} {verb}, {} duplicates, {} skipped",
        report.total_written(),
        report.duplicates,
        report.rows_skipped
    );
}
