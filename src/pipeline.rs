use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::categorizer::{detect_payment_method, RuleSet};
use crate::dedup::{self, fingerprint, LedgerStore};
use crate::error::{ExtratoError, Result};
use crate::importer;
use crate::models::{CategorizedTransaction, Region, Transaction};
use crate::writer::SheetWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Loading,
    Parsing,
    Classifying,
    Writing,
    Committing,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Parsing => "parsing",
            Self::Classifying => "classifying",
            Self::Writing => "writing",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Failed => "failed",
        })
    }
}

/// What one batch did. Filled in as the run advances, so a failed run
/// still reports how far it got.
#[derive(Debug)]
pub struct RunReport {
    pub files_read: usize,
    pub files_skipped: usize,
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub duplicates: usize,
    pub written: BTreeMap<Region, usize>,
    pub stage: Stage,
    pub failed_at: Option<Stage>,
    pub error: Option<ExtratoError>,
    pub processed_files: Vec<PathBuf>,
    pub dry_run: bool,
}

impl RunReport {
    fn new(dry_run: bool) -> Self {
        Self {
            files_read: 0,
            files_skipped: 0,
            rows_read: 0,
            rows_skipped: 0,
            duplicates: 0,
            written: BTreeMap::new(),
            stage: Stage::Idle,
            failed_at: None,
            error: None,
            processed_files: Vec::new(),
            dry_run,
        }
    }

    pub fn is_success(&self) -> bool {
        self.stage == Stage::Done
    }

    pub fn total_written(&self) -> usize {
        self.written.values().sum()
    }

    pub fn written_to(&self, region: Region) -> usize {
        self.written.get(&region).copied().unwrap_or(0)
    }
}

pub fn categorize(rules: &RuleSet, transaction: Transaction) -> CategorizedTransaction {
    CategorizedTransaction {
        category: rules.classify(&transaction),
        payment_method: detect_payment_method(&transaction.description),
        fingerprint: fingerprint(&transaction),
        transaction,
    }
}

pub struct Pipeline<'a> {
    rules: &'a RuleSet,
    ledger: &'a mut dyn LedgerStore,
    writer: SheetWriter<'a>,
    source: String,
    dry_run: bool,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        rules: &'a RuleSet,
        ledger: &'a mut dyn LedgerStore,
        writer: SheetWriter<'a>,
        source: &str,
    ) -> Self {
        Self {
            rules,
            ledger,
            writer,
            source: source.to_string(),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Process every statement in `dir` as one batch.
    pub fn run(&mut self, dir: &Path) -> RunReport {
        let mut report = RunReport::new(self.dry_run);
        if let Err(e) = self.execute(dir, &mut report) {
            error!(
                stage = %report.stage,
                files = report.files_read,
                rows = report.rows_read,
                skipped = report.rows_skipped,
                duplicates = report.duplicates,
                "batch failed: {e}"
            );
            report.failed_at = Some(report.stage);
            report.stage = Stage::Failed;
            report.error = Some(e);
            return report;
        }
        info!(
            files = report.files_read,
            rows = report.rows_read,
            skipped = report.rows_skipped,
            duplicates = report.duplicates,
            written = report.total_written(),
            dry_run = report.dry_run,
            "batch done"
        );
        report
    }

    fn enter(report: &mut RunReport, stage: Stage) {
        debug!(from = %report.stage, to = %stage, "stage");
        report.stage = stage;
    }

    fn execute(&mut self, dir: &Path, report: &mut RunReport) -> Result<()> {
        // ---- loading ----
        Self::enter(report, Stage::Loading);
        let mut ledger = self.ledger.load()?;
        if ledger.is_empty() {
            debug!("ledger is empty, every row is new");
        } else {
            debug!(fingerprints = ledger.len(), "ledger loaded");
        }
        let files = importer::scan_dir(dir)?;
        if files.is_empty() {
            warn!("no statement files in {}", dir.display());
        }

        // ---- parsing ----
        Self::enter(report, Stage::Parsing);
        let mut transactions = Vec::new();
        for file in files {
            let statement = match importer::read_statement(&file, &self.source) {
                Ok(s) => s,
                Err(e) => {
                    warn!("skipping {}: {e}", file.display());
                    report.files_skipped += 1;
                    continue;
                }
            };
            report.files_read += 1;
            report.rows_read += statement.transactions.len() + statement.malformed.len();
            report.rows_skipped += statement.malformed.len();
            for bad in &statement.malformed {
                warn!(file = %file.display(), "row skipped: {bad}");
            }
            transactions.extend(statement.transactions);
            report.processed_files.push(file);
        }

        // ---- classifying ----
        Self::enter(report, Stage::Classifying);
        let categorized: Vec<CategorizedTransaction> = transactions
            .into_iter()
            .map(|t| categorize(self.rules, t))
            .collect();
        let outcome = dedup::split(categorized, &ledger);
        report.duplicates = outcome.duplicates.len();

        // ---- writing ----
        Self::enter(report, Stage::Writing);
        let plan = self.writer.plan(&outcome.fresh)?;
        for region in Region::ALL {
            let rows = plan.rows_for(region);
            if rows > 0 {
                report.written.insert(region, rows);
            }
        }
        if self.dry_run {
            info!(rows = plan.total_rows(), "dry run, nothing written");
            Self::enter(report, Stage::Done);
            return Ok(());
        }
        self.writer.apply(&plan)?;

        // ---- committing ----
        Self::enter(report, Stage::Committing);
        for txn in &outcome.fresh {
            ledger.record(txn.fingerprint.clone());
        }
        self.ledger.persist(&ledger)?;
        ledger.mark_persisted();

        Self::enter(report, Stage::Done);
        Ok(())
    }
}
