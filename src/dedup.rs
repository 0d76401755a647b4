use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{ExtratoError, Result};
use crate::models::{CategorizedTransaction, Fingerprint, Transaction};

// ---------------------------------------------------------------------------
// Fingerprints
// ---------------------------------------------------------------------------

fn normalize_description(description: &str) -> String {
    description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn fingerprint(txn: &Transaction) -> Fingerprint {
    let key = format!(
        "{}|{}|{}|{}",
        txn.date.format("%Y-%m-%d"),
        normalize_description(&txn.description),
        txn.amount.normalize(),
        txn.source.trim(),
    );
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    Fingerprint(hex::encode(hasher.finalize()))
}

fn is_valid_fingerprint(s: &str) -> bool {
    s.len() == 64 && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Append-only set of fingerprints already applied to the sheet.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Ledger {
    applied: HashSet<Fingerprint>,
    pending: Vec<Fingerprint>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fingerprints(fingerprints: impl IntoIterator<Item = Fingerprint>) -> Self {
        Self {
            applied: fingerprints.into_iter().collect(),
            pending: Vec::new(),
        }
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        self.applied.contains(fp)
    }

    /// Returns false when the fingerprint was already known.
    pub fn record(&mut self, fp: Fingerprint) -> bool {
        if self.applied.insert(fp.clone()) {
            self.pending.push(fp);
            true
        } else {
            false
        }
    }

    /// Fingerprints recorded since the last persist.
    pub fn pending(&self) -> &[Fingerprint] {
        &self.pending
    }

    pub fn mark_persisted(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

pub trait LedgerStore {
    fn load(&self) -> Result<Ledger>;
    /// Durably append the ledger's pending fingerprints.
    fn persist(&mut self, ledger: &Ledger) -> Result<()>;
}

/// One fingerprint per line.
pub struct FileLedgerStore {
    path: PathBuf,
}

impl FileLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn corrupt(&self, line: usize, reason: impl Into<String>) -> ExtratoError {
        ExtratoError::LedgerCorruption {
            path: self.path.clone(),
            line,
            reason: reason.into(),
        }
    }
}

impl LedgerStore for FileLedgerStore {
    fn load(&self) -> Result<Ledger> {
        if !self.path.exists() {
            return Ok(Ledger::new());
        }
        let bytes = std::fs::read(&self.path)?;
        let content = String::from_utf8(bytes).map_err(|_| self.corrupt(0, "not valid UTF-8"))?;
        let mut fingerprints = Vec::new();
        for (i, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if !is_valid_fingerprint(line) {
                return Err(self.corrupt(i + 1, format!("'{line}' is not a fingerprint")));
            }
            fingerprints.push(Fingerprint(line.to_string()));
        }
        Ok(Ledger::from_fingerprints(fingerprints))
    }

    fn persist(&mut self, ledger: &Ledger) -> Result<()> {
        if ledger.pending().is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        let mut buf = String::new();
        if file.metadata()?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                buf.push('\n');
            }
        }
        for fp in ledger.pending() {
            buf.push_str(fp.as_str());
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }
}

/// In-memory store so pipeline tests need no ledger file.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    lines: Vec<Fingerprint>,
}

#[cfg(test)]
impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fingerprints(&self) -> &[Fingerprint] {
        &self.lines
    }
}

#[cfg(test)]
impl LedgerStore for MemoryLedgerStore {
    fn load(&self) -> Result<Ledger> {
        Ok(Ledger::from_fingerprints(self.lines.iter().cloned()))
    }

    fn persist(&mut self, ledger: &Ledger) -> Result<()> {
        self.lines.extend(ledger.pending().iter().cloned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Deduplication
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct DedupOutcome {
    pub fresh: Vec<CategorizedTransaction>,
    pub duplicates: Vec<CategorizedTransaction>,
}

pub fn is_duplicate(txn: &CategorizedTransaction, ledger: &Ledger) -> bool {
    ledger.contains(&txn.fingerprint)
}

/// Split a batch into rows not yet applied and rows to drop. A fingerprint
/// repeated inside the batch only survives the first time.
pub fn split(batch: Vec<CategorizedTransaction>, ledger: &Ledger) -> DedupOutcome {
    let mut seen: HashSet<Fingerprint> = HashSet::new();
    let mut outcome = DedupOutcome::default();
    for txn in batch {
        let reason = if is_duplicate(&txn, ledger) {
            Some("already applied")
        } else if !seen.insert(txn.fingerprint.clone()) {
            Some("repeated in batch")
        } else {
            None
        };
        match reason {
            Some(reason) => {
                info!(
                    fingerprint = %txn.fingerprint,
                    date = %txn.transaction.date,
                    amount = %txn.transaction.amount,
                    "duplicate skipped ({reason}): {}",
                    txn.transaction.description
                );
                outcome.duplicates.push(txn);
            }
            None => outcome.fresh.push(txn),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::detect_payment_method;
    use crate::models::Category;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn txn(date: &str, description: &str, amount: &str, source: &str) -> Transaction {
        Transaction {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            description: description.to_string(),
            amount: Decimal::from_str(amount).unwrap(),
            source: source.to_string(),
        }
    }

    fn categorized(t: Transaction) -> CategorizedTransaction {
        CategorizedTransaction {
            fingerprint: fingerprint(&t),
            payment_method: detect_payment_method(&t.description),
            category: Category::Outros,
            transaction: t,
        }
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = fingerprint(&txn("2024-03-01", "UBER TRIP 123", "-23.50", "NubankCC"));
        let b = fingerprint(&txn("2024-03-01", "UBER TRIP 123", "-23.50", "NubankCC"));
        assert_eq!(a, b);
        assert!(is_valid_fingerprint(a.as_str()));
    }

    #[test]
    fn test_fingerprint_normalizes_description_and_amount() {
        let a = fingerprint(&txn("2024-03-01", "UBER  TRIP 123 ", "-23.50", "NubankCC"));
        let b = fingerprint(&txn("2024-03-01", "uber trip 123", "-23.5", "NubankCC"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_distinguishes_fields() {
        let base = fingerprint(&txn("2024-03-01", "UBER TRIP 123", "-23.50", "NubankCC"));
        assert_ne!(base, fingerprint(&txn("2024-03-02", "UBER TRIP 123", "-23.50", "NubankCC")));
        assert_ne!(base, fingerprint(&txn("2024-03-01", "UBER TRIP 124", "-23.50", "NubankCC")));
        assert_ne!(base, fingerprint(&txn("2024-03-01", "UBER TRIP 123", "23.50", "NubankCC")));
        assert_ne!(base, fingerprint(&txn("2024-03-01", "UBER TRIP 123", "-23.50", "ItauCC")));
    }

    #[test]
    fn test_ledger_record_tracks_pending() {
        let mut ledger = Ledger::new();
        let fp = fingerprint(&txn("2024-03-01", "A", "-1", "s"));
        assert!(ledger.record(fp.clone()));
        assert!(!ledger.record(fp.clone()));
        assert!(ledger.contains(&fp));
        assert_eq!(ledger.pending().len(), 1);
        ledger.mark_persisted();
        assert!(ledger.pending().is_empty());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileLedgerStore::new(dir.path().join("ledger.txt"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_file_store_appends_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ledger.txt");
        let mut store = FileLedgerStore::new(&path);

        let mut ledger = store.load().unwrap();
        ledger.record(fingerprint(&txn("2024-03-01", "A", "-1", "s")));
        store.persist(&ledger).unwrap();
        ledger.mark_persisted();

        ledger.record(fingerprint(&txn("2024-03-02", "B", "-2", "s")));
        store.persist(&ledger).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn test_file_store_repairs_missing_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        let first = fingerprint(&txn("2024-03-01", "A", "-1", "s"));
        std::fs::write(&path, first.as_str()).unwrap();
        let mut store = FileLedgerStore::new(&path);
        let mut ledger = store.load().unwrap();
        ledger.record(fingerprint(&txn("2024-03-02", "B", "-2", "s")));
        store.persist(&ledger).unwrap();
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn test_file_store_rejects_corrupt_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.txt");
        let good = fingerprint(&txn("2024-03-01", "A", "-1", "s"));
        std::fs::write(&path, format!("{good}\nnot-a-hash\n")).unwrap();
        let err = FileLedgerStore::new(&path).load().unwrap_err();
        assert!(matches!(err, ExtratoError::LedgerCorruption { line: 2, .. }));
    }

    #[test]
    fn test_memory_store_persists_pending_only() {
        let mut store = MemoryLedgerStore::new();
        let mut ledger = store.load().unwrap();
        ledger.record(fingerprint(&txn("2024-03-01", "A", "-1", "s")));
        store.persist(&ledger).unwrap();
        assert_eq!(store.fingerprints().len(), 1);
    }

    #[test]
    fn test_split_drops_ledger_hits() {
        let seen = categorized(txn("2024-03-01", "A", "-1", "s"));
        let new = categorized(txn("2024-03-02", "B", "-2", "s"));
        let ledger = Ledger::from_fingerprints(vec![seen.fingerprint.clone()]);
        let outcome = split(vec![seen, new.clone()], &ledger);
        assert_eq!(outcome.fresh, vec![new]);
        assert_eq!(outcome.duplicates.len(), 1);
    }

    #[test]
    fn test_split_drops_repeats_within_batch() {
        let row = categorized(txn("2024-03-01", "UBER TRIP 123", "-23.50", "NubankCC"));
        let outcome = split(vec![row.clone(), row], &Ledger::new());
        assert_eq!(outcome.fresh.len(), 1);
        assert_eq!(outcome.duplicates.len(), 1);
    }
}
