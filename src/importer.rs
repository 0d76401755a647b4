use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::{ExtratoError, MalformedRow, Result, RowField};
use crate::models::{fold, RawRow, Transaction};

pub const ARCHIVE_DIR: &str = "processados";

// ---------------------------------------------------------------------------
// Field parsers
// ---------------------------------------------------------------------------

/// Parse a statement amount in either Brazilian (`1.234,56`) or
/// dot-decimal (`-1234.56`) notation.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let brazilian = raw.contains("R$");
    let cleaned: String = raw
        .replace("R$", "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '"' && *c != '$')
        .collect();
    let mut s = cleaned.as_str();
    let mut negative = false;
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        negative = true;
        s = inner;
    }
    let (s, leading) = match s.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (s, false),
    };
    let (s, trailing) = match s.strip_suffix('-') {
        Some(rest) => (rest, true),
        None => (s, false),
    };
    // At most one sign marker.
    if [negative, leading, trailing].iter().filter(|m| **m).count() > 1 {
        return None;
    }
    let value = Decimal::from_str(&normalize_separators(s, brazilian)?).ok()?;
    Some(if negative || leading || trailing { -value } else { value })
}

fn normalize_separators(s: &str, brazilian: bool) -> Option<String> {
    let (decimal, thousands) = match (s.rfind('.'), s.rfind(',')) {
        (None, None) => return Some(s.to_string()),
        // The separator that appears last is the decimal one.
        (Some(dot), Some(comma)) if comma > dot => (Some(','), Some('.')),
        (Some(_), Some(_)) => (Some('.'), Some(',')),
        (Some(dot), None) => {
            let digits_after = s.len() - dot - 1;
            if s.matches('.').count() > 1 || (brazilian && digits_after == 3) {
                (None, Some('.'))
            } else {
                (Some('.'), None)
            }
        }
        (None, Some(_)) if s.matches(',').count() > 1 => (None, Some(',')),
        (None, Some(_)) => (Some(','), None),
    };

    let (int_part, frac) = match decimal {
        Some(d) => {
            let (int_part, frac) = s.rsplit_once(d)?;
            if int_part.contains(d) {
                return None;
            }
            (int_part, Some(frac))
        }
        None => (s, None),
    };
    let int_part = match thousands {
        Some(t) if int_part.contains(t) => strip_thousands(int_part, t)?,
        _ => int_part.to_string(),
    };
    Some(match frac {
        Some(frac) => format!("{int_part}.{frac}"),
        None => int_part,
    })
}

/// `1.234.567` -> `1234567`; every group after the first must have three digits.
fn strip_thousands(int_part: &str, sep: char) -> Option<String> {
    let mut groups = int_part.split(sep);
    let head = groups.next()?;
    if !(1..=3).contains(&head.len()) || !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let mut out = head.to_string();
    for group in groups {
        if group.len() != 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        out.push_str(group);
    }
    Some(out)
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

pub fn parse_row(raw: &RawRow, source: &str) -> std::result::Result<Transaction, MalformedRow> {
    let malformed = |field: RowField, value: &str, reason: &str| MalformedRow {
        line: raw.line,
        field,
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let date = parse_date(&raw.date)
        .ok_or_else(|| malformed(RowField::Date, &raw.date, "not a dd/mm/yyyy or yyyy-mm-dd date"))?;

    let description = raw.description.trim();
    if description.is_empty() {
        return Err(malformed(RowField::Description, &raw.description, "empty"));
    }

    let amount = parse_amount(&raw.amount)
        .ok_or_else(|| malformed(RowField::Amount, &raw.amount, "not a number"))?;
    if amount.is_zero() {
        return Err(malformed(RowField::Amount, &raw.amount, "zero amount"));
    }

    Ok(Transaction {
        date,
        description: description.to_string(),
        amount,
        source: source.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Statement files
// ---------------------------------------------------------------------------

pub struct Statement {
    pub transactions: Vec<Transaction>,
    pub malformed: Vec<MalformedRow>,
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let text = match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(e.as_bytes());
            decoded.into_owned()
        }
    };
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

struct Columns {
    date: usize,
    amount: usize,
    description: usize,
}

impl Default for Columns {
    // Nubank account export: Data,Valor,Identificador,Descrição
    fn default() -> Self {
        Self {
            date: 0,
            amount: 1,
            description: 3,
        }
    }
}

/// A row naming `Data` or `Valor` is the header. Columns it does not name
/// keep their Nubank positions.
fn header_columns(record: &csv::StringRecord) -> Option<Columns> {
    let (mut date, mut amount, mut description) = (None, None, None);
    for (i, field) in record.iter().enumerate() {
        let f = fold(field.trim());
        if f == "data" {
            date = date.or(Some(i));
        } else if f == "valor" {
            amount = amount.or(Some(i));
        } else if f.contains("descri") {
            description = description.or(Some(i));
        }
    }
    if date.is_none() && amount.is_none() {
        return None;
    }
    let fallback = Columns::default();
    Some(Columns {
        date: date.unwrap_or(fallback.date),
        amount: amount.unwrap_or(fallback.amount),
        description: description.unwrap_or(fallback.description),
    })
}

/// Read one statement export. Rows that fail validation are returned
/// alongside the good ones instead of failing the file.
pub fn read_statement(path: &Path, source: &str) -> Result<Statement> {
    let text = read_text(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut columns: Option<Columns> = None;
    let mut transactions = Vec::new();
    let mut malformed = Vec::new();

    for result in rdr.records() {
        let Ok(record) = result else { continue };
        if columns.is_none() {
            columns = header_columns(&record);
            continue;
        }
        let Some(cols) = columns.as_ref() else { continue };
        let field = |i: usize| record.get(i).unwrap_or("").to_string();
        let raw = RawRow {
            line: record.position().map(|p| p.line() as usize).unwrap_or(0),
            date: field(cols.date),
            description: field(cols.description),
            amount: field(cols.amount),
        };
        match parse_row(&raw, source) {
            Ok(txn) => transactions.push(txn),
            Err(bad) => malformed.push(bad),
        }
    }

    if columns.is_none() {
        return Err(ExtratoError::Other(format!(
            "{}: no header row naming Data or Valor",
            path.display()
        )));
    }

    Ok(Statement {
        transactions,
        malformed,
    })
}

/// Statement exports in `dir`, sorted by file name.
pub fn scan_dir(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map_or(false, |e| e.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Move processed exports into `<dir>/processados/`.
pub fn archive_files(dir: &Path, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let target = dir.join(ARCHIVE_DIR);
    std::fs::create_dir_all(&target)?;
    let mut moved = Vec::with_capacity(files.len());
    for file in files {
        let Some(name) = file.file_name() else { continue };
        let dest = target.join(name);
        std::fs::rename(file, &dest)?;
        moved.push(dest);
    }
    Ok(moved)
}
