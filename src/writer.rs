use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ExtratoError, Result};
use crate::models::{CategorizedTransaction, Category, Region};
use crate::retry::RetryPolicy;
use crate::sheet::{CellValue, CellWrite, SheetClient};

const DESCRIPTION_MAX_CHARS: usize = 50;
// Google Sheets caps a spreadsheet at 10M cells.
const MAX_ROW: u32 = 10_000_000;
const MAX_REGION_ROWS: u32 = 1_000;

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionLayout {
    pub first_row: u32,
    pub last_row: u32,
    pub description_col: String,
    pub amount_col: String,
    pub date_col: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_col: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_col: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkbox_col: Option<String>,
}

impl RegionLayout {
    fn new(first_row: u32, last_row: u32, cols: [&str; 3]) -> Self {
        Self {
            first_row,
            last_row,
            description_col: cols[0].to_string(),
            amount_col: cols[1].to_string(),
            date_col: cols[2].to_string(),
            category_col: None,
            payment_col: None,
            checkbox_col: None,
        }
    }

    fn columns(&self) -> impl Iterator<Item = &String> {
        [&self.description_col, &self.amount_col, &self.date_col]
            .into_iter()
            .chain(self.category_col.iter())
            .chain(self.payment_col.iter())
            .chain(self.checkbox_col.iter())
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.first_row == 0 || self.first_row > self.last_row {
            return Err(format!("bad row range {}..{}", self.first_row, self.last_row));
        }
        if self.last_row > MAX_ROW {
            return Err(format!("last_row {} is past row {MAX_ROW}", self.last_row));
        }
        if self.last_row - self.first_row >= MAX_REGION_ROWS {
            return Err(format!(
                "row range {}..{} spans more than {MAX_REGION_ROWS} rows",
                self.first_row, self.last_row
            ));
        }
        for col in self.columns() {
            if col.is_empty() || !col.chars().all(|c| c.is_ascii_uppercase()) {
                return Err(format!("bad column '{col}' (expected letters like \"B\")"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetLayout {
    pub entradas: RegionLayout,
    pub gastos_fixos: RegionLayout,
    pub gastos_variaveis: RegionLayout,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            entradas: RegionLayout {
                checkbox_col: Some("E".to_string()),
                ..RegionLayout::new(10, 19, ["B", "C", "D"])
            },
            gastos_fixos: RegionLayout {
                category_col: Some("K".to_string()),
                checkbox_col: Some("L".to_string()),
                ..RegionLayout::new(17, 26, ["H", "I", "J"])
            },
            gastos_variaveis: RegionLayout {
                category_col: Some("E".to_string()),
                payment_col: Some("F".to_string()),
                ..RegionLayout::new(25, 51, ["B", "C", "D"])
            },
        }
    }
}

impl SheetLayout {
    pub fn region(&self, region: Region) -> &RegionLayout {
        match region {
            Region::Entradas => &self.entradas,
            Region::GastosFixos => &self.gastos_fixos,
            Region::GastosVariaveis => &self.gastos_variaveis,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        for region in Region::ALL {
            self.region(region)
                .validate()
                .map_err(|e| format!("{region}: {e}"))?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

pub fn route(txn: &CategorizedTransaction, fixed: &[Category]) -> Region {
    region_for(txn.transaction.amount, txn.category, fixed)
}

pub fn region_for(amount: Decimal, category: Category, fixed: &[Category]) -> Region {
    if amount > Decimal::ZERO {
        Region::Entradas
    } else if fixed.contains(&category) {
        Region::GastosFixos
    } else {
        Region::GastosVariaveis
    }
}

pub fn partition<'t>(
    txns: &'t [CategorizedTransaction],
    fixed: &[Category],
) -> BTreeMap<Region, Vec<&'t CategorizedTransaction>> {
    let mut regions: BTreeMap<Region, Vec<&CategorizedTransaction>> = BTreeMap::new();
    for txn in txns {
        regions.entry(route(txn, fixed)).or_default().push(txn);
    }
    regions
}

fn row_cells(txn: &CategorizedTransaction, layout: &RegionLayout, row: u32) -> Vec<CellWrite> {
    let t = &txn.transaction;
    let cell = |column: &String, value: CellValue| CellWrite {
        column: column.clone(),
        row,
        value,
    };
    let description: String = t.description.chars().take(DESCRIPTION_MAX_CHARS).collect();

    let mut cells = vec![
        cell(&layout.description_col, CellValue::Text(description)),
        cell(&layout.amount_col, CellValue::Number(t.amount.abs())),
        cell(&layout.date_col, CellValue::Text(t.date.format("%d/%m/%Y").to_string())),
    ];
    if let Some(col) = &layout.category_col {
        cells.push(cell(col, CellValue::Text(txn.category.to_string())));
    }
    if let Some(col) = &layout.payment_col {
        cells.push(cell(col, CellValue::Text(txn.payment_method.to_string())));
    }
    if let Some(col) = &layout.checkbox_col {
        cells.push(cell(col, CellValue::Bool(false)));
    }
    cells
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RegionPlan {
    pub region: Region,
    pub first_row: u32,
    pub rows: usize,
}

#[derive(Debug, Clone, Default)]
pub struct WritePlan {
    pub regions: Vec<RegionPlan>,
    pub writes: Vec<CellWrite>,
}

impl WritePlan {
    pub fn rows_for(&self, region: Region) -> usize {
        self.regions
            .iter()
            .filter(|p| p.region == region)
            .map(|p| p.rows)
            .sum()
    }

    pub fn total_rows(&self) -> usize {
        self.regions.iter().map(|p| p.rows).sum()
    }
}

pub struct SheetWriter<'a> {
    sheet: &'a mut dyn SheetClient,
    worksheet: String,
    layout: &'a SheetLayout,
    fixed: &'a [Category],
    retry: &'a RetryPolicy,
}

impl<'a> SheetWriter<'a> {
    pub fn new(
        sheet: &'a mut dyn SheetClient,
        worksheet: &str,
        layout: &'a SheetLayout,
        fixed: &'a [Category],
        retry: &'a RetryPolicy,
    ) -> Self {
        Self {
            sheet,
            worksheet: worksheet.to_string(),
            layout,
            fixed,
            retry,
        }
    }

    /// First row after the last occupied description cell of the region.
    pub fn next_empty_row(&mut self, region: Region) -> Result<u32> {
        let layouts: &'a SheetLayout = self.layout;
        let layout = layouts.region(region);
        let sheet = &mut *self.sheet;
        let worksheet = self.worksheet.as_str();
        let values = self.retry.run_blocking("read column", |_| {
            sheet.read_column(worksheet, &layout.description_col, layout.first_row, layout.last_row)
        })?;
        let occupied = values
            .iter()
            .rposition(|v| !v.trim().is_empty())
            .map_or(0, |i| i + 1);
        Ok(layout.first_row + occupied as u32)
    }

    /// Locate free rows in every region and lay out the cells. Fails with
    /// `RegionFull` before anything is written if a region lacks room.
    pub fn plan(&mut self, txns: &[CategorizedTransaction]) -> Result<WritePlan> {
        let mut plan = WritePlan::default();
        let layouts: &'a SheetLayout = self.layout;
        for (region, rows) in partition(txns, self.fixed) {
            let layout = layouts.region(region);
            let next = self.next_empty_row(region)?;
            let available = (layout.last_row + 1).saturating_sub(next) as usize;
            if rows.len() > available {
                return Err(ExtratoError::RegionFull {
                    region: region.to_string(),
                    needed: rows.len(),
                    available,
                });
            }
            debug!(%region, first_row = next, rows = rows.len(), "planned region");
            for (offset, txn) in rows.iter().enumerate() {
                plan.writes
                    .extend(row_cells(txn, layout, next + offset as u32));
            }
            plan.regions.push(RegionPlan {
                region,
                first_row: next,
                rows: rows.len(),
            });
        }
        Ok(plan)
    }

    /// Send the whole plan as one batch, retried per policy.
    pub fn apply(&mut self, plan: &WritePlan) -> Result<()> {
        if plan.writes.is_empty() {
            return Ok(());
        }
        let sheet = &mut *self.sheet;
        let worksheet = self.worksheet.as_str();
        self.retry.run_blocking("batch update", |attempt| {
            debug!(attempt, cells = plan.writes.len(), "writing batch");
            sheet.batch_update(worksheet, &plan.writes)
        })?;
        info!(
            worksheet,
            rows = plan.total_rows(),
            cells = plan.writes.len(),
            "batch written"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dedup::fingerprint;
    use crate::error::{SheetError, SheetErrorKind};
    use crate::models::{PaymentMethod, Transaction};
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::str::FromStr;

    /// In-memory sheet that can be told to fail the next N batch updates.
    #[derive(Default)]
    pub(crate) struct FakeSheet {
        pub cells: HashMap<(String, String, u32), CellValue>,
        pub failures_left: u32,
        pub batch_calls: u32,
    }

    impl FakeSheet {
        pub fn failing(times: u32) -> Self {
            Self {
                failures_left: times,
                ..Self::default()
            }
        }

        pub fn set_text(&mut self, ws: &str, col: &str, row: u32, s: &str) {
            self.cells
                .insert((ws.to_string(), col.to_string(), row), CellValue::Text(s.to_string()));
        }

        pub fn text(&self, ws: &str, col: &str, row: u32) -> Option<String> {
            match self.cells.get(&(ws.to_string(), col.to_string(), row)) {
                Some(CellValue::Text(s)) => Some(s.clone()),
                Some(CellValue::Number(d)) => Some(d.to_string()),
                Some(CellValue::Bool(b)) => Some(b.to_string()),
                None => None,
            }
        }
    }

    impl SheetClient for FakeSheet {
        fn read_column(
            &mut self,
            worksheet: &str,
            column: &str,
            first_row: u32,
            last_row: u32,
        ) -> std::result::Result<Vec<String>, SheetError> {
            let mut values: Vec<String> = (first_row..=last_row)
                .map(|r| self.text(worksheet, column, r).unwrap_or_default())
                .collect();
            while values.last().is_some_and(|v| v.is_empty()) {
                values.pop();
            }
            Ok(values)
        }

        fn batch_update(
            &mut self,
            worksheet: &str,
            writes: &[CellWrite],
        ) -> std::result::Result<(), SheetError> {
            self.batch_calls += 1;
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(SheetError::new(SheetErrorKind::Network, "connection reset"));
            }
            for w in writes {
                self.cells
                    .insert((worksheet.to_string(), w.column.clone(), w.row), w.value.clone());
            }
            Ok(())
        }
    }

    pub(crate) fn no_wait(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay_ms: 0,
            backoff_factor: 1,
            max_delay_ms: 0,
        }
    }

    fn categorized(date: &str, description: &str, amount: &str, category: Category) -> CategorizedTransaction {
        let transaction = Transaction {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            description: description.to_string(),
            amount: Decimal::from_str(amount).unwrap(),
            source: "NubankCC".to_string(),
        };
        CategorizedTransaction {
            fingerprint: fingerprint(&transaction),
            payment_method: PaymentMethod::Pix,
            category,
            transaction,
        }
    }

    const FIXED: &[Category] = &[Category::Moradia, Category::Assinaturas, Category::Educacao];

    #[test]
    fn test_route_by_sign_and_fixed_set() {
        let uber = categorized("2024-03-01", "UBER TRIP 123", "-23.50", Category::Transporte);
        let rent = categorized("2024-03-05", "Aluguel", "-1800.00", Category::Moradia);
        let salary = categorized("2024-03-05", "Salário", "5000.00", Category::Receita);
        assert_eq!(route(&uber, FIXED), Region::GastosVariaveis);
        assert_eq!(route(&rent, FIXED), Region::GastosFixos);
        assert_eq!(route(&salary, FIXED), Region::Entradas);
    }

    #[test]
    fn test_next_empty_row_skips_existing_entries() {
        let layout = SheetLayout::default();
        let retry = no_wait(1);
        let mut sheet = FakeSheet::default();
        sheet.set_text("JANEIRO", "B", 25, "Padaria");
        sheet.set_text("JANEIRO", "B", 27, "Cinema");
        let mut writer = SheetWriter::new(&mut sheet, "JANEIRO", &layout, FIXED, &retry);
        assert_eq!(writer.next_empty_row(Region::GastosVariaveis).unwrap(), 28);
        assert_eq!(writer.next_empty_row(Region::Entradas).unwrap(), 10);
    }

    #[test]
    fn test_plan_and_apply_writes_variable_expense_row() {
        let layout = SheetLayout::default();
        let retry = no_wait(1);
        let mut sheet = FakeSheet::default();
        sheet.set_text("MARCO", "B", 25, "Padaria");
        let txns = vec![categorized("2024-03-01", "UBER TRIP 123", "-23.50", Category::Transporte)];
        {
            let mut writer = SheetWriter::new(&mut sheet, "MARCO", &layout, FIXED, &retry);
            let plan = writer.plan(&txns).unwrap();
            assert_eq!(plan.rows_for(Region::GastosVariaveis), 1);
            assert_eq!(plan.regions[0].first_row, 26);
            writer.apply(&plan).unwrap();
        }
        assert_eq!(sheet.text("MARCO", "B", 26).as_deref(), Some("UBER TRIP 123"));
        assert_eq!(sheet.text("MARCO", "C", 26).as_deref(), Some("23.50"));
        assert_eq!(sheet.text("MARCO", "D", 26).as_deref(), Some("01/03/2024"));
        assert_eq!(sheet.text("MARCO", "E", 26).as_deref(), Some("Transporte"));
        assert_eq!(sheet.text("MARCO", "F", 26).as_deref(), Some("Pix"));
        assert_eq!(sheet.batch_calls, 1);
    }

    #[test]
    fn test_plan_truncates_long_descriptions() {
        let layout = SheetLayout::default();
        let retry = no_wait(1);
        let mut sheet = FakeSheet::default();
        let long = "X".repeat(80);
        let txns = vec![categorized("2024-03-01", &long, "100.00", Category::Receita)];
        let mut writer = SheetWriter::new(&mut sheet, "MARCO", &layout, FIXED, &retry);
        let plan = writer.plan(&txns).unwrap();
        assert_eq!(plan.writes[0].value, CellValue::Text("X".repeat(50)));
        assert!(plan
            .writes
            .iter()
            .any(|w| w.column == "E" && w.value == CellValue::Bool(false)));
    }

    #[test]
    fn test_full_region_fails_before_writing() {
        let layout = SheetLayout::default();
        let retry = no_wait(1);
        let mut sheet = FakeSheet::default();
        for row in 17..=25 {
            sheet.set_text("MARCO", "H", row, "Conta");
        }
        let txns = vec![
            categorized("2024-03-05", "Aluguel", "-1800.00", Category::Moradia),
            categorized("2024-03-06", "Condomínio", "-600.00", Category::Moradia),
        ];
        let mut writer = SheetWriter::new(&mut sheet, "MARCO", &layout, FIXED, &retry);
        let err = writer.plan(&txns).unwrap_err();
        assert!(matches!(
            err,
            ExtratoError::RegionFull { needed: 2, available: 1, .. }
        ));
        assert_eq!(sheet.batch_calls, 0);
    }

    #[test]
    fn test_apply_retries_then_succeeds() {
        let layout = SheetLayout::default();
        let retry = no_wait(3);
        let mut sheet = FakeSheet::failing(2);
        let txns = vec![categorized("2024-03-01", "UBER", "-10.00", Category::Transporte)];
        {
            let mut writer = SheetWriter::new(&mut sheet, "MARCO", &layout, FIXED, &retry);
            let plan = writer.plan(&txns).unwrap();
            writer.apply(&plan).unwrap();
        }
        assert_eq!(sheet.batch_calls, 3);
        assert!(sheet.text("MARCO", "B", 25).is_some());
    }

    #[test]
    fn test_apply_gives_up_after_policy_exhausted() {
        let layout = SheetLayout::default();
        let retry = no_wait(2);
        let mut sheet = FakeSheet::failing(5);
        let txns = vec![categorized("2024-03-01", "UBER", "-10.00", Category::Transporte)];
        let mut writer = SheetWriter::new(&mut sheet, "MARCO", &layout, FIXED, &retry);
        let plan = writer.plan(&txns).unwrap();
        let err = writer.apply(&plan).unwrap_err();
        assert!(matches!(err, ExtratoError::ExternalWrite { attempts: 2, .. }));
    }

    #[test]
    fn test_layout_rejects_huge_row_ranges() {
        let mut layout = SheetLayout::default();
        layout.gastos_variaveis.last_row = u32::MAX;
        let err = layout.validate().unwrap_err();
        assert!(err.starts_with("Gastos Variáveis"), "{err}");

        let mut layout = SheetLayout::default();
        layout.entradas.first_row = 10;
        layout.entradas.last_row = 5_000;
        assert!(layout.validate().is_err());

        layout.entradas.last_row = 1_009;
        assert!(layout.validate().is_ok());
    }

    #[test]
    fn test_default_layout_is_valid() {
        assert!(SheetLayout::default().validate().is_ok());
        let mut bad = SheetLayout::default();
        bad.gastos_fixos.amount_col = "i".to_string();
        assert!(bad.validate().is_err());
    }
}
