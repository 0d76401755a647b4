#[cfg(feature = "google")]
pub mod google;
pub mod local;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::SheetError;

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(Decimal),
    Bool(bool),
}

impl CellValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Number(d) => d
                .to_f64()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or_else(|| serde_json::Value::String(d.to_string())),
            Self::Bool(b) => serde_json::Value::Bool(*b),
        }
    }
}

/// A single cell assignment, addressed by column letters and 1-based row.
#[derive(Debug, Clone, PartialEq)]
pub struct CellWrite {
    pub column: String,
    pub row: u32,
    pub value: CellValue,
}

impl CellWrite {
    pub fn cell(&self) -> String {
        format!("{}{}", self.column, self.row)
    }

    pub fn a1(&self, worksheet: &str) -> String {
        format!("{}!{}", quote_worksheet(worksheet), self.cell())
    }
}

pub fn quote_worksheet(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}

pub fn column_range(worksheet: &str, column: &str, first_row: u32, last_row: u32) -> String {
    format!("{}!{column}{first_row}:{column}{last_row}", quote_worksheet(worksheet))
}

/// Render a JSON cell the way the Sheets API returns unformatted values.
pub fn json_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        other => other.to_string(),
    }
}

/// The remote spreadsheet, as far as the writer needs it.
pub trait SheetClient {
    /// Values of `column` from `first_row` to `last_row`; trailing empty
    /// cells may be omitted.
    fn read_column(
        &mut self,
        worksheet: &str,
        column: &str,
        first_row: u32,
        last_row: u32,
    ) -> Result<Vec<String>, SheetError>;

    /// Apply all writes in one request.
    fn batch_update(&mut self, worksheet: &str, writes: &[CellWrite]) -> Result<(), SheetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_a1_quotes_worksheet() {
        let w = CellWrite {
            column: "B".to_string(),
            row: 25,
            value: CellValue::Bool(false),
        };
        assert_eq!(w.a1("JANEIRO"), "'JANEIRO'!B25");
        assert_eq!(w.a1("Mar'24"), "'Mar''24'!B25");
        assert_eq!(column_range("MARÇO", "H", 17, 26), "'MARÇO'!H17:H26");
    }

    #[test]
    fn test_cell_value_json() {
        assert_eq!(CellValue::Number(Decimal::new(2350, 2)).to_json(), serde_json::json!(23.5));
        assert_eq!(CellValue::Text("Uber".into()).to_json(), serde_json::json!("Uber"));
        assert_eq!(json_to_text(&serde_json::json!(false)), "FALSE");
        assert_eq!(json_to_text(&serde_json::json!(null)), "");
    }
}
