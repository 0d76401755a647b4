use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ExtratoError, Result, SheetError, SheetErrorKind};
use crate::sheet::{json_to_text, CellWrite, SheetClient};

type Grid = BTreeMap<String, BTreeMap<String, serde_json::Value>>;

/// A spreadsheet kept as a JSON file: `{ worksheet: { "B25": value } }`.
/// Every batch is written to a temp file and renamed into place.
#[derive(Debug)]
pub struct LocalSheet {
    path: PathBuf,
    grid: Grid,
}

impl LocalSheet {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let grid = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Grid::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Grid::new()
        };
        Ok(Self { path, grid })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, worksheet: &str, cell: &str) -> Option<&serde_json::Value> {
        self.grid.get(worksheet).and_then(|ws| ws.get(cell))
    }

    fn save(&self, grid: &Grid) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(grid)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, format!("{json}\n"))?;
        std::fs::rename(&tmp, &self.path).map_err(ExtratoError::from)
    }
}

impl SheetClient for LocalSheet {
    fn read_column(
        &mut self,
        worksheet: &str,
        column: &str,
        first_row: u32,
        last_row: u32,
    ) -> std::result::Result<Vec<String>, SheetError> {
        let mut values: Vec<String> = (first_row..=last_row)
            .map(|row| {
                self.get(worksheet, &format!("{column}{row}"))
                    .map(json_to_text)
                    .unwrap_or_default()
            })
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
        let mut grid = self.grid.clone();
        let sheet = grid.entry(worksheet.to_string()).or_default();
        for write in writes {
            sheet.insert(write.cell(), write.value.to_json());
        }
        self.save(&grid)
            .map_err(|e| SheetError::new(SheetErrorKind::Rejected, e.to_string()))?;
        self.grid = grid;
        Ok(())
    }
}
