use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::categorizer::{default_rules, RuleConfig, RuleSet};
use crate::error::{ExtratoError, Result};
use crate::models::Category;
use crate::retry::RetryPolicy;
use crate::writer::SheetLayout;

const MONTHS: [&str; 12] = [
    "JANEIRO", "FEVEREIRO", "MARÇO", "ABRIL", "MAIO", "JUNHO", "JULHO", "AGOSTO", "SETEMBRO",
    "OUTUBRO", "NOVEMBRO", "DEZEMBRO",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub spreadsheet_id: String,
    /// Worksheet (tab) to write to; the current month when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worksheet: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_data_dir_string")]
    pub data_dir: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleConfig>,
    #[serde(default = "default_category")]
    pub default_category: Category,
    #[serde(default = "default_fixed_categories")]
    pub fixed_categories: Vec<Category>,
    #[serde(default)]
    pub layout: SheetLayout,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_source() -> String {
    "Nubank".to_string()
}

fn default_data_dir_string() -> String {
    default_data_dir().to_string_lossy().to_string()
}

fn default_token_env() -> String {
    "EXTRATO_SHEETS_TOKEN".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_category() -> Category {
    Category::Outros
}

fn default_fixed_categories() -> Vec<Category> {
    vec![Category::Moradia, Category::Assinaturas, Category::Educacao]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spreadsheet_id: String::new(),
            worksheet: None,
            source: default_source(),
            data_dir: default_data_dir_string(),
            token_env: default_token_env(),
            request_timeout_secs: default_request_timeout_secs(),
            rules: default_rules(),
            default_category: default_category(),
            fixed_categories: default_fixed_categories(),
            layout: SheetLayout::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Settings {
    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand_path(&self.data_dir))
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_path().join("ledger.txt")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_path().join("logs")
    }

    pub fn worksheet_name(&self, today: NaiveDate) -> String {
        match &self.worksheet {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => month_name(today.month()).to_string(),
        }
    }

    pub fn rule_set(&self) -> Result<RuleSet> {
        RuleSet::from_config(&self.rules, self.default_category)
    }

    fn validate(&self) -> Result<()> {
        self.layout
            .validate()
            .map_err(|e| ExtratoError::Settings(format!("layout: {e}")))?;
        if self.source.trim().is_empty() {
            return Err(ExtratoError::Settings("source must not be empty".into()));
        }
        self.rule_set().map(|_| ())
    }
}

/// Portuguese month name in upper case, as used for worksheet tabs.
pub fn month_name(month: u32) -> &'static str {
    MONTHS[(month.clamp(1, 12) - 1) as usize]
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("extrato")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("extrato")
}

/// Load settings from `path` (or the default location). A missing file
/// yields defaults; a malformed one is an error.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(settings_path);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(&path)?;
    let settings: Settings = serde_json::from_str(&content)
        .map_err(|e| ExtratoError::Settings(format!("{}: {e}", path.display())))?;
    settings.validate()?;
    Ok(settings)
}

pub fn save_settings(settings: &Settings, path: Option<&Path>) -> Result<PathBuf> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(settings_path);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| ExtratoError::Settings(e.to_string()))?;
    std::fs::write(&path, format!("{json}\n"))?;
    Ok(path)
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categorizer::MatchType;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            spreadsheet_id: "abc123".to_string(),
            worksheet: Some("JANEIRO".to_string()),
            data_dir: "/tmp/extrato-test".to_string(),
            ..Settings::default()
        };
        save_settings(&settings, Some(&path)).unwrap();
        let loaded = load_settings(Some(&path)).unwrap();
        assert_eq!(loaded.spreadsheet_id, "abc123");
        assert_eq!(loaded.worksheet.as_deref(), Some("JANEIRO"));
        assert_eq!(loaded.layout, SheetLayout::default());
        assert_eq!(loaded.rules.len(), default_rules().len());
    }

    #[test]
    fn test_load_returns_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings(Some(&dir.path().join("nope.json"))).unwrap();
        assert_eq!(s.source, "Nubank");
        assert_eq!(s.token_env, "EXTRATO_SHEETS_TOKEN");
        assert_eq!(s.default_category, Category::Outros);
        assert!(!s.data_dir.is_empty());
    }

    #[test]
    fn test_load_merges_with_defaults() {
        let json = r#"{
            "spreadsheet_id": "xyz",
            "fixed_categories": ["Moradia"],
            "rules": [{"pattern": "^pix", "category": "Presentes", "match_type": "regex"}]
        }"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.fixed_categories, vec![Category::Moradia]);
        assert_eq!(s.rules.len(), 1);
        assert_eq!(s.rules[0].match_type, MatchType::Regex);
        assert_eq!(s.retry, RetryPolicy::default());
        assert_eq!(s.request_timeout_secs, 30);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_settings(Some(&path)), Err(ExtratoError::Settings(_))));

        std::fs::write(&path, r#"{"default_category": "Viagem"}"#).unwrap();
        assert!(matches!(load_settings(Some(&path)), Err(ExtratoError::Settings(_))));
    }

    #[test]
    fn test_invalid_regex_rule_fails_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"rules": [{"pattern": "(unclosed", "category": "Lazer", "match_type": "regex"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            load_settings(Some(&path)),
            Err(ExtratoError::InvalidRule { .. })
        ));
    }

    #[test]
    fn test_invalid_layout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut settings = Settings::default();
        settings.layout.entradas.first_row = 30;
        save_settings(&settings, Some(&path)).unwrap();
        let err = load_settings(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Entradas"));
    }

    #[test]
    fn test_worksheet_defaults_to_month() {
        let march = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let mut s = Settings::default();
        assert_eq!(s.worksheet_name(march), "MARÇO");
        s.worksheet = Some("Teste".to_string());
        assert_eq!(s.worksheet_name(march), "Teste");
        assert_eq!(month_name(12), "DEZEMBRO");
    }

    #[test]
    fn test_paths_hang_off_data_dir() {
        let s = Settings {
            data_dir: "/tmp/extrato-paths".to_string(),
            ..Settings::default()
        };
        assert_eq!(s.ledger_path(), PathBuf::from("/tmp/extrato-paths/ledger.txt"));
        assert_eq!(s.log_dir(), PathBuf::from("/tmp/extrato-paths/logs"));
    }
}
