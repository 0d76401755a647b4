use std::path::Path;

use crate::error::Result;
use crate::settings::{load_settings, save_settings, shellexpand_path};

pub fn run(config: Option<&Path>, data_dir: Option<String>) -> Result<()> {
    let mut settings = load_settings(config)?;
    if let Some(dir) = data_dir {
        settings.data_dir = shellexpand_path(&dir);
    }

    let resolved = settings.data_path();
    std::fs::create_dir_all(&resolved)?;
    std::fs::create_dir_all(settings.log_dir())?;
    let written = save_settings(&settings, config)?;

    println!("Initialized extrato at {}", resolved.display());
    println!("Settings written to {}", written.display());
    if settings.spreadsheet_id.is_empty() {
        println!("Set \"spreadsheet_id\" there and export ${} before the first run.", settings.token_env);
    }
    Ok(())
}
