use std::path::Path;

use comfy_table::{Cell, Table};

use crate::error::Result;
use crate::settings::load_settings;

pub fn list(config: Option<&Path>) -> Result<()> {
    let settings = load_settings(config)?;
    let rules = settings.rule_set()?;

    let mut table = Table::new();
    table.set_header(vec!["#", "Pattern", "Type", "Category"]);
    for (i, rule) in rules.rules().iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&rule.config.pattern),
            Cell::new(rule.config.match_type),
            Cell::new(rule.category()),
        ]);
    }
    println!("Rules (first match wins)\n{table}");
    println!("Default category: {}", rules.default_category());

    let fixed: Vec<String> = settings.fixed_categories.iter().map(|c| c.to_string()).collect();
    println!("Fixed expenses: {}", fixed.join(", "));
    Ok(())
}
