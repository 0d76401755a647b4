use std::path::Path;

use crate::categorizer::detect_payment_method;
use crate::error::{ExtratoError, Result};
use crate::fmt::money;
use crate::importer::parse_amount;
use crate::settings::load_settings;
use crate::writer::region_for;

pub fn run(config: Option<&Path>, description: &str, amount: Option<&str>) -> Result<()> {
    let settings = load_settings(config)?;
    let rules = settings.rule_set()?;

    let category = rules.classify_description(description);
    println!("Category: {category}");
    println!("Payment:  {}", detect_payment_method(description));

    if let Some(raw) = amount {
        let amount = parse_amount(raw)
            .ok_or_else(|| ExtratoError::Other(format!("Invalid amount: {raw}")))?;
        let region = region_for(amount, category, &settings.fixed_categories);
        println!("Amount:   {}", money(amount));
        println!("Region:   {region}");
    }
    Ok(())
}
