//! Settings commands

use anyhow::{Context as _, Result};
use std::path::Path;

use crate::config::{Config, KNOWN_MODELS};

pub fn show(config: &Config) -> Result<()> {
    let mut shown = config.clone();
    if !shown.openai_api_key.is_empty() {
        shown.openai_api_key = mask_key(&shown.openai_api_key);
    }

    print!("{}", serde_yaml::to_string(&shown)?);
    println!("# database: {}", config.database_path().display());
    println!("# known models: {}", KNOWN_MODELS.join(", "));
    Ok(())
}

pub fn set(config: &mut Config, path: &Path, key: &str, value: &str) -> Result<()> {
    config.set(key, value)?;
    config
        .save(path)
        .with_context(|| format!("Failed to save settings to {}", path.display()))?;
    println!("Saved {} to {}", key, path.display());
    Ok(())
}

fn mask_key(key: &str) -> String {
    let tail: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{}", tail)
}
