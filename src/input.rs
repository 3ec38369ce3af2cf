use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::pipeline::CompanyIdentity;

/// One entry of the company list file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CompanyRecord {
    name: String,
    num: String,
}

/// Load the JSON company list: `[{"name": "...", "num": "..."}, ...]`.
pub fn load_companies(path: &Path) -> Result<Vec<CompanyIdentity>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_companies(&text).with_context(|| format!("Invalid company list {}", path.display()))
}

/// Entries that fail validation are logged and skipped.
fn parse_companies(text: &str) -> Result<Vec<CompanyIdentity>> {
    let records: Vec<CompanyRecord> = serde_json::from_str(text)?;
    let companies = records
        .iter()
        .enumerate()
        .filter_map(|(i, r)| match CompanyIdentity::new(&r.num, &r.name) {
            Ok(company) => Some(company),
            Err(e) => {
                warn!("Skipping entry {}: {:#}", i + 1, e);
                None
            }
        })
        .collect();
    Ok(companies)
}
