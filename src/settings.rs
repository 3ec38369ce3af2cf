use std::path::PathBuf;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::matcher::DEFAULT_CORPORATE_MARKERS;

const SETTINGS_FILE: &str = "nps_collector";
const ENV_PREFIX: &str = "NPS";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
    /// Sleep before every registry request.
    pub request_delay_ms: u64,
    /// Sleep between companies.
    pub company_delay_ms: u64,
    pub page_size: usize,
    pub min_match_len: usize,
    pub corporate_markers: Vec<String>,
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
    pub output_file: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "http://apis.data.go.kr/B552015/NpsBplcInfoInqireService".into(),
            timeout_secs: 10,
            request_delay_ms: 500,
            company_delay_ms: 1000,
            page_size: 100,
            min_match_len: 2,
            corporate_markers: DEFAULT_CORPORATE_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            input_path: PathBuf::from("business_name.json"),
            output_dir: PathBuf::from("output"),
            output_file: "국민연금사업장결과.csv".into(),
        }
    }
}

impl Settings {
    /// Defaults, then `nps_collector.toml` if present, then `NPS_*` env vars.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Config::builder()
            .add_source(File::with_name(SETTINGS_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("Failed to read settings")?
            .try_deserialize()
            .context("Invalid settings")
    }

    pub fn output_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_file)
    }
}
