//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.reviewlens.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Classifier model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Play Store fetch settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Directory for report artifacts.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            verbose: false,
        }
    }
}

fn default_output_dir() -> String {
    "reports".to_string()
}

/// Classifier model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name.
    #[serde(default = "default_model")]
    pub name: String,

    /// Anthropic API base URL.
    #[serde(default = "default_api_base")]
    pub base_url: String,

    /// Response token cap per classification.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            base_url: default_api_base(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_model_timeout(),
        }
    }
}

fn default_model() -> String {
    "claude-3-7-sonnet-20250219".to_string()
}

fn default_api_base() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_model_timeout() -> u64 {
    60
}

/// Play Store fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Language code for reviews.
    #[serde(default = "default_lang")]
    pub lang: String,

    /// Country code for the store front.
    #[serde(default = "default_country")]
    pub country: String,

    /// Number of reviews to fetch.
    #[serde(default = "default_count")]
    pub count: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_seconds: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            lang: default_lang(),
            country: default_country(),
            count: default_count(),
            timeout_seconds: default_fetch_timeout(),
        }
    }
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_country() -> String {
    "us".to_string()
}

fn default_count() -> usize {
    100
}

fn default_fetch_timeout() -> u64 {
    30
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Render the sentiment chart image alongside the JSON report.
    #[serde(default = "default_true")]
    pub chart: bool,

    /// Record each analysis in the history list.
    #[serde(default = "default_true")]
    pub history: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            chart: true,
            history: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".reviewlens.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        // Settings with CLI defaults always override.
        self.model.name = args.model.clone();
        self.fetch.lang = args.lang.clone();
        self.fetch.country = args.country.clone();
        self.fetch.count = args.count;
        self.general.output_dir = args.output_dir.display().to_string();

        // Timeout - only override if explicitly provided via CLI.
        if let Some(timeout) = args.timeout {
            self.model.timeout_seconds = timeout;
        }

        // Flags always override.
        if args.no_chart {
            self.report.chart = false;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
