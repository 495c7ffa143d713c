//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// Reviewlens - LLM-powered Play Store review analyzer
///
/// Fetch an app's reviews from the Google Play Store, classify their
/// sentiment and topics with Claude, and save a JSON report plus a
/// sentiment chart.
///
/// Examples:
///   reviewlens --app-id com.nianticlabs.pokemongo
///   reviewlens --app-id com.nianticlabs.pokemongo --count 250 --lang de --country de
///   reviewlens --app-id com.nianticlabs.pokemongo --negative-only
///   reviewlens --history
///   reviewlens --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Play Store app identifier to analyze
    ///
    /// The package name as it appears in the store URL
    /// (e.g. com.nianticlabs.pokemongo). Not required for
    /// --history, --clear-history, or --init-config.
    #[arg(short, long, value_name = "APP_ID")]
    pub app_id: Option<String>,

    /// Language code for reviews (two letters)
    #[arg(short, long, default_value = "en")]
    pub lang: String,

    /// Country code for the store front (two letters)
    #[arg(short = 'C', long, default_value = "us")]
    pub country: String,

    /// Number of reviews to fetch and analyze
    #[arg(short = 'n', long, default_value = "100", value_name = "COUNT")]
    pub count: usize,

    /// Analyze only negative reviews (1-3 stars)
    ///
    /// Fetches twice the requested count and keeps the negative ones.
    #[arg(long)]
    pub negative_only: bool,

    /// Directory for report artifacts
    #[arg(short, long, default_value = "reports", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Claude model to use for classification
    #[arg(
        short,
        long,
        default_value = "claude-3-7-sonnet-20250219",
        env = "REVIEWLENS_MODEL"
    )]
    pub model: String,

    /// Anthropic API key
    ///
    /// Usually supplied via the ANTHROPIC_API_KEY environment variable.
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Request timeout in seconds for the classifier
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Skip rendering the sentiment chart image
    #[arg(long)]
    pub no_chart: bool,

    /// Path to configuration file
    ///
    /// If not specified, looks for .reviewlens.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// List previously analyzed apps and exit
    #[arg(long)]
    pub history: bool,

    /// Delete all reports and the analysis history, then exit
    #[arg(long)]
    pub clear_history: bool,

    /// Generate a default .reviewlens.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the app id, empty if not set (should be validated first).
    pub fn app_id(&self) -> &str {
        self.app_id.as_deref().unwrap_or("")
    }

    /// Whether this invocation runs a full analysis (as opposed to a
    /// maintenance action that needs no app id or API key).
    pub fn is_analysis_run(&self) -> bool {
        !self.init_config && !self.history && !self.clear_history
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Maintenance actions need no further validation.
        if !self.is_analysis_run() {
            return Ok(());
        }

        let app_id = self.app_id.as_deref().unwrap_or("");
        if app_id.is_empty() {
            return Err("An app id is required (use --app-id)".to_string());
        }
        if !app_id.contains('.') {
            return Err(format!(
                "'{}' does not look like a Play Store package id (e.g. com.example.app)",
                app_id
            ));
        }

        if self.lang.len() != 2 || !self.lang.chars().all(|c| c.is_ascii_lowercase()) {
            return Err("Language must be a two-letter lowercase code (e.g. en)".to_string());
        }
        if self.country.len() != 2 || !self.country.chars().all(|c| c.is_ascii_lowercase()) {
            return Err("Country must be a two-letter lowercase code (e.g. us)".to_string());
        }

        if self.count == 0 {
            return Err("Review count must be at least 1".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            app_id: Some("com.example.app".to_string()),
            lang: "en".to_string(),
            country: "us".to_string(),
            count: 100,
            negative_only: false,
            output_dir: PathBuf::from("reports"),
            model: "test-model".to_string(),
            api_key: Some("sk-test".to_string()),
            timeout: None,
            no_chart: false,
            config: None,
            history: false,
            clear_history: false,
            init_config: false,
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn test_valid_args() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_missing_app_id() {
        let mut args = make_args();
        args.app_id = None;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_app_id_without_dots() {
        let mut args = make_args();
        args.app_id = Some("notapackage".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_bad_lang() {
        let mut args = make_args();
        args.lang = "english".to_string();
        assert!(args.validate().is_err());

        args.lang = "EN".to_string();
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_count() {
        let mut args = make_args();
        args.count = 0;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_maintenance_actions_skip_validation() {
        let mut args = make_args();
        args.app_id = None;
        args.history = true;
        assert!(args.validate().is_ok());
        assert!(!args.is_analysis_run());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
