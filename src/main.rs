//! Reviewlens - LLM-powered Play Store review analyzer
//!
//! A CLI tool that fetches an app's reviews from the Google Play
//! Store, classifies each one with Claude, and writes a JSON report
//! plus a sentiment chart.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (fetch failure, missing API key, etc.)

mod analysis;
mod chart;
mod classifier;
mod cli;
mod config;
mod models;
mod report;
mod store;

use analysis::Aggregator;
use anyhow::{Context, Result};
use chrono::Utc;
use classifier::{AnthropicClassifier, ClassifierConfig};
use cli::Args;
use config::Config;
use models::{HistoryEntry, Review};
use store::StoreClient;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("Reviewlens v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if args.history {
        return handle_history(&args);
    }
    if args.clear_history {
        return handle_clear_history(&args);
    }

    // Run the analysis
    match run_analysis(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Analysis failed: {}", e);
            eprintln!("\n❌ Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .reviewlens.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(".reviewlens.toml");

    if path.exists() {
        eprintln!("⚠️  .reviewlens.toml already exists. Remove it first or edit it manually.");
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).context("Failed to write .reviewlens.toml")?;

    println!("✅ Created .reviewlens.toml with default settings.");
    println!("   Edit it to customize model, fetch defaults, and report options.");
    Ok(())
}

/// Handle --history: list past analyses and exit.
fn handle_history(args: &Args) -> Result<()> {
    let entries = report::history::load(&args.output_dir);

    if entries.is_empty() {
        println!("No previous analyses found.");
        return Ok(());
    }

    println!("📜 Analysis history ({} entries):\n", entries.len());
    for entry in &entries {
        println!(
            "   {} - {} ({})",
            entry.date.format("%Y-%m-%d %H:%M"),
            entry.app_name,
            entry.app_id
        );
    }
    Ok(())
}

/// Handle --clear-history: delete reports, charts, and the history file.
fn handle_clear_history(args: &Args) -> Result<()> {
    let removed = report::history::clear(&args.output_dir)?;
    println!(
        "🗑️  Removed {} file(s) from {}",
        removed,
        args.output_dir.display()
    );
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete fetch → classify → report workflow.
async fn run_analysis(args: Args) -> Result<()> {
    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);

    let app_id = args.app_id().to_string();
    let output_dir = std::path::PathBuf::from(&config.general.output_dir);

    // Step 1: Fetch app metadata
    println!("📥 Fetching app info: {}", app_id);
    let store_client = StoreClient::new(config.fetch.timeout_seconds)?;
    let metadata = store_client
        .fetch_app(&app_id, &config.fetch.lang, &config.fetch.country)
        .await?;

    println!("   App: {}", metadata.title);
    println!("   Developer: {}", metadata.developer);
    println!(
        "   Store rating: {:.1} ({} reviews)",
        metadata.score, metadata.reviews
    );

    // Step 2: Fetch reviews
    let reviews = fetch_reviews(&store_client, &config, &args, &app_id).await?;
    println!("   Fetched {} reviews", reviews.len());

    // Step 3: Classify and aggregate
    println!(
        "\n🔬 Classifying {} reviews with {}...",
        reviews.len(),
        config.model.name
    );

    let classifier = AnthropicClassifier::new(ClassifierConfig {
        api_key: args.api_key.clone().unwrap_or_default(),
        model: config.model.name.clone(),
        base_url: config.model.base_url.clone(),
        timeout_seconds: config.model.timeout_seconds,
        max_tokens: config.model.max_tokens,
    })?;

    let stats = Aggregator::new(&classifier)
        .with_progress(!args.quiet)
        .aggregate(&reviews)
        .await?;

    if stats.fallback_count > 0 {
        warn!(
            "{} of {} reviews used the neutral fallback judgment",
            stats.fallback_count, stats.total_reviews
        );
    }

    // Step 4: Build and persist the report
    println!("\n📝 Generating report...");
    let analysis_report = report::build_report(&metadata, stats);
    let report_path = report::persist(&analysis_report, &output_dir)?;

    // Step 5: Render the chart
    if config.report.chart {
        let chart_path = report::chart_path(&output_dir, &app_id);
        if let Err(e) = chart::render_sentiment_chart(&analysis_report, &chart_path) {
            // The JSON artifact is already on disk; a chart failure
            // should not look like a failed analysis.
            warn!("Chart rendering failed: {}", e);
            eprintln!("⚠️  Chart rendering failed: {}", e);
        }
    }

    // Step 6: Record in history
    if config.report.history {
        report::history::append(
            &output_dir,
            HistoryEntry {
                app_id: app_id.clone(),
                app_name: metadata.title.clone(),
                date: Utc::now(),
                report_path: Some(report_path.display().to_string()),
            },
        )?;
    }

    // Print summary
    let analysis = &analysis_report.analysis;
    println!("\n📊 Analysis Summary:");
    println!("   Reviews analyzed: {}", analysis.total_reviews);
    println!("   Average rating: {:.2}", analysis.average_rating);
    println!(
        "   Sentiment: 🟢 {} positive | ⚪ {} neutral | 🔴 {} negative",
        analysis.sentiment_distribution.positive,
        analysis.sentiment_distribution.neutral,
        analysis.sentiment_distribution.negative
    );
    if let Some((topic, count)) = analysis.common_topics.iter().next() {
        println!("   Top topic: {} ({}x)", topic, count);
    }
    if let Some((issue, count)) = analysis.common_issues.iter().next() {
        println!("   Top issue: {} ({}x)", issue, count);
    }
    println!(
        "\n✅ Analysis complete! Report saved to: {}",
        report_path.display()
    );

    Ok(())
}

/// Fetch the review batch, applying the negative-only filter if asked.
async fn fetch_reviews(
    store_client: &StoreClient,
    config: &Config,
    args: &Args,
    app_id: &str,
) -> Result<Vec<Review>> {
    let count = config.fetch.count;

    if args.negative_only {
        // Over-fetch so enough negative reviews survive the filter.
        println!("📥 Fetching up to {} reviews (negative only)...", count);
        let reviews = store_client
            .fetch_reviews(app_id, &config.fetch.lang, &config.fetch.country, count * 2)
            .await?;
        Ok(store::negative_subset(reviews, count))
    } else {
        println!("📥 Fetching up to {} reviews...", count);
        Ok(store_client
            .fetch_reviews(app_id, &config.fetch.lang, &config.fetch.country, count)
            .await?)
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from .reviewlens.toml");
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
