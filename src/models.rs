//! Data models for the review analyzer.
//!
//! This module contains all the core data structures used throughout
//! the application for representing app metadata, reviews, sentiment
//! judgments, and analysis reports.

use chrono::{DateTime, Utc};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Sentiment of a single review.
///
/// The model is allowed to answer "mixed", but that value is collapsed
/// to `Neutral` during parsing and never appears downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Parse a sentiment value from the model response.
    ///
    /// Accepts `positive`, `negative`, `neutral`, and `mixed` (which
    /// normalizes to `Neutral`). Anything else is rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            "neutral" | "mixed" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "positive"),
            Sentiment::Negative => write!(f, "negative"),
            Sentiment::Neutral => write!(f, "neutral"),
        }
    }
}

/// Structured judgment produced for one review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    /// Overall sentiment of the review.
    pub sentiment: Sentiment,
    /// Topics the review touches on.
    pub topics: Vec<String>,
    /// Problems the reviewer complains about.
    pub issues: Vec<String>,
    /// Things the reviewer likes.
    pub praises: Vec<String>,
}

impl Judgment {
    /// The fixed judgment substituted when classification fails.
    pub fn fallback() -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            topics: vec!["error".to_string()],
            issues: Vec::new(),
            praises: Vec::new(),
        }
    }
}

/// Outcome of classifying one review.
///
/// Classification never fails outright: a bad model response becomes a
/// `Fallback` carrying the fixed neutral judgment and the reason, so
/// call sites can still tell "classified as neutral" apart from
/// "classification failed and defaulted to neutral".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The model produced a valid judgment.
    Classified(Judgment),
    /// Classification failed; the fixed fallback judgment applies.
    Fallback { judgment: Judgment, reason: String },
}

impl Classification {
    /// The judgment to fold into the aggregate, regardless of outcome.
    pub fn judgment(&self) -> &Judgment {
        match self {
            Classification::Classified(j) => j,
            Classification::Fallback { judgment, .. } => judgment,
        }
    }

    /// Whether this classification fell back to the neutral default.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Classification::Fallback { .. })
    }
}

/// App metadata fetched once per analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Play Store package identifier (e.g. `com.nianticlabs.pokemongo`).
    pub app_id: String,
    /// App display name.
    pub title: String,
    /// Developer name.
    pub developer: String,
    /// Average store rating, 0.0 to 5.0.
    pub score: f64,
    /// Total number of store reviews.
    pub reviews: u64,
    /// Install count as displayed by the store (e.g. "100,000,000+").
    pub installs: Option<String>,
    /// Price string, empty or "0" for free apps.
    pub price: Option<String>,
    /// Download size. The current details page no longer lists one, so
    /// this stays unset.
    pub size: Option<String>,
    /// Last-updated date as displayed by the store.
    pub updated: Option<String>,
    /// Content rating (e.g. "Everyone").
    pub content_rating: Option<String>,
}

/// A single user review, immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    /// Review text.
    pub content: String,
    /// Star rating, 1 to 5.
    pub score: u8,
    /// Reviewer display name.
    pub author: String,
    /// When the review was posted.
    pub timestamp: DateTime<Utc>,
}

/// Sentiment histogram. All three keys are always present in the
/// serialized form, defaulting to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentCounts {
    pub positive: u64,
    pub neutral: u64,
    pub negative: u64,
}

impl SentimentCounts {
    /// Increment the bucket for the given sentiment.
    pub fn increment(&mut self, sentiment: Sentiment) {
        match sentiment {
            Sentiment::Positive => self.positive += 1,
            Sentiment::Neutral => self.neutral += 1,
            Sentiment::Negative => self.negative += 1,
        }
    }

    /// Sum of all buckets. Equals the number of reviews aggregated.
    pub fn total(&self) -> u64 {
        self.positive + self.neutral + self.negative
    }
}

/// A label→count table that remembers discovery order.
///
/// Labels are counted as they arrive; `sort_descending` then orders the
/// table by count, keeping first-seen order for ties. Serializes as a
/// JSON object in table order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    entries: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the count for `label`, creating it at zero first.
    pub fn increment(&mut self, label: &str) {
        match self.index.get(label) {
            Some(&i) => self.entries[i].1 += 1,
            None => {
                self.index.insert(label.to_string(), self.entries.len());
                self.entries.push((label.to_string(), 1));
            }
        }
    }

    /// Stable sort by descending count; ties keep discovery order.
    pub fn sort_descending(&mut self) {
        self.entries.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
        for (i, (label, _)) in self.entries.iter().enumerate() {
            self.index.insert(label.clone(), i);
        }
    }

    pub fn get(&self, label: &str) -> Option<u64> {
        self.index.get(label).map(|&i| self.entries[i].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in table order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.entries.iter().map(|(label, count)| (label.as_str(), *count))
    }
}

impl Serialize for FrequencyTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (label, count) in &self.entries {
            map.serialize_entry(label, count)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FrequencyTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = FrequencyTable;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of label to count")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut table = FrequencyTable::new();
                while let Some((label, count)) = access.next_entry::<String, u64>()? {
                    table.index.insert(label.clone(), table.entries.len());
                    table.entries.push((label, count));
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}

/// Summary statistics computed across a batch of reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewStats {
    /// Number of reviews aggregated.
    pub total_reviews: u64,
    /// Arithmetic mean of the star ratings, unrounded.
    pub average_rating: f64,
    /// Star rating histogram; keys are a subset of 1..=5.
    pub rating_distribution: BTreeMap<u8, u64>,
    /// Sentiment histogram; all three keys always present.
    pub sentiment_distribution: SentimentCounts,
    /// Topic frequencies, descending by count.
    pub common_topics: FrequencyTable,
    /// Issue frequencies, descending by count.
    pub common_issues: FrequencyTable,
    /// Praise frequencies, descending by count.
    pub common_praises: FrequencyTable,
    /// How many judgments were classification fallbacks. Diagnostic
    /// only; not part of the persisted artifact.
    #[serde(skip)]
    pub fallback_count: u64,
}

/// Subset of app metadata persisted in the report artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppInfo {
    pub title: String,
    pub developer: String,
    pub score: f64,
    pub reviews: u64,
    pub installs: Option<String>,
    pub price: Option<String>,
    pub size: Option<String>,
    pub updated: Option<String>,
    pub content_rating: Option<String>,
}

impl From<&AppMetadata> for AppInfo {
    fn from(meta: &AppMetadata) -> Self {
        Self {
            title: meta.title.clone(),
            developer: meta.developer.clone(),
            score: meta.score,
            reviews: meta.reviews,
            installs: meta.installs.clone(),
            price: meta.price.clone(),
            size: meta.size.clone(),
            updated: meta.updated.clone(),
            content_rating: meta.content_rating.clone(),
        }
    }
}

/// The complete persisted analysis report. One per app identifier;
/// replaced wholesale on re-analysis, never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Package identifier the report was generated for. Carried in
    /// memory for path construction only; the artifact encodes it in
    /// the filename, not the JSON body.
    #[serde(skip)]
    pub app_id: String,
    /// App metadata snapshot.
    pub app_info: AppInfo,
    /// Aggregated statistics.
    pub analysis: ReviewStats,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
}

/// One entry in the analysis history list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub app_id: String,
    pub app_name: String,
    pub date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<String>,
}
