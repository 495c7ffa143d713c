//! The aggregation pass over a batch of fetched reviews.
//!
//! Each review is classified one at a time, in input order, and the
//! judgments are folded into running histograms and frequency tables.
//! One bad classification never aborts the batch; the classifier
//! substitutes its neutral fallback and the fold continues.

use crate::classifier::ReviewClassifier;
use crate::models::{FrequencyTable, Review, ReviewStats, SentimentCounts};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the aggregation pass.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    /// Aggregation was invoked with nothing to aggregate.
    #[error("no reviews to analyze; fetch reviews first")]
    NoReviews,
}

/// Runs the classify-and-fold pass over a review batch.
pub struct Aggregator<'a> {
    classifier: &'a dyn ReviewClassifier,
    show_progress: bool,
}

impl<'a> Aggregator<'a> {
    pub fn new(classifier: &'a dyn ReviewClassifier) -> Self {
        Self {
            classifier,
            show_progress: false,
        }
    }

    /// Display an indicatif bar while classifying.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Classify every review and fold the results into statistics.
    ///
    /// Sequential by design: one classifier call at a time, in input
    /// order, so the result is deterministic for a fixed batch and a
    /// deterministic classifier.
    pub async fn aggregate(&self, reviews: &[Review]) -> Result<ReviewStats, AggregateError> {
        if reviews.is_empty() {
            return Err(AggregateError::NoReviews);
        }

        let mut rating_distribution: BTreeMap<u8, u64> = BTreeMap::new();
        let mut score_sum: u64 = 0;
        for review in reviews {
            *rating_distribution.entry(review.score).or_insert(0) += 1;
            score_sum += u64::from(review.score);
        }
        let average_rating = score_sum as f64 / reviews.len() as f64;

        let mut sentiment_distribution = SentimentCounts::default();
        let mut common_topics = FrequencyTable::new();
        let mut common_issues = FrequencyTable::new();
        let mut common_praises = FrequencyTable::new();
        let mut fallback_count: u64 = 0;

        let progress_bar = if self.show_progress {
            let pb = ProgressBar::new(reviews.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} reviews",
                    )
                    .unwrap()
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        for (i, review) in reviews.iter().enumerate() {
            debug!("Classifying review {}/{}", i + 1, reviews.len());
            let classification = self.classifier.classify(&review.content).await;
            if classification.is_fallback() {
                fallback_count += 1;
            }

            let judgment = classification.judgment();
            sentiment_distribution.increment(judgment.sentiment);
            for topic in &judgment.topics {
                common_topics.increment(topic);
            }
            for issue in &judgment.issues {
                common_issues.increment(issue);
            }
            for praise in &judgment.praises {
                common_praises.increment(praise);
            }

            if let Some(ref pb) = progress_bar {
                pb.inc(1);
            }
        }

        if let Some(pb) = progress_bar {
            pb.finish_and_clear();
        }

        common_topics.sort_descending();
        common_issues.sort_descending();
        common_praises.sort_descending();

        info!(
            "Aggregated {} reviews ({} classification fallbacks)",
            reviews.len(),
            fallback_count
        );

        Ok(ReviewStats {
            total_reviews: reviews.len() as u64,
            average_rating,
            rating_distribution,
            sentiment_distribution,
            common_topics,
            common_issues,
            common_praises,
            fallback_count,
        })
    }
}
