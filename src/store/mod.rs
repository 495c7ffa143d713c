//! Play Store fetch adapter.
//!
//! Fetches app metadata from the details page (via its embedded
//! `application/ld+json` block) and reviews from the `batchexecute`
//! RPC endpoint the store web UI uses. Single attempt per call, no
//! retries; failures propagate to the caller immediately.

use crate::models::{AppMetadata, Review};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const PLAY_STORE_BASE: &str = "https://play.google.com";

/// The reviews RPC caps each page at 199 items.
const REVIEWS_PAGE_SIZE: usize = 199;

/// Sort order constant for newest-first in the reviews RPC.
const SORT_NEWEST: u8 = 2;

/// Errors from the fetch adapter.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The app identifier does not resolve on the store.
    #[error("app not found on the Play Store: {0}")]
    AppNotFound(String),

    /// Network failure talking to the store.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The store answered with something we could not interpret.
    #[error("unexpected Play Store response: {0}")]
    Parse(String),
}

/// HTTP client for the Play Store endpoints.
pub struct StoreClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl StoreClient {
    /// Create a client with the given request timeout.
    pub fn new(timeout_seconds: u64) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;

        Ok(Self {
            http_client,
            base_url: PLAY_STORE_BASE.to_string(),
        })
    }

    /// Fetch the metadata snapshot for one app.
    pub async fn fetch_app(
        &self,
        app_id: &str,
        lang: &str,
        country: &str,
    ) -> Result<AppMetadata, FetchError> {
        let url = format!(
            "{}/store/apps/details?id={}&hl={}&gl={}",
            self.base_url, app_id, lang, country
        );
        debug!("Fetching app details: {}", url);

        let response = self.http_client.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::AppNotFound(app_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(FetchError::Parse(format!(
                "details page returned HTTP {}",
                response.status()
            )));
        }

        let html = response.text().await?;
        let metadata = parse_details_page(app_id, &html)?;

        info!(
            "Fetched metadata for {} ({}, score {:.1})",
            metadata.title, app_id, metadata.score
        );
        Ok(metadata)
    }

    /// Fetch up to `count` reviews, newest first.
    ///
    /// Pages through the RPC endpoint until `count` reviews are
    /// collected or the store has no more to give.
    pub async fn fetch_reviews(
        &self,
        app_id: &str,
        lang: &str,
        country: &str,
        count: usize,
    ) -> Result<Vec<Review>, FetchError> {
        let source = RpcPageSource {
            client: self,
            app_id,
            lang,
            country,
        };
        let reviews = collect_reviews(&source, count).await?;
        info!("Fetched {} reviews for {}", reviews.len(), app_id);
        Ok(reviews)
    }

    /// Fetch one page from the reviews RPC.
    async fn fetch_reviews_page(
        &self,
        app_id: &str,
        lang: &str,
        country: &str,
        page_size: usize,
        token: Option<&str>,
    ) -> Result<(Vec<Review>, Option<String>), FetchError> {
        let url = format!(
            "{}/_/PlayStoreUi/data/batchexecute?hl={}&gl={}",
            self.base_url, lang, country
        );

        let payload = reviews_rpc_payload(app_id, page_size, token);
        let response = self
            .http_client
            .post(&url)
            .form(&[("f.req", payload)])
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::AppNotFound(app_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(FetchError::Parse(format!(
                "reviews endpoint returned HTTP {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        parse_reviews_response(&body)
    }
}

/// One page of reviews plus the continuation token for the next page.
type ReviewPage = (Vec<Review>, Option<String>);

/// Source of review pages. The RPC endpoint is the real one; tests
/// substitute a canned sequence.
#[async_trait]
trait ReviewPageSource {
    async fn fetch_page(
        &self,
        page_size: usize,
        token: Option<&str>,
    ) -> Result<ReviewPage, FetchError>;
}

struct RpcPageSource<'a> {
    client: &'a StoreClient,
    app_id: &'a str,
    lang: &'a str,
    country: &'a str,
}

#[async_trait]
impl ReviewPageSource for RpcPageSource<'_> {
    async fn fetch_page(
        &self,
        page_size: usize,
        token: Option<&str>,
    ) -> Result<ReviewPage, FetchError> {
        self.client
            .fetch_reviews_page(self.app_id, self.lang, self.country, page_size, token)
            .await
    }
}

/// Accumulate pages until `count` reviews are collected or the source
/// runs out (empty page or no continuation token), then truncate to at
/// most `count`.
async fn collect_reviews(
    source: &dyn ReviewPageSource,
    count: usize,
) -> Result<Vec<Review>, FetchError> {
    let mut reviews = Vec::with_capacity(count.min(REVIEWS_PAGE_SIZE));
    let mut token: Option<String> = None;

    while reviews.len() < count {
        let page_size = (count - reviews.len()).min(REVIEWS_PAGE_SIZE);
        let (page, next_token) = source.fetch_page(page_size, token.as_deref()).await?;

        debug!("Fetched page of {} reviews", page.len());
        if page.is_empty() {
            break;
        }
        reviews.extend(page);

        match next_token {
            Some(t) => token = Some(t),
            None => break,
        }
    }

    reviews.truncate(count);
    Ok(reviews)
}

/// Keep only negative reviews (1 to 3 stars), at most `count` of them.
///
/// Callers over-fetch and narrow with this; the result may hold fewer
/// than `count` reviews, or none at all when nobody complained.
pub fn negative_subset(mut reviews: Vec<Review>, count: usize) -> Vec<Review> {
    reviews.retain(|r| r.score <= 3);
    reviews.truncate(count);
    reviews
}

/// Build the `f.req` envelope for the reviews RPC.
///
/// The envelope wraps a stringified inner request: sort order, page
/// size, optional continuation token, and the app identifier.
fn reviews_rpc_payload(app_id: &str, page_size: usize, token: Option<&str>) -> String {
    let pagination = match token {
        Some(t) => format!("[{},null,\\\"{}\\\"]", page_size, t),
        None => format!("[{},null,null]", page_size),
    };
    format!(
        "[[[\"UsvDTd\",\"[null,null,[2,{},{}],[\\\"{}\\\",7]]\",null,\"generic\"]]]",
        SORT_NEWEST, pagination, app_id
    )
}

/// Parse the batchexecute response into reviews plus a continuation token.
fn parse_reviews_response(body: &str) -> Result<(Vec<Review>, Option<String>), FetchError> {
    // Responses are prefixed with an anti-XSSI marker line.
    let json_part = body
        .trim_start()
        .trim_start_matches(")]}'")
        .trim_start();

    let envelope: Value = serde_json::from_str(json_part)
        .map_err(|e| FetchError::Parse(format!("invalid envelope JSON: {}", e)))?;

    // The payload is a doubly-encoded JSON string at [0][2].
    let payload_str = envelope
        .get(0)
        .and_then(|v| v.get(2))
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::Parse("missing RPC payload".to_string()))?;

    let payload: Value = serde_json::from_str(payload_str)
        .map_err(|e| FetchError::Parse(format!("invalid payload JSON: {}", e)))?;

    let items = payload
        .get(0)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut reviews = Vec::with_capacity(items.len());
    for item in &items {
        match parse_review_item(item) {
            Some(review) => reviews.push(review),
            None => warn!("Skipping review entry with unexpected shape"),
        }
    }

    let token = payload
        .get(1)
        .and_then(|v| v.get(1))
        .and_then(Value::as_str)
        .map(String::from);

    Ok((reviews, token))
}

/// Decode a single review entry from the RPC payload.
fn parse_review_item(item: &Value) -> Option<Review> {
    let content = item.get(4)?.as_str()?.to_string();
    let score = item.get(2)?.as_u64()? as u8;
    let author = item
        .get(1)
        .and_then(|v| v.get(0))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let seconds = item
        .get(5)
        .and_then(|v| v.get(0))
        .and_then(Value::as_i64)
        .unwrap_or(0);
    let timestamp: DateTime<Utc> = DateTime::from_timestamp(seconds, 0)?;

    Some(Review {
        content,
        score,
        author,
        timestamp,
    })
}

/// Extract app metadata from the details page HTML.
///
/// The page carries a schema.org `SoftwareApplication` block which has
/// the fields we need; install count and friends are pulled out of the
/// surrounding markup on a best-effort basis.
fn parse_details_page(app_id: &str, html: &str) -> Result<AppMetadata, FetchError> {
    let schema = extract_ld_json(html)
        .ok_or_else(|| FetchError::Parse("no application schema in details page".to_string()))?;

    let title = schema
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| FetchError::Parse("details page missing app name".to_string()))?
        .to_string();

    let developer = schema
        .get("author")
        .and_then(|a| a.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let rating = schema.get("aggregateRating");
    let score = rating
        .and_then(|r| r.get("ratingValue"))
        .and_then(value_as_f64)
        .unwrap_or(0.0);
    let reviews = rating
        .and_then(|r| r.get("ratingCount"))
        .and_then(value_as_u64)
        .unwrap_or(0);

    let price = schema
        .get("offers")
        .and_then(|o| o.get(0))
        .and_then(|o| o.get("price"))
        .and_then(Value::as_str)
        .map(String::from);

    let content_rating = schema
        .get("contentRating")
        .and_then(Value::as_str)
        .map(String::from);

    Ok(AppMetadata {
        app_id: app_id.to_string(),
        title,
        developer,
        score,
        reviews,
        installs: extract_installs(html),
        price,
        // The details page dropped the download size years ago.
        size: None,
        updated: extract_updated(html),
        content_rating,
    })
}

/// Pull the first `application/ld+json` script block out of the page.
fn extract_ld_json(html: &str) -> Option<Value> {
    let re = Regex::new(r#"(?s)<script[^>]*type="application/ld\+json"[^>]*>(.*?)</script>"#)
        .expect("static regex");
    let captures = re.captures(html)?;
    serde_json::from_str(captures.get(1)?.as_str()).ok()
}

/// Best-effort install count (e.g. "100,000,000+") from the page markup.
fn extract_installs(html: &str) -> Option<String> {
    let re = Regex::new(r#""([\d][\d,.]*\+)""#).expect("static regex");
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Best-effort last-updated date from the page markup.
fn extract_updated(html: &str) -> Option<String> {
    let re = Regex::new(r#""(\w{3} \d{1,2}, \d{4})""#).expect("static regex");
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Schema values are sometimes numbers, sometimes numeric strings.
fn value_as_f64(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn value_as_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    fn review(content: &str, score: u8) -> Review {
        Review {
            content: content.to_string(),
            score,
            author: "tester".to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Serves a fixed sequence of pages, then empty pages forever.
    struct StubPages {
        pages: Mutex<VecDeque<ReviewPage>>,
    }

    impl StubPages {
        fn new(pages: Vec<ReviewPage>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
            }
        }
    }

    #[async_trait]
    impl ReviewPageSource for StubPages {
        async fn fetch_page(
            &self,
            _page_size: usize,
            _token: Option<&str>,
        ) -> Result<ReviewPage, FetchError> {
            Ok(self
                .pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or((Vec::new(), None)))
        }
    }

    #[tokio::test]
    async fn test_collect_reviews_truncates_to_requested_count() {
        // Upstream has 6 reviews across two pages; only 4 were asked for.
        let source = StubPages::new(vec![
            (
                vec![review("a", 5), review("b", 4), review("c", 3)],
                Some("tok".to_string()),
            ),
            (
                vec![review("d", 2), review("e", 1), review("f", 5)],
                Some("tok2".to_string()),
            ),
        ]);

        let reviews = collect_reviews(&source, 4).await.unwrap();
        assert_eq!(reviews.len(), 4);
        assert_eq!(reviews[3].content, "d");
    }

    #[tokio::test]
    async fn test_collect_reviews_stops_without_continuation_token() {
        let source = StubPages::new(vec![
            (vec![review("a", 5), review("b", 4)], None),
            (vec![review("never", 1)], None),
        ]);

        let reviews = collect_reviews(&source, 10).await.unwrap();
        assert_eq!(reviews.len(), 2);
    }

    #[tokio::test]
    async fn test_collect_reviews_stops_on_empty_page() {
        let source = StubPages::new(vec![(Vec::new(), Some("tok".to_string()))]);
        let reviews = collect_reviews(&source, 10).await.unwrap();
        assert!(reviews.is_empty());
    }

    #[test]
    fn test_negative_subset_keeps_low_scores() {
        let reviews = vec![
            review("a", 5),
            review("b", 3),
            review("c", 1),
            review("d", 4),
            review("e", 2),
        ];

        let negative = negative_subset(reviews, 2);
        assert_eq!(negative.len(), 2);
        assert!(negative.iter().all(|r| r.score <= 3));
        assert_eq!(negative[0].content, "b");
    }

    #[test]
    fn test_negative_subset_may_fall_short_of_count() {
        let reviews = vec![review("a", 5), review("b", 2), review("c", 5)];
        let negative = negative_subset(reviews, 10);
        assert_eq!(negative.len(), 1);
    }

    #[test]
    fn test_negative_subset_of_happy_reviews_is_empty() {
        let reviews = vec![review("a", 5), review("b", 4)];
        assert!(negative_subset(reviews, 10).is_empty());
    }

    const DETAILS_HTML: &str = r#"
<html><head>
<script type="application/ld+json" nonce="x">
{
  "@type": "SoftwareApplication",
  "name": "Example Game",
  "author": {"@type": "Organization", "name": "Example Studio"},
  "aggregateRating": {"ratingValue": "4.3", "ratingCount": "1532876"},
  "offers": [{"price": "0"}],
  "contentRating": "Everyone"
}
</script>
</head><body>"100,000,000+" updated "Jan 5, 2025"</body></html>
"#;

    #[test]
    fn test_parse_details_page() {
        let meta = parse_details_page("com.example.game", DETAILS_HTML).unwrap();
        assert_eq!(meta.app_id, "com.example.game");
        assert_eq!(meta.title, "Example Game");
        assert_eq!(meta.developer, "Example Studio");
        assert!((meta.score - 4.3).abs() < 1e-9);
        assert!(meta.score >= 0.0 && meta.score <= 5.0);
        assert_eq!(meta.reviews, 1_532_876);
        assert_eq!(meta.installs.as_deref(), Some("100,000,000+"));
        assert_eq!(meta.price.as_deref(), Some("0"));
        assert_eq!(meta.content_rating.as_deref(), Some("Everyone"));
    }

    #[test]
    fn test_parse_details_page_without_schema() {
        let err = parse_details_page("com.example", "<html></html>").unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[test]
    fn test_parse_reviews_response() {
        // Two reviews and a continuation token, in the doubly-encoded
        // shape the batchexecute endpoint returns.
        let payload = serde_json::json!([
            [
                ["id1", ["Alice"], 5, null, "Love it", [1700000000]],
                ["id2", ["Bob"], 2, null, "Crashes a lot", [1700000100]]
            ],
            [null, "next-token"]
        ]);
        let body = format!(
            ")]}}'\n[[null,null,{}]]",
            serde_json::to_string(&payload.to_string()).unwrap()
        );

        let (reviews, token) = parse_reviews_response(&body).unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].author, "Alice");
        assert_eq!(reviews[0].score, 5);
        assert_eq!(reviews[0].content, "Love it");
        assert_eq!(reviews[1].score, 2);
        assert_eq!(token.as_deref(), Some("next-token"));
    }

    #[test]
    fn test_parse_reviews_response_no_token() {
        let payload = serde_json::json!([
            [["id1", ["Ana"], 4, null, "Nice", [1700000000]]],
            null
        ]);
        let body = format!(
            ")]}}'\n[[null,null,{}]]",
            serde_json::to_string(&payload.to_string()).unwrap()
        );

        let (reviews, token) = parse_reviews_response(&body).unwrap();
        assert_eq!(reviews.len(), 1);
        assert!(token.is_none());
    }

    #[test]
    fn test_parse_reviews_response_garbage() {
        assert!(parse_reviews_response("not json").is_err());
    }

    #[test]
    fn test_review_item_with_missing_fields_is_skipped() {
        assert!(parse_review_item(&serde_json::json!(["id", ["x"]])).is_none());
    }

    #[test]
    fn test_rpc_payload_shapes() {
        let first = reviews_rpc_payload("com.example", 100, None);
        assert!(first.contains("UsvDTd"));
        assert!(first.contains("com.example"));
        assert!(first.contains("[100,null,null]"));

        let next = reviews_rpc_payload("com.example", 50, Some("tok"));
        assert!(next.contains("tok"));
    }
}
