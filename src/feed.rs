//! Rate-limited feed pagination.
//!
//! Pulls vulnerability records from the remote feed with an offset cursor,
//! sleeping a fixed interval between pages to stay under the feed's
//! request-rate ceiling: a short delay when a credential is present, a long
//! one otherwise. The wait is a fixed configurable duration, not an adaptive
//! backoff.
//!
//! A failed page (non-2xx or transport error) stops pagination early and
//! yields whatever was accumulated so far — callers must treat a short
//! result as potentially incomplete, not as full window coverage. Re-running
//! the same window is the only resumption mechanism.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

use crate::checkpoint::format_timestamp;
use crate::config::{FeedConfig, FEED_MAX_PAGE_SIZE};
use crate::models::{CveRecord, FeedPage};

/// Client for the paginated vulnerability feed.
pub struct FeedClient {
    base_url: String,
    api_key: Option<String>,
    page_size: u64,
    key_delay: Duration,
    public_delay: Duration,
    client: reqwest::Client,
}

impl FeedClient {
    /// Build a client with an explicit credential (or none).
    pub fn new(config: &FeedConfig, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: config.base_url.clone(),
            api_key,
            page_size: config.page_size.min(FEED_MAX_PAGE_SIZE),
            key_delay: Duration::from_millis(config.key_delay_ms),
            public_delay: Duration::from_millis(config.public_delay_ms),
            client,
        })
    }

    /// Build a client, reading the credential from the configured env var.
    pub fn from_env(config: &FeedConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        Self::new(config, api_key)
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// Fixed sleep applied between page requests.
    fn page_delay(&self) -> Duration {
        if self.has_credential() {
            self.key_delay
        } else {
            self.public_delay
        }
    }

    async fn request_page(
        &self,
        window: Option<(&str, &str)>,
        start_index: u64,
        per_page: u64,
    ) -> Result<FeedPage> {
        let mut params: Vec<(&str, String)> = vec![
            ("resultsPerPage", per_page.to_string()),
            ("startIndex", start_index.to_string()),
        ];
        if let Some((start, end)) = window {
            params.push(("lastModStartDate", start.to_string()));
            params.push(("lastModEndDate", end.to_string()));
        }

        let mut request = self.client.get(&self.base_url).query(&params);
        if let Some(ref key) = self.api_key {
            request = request.header("apiKey", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            bail!("feed returned {}", status);
        }

        Ok(response.json::<FeedPage>().await?)
    }

    /// Fetch every record in a modification-time window.
    ///
    /// Always returns the accumulated records; a failed page ends the walk
    /// early with a warning instead of an error.
    pub async fn fetch_window(&self, start: &str, end: &str) -> Vec<CveRecord> {
        self.fetch_paginated(Some((start, end))).await
    }

    /// Fetch the entire feed, unfiltered. Used by the full seed rebuild.
    pub async fn fetch_all(&self) -> Vec<CveRecord> {
        self.fetch_paginated(None).await
    }

    async fn fetch_paginated(&self, window: Option<(&str, &str)>) -> Vec<CveRecord> {
        let mut records = Vec::new();
        let mut start_index = 0u64;

        loop {
            let page = match self.request_page(window, start_index, self.page_size).await {
                Ok(page) => page,
                Err(e) => {
                    eprintln!("Warning: feed request failed: {}; stopping pagination early", e);
                    break;
                }
            };

            if page.vulnerabilities.is_empty() {
                break;
            }

            let page_len = page.vulnerabilities.len() as u64;
            let total = page.total_results;
            records.extend(page.vulnerabilities.into_iter().map(|entry| entry.cve));
            println!(
                "  fetched {} records | total: {}/{}",
                page_len,
                records.len(),
                total
            );

            if start_index + page_len >= total {
                break;
            }
            start_index += self.page_size;

            tokio::time::sleep(self.page_delay()).await;
        }

        records
    }

    /// Fetch a single page of records for a window, capped at `limit`.
    ///
    /// Used by the live feed-filter endpoint; unlike the paginated walk,
    /// a failure here is an error the caller reports.
    pub async fn fetch_page(&self, start: &str, end: &str, limit: u64) -> Result<Vec<CveRecord>> {
        let per_page = limit.min(FEED_MAX_PAGE_SIZE);
        let page = self.request_page(Some((start, end)), 0, per_page).await?;
        Ok(page.vulnerabilities.into_iter().map(|e| e.cve).collect())
    }
}

/// Compute the date window for a feed filter.
///
/// `today` covers midnight to now, `week` the last 7 days, `month` the last
/// 30; `custom` requires both explicit bounds (RFC 3339, `Z` accepted).
/// Anything else falls back to a 7-day window. Returns feed-format strings.
pub fn filter_window(
    filter: &str,
    start_date: Option<&str>,
    end_date: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(String, String)> {
    let (start, end) = match filter {
        "today" => {
            let midnight = now
                .date_naive()
                .and_hms_opt(0, 0, 0)
                .unwrap()
                .and_utc();
            (midnight, now)
        }
        "week" => (now - ChronoDuration::days(7), now),
        "month" => (now - ChronoDuration::days(30), now),
        "custom" => match (start_date, end_date) {
            (Some(s), Some(e)) => {
                let start = DateTime::parse_from_rfc3339(s)
                    .map_err(|err| anyhow::anyhow!("invalid startDate '{}': {}", s, err))?
                    .with_timezone(&Utc);
                let end = DateTime::parse_from_rfc3339(e)
                    .map_err(|err| anyhow::anyhow!("invalid endDate '{}': {}", e, err))?
                    .with_timezone(&Utc);
                (start, end)
            }
            // custom without both bounds degrades to the default window
            _ => (now - ChronoDuration::days(7), now),
        },
        _ => (now - ChronoDuration::days(7), now),
    };

    Ok((format_timestamp(start), format_timestamp(end)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 14, 30, 0).unwrap()
    }

    #[test]
    fn test_today_window_starts_at_midnight() {
        let (start, end) = filter_window("today", None, None, fixed_now()).unwrap();
        assert_eq!(start, "2024-06-15T00:00:00.000");
        assert_eq!(end, "2024-06-15T14:30:00.000");
    }

    #[test]
    fn test_week_window() {
        let (start, end) = filter_window("week", None, None, fixed_now()).unwrap();
        assert_eq!(start, "2024-06-08T14:30:00.000");
        assert_eq!(end, "2024-06-15T14:30:00.000");
    }

    #[test]
    fn test_month_window() {
        let (start, _) = filter_window("month", None, None, fixed_now()).unwrap();
        assert_eq!(start, "2024-05-16T14:30:00.000");
    }

    #[test]
    fn test_custom_window_parses_both_bounds() {
        let (start, end) = filter_window(
            "custom",
            Some("2024-01-01T00:00:00Z"),
            Some("2024-02-01T12:00:00Z"),
            fixed_now(),
        )
        .unwrap();
        assert_eq!(start, "2024-01-01T00:00:00.000");
        assert_eq!(end, "2024-02-01T12:00:00.000");
    }

    #[test]
    fn test_custom_without_bounds_defaults_to_week() {
        let (start, _) = filter_window("custom", Some("2024-01-01T00:00:00Z"), None, fixed_now())
            .unwrap();
        assert_eq!(start, "2024-06-08T14:30:00.000");
    }

    #[test]
    fn test_custom_invalid_date_is_error() {
        assert!(filter_window("custom", Some("yesterday"), Some("today"), fixed_now()).is_err());
    }

    #[test]
    fn test_unrecognized_filter_defaults_to_week() {
        let (start, _) = filter_window("fortnight", None, None, fixed_now()).unwrap();
        assert_eq!(start, "2024-06-08T14:30:00.000");
    }

    #[test]
    fn test_credential_selects_short_delay() {
        let config = FeedConfig::default();
        let with_key = FeedClient::new(&config, Some("k".to_string())).unwrap();
        let without = FeedClient::new(&config, None).unwrap();
        assert_eq!(with_key.page_delay(), Duration::from_millis(600));
        assert_eq!(without.page_delay(), Duration::from_millis(6000));
    }

    #[test]
    fn test_page_size_clamped_to_feed_cap() {
        let config = FeedConfig {
            page_size: 100_000,
            ..FeedConfig::default()
        };
        let client = FeedClient::new(&config, None).unwrap();
        assert_eq!(client.page_size, FEED_MAX_PAGE_SIZE);
    }
}
