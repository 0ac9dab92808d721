use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use reqwest::Client;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::db::{Database, Feed, NewNews};
use crate::summarizer::{summarize_or_fallback, Summarizer};
use crate::text::{hype_score, is_web_url, source_domain, strip_html, truncate_chars};

/// Per-run ingestion limits
#[derive(Debug, Clone)]
pub struct FetchLimits {
    pub max_items_per_run: usize,
    pub max_items_per_feed: usize,
    pub entries_per_feed: usize,
    pub raw_summary_chars: usize,
    pub summary_chars: usize,
    pub max_hype_score: Option<u32>,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            max_items_per_run: 30,
            max_items_per_feed: 3,
            entries_per_feed: 10,
            raw_summary_chars: 500,
            summary_chars: 400,
            max_hype_score: None,
        }
    }
}

impl From<&Config> for FetchLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_items_per_run: config.max_items_per_run,
            max_items_per_feed: config.max_items_per_feed,
            entries_per_feed: config.entries_per_feed,
            raw_summary_chars: config.raw_summary_chars,
            summary_chars: config.summarizer.summary_chars,
            max_hype_score: config.max_hype_score,
        }
    }
}

/// A feed entry reduced to the fields we store
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEntry {
    pub title: String,
    pub link: String,
    pub raw_summary: String,
    pub published: Option<DateTime<Utc>>,
    pub image: String,
    pub source: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub feeds_total: usize,
    pub feeds_failed: usize,
    pub inserted: usize,
}

pub struct Fetcher {
    client: Client,
    db: Arc<Database>,
    summarizer: Arc<dyn Summarizer>,
    limits: FetchLimits,
    refreshing: Arc<RwLock<bool>>,
}

impl Fetcher {
    pub fn new(
        db: Arc<Database>,
        summarizer: Arc<dyn Summarizer>,
        limits: FetchLimits,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("ShortNews/1.0 (Telugu News Aggregator)")
            .build()?;

        Ok(Self {
            client,
            db,
            summarizer,
            limits,
            refreshing: Arc::new(RwLock::new(false)),
        })
    }

    pub async fn is_refreshing(&self) -> bool {
        *self.refreshing.read().await
    }

    /// Run one ingestion pass over every feed.
    /// Returns `None` when another pass is already running.
    pub async fn refresh_all_feeds(&self) -> anyhow::Result<Option<RefreshReport>> {
        if !self.try_claim().await {
            info!("Refresh already in progress, skipping");
            return Ok(None);
        }

        let result = self.do_refresh_all().await;
        self.release().await;

        result.map(Some)
    }

    /// Start a pass in the background. Returns `false` when one is already running.
    pub async fn spawn_refresh(self: Arc<Self>) -> bool {
        if !self.try_claim().await {
            return false;
        }

        tokio::spawn(async move {
            if let Err(e) = self.do_refresh_all().await {
                error!("Background feed refresh failed: {}", e);
            }
            self.release().await;
        });

        true
    }

    async fn try_claim(&self) -> bool {
        let mut refreshing = self.refreshing.write().await;
        if *refreshing {
            return false;
        }
        *refreshing = true;
        true
    }

    async fn release(&self) {
        *self.refreshing.write().await = false;
    }

    async fn do_refresh_all(&self) -> anyhow::Result<RefreshReport> {
        let feeds = self.db.get_all_feeds().await?;
        info!("Refreshing {} feeds", feeds.len());

        let mut report = RefreshReport {
            feeds_total: feeds.len(),
            ..Default::default()
        };

        for feed in feeds {
            if report.inserted >= self.limits.max_items_per_run {
                info!("Reached {} new items, stopping", report.inserted);
                break;
            }

            let budget = self.limits.max_items_per_run - report.inserted;
            match self.refresh_feed(&feed, budget).await {
                Ok(added) => {
                    report.inserted += added;
                    if let Err(e) = self.db.update_feed_fetched(feed.id, None, added as i64).await
                    {
                        error!("Failed to record fetch of '{}': {}", feed.name, e);
                    }
                }
                Err(e) => {
                    error!("Failed to refresh feed '{}': {}", feed.name, e);
                    report.feeds_failed += 1;
                    if let Err(e) = self
                        .db
                        .update_feed_fetched(feed.id, Some(&e.to_string()), 0)
                        .await
                    {
                        error!("Failed to record error for '{}': {}", feed.name, e);
                    }
                }
            }
        }

        info!(
            "Feed refresh complete: {} new items, {} of {} feeds failed",
            report.inserted, report.feeds_failed, report.feeds_total
        );
        Ok(report)
    }

    /// Ingest up to `budget` new items from one feed. Returns how many were inserted.
    async fn refresh_feed(&self, feed: &Feed, budget: usize) -> anyhow::Result<usize> {
        info!("Fetching feed: {} ({})", feed.name, feed.url);

        let response = self.client.get(&feed.url).send().await?.error_for_status()?;
        let bytes = response.bytes().await?;
        let parsed = parser::parse(&bytes[..])?;

        let per_feed = self.limits.max_items_per_feed.min(budget);
        let mut added = 0;

        for entry in parsed.entries.iter().take(self.limits.entries_per_feed) {
            if added >= per_feed {
                break;
            }

            let Some(normalized) = Self::normalize_entry(entry, self.limits.raw_summary_chars)
            else {
                warn!("Skipping entry without link/title in '{}'", feed.name);
                continue;
            };

            match self.ingest_entry(feed, normalized).await {
                Ok(true) => added += 1,
                Ok(false) => {}
                Err(e) => error!("Error processing entry from '{}': {}", feed.name, e),
            }
        }

        info!("Added {} items from '{}'", added, feed.name);
        Ok(added)
    }

    /// Filter, dedupe, summarize and store one entry. Returns whether it was inserted.
    async fn ingest_entry(&self, feed: &Feed, entry: NormalizedEntry) -> anyhow::Result<bool> {
        let score = hype_score(&entry.title, &entry.raw_summary);
        if let Some(max) = self.limits.max_hype_score {
            if score > max {
                info!("Skipping clickbait (score {}): {}", score, entry.title);
                return Ok(false);
            }
        }

        if self.db.is_duplicate(&entry.link, &entry.title).await? {
            debug!("Duplicate found: {}", truncate_chars(&entry.title, 50));
            return Ok(false);
        }

        let summary = summarize_or_fallback(
            self.summarizer.as_ref(),
            &entry.title,
            &entry.raw_summary,
            self.limits.summary_chars,
        )
        .await;

        let news = NewNews {
            title: entry.title,
            link: entry.link,
            raw_summary: entry.raw_summary,
            summary,
            image: entry.image,
            source: entry.source,
            feed_url: feed.url.clone(),
            language: "te".to_string(),
            category: feed.category.clone(),
            hype_score: score,
            published: entry.published,
        };

        match self.db.insert_news(&news).await? {
            Some(id) => {
                info!("Inserted news {}: {}", id, truncate_chars(&news.title, 50));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reduce a parsed entry to stored fields. Entries without title or link yield `None`.
    pub fn normalize_entry(entry: &Entry, raw_summary_chars: usize) -> Option<NormalizedEntry> {
        let title = entry
            .title
            .as_ref()
            .map(|t| strip_html(&t.content))
            .unwrap_or_default();

        let link = entry
            .links
            .iter()
            .find(|l| !Self::is_image_link(l))
            .map(|l| l.href.trim().to_string())
            .unwrap_or_default();

        if title.is_empty() || !is_web_url(&link) {
            return None;
        }

        let body = entry
            .summary
            .as_ref()
            .map(|s| s.content.clone())
            .filter(|s| !s.trim().is_empty())
            .or_else(|| entry.content.as_ref().and_then(|c| c.body.clone()))
            .unwrap_or_default();

        let published = entry.published.or(entry.updated);

        Some(NormalizedEntry {
            raw_summary: truncate_chars(&strip_html(&body), raw_summary_chars),
            source: source_domain(&link),
            image: Self::extract_image(entry),
            title,
            link,
            published,
        })
    }

    /// First `http(s)` image URL among media content, media thumbnails and `image/*` links
    pub fn extract_image(entry: &Entry) -> String {
        let media_content = entry
            .media
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|c| c.url.as_ref().map(|u| u.to_string()));

        let thumbnails = entry
            .media
            .iter()
            .flat_map(|m| m.thumbnails.iter())
            .map(|t| t.image.uri.trim().to_string());

        let image_links = entry
            .links
            .iter()
            .filter(|l| Self::is_image_link(l))
            .map(|l| l.href.trim().to_string());

        media_content
            .chain(thumbnails)
            .chain(image_links)
            .find(|url| is_web_url(url))
            .unwrap_or_default()
    }

    fn is_image_link(link: &feed_rs::model::Link) -> bool {
        link.media_type
            .as_deref()
            .map(|t| t.starts_with("image"))
            .unwrap_or(false)
    }
}

fn refresh_period(interval_minutes: u64) -> Duration {
    Duration::from_secs(interval_minutes.saturating_mul(60))
}

pub async fn start_background_refresh(fetcher: Arc<Fetcher>, interval_minutes: u64) {
    let interval = refresh_period(interval_minutes);

    info!("Starting initial feed fetch");
    if let Err(e) = fetcher.refresh_all_feeds().await {
        error!("Initial feed fetch failed: {}", e);
    }

    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled feed refresh");
        if let Err(e) = fetcher.refresh_all_feeds().await {
            error!("Scheduled feed refresh failed: {}", e);
        }
    }
}

/// Periodically delete news older than `ttl`
pub async fn start_expiry_sweeper(db: Arc<Database>, ttl: chrono::Duration, every: Duration) {
    loop {
        match db.purge_expired(ttl).await {
            Ok(0) => debug!("Expiry sweep: nothing to remove"),
            Ok(n) => info!("Expiry sweep removed {} news items", n),
            Err(e) => error!("Expiry sweep failed: {}", e),
        }
        tokio::time::sleep(every).await;
    }
}
