use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};

use crate::config::FeedConfig;
use crate::text::title_prefix;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Feed {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub category: String,
    pub last_fetched: Option<String>,
    pub last_error: Option<String>,
    pub last_inserted: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct NewsItem {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub raw_summary: String,
    pub summary: String,
    pub image: String,
    pub source: String,
    pub feed_url: String,
    pub language: String,
    pub category: String,
    pub hype_score: i64,
    pub published: Option<String>,
    pub created_at: String,
    pub likes: i64,
    pub dislikes: i64,
    pub comment_count: i64,
}

/// A news item ready to be stored
#[derive(Debug, Clone, Default)]
pub struct NewNews {
    pub title: String,
    pub link: String,
    pub raw_summary: String,
    pub summary: String,
    pub image: String,
    pub source: String,
    pub feed_url: String,
    pub language: String,
    pub category: String,
    pub hype_score: u32,
    pub published: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Comment {
    pub id: i64,
    pub news_id: i64,
    pub text: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    Like,
    Dislike,
}

impl Reaction {
    pub fn parse(action: &str) -> Option<Self> {
        match action.trim().to_lowercase().as_str() {
            "like" => Some(Reaction::Like),
            "dislike" => Some(Reaction::Dislike),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Reaction::Like => "likes",
            Reaction::Dislike => "dislikes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow, Serialize)]
pub struct ReactionCounts {
    pub likes: i64,
    pub dislikes: i64,
}

/// Fixed-width UTC timestamp, so string order matches time order
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every connection to an in-memory database is a separate database
        let options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = options.connect(database_url).await?;

        Ok(Self { pool })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE,
                category TEXT NOT NULL DEFAULT 'general',
                last_fetched TEXT,
                last_error TEXT,
                last_inserted INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS news (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                link TEXT NOT NULL UNIQUE,
                raw_summary TEXT NOT NULL DEFAULT '',
                summary TEXT NOT NULL DEFAULT '',
                image TEXT NOT NULL DEFAULT '',
                source TEXT NOT NULL DEFAULT '',
                feed_url TEXT NOT NULL DEFAULT '',
                language TEXT NOT NULL DEFAULT 'te',
                category TEXT NOT NULL DEFAULT 'general',
                hype_score INTEGER NOT NULL DEFAULT 0,
                published TEXT,
                created_at TEXT NOT NULL,
                likes INTEGER NOT NULL DEFAULT 0,
                dislikes INTEGER NOT NULL DEFAULT 0,
                comment_count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Serves both the newest-first listing and the expiry sweep
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_news_created_at ON news(created_at DESC)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY,
                news_id INTEGER NOT NULL REFERENCES news(id),
                text TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_comments_news
            ON comments(news_id, created_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Make the stored feed list match `configs`. Feeds no longer configured are removed.
    pub async fn sync_feeds(&self, configs: &[FeedConfig]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        for config in configs {
            sqlx::query(
                r#"
                INSERT INTO feeds (name, url, category)
                VALUES (?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET
                    name = excluded.name,
                    category = excluded.category
                "#,
            )
            .bind(&config.name)
            .bind(&config.url)
            .bind(&config.category)
            .execute(&mut *tx)
            .await?;
        }

        let stored: Vec<(i64, String)> = sqlx::query_as("SELECT id, url FROM feeds")
            .fetch_all(&mut *tx)
            .await?;

        for (id, url) in stored {
            if !configs.iter().any(|config| config.url == url) {
                sqlx::query("DELETE FROM feeds WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_all_feeds(&self) -> anyhow::Result<Vec<Feed>> {
        let feeds = sqlx::query_as::<_, Feed>("SELECT * FROM feeds ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(feeds)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> anyhow::Result<Option<Feed>> {
        let feed = sqlx::query_as::<_, Feed>("SELECT * FROM feeds WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(feed)
    }

    pub async fn update_feed_fetched(
        &self,
        feed_id: i64,
        error: Option<&str>,
        inserted: i64,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE feeds
            SET last_fetched = ?, last_error = ?, last_inserted = ?
            WHERE id = ?
            "#,
        )
        .bind(format_timestamp(Utc::now()))
        .bind(error)
        .bind(inserted)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// True if an item with this link, or a title starting the same way, is stored
    pub async fn is_duplicate(&self, link: &str, title: &str) -> anyhow::Result<bool> {
        let pattern = format!("{}%", escape_like(&title_prefix(title)));

        let found: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM news
            WHERE link = ? OR title LIKE ? ESCAPE '\'
            LIMIT 1
            "#,
        )
        .bind(link)
        .bind(pattern)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.is_some())
    }

    /// Insert a news item unless its link is already stored.
    /// Returns the new id, or `None` for a duplicate link.
    pub async fn insert_news(&self, news: &NewNews) -> anyhow::Result<Option<i64>> {
        self.insert_news_at(news, Utc::now()).await
    }

    pub async fn insert_news_at(
        &self,
        news: &NewNews,
        created_at: DateTime<Utc>,
    ) -> anyhow::Result<Option<i64>> {
        let language = if news.language.is_empty() {
            "te"
        } else {
            news.language.as_str()
        };
        let category = if news.category.is_empty() {
            "general"
        } else {
            news.category.as_str()
        };

        let result = sqlx::query(
            r#"
            INSERT INTO news (
                title, link, raw_summary, summary, image, source, feed_url,
                language, category, hype_score, published, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(link) DO NOTHING
            "#,
        )
        .bind(&news.title)
        .bind(&news.link)
        .bind(&news.raw_summary)
        .bind(&news.summary)
        .bind(&news.image)
        .bind(&news.source)
        .bind(&news.feed_url)
        .bind(language)
        .bind(category)
        .bind(news.hype_score as i64)
        .bind(news.published.map(format_timestamp))
        .bind(format_timestamp(created_at))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        Ok(Some(result.last_insert_rowid()))
    }

    pub async fn list_news(&self, limit: i64) -> anyhow::Result<Vec<NewsItem>> {
        let items = sqlx::query_as::<_, NewsItem>(
            r#"
            SELECT * FROM news
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn get_news(&self, id: i64) -> anyhow::Result<Option<NewsItem>> {
        let item = sqlx::query_as::<_, NewsItem>("SELECT * FROM news WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(item)
    }

    pub async fn count_news(&self) -> anyhow::Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM news")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Bump one reaction counter. Returns the new counts, or `None` if the item is gone.
    pub async fn add_reaction(
        &self,
        id: i64,
        reaction: Reaction,
    ) -> anyhow::Result<Option<ReactionCounts>> {
        let column = reaction.column();
        let result = sqlx::query(&format!(
            "UPDATE news SET {column} = {column} + 1 WHERE id = ?"
        ))
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let counts =
            sqlx::query_as::<_, ReactionCounts>("SELECT likes, dislikes FROM news WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(counts)
    }

    pub async fn list_comments(&self, news_id: i64) -> anyhow::Result<Vec<Comment>> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT * FROM comments
            WHERE news_id = ?
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(news_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(comments)
    }

    /// Store a comment and bump the item's comment count.
    /// Returns `None` when the news item does not exist.
    pub async fn add_comment(&self, news_id: i64, text: &str) -> anyhow::Result<Option<i64>> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE news SET comment_count = comment_count + 1 WHERE id = ?")
            .bind(news_id)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let inserted =
            sqlx::query("INSERT INTO comments (news_id, text, created_at) VALUES (?, ?, ?)")
                .bind(news_id)
                .bind(text)
                .bind(format_timestamp(Utc::now()))
                .execute(&mut *tx)
                .await?;

        tx.commit().await?;
        Ok(Some(inserted.last_insert_rowid()))
    }

    /// Delete news older than `ttl`, and their comments. Returns the number of news removed.
    pub async fn purge_expired(&self, ttl: Duration) -> anyhow::Result<u64> {
        match Utc::now().checked_sub_signed(ttl) {
            Some(cutoff) => self.purge_created_before(cutoff).await,
            // Nothing can be older than the start of representable time
            None => Ok(0),
        }
    }

    pub async fn purge_created_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let cutoff = format_timestamp(cutoff);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            DELETE FROM comments
            WHERE news_id IN (SELECT id FROM news WHERE created_at < ?)
            "#,
        )
        .bind(&cutoff)
        .execute(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM news WHERE created_at < ?")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(deleted.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeedConfig;

    async fn create_test_db() -> Database {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.initialize().await.unwrap();
        db
    }

    fn create_feed_config(name: &str, url: &str) -> FeedConfig {
        FeedConfig {
            name: name.to_string(),
            url: url.to_string(),
            category: "general".to_string(),
        }
    }

    fn create_news(title: &str, link: &str) -> NewNews {
        NewNews {
            title: title.to_string(),
            link: link.to_string(),
            raw_summary: format!("{} raw", title),
            summary: format!("{} summary", title),
            source: "example.com".to_string(),
            feed_url: "https://example.com/rss".to_string(),
            ..Default::default()
        }
    }

    // Database initialization tests
    mod initialization_tests {
        use super::*;

        #[tokio::test]
        async fn test_database_initialization() {
            let db = create_test_db().await;
            assert!(db.get_all_feeds().await.unwrap().is_empty());
            assert_eq!(db.count_news().await.unwrap(), 0);
        }

        #[tokio::test]
        async fn test_double_initialization_is_safe() {
            let db = create_test_db().await;
            assert!(db.initialize().await.is_ok());
        }
    }

    mod sync_feeds_tests {
        use super::*;

        #[tokio::test]
        async fn test_sync_updates_existing_feed() {
            let db = create_test_db().await;

            db.sync_feeds(&[create_feed_config("Original", "https://example.com/rss")])
                .await
                .unwrap();

            let mut updated = create_feed_config("Updated", "https://example.com/rss");
            updated.category = "telangana".to_string();
            db.sync_feeds(&[updated]).await.unwrap();

            let feeds = db.get_all_feeds().await.unwrap();
            assert_eq!(feeds.len(), 1);
            assert_eq!(feeds[0].name, "Updated");
            assert_eq!(feeds[0].category, "telangana");
        }

        #[tokio::test]
        async fn test_sync_removes_unlisted_feeds() {
            let db = create_test_db().await;

            db.sync_feeds(&[create_feed_config("Old", "https://old.example.com/rss")])
                .await
                .unwrap();
            db.sync_feeds(&[create_feed_config("New", "https://new.example.com/rss")])
                .await
                .unwrap();

            let urls: Vec<String> = db
                .get_all_feeds()
                .await
                .unwrap()
                .into_iter()
                .map(|f| f.url)
                .collect();
            assert_eq!(urls, vec!["https://new.example.com/rss"]);
        }

        #[tokio::test]
        async fn test_resync_keeps_fetch_status() {
            let db = create_test_db().await;
            let feed = create_feed_config("A", "https://a.com/rss");

            db.sync_feeds(&[feed.clone()]).await.unwrap();
            let id = db.get_all_feeds().await.unwrap()[0].id;
            db.update_feed_fetched(id, None, 4).await.unwrap();

            db.sync_feeds(&[feed, create_feed_config("B", "https://b.com/rss")])
                .await
                .unwrap();

            let feeds = db.get_all_feeds().await.unwrap();
            assert_eq!(feeds.len(), 2);
            assert_eq!(feeds[0].id, id);
            assert_eq!(feeds[0].last_inserted, 4);
        }

        #[tokio::test]
        async fn test_get_feed_by_url() {
            let db = create_test_db().await;
            db.sync_feeds(&[
                create_feed_config("A", "https://a.com/rss"),
                create_feed_config("B", "https://b.com/rss"),
            ])
            .await
            .unwrap();

            let feed = db.get_feed_by_url("https://b.com/rss").await.unwrap();
            assert_eq!(feed.unwrap().name, "B");
            assert!(db
                .get_feed_by_url("https://c.com/rss")
                .await
                .unwrap()
                .is_none());
        }

        #[tokio::test]
        async fn test_update_feed_fetched_records_and_clears_error() {
            let db = create_test_db().await;
            db.sync_feeds(&[create_feed_config("Test", "https://test.com/rss")])
                .await
                .unwrap();
            let feed_id = db.get_all_feeds().await.unwrap()[0].id;

            db.update_feed_fetched(feed_id, Some("Connection timeout"), 0)
                .await
                .unwrap();
            let feed = db.get_feed_by_url("https://test.com/rss").await.unwrap().unwrap();
            assert!(feed.last_fetched.is_some());
            assert_eq!(feed.last_error.as_deref(), Some("Connection timeout"));

            db.update_feed_fetched(feed_id, None, 3).await.unwrap();
            let feed = db.get_feed_by_url("https://test.com/rss").await.unwrap().unwrap();
            assert!(feed.last_error.is_none());
            assert_eq!(feed.last_inserted, 3);
        }
    }

    mod insert_news_tests {
        use super::*;

        #[tokio::test]
        async fn test_insert_and_get() {
            let db = create_test_db().await;

            let id = db
                .insert_news(&create_news("వార్త", "https://a.com/1"))
                .await
                .unwrap()
                .unwrap();

            let item = db.get_news(id).await.unwrap().unwrap();
            assert_eq!(item.title, "వార్త");
            assert_eq!(item.link, "https://a.com/1");
            assert_eq!(item.language, "te");
            assert_eq!(item.category, "general");
            assert_eq!(item.likes, 0);
            assert_eq!(item.dislikes, 0);
            assert_eq!(item.comment_count, 0);
            assert!(item.published.is_none());
        }

        #[tokio::test]
        async fn test_link_is_never_inserted_twice() {
            let db = create_test_db().await;

            let first = db
                .insert_news(&create_news("First", "https://a.com/1"))
                .await
                .unwrap();
            let second = db
                .insert_news(&create_news("Second", "https://a.com/1"))
                .await
                .unwrap();

            assert!(first.is_some());
            assert!(second.is_none());
            assert_eq!(db.count_news().await.unwrap(), 1);

            let item = db.get_news(first.unwrap()).await.unwrap().unwrap();
            assert_eq!(item.title, "First");
        }

        #[tokio::test]
        async fn test_get_missing_news() {
            let db = create_test_db().await;
            assert!(db.get_news(999).await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_published_is_stored() {
            let db = create_test_db().await;
            let mut news = create_news("Dated", "https://a.com/dated");
            let published = "2024-12-09T12:00:00Z".parse::<DateTime<Utc>>().unwrap();
            news.published = Some(published);

            let id = db.insert_news(&news).await.unwrap().unwrap();
            let item = db.get_news(id).await.unwrap().unwrap();
            assert_eq!(
                item.published.as_deref(),
                Some("2024-12-09T12:00:00.000000Z")
            );
        }
    }

    mod duplicate_tests {
        use super::*;

        #[tokio::test]
        async fn test_duplicate_by_link() {
            let db = create_test_db().await;
            db.insert_news(&create_news("Title", "https://a.com/1"))
                .await
                .unwrap();

            assert!(db.is_duplicate("https://a.com/1", "Other").await.unwrap());
            assert!(!db.is_duplicate("https://a.com/2", "Other").await.unwrap());
        }

        #[tokio::test]
        async fn test_duplicate_by_title_prefix() {
            let db = create_test_db().await;
            let title = format!("{} - Eenadu", "x".repeat(60));
            db.insert_news(&create_news(&title, "https://a.com/1"))
                .await
                .unwrap();

            // Same first 50 characters, different ending and link
            let republished = format!("{} - Sakshi", "x".repeat(60));
            assert!(db
                .is_duplicate("https://b.com/1", &republished)
                .await
                .unwrap());
        }

        #[tokio::test]
        async fn test_title_prefix_match_ignores_ascii_case() {
            let db = create_test_db().await;
            db.insert_news(&create_news("Budget Session Begins", "https://a.com/1"))
                .await
                .unwrap();

            assert!(db
                .is_duplicate("https://b.com/1", "budget session begins")
                .await
                .unwrap());
        }

        #[tokio::test]
        async fn test_like_wildcards_are_literal() {
            let db = create_test_db().await;
            db.insert_news(&create_news("Growth of 5 percent", "https://a.com/1"))
                .await
                .unwrap();

            assert!(!db.is_duplicate("https://b.com/1", "Growth%").await.unwrap());
            assert!(!db.is_duplicate("https://b.com/1", "Gr_wth").await.unwrap());
        }
    }

    mod list_news_tests {
        use super::*;

        #[tokio::test]
        async fn test_newest_first_with_limit() {
            let db = create_test_db().await;
            let now = Utc::now();

            for i in 1..=5 {
                db.insert_news_at(
                    &create_news(&format!("Title {}", i), &format!("https://a.com/{}", i)),
                    now - Duration::minutes(10 - i),
                )
                .await
                .unwrap();
            }

            let items = db.list_news(3).await.unwrap();
            assert_eq!(items.len(), 3);
            assert_eq!(items[0].title, "Title 5");
            assert_eq!(items[2].title, "Title 3");
        }
    }

    mod reaction_tests {
        use super::*;

        #[test]
        fn test_parse_reaction() {
            assert_eq!(Reaction::parse(" Like "), Some(Reaction::Like));
            assert_eq!(Reaction::parse("DISLIKE"), Some(Reaction::Dislike));
            assert_eq!(Reaction::parse("love"), None);
            assert_eq!(Reaction::parse(""), None);
        }

        #[tokio::test]
        async fn test_reaction_increments_exactly_one_counter() {
            let db = create_test_db().await;
            let id = db
                .insert_news(&create_news("T", "https://a.com/1"))
                .await
                .unwrap()
                .unwrap();

            let counts = db.add_reaction(id, Reaction::Like).await.unwrap().unwrap();
            assert_eq!(counts, ReactionCounts { likes: 1, dislikes: 0 });

            let counts = db
                .add_reaction(id, Reaction::Dislike)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(counts, ReactionCounts { likes: 1, dislikes: 1 });

            let counts = db.add_reaction(id, Reaction::Like).await.unwrap().unwrap();
            assert_eq!(counts, ReactionCounts { likes: 2, dislikes: 1 });
        }

        #[tokio::test]
        async fn test_reaction_on_missing_news() {
            let db = create_test_db().await;
            assert!(db
                .add_reaction(42, Reaction::Like)
                .await
                .unwrap()
                .is_none());
        }
    }

    mod comment_tests {
        use super::*;

        #[tokio::test]
        async fn test_add_and_list_comments() {
            let db = create_test_db().await;
            let id = db
                .insert_news(&create_news("T", "https://a.com/1"))
                .await
                .unwrap()
                .unwrap();

            let first = db.add_comment(id, "మొదటి").await.unwrap().unwrap();
            let second = db.add_comment(id, "రెండవ").await.unwrap().unwrap();
            assert_ne!(first, second);

            let comments = db.list_comments(id).await.unwrap();
            assert_eq!(comments.len(), 2);
            // Newest first
            assert_eq!(comments[0].text, "రెండవ");
            assert_eq!(comments[1].text, "మొదటి");

            let item = db.get_news(id).await.unwrap().unwrap();
            assert_eq!(item.comment_count, 2);
        }

        #[tokio::test]
        async fn test_comment_on_missing_news() {
            let db = create_test_db().await;
            assert!(db.add_comment(7, "hello").await.unwrap().is_none());
            assert!(db.list_comments(7).await.unwrap().is_empty());
        }
    }

    mod expiry_tests {
        use super::*;

        #[tokio::test]
        async fn test_purge_removes_only_expired_items() {
            let db = create_test_db().await;
            let now = Utc::now();

            let old = db
                .insert_news_at(&create_news("Old", "https://a.com/old"), now - Duration::hours(30))
                .await
                .unwrap()
                .unwrap();
            let fresh = db
                .insert_news_at(&create_news("Fresh", "https://a.com/new"), now - Duration::hours(1))
                .await
                .unwrap()
                .unwrap();

            db.add_comment(old, "old comment").await.unwrap();
            db.add_comment(fresh, "fresh comment").await.unwrap();

            let purged = db.purge_expired(Duration::hours(24)).await.unwrap();
            assert_eq!(purged, 1);

            assert!(db.get_news(old).await.unwrap().is_none());
            assert!(db.get_news(fresh).await.unwrap().is_some());
            assert!(db.list_comments(old).await.unwrap().is_empty());
            assert_eq!(db.list_comments(fresh).await.unwrap().len(), 1);
        }

        #[tokio::test]
        async fn test_purged_link_can_be_ingested_again() {
            let db = create_test_db().await;
            let now = Utc::now();

            db.insert_news_at(&create_news("Old", "https://a.com/1"), now - Duration::hours(50))
                .await
                .unwrap();
            db.purge_expired(Duration::hours(48)).await.unwrap();

            let again = db
                .insert_news(&create_news("Old", "https://a.com/1"))
                .await
                .unwrap();
            assert!(again.is_some());
        }

        #[tokio::test]
        async fn test_purge_nothing_expired() {
            let db = create_test_db().await;
            db.insert_news(&create_news("Fresh", "https://a.com/1"))
                .await
                .unwrap();

            assert_eq!(db.purge_expired(Duration::hours(12)).await.unwrap(), 0);
            assert_eq!(db.count_news().await.unwrap(), 1);
        }

        #[tokio::test]
        async fn test_huge_ttl_keeps_everything() {
            let db = create_test_db().await;
            db.insert_news_at(
                &create_news("Ancient", "https://a.com/1"),
                Utc::now() - Duration::days(3650),
            )
            .await
            .unwrap();

            assert_eq!(db.purge_expired(Duration::days(100_000_000)).await.unwrap(), 0);
            assert_eq!(db.count_news().await.unwrap(), 1);
        }
    }

    #[test]
    fn test_format_timestamp_is_fixed_width() {
        let a = format_timestamp("2024-01-01T00:00:00Z".parse().unwrap());
        let b = format_timestamp("2024-01-01T00:00:00.5Z".parse().unwrap());
        assert_eq!(a, "2024-01-01T00:00:00.000000Z");
        assert_eq!(a.len(), b.len());
        assert!(a < b);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like(r"50%_off\"), r"50\%\_off\\");
    }
}
