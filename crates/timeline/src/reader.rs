//! Read-side seam between the sync engine and the activity store.

use async_trait::async_trait;
use chrono::NaiveDate;
use daylog_core::{Activity, DayBucket};
use daylog_local_db::LocalDb;
use std::sync::Arc;

use crate::error::ReadError;

/// One paginated read. `offset` and `limit` count activity rows in timeline
/// order (newest first); the dates bound the page to an inclusive local-date
/// range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
}

impl PageRequest {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit,
            ..Self::default()
        }
    }
}

/// Query interface the orchestrator fetches through.
#[async_trait]
pub trait LogReader: Send + Sync {
    async fn fetch_page(&self, request: PageRequest) -> Result<Vec<DayBucket>, ReadError>;

    /// Activities persisted after `since_version`, ascending by version.
    async fn fetch_increment(
        &self,
        since_version: u64,
        limit: usize,
    ) -> Result<Vec<Activity>, ReadError>;

    async fn fetch_detail(&self, activity_id: &str) -> Result<Option<Activity>, ReadError>;
}

/// [`LogReader`] over the SQLite store. Queries run on the blocking pool.
#[derive(Clone)]
pub struct LocalDbReader {
    db: Arc<LocalDb>,
}

impl LocalDbReader {
    pub fn new(db: Arc<LocalDb>) -> Self {
        Self { db }
    }

    async fn run<T, F>(&self, query: F) -> Result<T, ReadError>
    where
        T: Send + 'static,
        F: FnOnce(&LocalDb) -> anyhow::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let result = tokio::task::spawn_blocking(move || query(&db)).await?;
        Ok(result?)
    }
}

#[async_trait]
impl LogReader for LocalDbReader {
    async fn fetch_page(&self, request: PageRequest) -> Result<Vec<DayBucket>, ReadError> {
        self.run(move |db| {
            db.fetch_page(
                request.offset,
                request.limit,
                request.date_start,
                request.date_end,
            )
        })
        .await
    }

    async fn fetch_increment(
        &self,
        since_version: u64,
        limit: usize,
    ) -> Result<Vec<Activity>, ReadError> {
        self.run(move |db| db.fetch_increment(since_version, limit))
            .await
    }

    async fn fetch_detail(&self, activity_id: &str) -> Result<Option<Activity>, ReadError> {
        let id = activity_id.to_string();
        self.run(move |db| db.fetch_detail(&id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daylog_core::testing::{instant, utc_zone};
    use daylog_local_db::NewActivity;

    fn seeded_reader() -> LocalDbReader {
        let db = LocalDb::open_in_memory().unwrap().with_zone(utc_zone());
        for (title, start) in [
            ("standup", "2024-06-01T09:00:00Z"),
            ("review", "2024-06-01T14:00:00Z"),
            ("deploy", "2024-06-02T10:00:00Z"),
        ] {
            db.record_activity(NewActivity {
                id: Some(title.to_string()),
                title: title.to_string(),
                description: None,
                start_time: instant(start),
                end_time: instant(start) + chrono::Duration::minutes(30),
                events: Vec::new(),
            })
            .unwrap();
        }
        LocalDbReader::new(Arc::new(db))
    }

    #[tokio::test]
    async fn pages_are_grouped_newest_day_first() {
        let reader = seeded_reader();
        let page = reader.fetch_page(PageRequest::new(0, 10)).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].date_key(), "2024-06-02");
        assert_eq!(page[1].activities[0].id, "review");
    }

    #[tokio::test]
    async fn increments_follow_version_order() {
        let reader = seeded_reader();
        let rows = reader.fetch_increment(1, 10).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["review", "deploy"]);
    }

    #[tokio::test]
    async fn missing_detail_is_none() {
        let reader = seeded_reader();
        assert!(reader.fetch_detail("nope").await.unwrap().is_none());
        assert!(reader.fetch_detail("deploy").await.unwrap().is_some());
    }
}
