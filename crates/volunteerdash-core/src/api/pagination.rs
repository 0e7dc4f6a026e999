//! Cursor pagination over `since_id`.
//!
//! Galaxy list endpoints return at most `per_page` records after the record
//! whose id is `since_id`. A page shorter than the page size is the last one.

use anyhow::Result;
use serde_json::Value;
use tracing::{debug, warn};

/// Records requested per page.
pub const PAGE_SIZE: usize = 150;

/// Caps for a bounded fetch, used to smoke-test against a live account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimit {
    pub max_records: usize,
    pub max_pages: usize,
}

impl FetchLimit {
    pub fn records(max_records: usize) -> Self {
        Self {
            max_records,
            max_pages: max_records.div_ceil(PAGE_SIZE).max(1),
        }
    }
}

/// Result of walking the pages of an endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collected {
    pub records: Vec<Value>,
    /// False when a limit cut the walk short or the cursor could not advance.
    pub complete: bool,
}

/// One page of an endpoint, after the given cursor.
pub(crate) trait PageSource {
    async fn fetch_page(&mut self, since_id: Option<&Value>) -> Result<Vec<Value>>;
}

pub(crate) async fn collect_pages<S: PageSource>(
    source: &mut S,
    page_size: usize,
    limit: Option<FetchLimit>,
) -> Result<Collected> {
    let page_size = page_size.max(1);
    let mut records: Vec<Value> = Vec::new();
    let mut since_id: Option<Value> = None;
    let mut pages = 0usize;

    loop {
        let page = source.fetch_page(since_id.as_ref()).await?;
        pages += 1;
        let count = page.len();
        let next_cursor = page.last().and_then(|r| r.get("id")).cloned();
        records.extend(page);
        debug!(page = pages, count, total = records.len(), "Fetched page");

        if count < page_size {
            return Ok(Collected {
                records,
                complete: true,
            });
        }

        if let Some(limit) = limit {
            if records.len() >= limit.max_records || pages >= limit.max_pages {
                records.truncate(limit.max_records);
                debug!(total = records.len(), pages, "Fetch limit reached");
                return Ok(Collected {
                    records,
                    complete: false,
                });
            }
        }

        match next_cursor {
            Some(cursor) if Some(&cursor) != since_id.as_ref() => since_id = Some(cursor),
            _ => {
                warn!(total = records.len(), "Pagination cursor did not advance, stopping");
                return Ok(Collected {
                    records,
                    complete: false,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Serves `total` records with ids 1..=total, honouring `since_id`.
    struct FakeSource {
        total: usize,
        page_size: usize,
        requests: Vec<Option<Value>>,
    }

    impl FakeSource {
        fn new(total: usize, page_size: usize) -> Self {
            Self {
                total,
                page_size,
                requests: Vec::new(),
            }
        }
    }

    impl PageSource for FakeSource {
        async fn fetch_page(&mut self, since_id: Option<&Value>) -> Result<Vec<Value>> {
            self.requests.push(since_id.cloned());
            let after = since_id.and_then(Value::as_u64).unwrap_or(0) as usize;
            Ok((after + 1..=self.total)
                .take(self.page_size)
                .map(|id| json!({"id": id}))
                .collect())
        }
    }

    fn ids(records: &[Value]) -> Vec<u64> {
        records.iter().filter_map(|r| r["id"].as_u64()).collect()
    }

    async fn walk(total: usize, page_size: usize) -> (Collected, usize) {
        let mut source = FakeSource::new(total, page_size);
        let collected = collect_pages(&mut source, page_size, None).await.unwrap();
        (collected, source.requests.len())
    }

    #[tokio::test]
    async fn test_empty_endpoint() {
        let (collected, requests) = walk(0, 150).await;
        assert!(collected.records.is_empty());
        assert!(collected.complete);
        assert_eq!(requests, 1);
    }

    #[tokio::test]
    async fn test_single_short_page() {
        let (collected, requests) = walk(40, 150).await;
        assert_eq!(ids(&collected.records), (1..=40).collect::<Vec<_>>());
        assert_eq!(requests, 1);
    }

    #[tokio::test]
    async fn test_exact_page_needs_empty_follow_up() {
        let (collected, requests) = walk(150, 150).await;
        assert_eq!(collected.records.len(), 150);
        assert!(collected.complete);
        assert_eq!(requests, 2);
    }

    #[tokio::test]
    async fn test_multiple_pages_without_duplicates() {
        let (collected, requests) = walk(303, 150).await;
        assert_eq!(ids(&collected.records), (1..=303).collect::<Vec<_>>());
        assert_eq!(requests, 3);
    }

    #[tokio::test]
    async fn test_cursor_is_last_id() {
        let mut source = FakeSource::new(5, 2);
        collect_pages(&mut source, 2, None).await.unwrap();
        assert_eq!(source.requests, vec![None, Some(json!(2)), Some(json!(4))]);
    }

    #[tokio::test]
    async fn test_limit_truncates() {
        let mut source = FakeSource::new(500, 150);
        let collected = collect_pages(&mut source, 150, Some(FetchLimit::records(10)))
            .await
            .unwrap();
        assert_eq!(collected.records.len(), 10);
        assert!(!collected.complete);
        assert_eq!(source.requests.len(), 1);
    }

    #[tokio::test]
    async fn test_limit_on_small_dataset_is_complete() {
        let mut source = FakeSource::new(7, 150);
        let collected = collect_pages(&mut source, 150, Some(FetchLimit::records(10)))
            .await
            .unwrap();
        assert_eq!(collected.records.len(), 7);
        assert!(collected.complete);
    }

    #[tokio::test]
    async fn test_page_limit() {
        let mut source = FakeSource::new(100, 10);
        let limit = FetchLimit {
            max_records: 1000,
            max_pages: 3,
        };
        let collected = collect_pages(&mut source, 10, Some(limit)).await.unwrap();
        assert_eq!(collected.records.len(), 30);
        assert!(!collected.complete);
    }

    struct StuckSource;

    impl PageSource for StuckSource {
        async fn fetch_page(&mut self, _since_id: Option<&Value>) -> Result<Vec<Value>> {
            Ok(vec![json!({"id": 1}), json!({"id": 1})])
        }
    }

    #[tokio::test]
    async fn test_stuck_cursor_stops() {
        let collected = collect_pages(&mut StuckSource, 2, None).await.unwrap();
        assert_eq!(collected.records.len(), 4);
        assert!(!collected.complete);
    }

    #[test]
    fn test_fetch_limit_pages() {
        assert_eq!(FetchLimit::records(10).max_pages, 1);
        assert_eq!(FetchLimit::records(300).max_pages, 2);
        assert_eq!(FetchLimit::records(0).max_pages, 1);
    }
}
