//! Property-based tests for offset pagination

use std::sync::Mutex;

use async_trait::async_trait;
use composer_sync_core::PlatformResult;
use composer_sync_core::platform::pagination::{Page, PageSource, fetch_all, remaining_pages};
use composer_sync_core::platform::PlatformError;
use proptest::prelude::*;

use super::runtime;

/// Listing of `0..total` that records requested offsets
struct CountingSource {
    total: usize,
    fail_at: Option<usize>,
    offsets: Mutex<Vec<usize>>,
}

impl CountingSource {
    fn new(total: usize) -> Self {
        Self {
            total,
            fail_at: None,
            offsets: Mutex::new(Vec::new()),
        }
    }

    fn offsets(&self) -> Vec<usize> {
        let mut offsets = self.offsets.lock().unwrap().clone();
        offsets.sort_unstable();
        offsets
    }
}

#[async_trait]
impl PageSource<usize> for CountingSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> PlatformResult<Page<usize>> {
        self.offsets.lock().unwrap().push(offset);
        if self.fail_at == Some(offset) {
            return Err(PlatformError::Status {
                status: 500,
                message: format!("page at {offset} failed"),
            });
        }
        let end = (offset + limit).min(self.total);
        Ok(Page {
            items: (offset.min(end)..end).collect(),
            total: Some(self.total),
        })
    }
}

#[test]
fn two_hundred_fifty_items_take_three_requests() {
    let source = CountingSource::new(250);
    let items = runtime().block_on(fetch_all(&source, 100)).unwrap();
    assert_eq!(items, (0..250).collect::<Vec<_>>());
    assert_eq!(source.offsets(), vec![0, 100, 200]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Every item arrives once, in listing order
    #[test]
    fn fetch_all_concatenates_in_page_order(total in 0usize..1000, limit in 1usize..150) {
        let source = CountingSource::new(total);
        let items = runtime().block_on(fetch_all(&source, limit)).unwrap();
        prop_assert_eq!(items, (0..total).collect::<Vec<_>>());
    }

    /// One request per page, never fewer than one
    #[test]
    fn request_count_matches_page_count(total in 0usize..1000, limit in 1usize..150) {
        let source = CountingSource::new(total);
        runtime().block_on(fetch_all(&source, limit)).unwrap();
        let expected: Vec<usize> = (0..total.div_ceil(limit).max(1)).map(|page| page * limit).collect();
        prop_assert_eq!(source.offsets(), expected);
        prop_assert_eq!(remaining_pages(limit.min(total), total, limit), total.div_ceil(limit).max(1) - 1);
    }

    /// A failing follow-up page fails the whole listing
    #[test]
    fn failing_page_fails_listing(pages in 2usize..8, failing in 1usize..8) {
        let limit = 10;
        let failing = failing % pages;
        let mut source = CountingSource::new(pages * limit);
        source.fail_at = Some(failing * limit);
        let result = runtime().block_on(fetch_all(&source, limit));
        prop_assert!(result.is_err());
    }
}
