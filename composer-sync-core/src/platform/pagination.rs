//! Offset pagination over platform listings
//!
//! The first page tells how many items match the query. If it does not hold
//! all of them, the remaining pages are requested in parallel and appended in
//! page order.

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::debug;

use super::PlatformResult;

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Total number of matching items, if the platform reported it
    pub total: Option<usize>,
}

/// Something that can serve one page of a listing
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    /// Fetches `limit` items starting at `offset`
    ///
    /// # Errors
    ///
    /// Returns the platform error of the failed request.
    async fn fetch_page(&self, offset: usize, limit: usize) -> PlatformResult<Page<T>>;
}

/// Number of follow-up requests needed after the first page
#[must_use]
pub fn remaining_pages(first_page_len: usize, total: usize, limit: usize) -> usize {
    if limit == 0 || first_page_len >= total {
        return 0;
    }
    total.div_ceil(limit) - 1
}

/// Fetches every item of a listing
///
/// # Errors
///
/// Returns the error of the first page, or of the first follow-up page that
/// fails; partial results are discarded.
pub async fn fetch_all<T, S>(source: &S, limit: usize) -> PlatformResult<Vec<T>>
where
    T: Send,
    S: PageSource<T> + ?Sized,
{
    let first = source.fetch_page(0, limit).await?;
    let total = first.total.unwrap_or(first.items.len());
    let follow_ups = remaining_pages(first.items.len(), total, limit);
    if follow_ups == 0 {
        return Ok(first.items);
    }

    debug!(total, follow_ups, "Fetching remaining pages");
    let pages = try_join_all((1..=follow_ups).map(|page| source.fetch_page(page * limit, limit)))
        .await?;

    let mut items = first.items;
    items.reserve(total.saturating_sub(items.len()));
    for page in pages {
        items.extend(page.items);
    }
    Ok(items)
}
