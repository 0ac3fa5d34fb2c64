//! Paginated line fetching with bounded retries
//!
//! Pages are pulled one at a time through the `next` links returned by the
//! lines API. Each page fetch gets a fixed number of attempts; exhausting
//! them is fatal for the run, because a gap in the middle of an export would
//! silently truncate every output file.

use std::time::Duration;

use futures::Stream;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::types::Page;
use crate::api::DatasetClient;
use crate::error::{ExportError, Result};

/// Lines requested per page
pub const PAGE_SIZE: usize = 10_000;
/// Attempts per page before the run is aborted
pub const FETCH_ATTEMPTS: u32 = 3;

const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Cursor over the dataset's lines, one page at a time
pub struct PageStream {
    client: DatasetClient,
    next_url: Option<String>,
    cancel: CancellationToken,
    fetched: u64,
    total: Option<u64>,
}

impl PageStream {
    pub fn new(client: DatasetClient, first_url: String, cancel: CancellationToken) -> Self {
        Self {
            client,
            next_url: Some(first_url),
            cancel,
            fetched: 0,
            total: None,
        }
    }

    /// Lines fetched so far and the server-reported total, when known
    pub fn progress(&self) -> (u64, Option<u64>) {
        (self.fetched, self.total)
    }

    /// Fetch the next page, or `None` once the cursor is exhausted
    ///
    /// Cancellation is checked before each fetch and ends the stream
    /// cleanly; whether the run was cancelled is read off the token by the
    /// caller, not off this return value.
    pub async fn next_page(&mut self) -> Result<Option<Page>> {
        let Some(url) = self.next_url.take() else {
            return Ok(None);
        };
        if self.cancel.is_cancelled() {
            debug!("cancellation requested, stopping pagination");
            return Ok(None);
        }

        // A fetch error leaves next_url unset, so the stream stays finished.
        let page = self.fetch_with_retry(&url).await?;

        self.fetched += page.results.len() as u64;
        if let Some(total) = page.total {
            self.total = Some(total);
        }

        let exhausted = page.results.is_empty()
            || page.next.is_none()
            || self.total.is_some_and(|total| self.fetched >= total);
        if !exhausted {
            self.next_url = page.next.clone();
        }

        if page.results.is_empty() {
            return Ok(None);
        }
        Ok(Some(page))
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<Page> {
        let mut last_error: Option<ExportError> = None;
        for attempt in 1..=FETCH_ATTEMPTS {
            match self.client.fetch_page(url).await {
                Ok(page) => return Ok(page),
                Err(err) => {
                    warn!(
                        url,
                        attempt,
                        max_attempts = FETCH_ATTEMPTS,
                        error = %err,
                        "page fetch failed"
                    );
                    last_error = Some(err);
                    if attempt < FETCH_ATTEMPTS {
                        sleep(RETRY_DELAY).await;
                    }
                },
            }
        }
        match last_error {
            Some(source) => Err(ExportError::retries_exhausted(url, FETCH_ATTEMPTS, source)),
            None => Err(ExportError::api(format!(
                "page fetch for {url} failed without a recorded error"
            ))),
        }
    }

    /// Adapt the cursor into a `Stream` of pages
    pub fn into_stream(self) -> impl Stream<Item = Result<Page>> {
        futures::stream::unfold(self, |mut pages| async move {
            match pages.next_page().await {
                Ok(Some(page)) => Some((Ok(page), pages)),
                Ok(None) => None,
                Err(err) => Some((Err(err), pages)),
            }
        })
    }
}
