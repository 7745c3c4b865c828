//! 📄 ResultPager: reads a finished job's results without swallowing them in one gulp.
//!
//! Page size 0, or fewer results than a page? One fetch, done.
//! Otherwise: fixed-size pages, offset marching forward by the page size until it reaches
//! the total. Pages are concatenated in the order they arrive. Nobody skips the line. 🦆

use anyhow::{Context, Result};
use tracing::{debug, trace};

use super::SearchJob;
use crate::event::EventRecord;

#[derive(Debug, Clone, Copy)]
pub struct ResultPager {
    page_size: u64,
}

impl ResultPager {
    pub fn new(page_size: u64) -> Self {
        Self { page_size }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// 📦 Fetches every result of `job` and turns each row into an `EventRecord`.
    pub async fn collect(&self, job: &dyn SearchJob) -> Result<Vec<EventRecord>> {
        let total = job
            .result_count()
            .await
            .with_context(|| format!("💀 Could not ask job '{}' how many results it has", job.sid()))?;
        debug!("📄 job '{}' finished with {} results, page size {}", job.sid(), total, self.page_size);

        if self.page_size == 0 || total < self.page_size {
            // -- small enough to carry in one trip
            let rows = job
                .results(0, self.page_size)
                .await
                .with_context(|| format!("💀 Fetching results of job '{}' failed", job.sid()))?;
            return Ok(rows.into_iter().map(EventRecord::from_pairs).collect());
        }

        let mut events = Vec::with_capacity(usize::try_from(total).unwrap_or_default());
        let mut offset = 0;
        while offset < total {
            trace!("📄 fetching page at offset {offset} of job '{}'", job.sid());
            let rows = job.results(offset, self.page_size).await.with_context(|| {
                format!(
                    "💀 Fetching results page at offset {offset} of job '{}' failed",
                    job.sid()
                )
            })?;
            events.extend(rows.into_iter().map(EventRecord::from_pairs));
            offset += self.page_size;
        }
        Ok(events)
    }
}
