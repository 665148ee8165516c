//! Cursor-based retrieval of the `/messages` listing.
//!
//! A one-row call `(1, 1)` learns the total; pages of `page_size` are then
//! requested from offset 1 until the total is covered. The assembled
//! collection holds exactly `total` records in page order, or the fetch
//! fails as a whole.

use crate::config::toml_config::MAX_PAGE_SIZE;
use crate::domain::model::{MessagePage, Record};
use crate::domain::ports::MessageSource;
use crate::utils::error::{HarvestError, Result};
use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;

/// One planned request: 1-based offset and row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub start_offset: u64,
    pub page_size: u64,
}

/// Largest `total` accepted from the remote before any page is planned.
pub const MAX_REMOTE_TOTAL: u64 = 10_000_000;

const PREALLOCATED_RECORDS: u64 = 100_000;

/// Pages covering `1..=total`, generated lazily; the last page is shortened to fit.
pub fn plan_pages(total: u64, page_size: u64) -> impl Iterator<Item = PageRequest> {
    let page_size = page_size.max(1);
    // index * page_size < total, so start_offset never exceeds total
    (0..total.div_ceil(page_size)).map(move |index| {
        let start_offset = index * page_size + 1;
        PageRequest {
            start_offset,
            page_size: page_size.min(total - (start_offset - 1)),
        }
    })
}

pub struct PaginatedFetcher<S: MessageSource> {
    source: S,
    concurrency: usize,
    identity_field: Option<String>,
    delimiter: String,
}

impl<S: MessageSource> PaginatedFetcher<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            concurrency: 1,
            identity_field: None,
            delimiter: ".".to_string(),
        }
    }

    /// Pages in flight at once; results are still assembled in page order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Path (split on `delimiter`) whose value must be unique across pages.
    pub fn with_identity_field(mut self, field: Option<String>, delimiter: &str) -> Self {
        self.identity_field = field;
        self.delimiter = delimiter.to_string();
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn fetch_all(&self, page_size: u64) -> Result<Vec<Record>> {
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(HarvestError::precondition(format!(
                "page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, page_size
            )));
        }

        let total_known = self.source.fetch_page(1, 1).await?.total;
        tracing::info!("📋 Remote reports {} messages", total_known);

        if total_known == 0 {
            return Ok(Vec::new());
        }
        if total_known > MAX_REMOTE_TOTAL {
            let message = format!(
                "reported total {} exceeds the supported maximum of {}",
                total_known, MAX_REMOTE_TOTAL
            );
            tracing::error!("❌ {}", message);
            return Err(HarvestError::invalid_response("/messages", message));
        }

        tracing::info!(
            "📥 Fetching {} page(s) of up to {} messages",
            total_known.div_ceil(page_size),
            page_size
        );

        let source = &self.source;
        let requests = plan_pages(total_known, page_size).map(|request| async move {
            let page = source
                .fetch_page(request.start_offset, request.page_size)
                .await;
            (request, page)
        });
        let mut pages = stream::iter(requests).buffered(self.concurrency);

        let capacity = usize::try_from(total_known.min(PREALLOCATED_RECORDS)).unwrap_or(0);
        let mut records = Vec::with_capacity(capacity);
        while let Some((request, page)) = pages.next().await {
            let page = page?;
            check_page(&request, &page, total_known)?;
            tracing::debug!(
                "Page at {} returned {} messages",
                request.start_offset,
                page.messages.len()
            );
            records.extend(page.messages);
        }

        if let Some(field) = &self.identity_field {
            check_unique_identity(&records, field, &self.delimiter)?;
        }

        tracing::info!("✅ Fetched {} messages", records.len());
        Ok(records)
    }
}

fn check_page(request: &PageRequest, page: &MessagePage, total_known: u64) -> Result<()> {
    if page.total != total_known {
        let message = format!(
            "total changed from {} to {} while fetching offset {}",
            total_known, page.total, request.start_offset
        );
        tracing::error!("❌ {}", message);
        return Err(HarvestError::RemoteCountDrift { message });
    }

    let received = page.messages.len() as u64;
    if received != request.page_size {
        let message = format!(
            "requested {} messages at offset {} of {}, received {}",
            request.page_size, request.start_offset, total_known, received
        );
        tracing::error!("❌ {}", message);
        return Err(HarvestError::RemoteCountDrift { message });
    }

    Ok(())
}

/// Looks up a nested value by a delimiter-joined path.
pub fn lookup_path<'a>(
    record: &'a Record,
    path: &str,
    delimiter: &str,
) -> Option<&'a serde_json::Value> {
    let mut segments = path.split(delimiter);
    let mut current = record.data.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn check_unique_identity(records: &[Record], field: &str, delimiter: &str) -> Result<()> {
    let mut seen = HashSet::new();
    let mut missing = 0usize;

    for (index, record) in records.iter().enumerate() {
        match lookup_path(record, field, delimiter) {
            Some(value) if !value.is_null() => {
                let key = value.to_string();
                if !seen.insert(key.clone()) {
                    let message = format!(
                        "duplicate {} {} at position {} of {}",
                        field,
                        key,
                        index + 1,
                        records.len()
                    );
                    tracing::error!("❌ {}", message);
                    return Err(HarvestError::RemoteCountDrift { message });
                }
            }
            _ => missing += 1,
        }
    }

    if missing > 0 {
        tracing::warn!("⚠️ {} message(s) have no {}", missing, field);
    }
    Ok(())
}
