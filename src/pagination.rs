use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{PAGE_SIZE, PAGINATION_SKIP_CEILING};
use crate::error::ExtractError;
use crate::transport::{list_items, Transport};

/// Page size and runaway ceiling for one paged sequence.
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub page_size: usize,
    /// Stop once accumulated skip reaches this, even if pages stay full.
    pub skip_ceiling: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            skip_ceiling: PAGINATION_SKIP_CEILING,
        }
    }
}

/// Fetch every item of a `$top`/`$skip` paged collection, in response order.
///
/// Pages are requested one after another since each offset depends on the
/// count already received. A page shorter than `page_size` ends the
/// sequence. Items are never deduplicated.
pub async fn fetch_all<T: Transport + ?Sized>(
    transport: &T,
    path: &str,
    base_params: &[(String, String)],
    limits: PageLimits,
    cancel: &CancellationToken,
) -> Result<Vec<Value>, ExtractError> {
    let page_size = limits.page_size.max(1);
    let mut items = Vec::new();
    let mut skip = 0usize;
    let mut pages = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let mut query: Vec<(String, String)> = base_params
            .iter()
            .filter(|(k, _)| k != "$top" && k != "$skip")
            .cloned()
            .collect();
        query.push(("$top".to_string(), page_size.to_string()));
        query.push(("$skip".to_string(), skip.to_string()));

        let page = list_items(transport.get(path, &query).await?)?;
        let received = page.len();
        pages += 1;
        debug!(
            "Fetched page {} of {} (skip={}, items={})",
            pages, path, skip, received
        );

        items.extend(page);

        if received < page_size {
            break;
        }

        skip += received;
        if skip >= limits.skip_ceiling {
            warn!(
                "Pagination of {} stopped at safety ceiling after {} pages ({} items)",
                path,
                pages,
                items.len()
            );
            break;
        }
    }

    Ok(items)
}
