//! The storage client: the only path from the engine to the backend.

use bson::Document;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::{
    backend::{ItemKey, StoreBackend},
    document::MODEL,
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Thin wrapper over a [`StoreBackend`] bound to one table.
///
/// Backend errors are returned unchanged and nothing is retried. Scans are drained
/// page by page before anything is returned, so callers never observe a partial scan.
#[derive(Debug, Clone)]
pub struct StorageClient {
    backend: Arc<dyn StoreBackend>,
    table: String,
    page_size: Option<usize>,
}

impl StorageClient {
    /// Binds `backend` to `table`. `page_size` is passed to every scan call.
    pub fn new(backend: Arc<dyn StoreBackend>, table: impl Into<String>, page_size: Option<usize>) -> Self {
        Self {
            backend,
            table: table.into(),
            page_size,
        }
    }

    /// The table every call addresses.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Reads one item, or `None` if nothing is stored under `key`.
    pub async fn get_by_key(&self, key: &ItemKey) -> DocumentStoreResult<Option<Document>> {
        debug!(table = %self.table, key = %key.primary_key, "get item");
        self.backend.get_item(&self.table, key).await
    }

    /// Writes an item. The item must carry its key fields.
    pub async fn put(&self, item: Document) -> DocumentStoreResult<()> {
        let key = ItemKey::from_item(&item)?;
        debug!(table = %self.table, key = %key.primary_key, "put item");
        self.backend.put_item(&self.table, item).await
    }

    /// Removes the item stored under `key`, if any.
    pub async fn delete(&self, key: &ItemKey) -> DocumentStoreResult<()> {
        debug!(table = %self.table, key = %key.primary_key, "delete item");
        self.backend.delete_item(&self.table, key).await
    }

    /// Scans the whole table, keeping only items whose `model` field equals `model`
    /// when one is given.
    ///
    /// # Errors
    ///
    /// Propagates backend errors, and fails with [`DocumentStoreError::Backend`] if the
    /// backend hands back a continuation token that does not move the scan forward.
    pub async fn scan_all(&self, model: Option<&str>) -> DocumentStoreResult<Vec<Document>> {
        let mut items = Vec::new();
        let mut start_after: Option<ItemKey> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .backend
                .scan(&self.table, start_after.clone(), self.page_size)
                .await?;
            pages += 1;
            trace!(table = %self.table, page = pages, items = page.items.len(), "scanned page");

            items.extend(page.items.into_iter().filter(|item| match model {
                Some(model) => item.get(MODEL).and_then(|value| value.as_str()) == Some(model),
                None => true,
            }));

            match page.next {
                Some(next) if start_after.as_ref() == Some(&next) => {
                    return Err(DocumentStoreError::Backend(format!(
                        "scan of table {} did not advance past {}",
                        self.table, next.primary_key
                    )));
                }
                Some(next) => start_after = Some(next),
                None => break,
            }
        }

        debug!(table = %self.table, model = ?model, pages, items = items.len(), "scan complete");
        Ok(items)
    }
}
