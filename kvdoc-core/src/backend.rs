//! Key-value backend abstraction for the document store.
//!
//! The engine only relies on four primitives: point get, put and delete addressed by an
//! [`ItemKey`], and a paginated scan over a whole table. Everything richer (filtering,
//! sorting, joins, updates, aggregation) is emulated on top of these in memory.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The primitive operations a backend must provide
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use kvdoc::backend::{ItemKey, StoreBackend};
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//! let key = ItemKey::for_document("User", "42");
//!
//! backend.put_item("documents", doc! {
//!     "primaryKey": &key.primary_key,
//!     "sortKey": &key.sort_key,
//!     "model": "User",
//!     "id": "42",
//! }).await?;
//! let item = backend.get_item("documents", &key).await?;
//! ```

use async_trait::async_trait;
use bson::Document;
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, sync::Arc};

use crate::{
    document::{PRIMARY_KEY, SORT_KEY},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// The composite key every stored item is addressed by.
///
/// Both halves are derived from the owning model and the document id as
/// `"{model}#{id}"`; there is no other addressing scheme and no secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    /// The partition key of the item.
    pub primary_key: String,
    /// The sort key of the item.
    pub sort_key: String,
}

impl ItemKey {
    /// Creates a key from its raw parts.
    pub fn new(primary_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            primary_key: primary_key.into(),
            sort_key: sort_key.into(),
        }
    }

    /// Derives the key of the document `id` belonging to `model`.
    pub fn for_document(model: &str, id: &str) -> Self {
        let key = format!("{model}#{id}");

        Self {
            primary_key: key.clone(),
            sort_key: key,
        }
    }

    /// Reads the key fields out of a stored item.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::InvalidDocument`] if either key field is missing
    /// or is not a string.
    pub fn from_item(item: &Document) -> DocumentStoreResult<Self> {
        let field = |name: &str| {
            item.get(name)
                .and_then(|value| value.as_str())
                .map(str::to_string)
                .ok_or_else(|| DocumentStoreError::InvalidDocument(
                    format!("item is missing string field {name}")
                ))
        };

        Ok(Self {
            primary_key: field(PRIMARY_KEY)?,
            sort_key: field(SORT_KEY)?,
        })
    }
}

/// One page of a table scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPage {
    /// The items on this page, in backend order.
    pub items: Vec<Document>,
    /// Where the next page starts, or `None` if the scan is exhausted.
    pub next: Option<ItemKey>,
}

/// Abstract interface for primitive key-value storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks. The engine never locks across calls, so a backend only needs each
/// individual call to be atomic.
///
/// # Error Handling
///
/// Backend failures should be reported as [`DocumentStoreError::Backend`]. The engine
/// propagates them unchanged and never retries.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Fetches a single item by key, or `None` if no item is stored under it.
    async fn get_item(&self, table: &str, key: &ItemKey) -> DocumentStoreResult<Option<Document>>;

    /// Writes an item, replacing any item stored under the same key.
    ///
    /// The key is read from the item's `primaryKey` and `sortKey` fields.
    async fn put_item(&self, table: &str, item: Document) -> DocumentStoreResult<()>;

    /// Removes the item stored under `key`. Deleting a missing item is not an error.
    async fn delete_item(&self, table: &str, key: &ItemKey) -> DocumentStoreResult<()>;

    /// Returns one page of a full-table scan.
    ///
    /// # Arguments
    ///
    /// * `table` - The table to scan
    /// * `start_after` - The continuation token returned by the previous page, if any
    /// * `limit` - Upper bound on the number of items in the page. Backends may return
    ///   fewer items (and a continuation token) even when more are available.
    async fn scan(
        &self,
        table: &str,
        start_after: Option<ItemKey>,
        limit: Option<usize>,
    ) -> DocumentStoreResult<ScanPage>;
}

#[async_trait]
impl<B> StoreBackend for Arc<B>
where
    B: StoreBackend + ?Sized,
{
    async fn get_item(&self, table: &str, key: &ItemKey) -> DocumentStoreResult<Option<Document>> {
        (**self).get_item(table, key).await
    }

    async fn put_item(&self, table: &str, item: Document) -> DocumentStoreResult<()> {
        (**self).put_item(table, item).await
    }

    async fn delete_item(&self, table: &str, key: &ItemKey) -> DocumentStoreResult<()> {
        (**self).delete_item(table, key).await
    }

    async fn scan(
        &self,
        table: &str,
        start_after: Option<ItemKey>,
        limit: Option<usize>,
    ) -> DocumentStoreResult<ScanPage> {
        (**self)
            .scan(table, start_after, limit)
            .await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
