//! In-memory item storage.
//!
//! Items live in ordered maps keyed by [`ItemKey`], one map per table, behind an
//! async-aware read-write lock. Scans walk a table in key order and page with the last
//! key returned, the same contract a remote key-value table offers.

use async_trait::async_trait;
use bson::Document;
use mea::rwlock::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::Arc,
};

use kvdoc_core::{
    backend::{ItemKey, ScanPage, StoreBackend, StoreBackendBuilder},
    error::DocumentStoreResult,
};

type TableMap = BTreeMap<ItemKey, Document>;
type StoreMap = HashMap<String, TableMap>;

/// Thread-safe in-memory item storage.
///
/// Clones share the same underlying tables.
///
/// # Example
///
/// ```ignore
/// use kvdoc_memory::InMemoryStore;
/// use kvdoc::backend::{ItemKey, StoreBackend};
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let key = ItemKey::for_document("User", "1");
///
/// store.put_item("documents", doc! {
///     "primaryKey": &key.primary_key,
///     "sortKey": &key.sort_key,
///     "name": "Ann",
/// }).await?;
///
/// assert!(store.get_item("documents", &key).await?.is_some());
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    tables: Arc<RwLock<StoreMap>>,
    /// Upper bound on items per scan page, whatever the caller asks for.
    page_size: Option<usize>,
}

impl InMemoryStore {
    /// Creates an empty store with unbounded scan pages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a builder for a store with a custom scan page size.
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// Number of items currently held in `table`.
    pub async fn len(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    fn page_limit(&self, requested: Option<usize>) -> Option<usize> {
        match (requested.filter(|n| *n > 0), self.page_size) {
            (Some(requested), Some(cap)) => Some(requested.min(cap)),
            (requested, cap) => requested.or(cap),
        }
    }
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn get_item(&self, table: &str, key: &ItemKey) -> DocumentStoreResult<Option<Document>> {
        Ok(self
            .tables
            .read()
            .await
            .get(table)
            .and_then(|items| items.get(key))
            .cloned())
    }

    async fn put_item(&self, table: &str, item: Document) -> DocumentStoreResult<()> {
        let key = ItemKey::from_item(&item)?;

        self.tables
            .write()
            .await
            .entry(table.to_string())
            .or_default()
            .insert(key, item);

        Ok(())
    }

    async fn delete_item(&self, table: &str, key: &ItemKey) -> DocumentStoreResult<()> {
        if let Some(items) = self.tables.write().await.get_mut(table) {
            items.remove(key);
        }

        Ok(())
    }

    async fn scan(
        &self,
        table: &str,
        start_after: Option<ItemKey>,
        limit: Option<usize>,
    ) -> DocumentStoreResult<ScanPage> {
        let tables = self.tables.read().await;
        let Some(items) = tables.get(table) else {
            return Ok(ScanPage { items: vec![], next: None });
        };

        let lower = match start_after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        let mut remaining = items.range((lower, Bound::Unbounded));

        let page = match self.page_limit(limit) {
            Some(limit) => remaining.by_ref().take(limit).collect::<Vec<_>>(),
            None => remaining.by_ref().collect::<Vec<_>>(),
        };
        let next = match remaining.next() {
            Some(_) => page.last().map(|(key, _)| ItemKey::clone(key)),
            None => None,
        };

        Ok(ScanPage {
            items: page.into_iter().map(|(_, item)| item.clone()).collect(),
            next,
        })
    }
}

/// Builder for [`InMemoryStore`].
///
/// # Example
///
/// ```ignore
/// use kvdoc::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().page_size(100).build().await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStoreBuilder {
    page_size: Option<usize>,
}

impl InMemoryStoreBuilder {
    /// Caps every scan page at `page_size` items.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore {
            page_size: self.page_size,
            ..InMemoryStore::default()
        })
    }
}
