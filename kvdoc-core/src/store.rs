//! Main document store interface.
//!
//! A [`DocumentStore`] ties together a backend, the [`ModelRegistry`] and the
//! [`StoreOptions`]. Models are obtained from it by name and share its storage client.
//!
//! # Example
//!
//! ```ignore
//! use kvdoc::prelude::*;
//! use kvdoc::memory::InMemoryStore;
//!
//! let registry = ModelRegistry::builder()
//!     .register(ModelDef::new("Player").default_value("score", 0))
//!     .build()?;
//! let store = DocumentStore::new(InMemoryStore::new(), registry);
//!
//! let players = store.model("Player")?;
//! let ann = players.create(doc! { "name": "Ann", "score": 10 }).await?;
//! ```

use std::sync::Arc;

use crate::{
    backend::StoreBackend,
    client::StorageClient,
    error::{DocumentStoreError, DocumentStoreResult},
    model::Model,
    options::StoreOptions,
    registry::ModelRegistry,
};

/// State shared by every model handle obtained from one store.
#[derive(Debug)]
pub(crate) struct StoreContext {
    pub(crate) client: StorageClient,
    pub(crate) registry: ModelRegistry,
    pub(crate) options: StoreOptions,
}

/// A document store bound to one backend table.
///
/// Cloning is cheap; clones share the backend and registry.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    context: Arc<StoreContext>,
}

impl DocumentStore {
    /// Creates a store with default [`StoreOptions`].
    pub fn new<B: StoreBackend + 'static>(backend: B, registry: ModelRegistry) -> Self {
        Self::with_options(backend, registry, StoreOptions::default())
    }

    /// Creates a store with explicit options.
    pub fn with_options<B: StoreBackend + 'static>(
        backend: B,
        registry: ModelRegistry,
        options: StoreOptions,
    ) -> Self {
        let client = StorageClient::new(Arc::new(backend), options.table.clone(), options.scan_page_size);

        Self {
            context: Arc::new(StoreContext { client, registry, options }),
        }
    }

    /// Returns a handle to the model registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::ModelNotFound`] if no such model is registered.
    pub fn model(&self, name: &str) -> DocumentStoreResult<Model> {
        self.context
            .registry
            .resolve(name)
            .map(|definition| Model::new(definition, self.context.clone()))
            .ok_or_else(|| DocumentStoreError::ModelNotFound(name.to_string()))
    }

    /// The registry models are resolved from.
    pub fn registry(&self) -> &ModelRegistry {
        &self.context.registry
    }

    /// The options the store was created with.
    pub fn options(&self) -> &StoreOptions {
        &self.context.options
    }

    /// The storage client, for callers that need raw item access.
    pub fn client(&self) -> &StorageClient {
        &self.context.client
    }
}
