//! In-memory storage backend for kvdoc.
//!
//! [`InMemoryStore`] implements the item-level `StoreBackend` trait with ordered maps
//! behind an async-aware read-write lock. It is meant for development, tests and
//! small single-process deployments; nothing is persisted.
//!
//! # Quick Start
//!
//! ```ignore
//! use kvdoc::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ModelRegistry::builder()
//!         .register(ModelDef::new("User"))
//!         .build()?;
//!     let store = DocumentStore::new(InMemoryStore::builder().page_size(500).build().await?, registry);
//!
//!     let users = store.model("User")?;
//!     users.create(doc! { "name": "Alice" }).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as kvdoc_memory;

pub mod store;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
