//! A document-database programming surface on top of a primitive key-value table.
//!
//! This crate is the entry point for users of kvdoc. It re-exports the core engine and
//! the bundled backends.
//!
//! # Features
//!
//! - **Models** - Named entity types with creation defaults and join declarations
//! - **Queries** - Filters with equality, `$in`, `$regex` and `$gt`, plus sort, limit,
//!   populate, projection and lean reads
//! - **Updates** - `$set`, `$unset`, `$inc` and `$push`, with upserts
//! - **Aggregation** - `$match`, `$sort` and `$group` with `$sum` and `$push`
//! - **Hydrated documents** - Documents that save and delete themselves
//!
//! # Quick Start
//!
//! ```ignore
//! use kvdoc::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let registry = ModelRegistry::builder()
//!         .register(ModelDef::new("Player").default_value("score", 0))
//!         .build()?;
//!     let store = DocumentStore::new(InMemoryStore::new(), registry);
//!     let players = store.model("Player")?;
//!
//!     players.create(doc! { "name": "Ann", "score": 10 }).await?;
//!     players.create(doc! { "name": "Bo" }).await?;
//!
//!     let leaders = players
//!         .find(doc! { "score": { "$gt": 5 } })
//!         .sort("-score")
//!         .lean()
//!         .await?;
//!
//!     let mut bo = players.find_one(doc! { "name": "Bo" }).await?.expect("created above");
//!     bo.set("score", 7);
//!     bo.save().await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//!
//! Any other engine can be plugged in by implementing
//! [`StoreBackend`](backend::StoreBackend).

pub mod prelude;

pub use kvdoc_core::{
    aggregate, backend, client, codec, document, error, filter, hydrated, model, options, query, registry, sort,
    store, update,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use kvdoc_memory::{InMemoryStore, InMemoryStoreBuilder};
}
