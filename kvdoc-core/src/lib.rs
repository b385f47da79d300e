//! A document-store layer over a primitive key-value backend.
//!
//! The backend only has to get, put and delete single items and scan a table page by
//! page. On top of that this crate provides:
//!
//! - **Backend abstraction** ([`backend`]) - The item-level trait a storage engine implements
//! - **Storage client** ([`client`]) - Point operations and drained full-table scans
//! - **Document helpers** ([`document`], [`codec`]) - System fields, dotted paths and value normalization
//! - **Models** ([`model`], [`registry`]) - Model definitions and the operations on them
//! - **Filtering and ordering** ([`filter`], [`sort`]) - In-memory predicate evaluation and sorting
//! - **Updates** ([`update`]) - `$set`, `$unset`, `$inc` and `$push`
//! - **Queries** ([`query`]) - Deferred chainable reads with joins and projections
//! - **Aggregation** ([`aggregate`]) - `$match`, `$sort` and `$group` pipelines
//! - **Hydrated documents** ([`hydrated`]) - Documents that can save and delete themselves
//! - **Document store** ([`store`]) - The entry point tying a backend to a registry
//!
//! Every model shares one physical table. Items are addressed by
//! `{primaryKey: "<model>#<id>", sortKey: "<model>#<id>"}` and tagged with a `model`
//! field that scans filter on.
//!
//! # Example
//!
//! ```ignore
//! use kvdoc::prelude::*;
//! use kvdoc::memory::InMemoryStore;
//!
//! let registry = ModelRegistry::builder()
//!     .register(ModelDef::new("Player"))
//!     .build()?;
//! let store = DocumentStore::new(InMemoryStore::new(), registry);
//! let players = store.model("Player")?;
//!
//! players.create(doc! { "name": "Ann", "score": 10 }).await?;
//! players.update_one(doc! { "name": "Ann" }, doc! { "$inc": { "score": 1 } }, UpdateOptions::default()).await?;
//!
//! let ann = players.find_one(doc! { "name": "Ann" }).lean().await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as kvdoc_core;

pub mod aggregate;
pub mod backend;
pub mod client;
pub mod codec;
pub mod document;
pub mod error;
pub mod filter;
pub mod hydrated;
pub mod model;
pub mod options;
pub mod query;
pub mod registry;
pub mod sort;
pub mod store;
pub mod update;
