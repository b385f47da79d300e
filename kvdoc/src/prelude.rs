//! Convenient re-exports of commonly used types from kvdoc.
//!
//! ```ignore
//! use kvdoc::prelude::*;
//! ```

pub use bson::{Bson, Document, doc};

pub use kvdoc_core::{
    aggregate::Pipeline,
    backend::{ItemKey, ScanPage, StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    filter::Filter,
    hydrated::HydratedDocument,
    model::{DeleteResult, Model, ModelDef, UpdateOptions, UpdateResult},
    options::StoreOptions,
    query::{Hydrated, Lean, Many, One, Projection, Query},
    registry::ModelRegistry,
    sort::{SortDirection, SortSpec},
    store::DocumentStore,
    update::Update,
};
