//! Error types and result types for document store operations.
//!
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.
//! Absence is never an error here: lookups that find nothing return `None`.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
///
/// The `Unsupported*`, `UnknownPopulateField`, `ImmutableField` and `DuplicateId` variants are only
/// produced when the store runs in strict mode. In the default lenient mode the same
/// situations are logged and the offending part of the request is ignored.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The document has an invalid structure, e.g. a stored item without key fields.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
    /// A model with the same name was registered twice.
    #[error("Model {0} is already registered")]
    DuplicateModel(String),
    /// No model with the given name is registered.
    #[error("Model not found: {0}")]
    ModelNotFound(String),
    /// A filter or update used an operator the engine does not implement.
    #[error("Unsupported operator {operator} on path {path}")]
    UnsupportedOperator {
        /// The dotted path the operator was applied to.
        path: String,
        /// The operator as written by the caller.
        operator: String,
    },
    /// An aggregation stage or accumulator the engine does not implement.
    #[error("Unsupported pipeline stage: {0}")]
    UnsupportedStage(String),
    /// `populate` was asked for a field the model has no join definition for.
    #[error("Model {model} has no populate definition for field {field}")]
    UnknownPopulateField {
        /// The model being queried.
        model: String,
        /// The requested join field.
        field: String,
    },
    /// An upsert asked for an id that already belongs to another document.
    #[error("Model {model} already has a document with id {id}")]
    DuplicateId {
        /// The model being written.
        model: String,
        /// The requested id.
        id: String,
    },
    /// An update tried to modify a system field.
    #[error("Field {0} is immutable")]
    ImmutableField(String),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
