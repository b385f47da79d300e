//! System fields, dotted-path access and conversions for stored documents.
//!
//! Documents are plain [`bson::Document`] values. Every stored document carries the
//! system fields listed below next to its own fields, all flattened at the top level.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Unique id of the document within its model.
pub const ID: &str = "id";
/// Name of the model the document belongs to.
pub const MODEL: &str = "model";
/// Partition key of the stored item, `"{model}#{id}"`.
pub const PRIMARY_KEY: &str = "primaryKey";
/// Sort key of the stored item, `"{model}#{id}"`.
pub const SORT_KEY: &str = "sortKey";
/// Canonical timestamp of creation.
pub const CREATED_AT: &str = "createdAt";
/// Canonical timestamp of the last mutation.
pub const UPDATED_AT: &str = "updatedAt";

/// Fields that update operators may never touch.
pub const IMMUTABLE_FIELDS: [&str; 5] = [ID, MODEL, PRIMARY_KEY, SORT_KEY, CREATED_AT];

/// Returns `true` if `path` addresses an immutable system field or something below it.
pub fn is_immutable_path(path: &str) -> bool {
    let root = path.split('.').next().unwrap_or(path);
    IMMUTABLE_FIELDS.contains(&root)
}

/// Resolves a dotted path such as `"author.name"` or `"tags.0"`.
///
/// Numeric segments index into arrays. Returns `None` as soon as a segment is
/// missing or the current value cannot be descended into.
pub fn resolve_path<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Bson::Document(inner) => inner.get(segment)?,
            Bson::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Writes `value` at a dotted path, creating intermediate documents as needed.
///
/// An intermediate value that is neither a document nor an indexable array is
/// replaced by an empty document. Array segments must address an existing element.
/// Returns `false` if the value could not be placed.
pub fn set_path(document: &mut Document, path: &str, value: Bson) -> bool {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
            true
        }
        Some((head, rest)) => {
            let needs_document = !matches!(
                document.get(head),
                Some(Bson::Document(_)) | Some(Bson::Array(_))
            );
            if needs_document {
                document.insert(head, Document::new());
            }

            match document.get_mut(head) {
                Some(Bson::Document(inner)) => set_path(inner, rest, value),
                Some(Bson::Array(items)) => set_in_array(items, rest, value),
                _ => false,
            }
        }
    }
}

fn set_in_array(items: &mut [Bson], path: &str, value: Bson) -> bool {
    let (index, rest) = match path.split_once('.') {
        Some((index, rest)) => (index, Some(rest)),
        None => (path, None),
    };
    let Some(slot) = index.parse::<usize>().ok().and_then(|i| items.get_mut(i)) else {
        return false;
    };

    match rest {
        None => {
            *slot = value;
            true
        }
        Some(rest) => {
            if !matches!(slot, Bson::Document(_) | Bson::Array(_)) {
                *slot = Bson::Document(Document::new());
            }

            match slot {
                Bson::Document(inner) => set_path(inner, rest, value),
                Bson::Array(inner) => set_in_array(inner, rest, value),
                _ => false,
            }
        }
    }
}

/// Removes the value at a dotted path, returning it if it existed.
pub fn unset_path(document: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head)? {
            Bson::Document(inner) => unset_path(inner, rest),
            _ => None,
        },
    }
}

/// The string form values are compared by in equality and membership filters.
///
/// Integral doubles print without a fractional part so that `5` and `5.0`
/// compare equal; arrays print as their comma-joined elements; documents print
/// as JSON.
pub fn string_form(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(n) => format_number(*n),
        Bson::Boolean(b) => b.to_string(),
        Bson::Null | Bson::Undefined => "null".to_string(),
        Bson::Array(items) => items
            .iter()
            .map(string_form)
            .collect::<Vec<_>>()
            .join(","),
        Bson::Document(_) => serde_json::to_string(value).unwrap_or_else(|_| value.to_string()),
        other => other.to_string(),
    }
}

/// Formats a number the way it would be written in a document literal.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Reads a value as a number, accepting numeric strings.
pub fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        Bson::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Serializes a typed value into a document.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Serialization`] if serialization fails, or
/// [`DocumentStoreError::InvalidDocument`] if the value does not serialize to a document.
pub fn to_document<T: Serialize>(value: &T) -> DocumentStoreResult<Document> {
    match serialize_to_bson(value)? {
        Bson::Document(document) => Ok(document),
        other => Err(DocumentStoreError::InvalidDocument(
            format!("expected a document, got {:?}", other.element_type())
        )),
    }
}

/// Deserializes a document into a typed value.
///
/// # Errors
///
/// Returns [`DocumentStoreError::Serialization`] if the document does not match `T`.
pub fn from_document<T: DeserializeOwned>(document: Document) -> DocumentStoreResult<T> {
    Ok(deserialize_from_bson(Bson::Document(document))?)
}
