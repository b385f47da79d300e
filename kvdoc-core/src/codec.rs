//! Value normalization applied to every document right before it is written.
//!
//! Temporal values are stored as canonical RFC 3339 strings in UTC with millisecond
//! precision (`2024-05-01T12:30:00.000Z`). The format has a fixed width, so the
//! strings sort lexicographically in chronological order. There is no decode step:
//! readers parse temporal fields back themselves when they need to.

use bson::{Bson, DateTime, Document};
use chrono::{SecondsFormat, Utc};

/// Normalizes a single value.
///
/// `DateTime` values become canonical strings, arrays are normalized element-wise
/// and documents field-wise. Every other value is returned unchanged.
pub fn normalize(value: Bson) -> Bson {
    match value {
        Bson::DateTime(datetime) => Bson::String(canonical_datetime(datetime)),
        Bson::Array(items) => Bson::Array(items.into_iter().map(normalize).collect()),
        Bson::Document(document) => Bson::Document(normalize_document(document)),
        other => other,
    }
}

/// Normalizes every field of a document.
pub fn normalize_document(document: Document) -> Document {
    document
        .into_iter()
        .map(|(key, value)| (key, normalize(value)))
        .collect()
}

/// The canonical timestamp string for the current instant.
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn canonical_datetime(datetime: DateTime) -> String {
    match chrono::DateTime::<Utc>::from_timestamp_millis(datetime.timestamp_millis()) {
        Some(utc) => utc.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => datetime.to_string(),
    }
}
