//! Multi-key sorting of documents.
//!
//! Keys are compared in the order they were given; ties fall through to the next key
//! and the sort is stable. Missing (or null) values always sort last, whatever the
//! direction of the key.

use bson::{Bson, Document};
use std::cmp::Ordering;

use crate::document::resolve_path;

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// One key of a sort specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    /// The dotted path to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// An ordered list of sort keys.
///
/// # Example
///
/// ```ignore
/// use bson::doc;
/// use kvdoc::sort::SortSpec;
///
/// let by_score = SortSpec::from(doc! { "score": -1, "name": 1 });
/// let same = SortSpec::from("-score name");
/// let same_again = SortSpec::new().desc("score").asc("name");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec {
    keys: Vec<SortKey>,
}

impl SortSpec {
    /// An empty spec, which keeps input order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an ascending key.
    pub fn asc(self, field: impl Into<String>) -> Self {
        self.key(field, SortDirection::Asc)
    }

    /// Appends a descending key.
    pub fn desc(self, field: impl Into<String>) -> Self {
        self.key(field, SortDirection::Desc)
    }

    /// Appends a key with an explicit direction.
    pub fn key(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.keys.push(SortKey { field: field.into(), direction });
        self
    }

    /// Sort keys, most significant first.
    pub fn keys(&self) -> &[SortKey] {
        &self.keys
    }

    /// Whether no sort key was given.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Compares two documents under this specification.
    pub fn compare(&self, left: &Document, right: &Document) -> Ordering {
        for key in &self.keys {
            let ordering = match (present(left, &key.field), present(right, &key.field)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => match key.direction {
                    SortDirection::Asc => compare_values(a, b),
                    SortDirection::Desc => compare_values(b, a),
                },
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }

    /// Sorts documents in place. Stable.
    pub fn apply(&self, documents: &mut [Document]) {
        if !self.is_empty() {
            documents.sort_by(|a, b| self.compare(a, b));
        }
    }
}

impl From<Document> for SortSpec {
    /// Reads `{field: direction}` pairs. Negative numbers and the strings `"desc"`,
    /// `"descending"` and `"-1"` mean descending; everything else ascending.
    fn from(document: Document) -> Self {
        document
            .into_iter()
            .fold(SortSpec::new(), |spec, (field, direction)| {
                let descending = match &direction {
                    Bson::Int32(n) => *n < 0,
                    Bson::Int64(n) => *n < 0,
                    Bson::Double(n) => *n < 0.0,
                    Bson::String(s) => matches!(s.to_ascii_lowercase().as_str(), "desc" | "descending" | "-1"),
                    _ => false,
                };

                spec.key(field, if descending { SortDirection::Desc } else { SortDirection::Asc })
            })
    }
}

impl From<&str> for SortSpec {
    /// Reads a whitespace-separated field list where a leading `-` means descending.
    fn from(spec: &str) -> Self {
        spec.split_whitespace()
            .fold(SortSpec::new(), |spec, field| match field.strip_prefix('-') {
                Some(field) => spec.desc(field),
                None => spec.asc(field.strip_prefix('+').unwrap_or(field)),
            })
    }
}

fn present<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    resolve_path(document, path).filter(|value| !matches!(value, Bson::Null | Bson::Undefined))
}

/// Cross-type rank used when two values of different kinds are compared.
fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::Null | Bson::Undefined => 0,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 1,
        Bson::String(_) | Bson::Symbol(_) => 2,
        Bson::Document(_) => 3,
        Bson::Array(_) => 4,
        Bson::Binary(_) => 5,
        Bson::ObjectId(_) => 6,
        Bson::Boolean(_) => 7,
        Bson::DateTime(_) | Bson::Timestamp(_) => 8,
        _ => 9,
    }
}

/// Total order over values: same-kind values compare naturally, different kinds by rank.
pub fn compare_values(left: &Bson, right: &Bson) -> Ordering {
    match (left, right) {
        (Bson::String(a), Bson::String(b)) => a.cmp(b),
        (Bson::Boolean(a), Bson::Boolean(b)) => a.cmp(b),
        (Bson::DateTime(a), Bson::DateTime(b)) => a.cmp(b),
        (Bson::Array(a), Bson::Array(b)) => a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| compare_values(x, y))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        _ => match (numeric(left), numeric(right)) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            _ => type_rank(left)
                .cmp(&type_rank(right))
                .then_with(|| left.to_string().cmp(&right.to_string())),
        },
    }
}

fn numeric(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(*n as f64),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn names(documents: &[Document]) -> Vec<&str> {
        documents
            .iter()
            .map(|d| d.get("name").and_then(Bson::as_str).unwrap_or("?"))
            .collect()
    }

    #[test]
    fn missing_values_sort_last_in_both_directions() {
        let mut documents = vec![
            doc! { "name": "none" },
            doc! { "name": "b", "x": 2 },
            doc! { "name": "null", "x": null },
            doc! { "name": "a", "x": 1 },
        ];

        SortSpec::from(doc! { "x": 1 }).apply(&mut documents);
        assert_eq!(names(&documents), ["a", "b", "none", "null"]);

        SortSpec::from(doc! { "x": -1 }).apply(&mut documents);
        assert_eq!(names(&documents), ["b", "a", "none", "null"]);
    }

    #[test]
    fn ties_fall_through_to_later_keys() {
        let mut documents = vec![
            doc! { "name": "c", "group": 1, "rank": 2 },
            doc! { "name": "a", "group": 2, "rank": 1 },
            doc! { "name": "b", "group": 1, "rank": 1 },
        ];

        SortSpec::from("group -rank").apply(&mut documents);

        assert_eq!(names(&documents), ["c", "b", "a"]);
    }

    #[test]
    fn sorting_is_stable() {
        let mut documents = vec![
            doc! { "name": "first", "x": 1 },
            doc! { "name": "second", "x": 1 },
            doc! { "name": "third", "x": 0 },
        ];

        SortSpec::new().asc("x").apply(&mut documents);

        assert_eq!(names(&documents), ["third", "first", "second"]);
    }

    #[test]
    fn numbers_compare_across_representations() {
        assert_eq!(compare_values(&Bson::Int32(2), &Bson::Double(1.5)), Ordering::Greater);
        assert_eq!(compare_values(&Bson::Int64(3), &Bson::Int32(3)), Ordering::Equal);
        assert_eq!(
            compare_values(&Bson::Int32(100), &Bson::String("1".into())),
            Ordering::Less
        );
    }

    #[test]
    fn string_directions_are_understood() {
        let spec = SortSpec::from(doc! { "a": "desc", "b": "asc" });

        assert_eq!(spec, SortSpec::new().desc("a").asc("b"));
    }
}
