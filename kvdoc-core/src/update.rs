//! Update operators applied by the mutation engine.
//!
//! An update document is made of operator keys (`$set`, `$unset`, `$inc`, `$push`,
//! with or without the `$`) mapping dotted paths to operands. A document without any
//! operator key is a plain patch and behaves like `$set`.
//!
//! ```ignore
//! use bson::doc;
//! use kvdoc::update::Update;
//!
//! let update = Update::from(doc! { "$set": { "profile.bio": "hi" }, "$inc": { "likes": 1 } });
//! let patch = Update::from(doc! { "name": "Bo" });
//! ```

use bson::{Bson, Document};
use tracing::warn;

use crate::{
    document::{is_immutable_path, resolve_path, set_path, unset_path},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// One path-level modification.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    /// Writes the value at the path.
    Set(String, Bson),
    /// Removes the path.
    Unset(String),
    /// Adds a number to the value at the path, treating a missing value as zero.
    Inc(String, Bson),
    /// Appends to the array at the path, creating it if missing.
    Push(String, Bson),
    /// An operator the engine does not implement. Skipped when applied.
    Unsupported(String),
}

impl UpdateOp {
    fn path(&self) -> Option<&str> {
        match self {
            UpdateOp::Set(path, _)
            | UpdateOp::Unset(path)
            | UpdateOp::Inc(path, _)
            | UpdateOp::Push(path, _) => Some(path),
            UpdateOp::Unsupported(_) => None,
        }
    }
}

/// An ordered list of update operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<UpdateOp>,
}

impl Update {
    /// An update with no operations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a `$set`.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Set(path.into(), value.into()));
        self
    }

    /// Adds an `$unset`.
    pub fn unset(mut self, path: impl Into<String>) -> Self {
        self.ops.push(UpdateOp::Unset(path.into()));
        self
    }

    /// Adds an `$inc`.
    pub fn inc(mut self, path: impl Into<String>, by: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Inc(path.into(), by.into()));
        self
    }

    /// Adds a `$push`.
    pub fn push(mut self, path: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.ops.push(UpdateOp::Push(path.into(), value.into()));
        self
    }

    /// Operations in application order.
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    /// Whether there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Checks the update against the engine's rules before it touches any document.
    ///
    /// In strict mode unsupported operators and writes to immutable system fields are
    /// errors. Otherwise they are logged and dropped from the returned update.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::UnsupportedOperator`] or
    /// [`DocumentStoreError::ImmutableField`] in strict mode.
    pub fn sanitize(self, strict: bool) -> DocumentStoreResult<Self> {
        let mut ops = Vec::with_capacity(self.ops.len());

        for op in self.ops {
            if let UpdateOp::Unsupported(operator) = &op {
                if strict {
                    return Err(DocumentStoreError::UnsupportedOperator {
                        path: String::new(),
                        operator: operator.clone(),
                    });
                }
                warn!(operator = %operator, "ignoring unsupported update operator");
                continue;
            }

            if let Some(path) = op.path().filter(|path| is_immutable_path(path)) {
                if strict {
                    return Err(DocumentStoreError::ImmutableField(path.to_string()));
                }
                warn!(path = %path, "ignoring update of immutable field");
                continue;
            }

            ops.push(op);
        }

        Ok(Self { ops })
    }

    /// Applies every operation to `document` in order.
    pub fn apply(&self, document: &mut Document) {
        for op in &self.ops {
            match op {
                UpdateOp::Set(path, value) => {
                    if !set_path(document, path, value.clone()) {
                        warn!(path = %path, "could not set path");
                    }
                }
                UpdateOp::Unset(path) => {
                    unset_path(document, path);
                }
                UpdateOp::Inc(path, by) => {
                    let current = resolve_path(document, path).cloned().unwrap_or(Bson::Int32(0));
                    match add(&current, by) {
                        Some(sum) => {
                            set_path(document, path, sum);
                        }
                        None => warn!(path = %path, "cannot increment a non-numeric value"),
                    }
                }
                UpdateOp::Push(path, value) => match resolve_path(document, path).cloned() {
                    None | Some(Bson::Null) => {
                        set_path(document, path, Bson::Array(vec![value.clone()]));
                    }
                    Some(Bson::Array(mut items)) => {
                        items.push(value.clone());
                        set_path(document, path, Bson::Array(items));
                    }
                    Some(_) => warn!(path = %path, "cannot push onto a non-array value"),
                },
                UpdateOp::Unsupported(_) => {}
            }
        }
    }
}

fn add(left: &Bson, right: &Bson) -> Option<Bson> {
    match (left, right) {
        (Bson::Int32(a), Bson::Int32(b)) => Some(
            a.checked_add(*b)
                .map(Bson::Int32)
                .unwrap_or(Bson::Int64(*a as i64 + *b as i64)),
        ),
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            let a = integer(left)?;
            let b = integer(right)?;
            a.checked_add(b).map(Bson::Int64)
        }
        _ => Some(Bson::Double(float(left)? + float(right)?)),
    }
}

fn integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(*n as i64),
        Bson::Int64(n) => Some(*n),
        _ => None,
    }
}

fn float(value: &Bson) -> Option<f64> {
    match value {
        Bson::Double(n) => Some(*n),
        other => integer(other).map(|n| n as f64),
    }
}

impl From<Document> for Update {
    fn from(document: Document) -> Self {
        let has_operators = document.keys().any(|key| key.starts_with('$'))
            || document
                .iter()
                .any(|(key, value)| is_operator(key) && matches!(value, Bson::Document(_)));

        if !has_operators {
            return document
                .into_iter()
                .fold(Update::new(), |update, (path, value)| update.set(path, value));
        }

        let mut update = Update::new();

        for (key, value) in document {
            let name = key.strip_prefix('$').unwrap_or(&key).to_string();
            match (name.as_str(), value) {
                ("set", Bson::Document(fields)) => {
                    update.ops.extend(fields.into_iter().map(|(p, v)| UpdateOp::Set(p, v)));
                }
                ("unset", Bson::Document(fields)) => {
                    update.ops.extend(fields.into_iter().map(|(p, _)| UpdateOp::Unset(p)));
                }
                ("inc", Bson::Document(fields)) => {
                    update.ops.extend(fields.into_iter().map(|(p, v)| UpdateOp::Inc(p, v)));
                }
                ("push", Bson::Document(fields)) => {
                    update.ops.extend(fields.into_iter().map(|(p, v)| UpdateOp::Push(p, v)));
                }
                (_, value) if !key.starts_with('$') && !is_operator(&key) => {
                    update.ops.push(UpdateOp::Set(key, value));
                }
                _ => update.ops.push(UpdateOp::Unsupported(key)),
            }
        }

        update
    }
}

fn is_operator(key: &str) -> bool {
    matches!(key.strip_prefix('$').unwrap_or(key), "set" | "unset" | "inc" | "push")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn plain_documents_are_set_patches() {
        let mut document = doc! { "name": "Ann", "score": 1 };

        Update::from(doc! { "score": 2, "profile.bio": "hi" }).apply(&mut document);

        assert_eq!(document, doc! { "name": "Ann", "score": 2, "profile": { "bio": "hi" } });
    }

    #[test]
    fn operators_are_applied_in_order() {
        let mut document = doc! { "likes": 1, "tags": ["a"], "draft": true };

        Update::from(doc! {
            "$set": { "title": "t" },
            "$inc": { "likes": 2, "views": 1 },
            "push": { "tags": "b", "authors": "u1" },
            "$unset": { "draft": "" },
        })
        .apply(&mut document);

        assert_eq!(
            document,
            doc! {
                "likes": 3,
                "tags": ["a", "b"],
                "title": "t",
                "views": 1,
                "authors": ["u1"],
            }
        );
    }

    #[test]
    fn increments_widen_instead_of_overflowing() {
        let mut document = doc! { "n": i32::MAX, "f": 1 };

        Update::new().inc("n", 1).inc("f", 0.5).apply(&mut document);

        assert_eq!(document.get("n"), Some(&Bson::Int64(i32::MAX as i64 + 1)));
        assert_eq!(document.get("f"), Some(&Bson::Double(1.5)));
    }

    #[test]
    fn sanitize_drops_or_rejects_forbidden_operations() {
        let update = Update::from(doc! { "$set": { "id": "x", "name": "Bo" }, "$rename": { "a": "b" } });

        let lenient = update.clone().sanitize(false).unwrap();
        assert_eq!(lenient, Update::new().set("name", "Bo"));

        assert!(matches!(
            update.sanitize(true),
            Err(DocumentStoreError::ImmutableField(field)) if field == "id"
        ));
    }

    #[test]
    fn unknown_operators_are_errors_in_strict_mode() {
        let update = Update::from(doc! { "$rename": { "a": "b" } });

        assert!(matches!(
            update.sanitize(true),
            Err(DocumentStoreError::UnsupportedOperator { operator, .. }) if operator == "$rename"
        ));
    }
}
