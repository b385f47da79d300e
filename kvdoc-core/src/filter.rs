//! Filter specifications and their in-memory evaluation.
//!
//! A filter maps dotted field paths to either a literal (equality) or an operator
//! object. All conditions combine with AND; there is no OR.
//!
//! ```ignore
//! use bson::doc;
//! use kvdoc::filter::Filter;
//!
//! let filter = Filter::from(doc! {
//!     "status": "active",
//!     "score": { "$gt": 5 },
//!     "tag": { "$in": ["a", "b"] },
//!     "name": { "$regex": "^an", "$options": "i" },
//! });
//!
//! // The same filter through the builder API.
//! let filter = Filter::new()
//!     .eq("status", "active")
//!     .gt("score", 5)
//!     .is_in("tag", ["a", "b"])
//!     .regex("name", "^an", "i");
//! ```
//!
//! Operator keys are accepted with or without a leading `$`. Operator shapes the
//! engine does not implement are kept as [`FieldOp::Unsupported`] conditions, which
//! never match. Strict stores reject them up front through [`Filter::ensure_supported`].

use bson::{Bson, Document};
use regex::{Regex, RegexBuilder};

use crate::{
    document::{as_number, resolve_path, string_form},
    error::{DocumentStoreError, DocumentStoreResult},
};

/// Comparison applied to the value found at a condition's path.
#[derive(Debug, Clone)]
pub enum FieldOp {
    /// Equality of string forms.
    Eq(Bson),
    /// Membership of the string form in a set of values.
    In(Vec<Bson>),
    /// Pattern test on the string form.
    Regex(Regex),
    /// Greater-than, numeric when both sides are numbers.
    Gt(Bson),
    /// An operator shape the evaluator does not implement. Never matches.
    Unsupported(String),
}

/// A single path/operator pair.
#[derive(Debug, Clone)]
pub struct Condition {
    /// The dotted path to resolve on the document.
    pub path: String,
    /// The comparison to apply.
    pub op: FieldOp,
}

/// A conjunction of conditions. The empty filter matches every document.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    /// Creates a filter that matches every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an equality condition.
    pub fn eq(self, path: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with(path, FieldOp::Eq(value.into()))
    }

    /// Adds a membership condition.
    pub fn is_in<I, V>(self, path: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Bson>,
    {
        self.with(path, FieldOp::In(values.into_iter().map(Into::into).collect()))
    }

    /// Adds a pattern condition. An invalid pattern yields an unsupported condition.
    pub fn regex(self, path: impl Into<String>, pattern: &str, options: &str) -> Self {
        self.with(path, compile_regex(pattern, options))
    }

    /// Adds a greater-than condition.
    pub fn gt(self, path: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.with(path, FieldOp::Gt(value.into()))
    }

    fn with(mut self, path: impl Into<String>, op: FieldOp) -> Self {
        self.conditions.push(Condition { path: path.into(), op });
        self
    }

    /// The conditions of this filter, in the order they were given.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns `true` if the filter has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Iterates over the conditions the evaluator cannot honour.
    pub fn unsupported(&self) -> impl Iterator<Item = (&str, &str)> {
        self.conditions.iter().filter_map(|condition| match &condition.op {
            FieldOp::Unsupported(operator) => Some((condition.path.as_str(), operator.as_str())),
            _ => None,
        })
    }

    /// Fails on the first unsupported condition.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::UnsupportedOperator`] naming the path and operator.
    pub fn ensure_supported(&self) -> DocumentStoreResult<()> {
        match self.unsupported().next() {
            Some((path, operator)) => Err(DocumentStoreError::UnsupportedOperator {
                path: path.to_string(),
                operator: operator.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// The id this filter pins by equality, if any.
    pub fn id_equality(&self) -> Option<String> {
        self.conditions.iter().find_map(|condition| match &condition.op {
            FieldOp::Eq(value) if condition.path == crate::document::ID => Some(string_form(value)),
            _ => None,
        })
    }

    /// Builds the document an upsert starts from: every equality condition written
    /// at its path. Operator conditions do not contribute.
    pub fn seed_document(&self) -> Document {
        let mut seed = Document::new();

        for condition in &self.conditions {
            if let FieldOp::Eq(value) = &condition.op {
                crate::document::set_path(&mut seed, &condition.path, value.clone());
            }
        }

        seed
    }
}

impl From<Document> for Filter {
    fn from(document: Document) -> Self {
        let mut filter = Filter::new();

        for (path, value) in document {
            match value {
                Bson::Document(operators) => {
                    for op in parse_operators(operators) {
                        filter = filter.with(path.clone(), op);
                    }
                }
                literal => filter = filter.with(path, FieldOp::Eq(literal)),
            }
        }

        filter
    }
}

impl From<Option<Document>> for Filter {
    fn from(document: Option<Document>) -> Self {
        document.map(Filter::from).unwrap_or_default()
    }
}

fn operator_name(key: &str) -> &str {
    key.strip_prefix('$').unwrap_or(key)
}

fn parse_operators(operators: Document) -> Vec<FieldOp> {
    if operators.is_empty() {
        return vec![FieldOp::Unsupported("{}".to_string())];
    }

    let options = operators
        .iter()
        .find(|(key, _)| operator_name(key) == "options")
        .and_then(|(_, value)| value.as_str())
        .unwrap_or_default()
        .to_string();

    operators
        .iter()
        .filter(|(key, _)| operator_name(key) != "options")
        .map(|(key, value)| match (operator_name(key), value) {
            ("in", Bson::Array(values)) => FieldOp::In(values.clone()),
            ("regex", Bson::String(pattern)) => compile_regex(pattern, &options),
            ("gt", value) => FieldOp::Gt(value.clone()),
            _ => FieldOp::Unsupported(key.clone()),
        })
        .collect()
}

fn compile_regex(pattern: &str, options: &str) -> FieldOp {
    RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .ignore_whitespace(options.contains('x'))
        .build()
        .map(FieldOp::Regex)
        .unwrap_or_else(|_| FieldOp::Unsupported(format!("$regex /{pattern}/{options}")))
}

/// Evaluates filters against a single document.
pub struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    /// Evaluates filters against `document`.
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    /// Returns `true` if every condition of `filter` holds for the document.
    pub fn evaluate(&self, filter: &Filter) -> bool {
        filter
            .conditions
            .iter()
            .all(|condition| self.evaluate_condition(condition))
    }

    /// Keeps the documents that match `filter`, preserving their order.
    pub fn filter_documents(
        documents: impl IntoIterator<Item = Document>,
        filter: &Filter,
    ) -> Vec<Document> {
        documents
            .into_iter()
            .filter(|document| DocumentEvaluator::new(document).evaluate(filter))
            .collect()
    }

    fn evaluate_condition(&self, condition: &Condition) -> bool {
        let Some(value) = resolve_path(self.document, &condition.path) else {
            return false;
        };

        match &condition.op {
            FieldOp::Eq(expected) => string_form(value) == string_form(expected),
            FieldOp::In(candidates) => {
                let contains = |value: &Bson| {
                    let form = string_form(value);
                    candidates.iter().any(|candidate| string_form(candidate) == form)
                };

                match value {
                    Bson::Array(items) => items.iter().any(contains),
                    single => contains(single),
                }
            }
            FieldOp::Regex(regex) => regex.is_match(&string_form(value)),
            FieldOp::Gt(bound) => greater_than(value, bound),
            FieldOp::Unsupported(_) => false,
        }
    }
}

fn greater_than(value: &Bson, bound: &Bson) -> bool {
    match (value, bound) {
        (Bson::String(left), Bson::String(right))
            if left.trim().parse::<f64>().is_err() || right.trim().parse::<f64>().is_err() =>
        {
            left > right
        }
        _ => match (as_number(value), as_number(bound)) {
            (Some(left), Some(right)) => left > right,
            _ => false,
        },
    }
}
