//! A restricted aggregation pipeline evaluated over materialized documents.
//!
//! Three stages are understood: `match` (filter semantics), `sort` (query sort
//! semantics) and `group`. Stage and accumulator names are accepted with or without a
//! leading `$`.
//!
//! ```ignore
//! use bson::doc;
//! use kvdoc::aggregate::Pipeline;
//!
//! let pipeline = Pipeline::from(vec![
//!     doc! { "$match": { "kind": "vote" } },
//!     doc! { "$group": {
//!         "_id": { "batch": "$batch", "category": "$category" },
//!         "votes": { "$sum": 1 },
//!         "voters": { "$push": "$user" },
//!     } },
//!     doc! { "$sort": { "votes": -1 } },
//! ]);
//! ```
//!
//! In a `group` stage strings are field paths (`"$score"` or `"score"`), documents are
//! composite keys whose members are evaluated the same way, and anything else is a
//! constant.

use bson::{Bson, Document};
use std::collections::HashMap;
use tracing::warn;

use crate::{
    document::resolve_path,
    error::{DocumentStoreError, DocumentStoreResult},
    filter::{DocumentEvaluator, Filter},
    sort::SortSpec,
};

/// Name of the group key field in `group` output rows.
pub const GROUP_ID: &str = "_id";

/// An expression evaluated against each row of a `group` stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// The value at a dotted path, or null when missing.
    Field(String),
    /// A fixed value.
    Constant(Bson),
    /// A document whose members are expressions.
    Composite(Vec<(String, Expression)>),
}

impl Expression {
    /// Evaluates the expression against a row.
    pub fn evaluate(&self, row: &Document) -> Bson {
        match self {
            Expression::Field(path) => resolve_path(row, path).cloned().unwrap_or(Bson::Null),
            Expression::Constant(value) => value.clone(),
            Expression::Composite(members) => Bson::Document(
                members
                    .iter()
                    .map(|(name, expression)| (name.clone(), expression.evaluate(row)))
                    .collect(),
            ),
        }
    }
}

impl From<Bson> for Expression {
    fn from(value: Bson) -> Self {
        match value {
            Bson::String(path) => Expression::Field(path.strip_prefix('$').unwrap_or(&path).to_string()),
            Bson::Document(members) => Expression::Composite(
                members
                    .into_iter()
                    .map(|(name, value)| (name, Expression::from(value)))
                    .collect(),
            ),
            constant => Expression::Constant(constant),
        }
    }
}

/// How a `group` stage folds the rows of a group into one output field.
#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    /// Sum of a field, or of a constant per row (`1` counts rows).
    Sum(Expression),
    /// The values of a field, in row order. Missing values are skipped.
    Push(Expression),
    /// An accumulator the engine does not implement.
    Unsupported(String),
}

impl From<Bson> for Accumulator {
    fn from(value: Bson) -> Self {
        let spec = match value {
            Bson::Document(spec) => spec,
            other => return Accumulator::Unsupported(other.to_string()),
        };
        let mut entries = spec.into_iter();

        match (entries.next(), entries.next()) {
            (Some((name, operand)), None) => match name.strip_prefix('$').unwrap_or(&name) {
                "sum" => Accumulator::Sum(Expression::from(operand)),
                "push" => Accumulator::Push(Expression::from(operand)),
                _ => Accumulator::Unsupported(name.clone()),
            },
            _ => Accumulator::Unsupported("accumulator with zero or several operators".to_string()),
        }
    }
}

/// One stage of a pipeline.
#[derive(Debug, Clone)]
pub enum Stage {
    Match(Filter),
    Sort(SortSpec),
    Group {
        id: Expression,
        accumulators: Vec<(String, Accumulator)>,
    },
    /// A stage the engine does not implement. A no-op in lenient mode.
    Unsupported(String),
}

impl From<Document> for Stage {
    fn from(document: Document) -> Self {
        let mut entries = document.into_iter();

        let (Some((name, body)), None) = (entries.next(), entries.next()) else {
            return Stage::Unsupported("stage with zero or several operators".to_string());
        };

        match (name.strip_prefix('$').unwrap_or(&name), body) {
            ("match", Bson::Document(filter)) => Stage::Match(Filter::from(filter)),
            ("sort", Bson::Document(spec)) => Stage::Sort(SortSpec::from(spec)),
            ("sort", Bson::String(spec)) => Stage::Sort(SortSpec::from(spec.as_str())),
            ("group", Bson::Document(mut spec)) => {
                let id = spec.remove(GROUP_ID).map(Expression::from).unwrap_or(Expression::Constant(Bson::Null));

                Stage::Group {
                    id,
                    accumulators: spec
                        .into_iter()
                        .map(|(field, accumulator)| (field, Accumulator::from(accumulator)))
                        .collect(),
                }
            }
            _ => Stage::Unsupported(name.clone()),
        }
    }
}

/// An ordered list of stages.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// An empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `$match` stage.
    pub fn match_(mut self, filter: impl Into<Filter>) -> Self {
        self.stages.push(Stage::Match(filter.into()));
        self
    }

    /// Appends a `$sort` stage.
    pub fn sort(mut self, spec: impl Into<SortSpec>) -> Self {
        self.stages.push(Stage::Sort(spec.into()));
        self
    }

    /// Appends a `$group` stage keyed by `id`.
    pub fn group<I, S>(mut self, id: impl Into<Bson>, accumulators: I) -> Self
    where
        I: IntoIterator<Item = (S, Accumulator)>,
        S: Into<String>,
    {
        self.stages.push(Stage::Group {
            id: Expression::from(id.into()),
            accumulators: accumulators
                .into_iter()
                .map(|(field, accumulator)| (field.into(), accumulator))
                .collect(),
        });
        self
    }

    /// The stages in execution order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Fails on the first stage, accumulator or match operator the engine cannot run.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::UnsupportedStage`] or
    /// [`DocumentStoreError::UnsupportedOperator`].
    pub fn ensure_supported(&self) -> DocumentStoreResult<()> {
        for stage in &self.stages {
            match stage {
                Stage::Match(filter) => filter.ensure_supported()?,
                Stage::Group { accumulators, .. } => {
                    if let Some((field, _)) = accumulators
                        .iter()
                        .find(|(_, accumulator)| matches!(accumulator, Accumulator::Unsupported(_)))
                    {
                        return Err(DocumentStoreError::UnsupportedStage(format!("group accumulator {field}")));
                    }
                }
                Stage::Unsupported(name) => return Err(DocumentStoreError::UnsupportedStage(name.clone())),
                Stage::Sort(_) => {}
            }
        }

        Ok(())
    }

    /// Runs every stage in order over `rows`.
    pub fn run(&self, rows: Vec<Document>) -> DocumentStoreResult<Vec<Document>> {
        self.stages.iter().try_fold(rows, |rows, stage| match stage {
            Stage::Match(filter) => Ok(DocumentEvaluator::filter_documents(rows, filter)),
            Stage::Sort(spec) => {
                let mut rows = rows;
                spec.apply(&mut rows);
                Ok(rows)
            }
            Stage::Group { id, accumulators } => group(rows, id, accumulators),
            Stage::Unsupported(name) => {
                warn!(stage = %name, "skipping unsupported pipeline stage");
                Ok(rows)
            }
        })
    }
}

impl From<Vec<Document>> for Pipeline {
    fn from(stages: Vec<Document>) -> Self {
        Self {
            stages: stages.into_iter().map(Stage::from).collect(),
        }
    }
}

/// Running state of one accumulator for one group.
enum Accumulated {
    Integer(i64),
    Float(f64),
    Items(Vec<Bson>),
}

impl Accumulated {
    fn add(&mut self, value: &Bson) {
        let integral = match value {
            Bson::Int32(n) => Some(*n as i64),
            Bson::Int64(n) => Some(*n),
            _ => None,
        };

        let next = match (&*self, integral, value) {
            (Accumulated::Integer(sum), Some(n), _) => match sum.checked_add(n) {
                Some(total) => Accumulated::Integer(total),
                None => Accumulated::Float(*sum as f64 + n as f64),
            },
            (Accumulated::Integer(sum), None, Bson::Double(n)) => Accumulated::Float(*sum as f64 + n),
            (Accumulated::Float(sum), Some(n), _) => Accumulated::Float(sum + n as f64),
            (Accumulated::Float(sum), None, Bson::Double(n)) => Accumulated::Float(sum + n),
            _ => return,
        };
        *self = next;
    }

    fn into_bson(self) -> Bson {
        match self {
            Accumulated::Integer(n) => Bson::Int64(n),
            Accumulated::Float(n) => Bson::Double(n),
            Accumulated::Items(items) => Bson::Array(items),
        }
    }
}

struct GroupState {
    key: Bson,
    values: Vec<Option<Accumulated>>,
}

fn group(
    rows: Vec<Document>,
    id: &Expression,
    accumulators: &[(String, Accumulator)],
) -> DocumentStoreResult<Vec<Document>> {
    let mut groups: Vec<GroupState> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in &rows {
        let key = id.evaluate(row);
        let serialized = serde_json::to_string(&key)?;

        let position = *index.entry(serialized).or_insert_with(|| {
            groups.push(GroupState {
                key,
                values: accumulators
                    .iter()
                    .map(|(_, accumulator)| match accumulator {
                        Accumulator::Sum(_) => Some(Accumulated::Integer(0)),
                        Accumulator::Push(_) => Some(Accumulated::Items(Vec::new())),
                        Accumulator::Unsupported(_) => None,
                    })
                    .collect(),
            });
            groups.len() - 1
        });

        for ((_, accumulator), state) in accumulators.iter().zip(groups[position].values.iter_mut()) {
            match (accumulator, state) {
                (Accumulator::Sum(expression), Some(state)) => state.add(&expression.evaluate(row)),
                (Accumulator::Push(expression), Some(Accumulated::Items(items))) => {
                    let value = expression.evaluate(row);
                    if !matches!(expression, Expression::Field(_)) || !matches!(value, Bson::Null) {
                        items.push(value);
                    }
                }
                _ => {}
            }
        }
    }

    Ok(groups
        .into_iter()
        .map(|state| {
            let mut output = Document::new();
            output.insert(GROUP_ID, state.key);

            for ((field, accumulator), value) in accumulators.iter().zip(state.values) {
                match value {
                    Some(value) => {
                        output.insert(field.clone(), value.into_bson());
                    }
                    None => warn!(field = %field, accumulator = ?accumulator, "skipping unsupported accumulator"),
                }
            }

            output
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn sums_a_field_under_a_constant_key() {
        let rows = vec![doc! { "v": 1 }, doc! { "v": 2 }, doc! { "v": 3 }];
        let pipeline = Pipeline::from(vec![doc! { "$group": { "_id": null, "total": { "$sum": "v" } } }]);

        let output = pipeline.run(rows).unwrap();

        assert_eq!(output, vec![doc! { "_id": null, "total": 6_i64 }]);
    }

    #[test]
    fn counts_rows_per_group_in_first_seen_order() {
        let rows = vec![
            doc! { "id": "b" },
            doc! { "id": "a" },
            doc! { "id": "b" },
        ];
        let pipeline = Pipeline::new().group("$id", [("count", Accumulator::Sum(Expression::Constant(Bson::Int32(1))))]);

        let output = pipeline.run(rows).unwrap();

        assert_eq!(
            output,
            vec![doc! { "_id": "b", "count": 2_i64 }, doc! { "_id": "a", "count": 1_i64 }]
        );
    }

    #[test]
    fn composite_keys_group_by_every_component() {
        let rows = vec![
            doc! { "batch": "b1", "category": "funniest", "user": "u1", "weight": 1.5 },
            doc! { "batch": "b1", "category": "funniest", "user": "u2", "weight": 1 },
            doc! { "batch": "b1", "category": "kindest", "user": "u1" },
        ];
        let pipeline = Pipeline::from(vec![
            doc! { "group": {
                "_id": { "batch": "$batch", "category": "$category" },
                "voters": { "push": "$user" },
                "weight": { "sum": "$weight" },
            } },
            doc! { "sort": { "weight": -1 } },
        ]);

        let output = pipeline.run(rows).unwrap();

        assert_eq!(
            output,
            vec![
                doc! {
                    "_id": { "batch": "b1", "category": "funniest" },
                    "voters": ["u1", "u2"],
                    "weight": 2.5,
                },
                doc! {
                    "_id": { "batch": "b1", "category": "kindest" },
                    "voters": ["u1"],
                    "weight": 0_i64,
                },
            ]
        );
    }

    #[test]
    fn match_runs_before_later_stages() {
        let rows = vec![doc! { "v": 1, "k": "x" }, doc! { "v": 5, "k": "y" }];
        let pipeline = Pipeline::new()
            .match_(doc! { "k": "y" })
            .group(Bson::Null, [("total", Accumulator::Sum(Expression::Field("v".into())))]);

        assert_eq!(pipeline.run(rows).unwrap(), vec![doc! { "_id": null, "total": 5_i64 }]);
    }

    #[test]
    fn unsupported_stages_are_skipped_or_rejected() {
        let rows = vec![doc! { "v": 1 }, doc! { "v": 2 }];
        let pipeline = Pipeline::from(vec![doc! { "$limit": 1 }]);

        assert_eq!(pipeline.run(rows.clone()).unwrap(), rows);
        assert!(matches!(
            pipeline.ensure_supported(),
            Err(DocumentStoreError::UnsupportedStage(stage)) if stage == "$limit"
        ));
    }

    #[test]
    fn unsupported_accumulators_are_left_out() {
        let pipeline = Pipeline::from(vec![doc! { "$group": { "_id": "$k", "avg": { "$avg": "$v" } } }]);

        let output = pipeline.run(vec![doc! { "k": "a", "v": 2 }]).unwrap();

        assert_eq!(output, vec![doc! { "_id": "a" }]);
        assert!(pipeline.ensure_supported().is_err());
    }
}
