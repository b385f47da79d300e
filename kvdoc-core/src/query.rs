//! Deferred, chainable read queries.
//!
//! A [`Query`] is created by [`Model::find`], [`Model::find_one`] or
//! [`Model::find_by_id`] and does nothing until it is awaited (or [`Query::exec`] is
//! called). Modifiers can be chained in any order; they are always applied in the same
//! sequence:
//!
//! 1. load (full scan plus filter, or a point read by id)
//! 2. sort
//! 3. limit
//! 4. populate
//! 5. projection
//! 6. hydration
//!
//! The result shape is carried in the type: [`Many`] queries resolve to a `Vec`, [`One`]
//! queries to an `Option`, and [`Query::lean`] switches the items from
//! [`HydratedDocument`] to plain [`Document`]s.
//!
//! # Example
//!
//! ```ignore
//! let top: Vec<Document> = players
//!     .find(doc! { "score": { "$gt": 5 } })
//!     .sort("-score")
//!     .limit(1)
//!     .lean()
//!     .await?;
//! ```

use bson::{Bson, Document};
use futures::future::BoxFuture;
use std::{
    collections::HashMap,
    future::IntoFuture,
    marker::PhantomData,
};
use tracing::debug;

use crate::{
    backend::ItemKey,
    document::{ID, resolve_path, set_path, string_form, unset_path},
    error::DocumentStoreResult,
    filter::Filter,
    hydrated::HydratedDocument,
    model::Model,
    sort::SortSpec,
};

/// How many results a query resolves to.
pub trait Cardinality: Send + Sync + 'static {
    type Output<T>;

    /// Whether only the first row is ever returned.
    const SINGLE: bool;

    fn collect<T>(rows: Vec<T>) -> Self::Output<T>;
}

/// Resolves to every matching row.
#[derive(Debug, Clone, Copy)]
pub struct Many;

/// Resolves to the first matching row, if any.
#[derive(Debug, Clone, Copy)]
pub struct One;

impl Cardinality for Many {
    type Output<T> = Vec<T>;

    const SINGLE: bool = false;

    fn collect<T>(rows: Vec<T>) -> Vec<T> {
        rows
    }
}

impl Cardinality for One {
    type Output<T> = Option<T>;

    const SINGLE: bool = true;

    fn collect<T>(rows: Vec<T>) -> Option<T> {
        rows.into_iter().next()
    }
}

/// What each result row is turned into.
pub trait Hydration: Send + Sync + 'static {
    type Item: Send;

    fn finish(model: &Model, document: Document, partial: bool, joined: Option<&str>) -> Self::Item;
}

/// Rows become [`HydratedDocument`]s.
#[derive(Debug, Clone, Copy)]
pub struct Hydrated;

/// Rows stay plain documents.
#[derive(Debug, Clone, Copy)]
pub struct Lean;

impl Hydration for Hydrated {
    type Item = HydratedDocument;

    fn finish(model: &Model, document: Document, partial: bool, joined: Option<&str>) -> HydratedDocument {
        HydratedDocument::from_stored(model.clone(), document, partial, joined.map(str::to_string))
    }
}

impl Hydration for Lean {
    type Item = Document;

    fn finish(_model: &Model, document: Document, _partial: bool, _joined: Option<&str>) -> Document {
        document
    }
}

/// Field selection applied to query results.
///
/// `id` is always kept so results can still be addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    Include(Vec<String>),
    Exclude(Vec<String>),
}

impl Projection {
    /// Keeps only `fields` (and `id`).
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Include(fields.into_iter().map(Into::into).collect())
    }

    /// Drops `fields`.
    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Exclude(fields.into_iter().map(Into::into).collect())
    }

    /// Applies the projection in place.
    pub fn apply(&self, document: &mut Document) {
        match self {
            Self::Include(fields) => {
                let mut projected = Document::new();
                if let Some(id) = document.get(ID) {
                    projected.insert(ID, id.clone());
                }
                for field in fields {
                    if let Some(value) = resolve_path(document, field) {
                        set_path(&mut projected, field, value.clone());
                    }
                }
                *document = projected;
            }
            Self::Exclude(fields) => {
                for field in fields.iter().filter(|field| *field != ID) {
                    unset_path(document, field);
                }
            }
        }
    }
}

/// Truthy values include a field, falsy ones exclude it. Any inclusion makes the
/// whole projection an inclusion.
impl From<Document> for Projection {
    fn from(value: Document) -> Self {
        let (include, exclude): (Vec<_>, Vec<_>) = value.into_iter().partition(|(_, flag)| match flag {
            Bson::Boolean(flag) => *flag,
            Bson::Int32(n) => *n != 0,
            Bson::Int64(n) => *n != 0,
            Bson::Double(n) => *n != 0.0,
            _ => true,
        });

        if include.is_empty() {
            Self::Exclude(exclude.into_iter().map(|(field, _)| field).collect())
        } else {
            Self::Include(include.into_iter().map(|(field, _)| field).collect())
        }
    }
}

/// Space-separated field names; a leading `-` excludes.
impl From<&str> for Projection {
    fn from(value: &str) -> Self {
        let (exclude, include): (Vec<_>, Vec<_>) = value.split_whitespace().partition(|field| field.starts_with('-'));

        if include.is_empty() {
            Self::exclude(exclude.into_iter().map(|field| &field[1..]))
        } else {
            Self::include(include)
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum Loader {
    Scan(Filter),
    ById(String),
}

/// A deferred read against one model.
#[derive(Debug)]
#[must_use = "queries do nothing unless awaited"]
pub struct Query<C: Cardinality, H: Hydration = Hydrated> {
    model: Model,
    loader: Loader,
    sort: Option<SortSpec>,
    limit: Option<usize>,
    populate: Option<String>,
    projection: Option<Projection>,
    _shape: PhantomData<fn() -> (C, H)>,
}

impl<C: Cardinality> Query<C, Hydrated> {
    pub(crate) fn new(model: Model, loader: Loader) -> Self {
        Self {
            model,
            loader,
            sort: None,
            limit: None,
            populate: None,
            projection: None,
            _shape: PhantomData,
        }
    }
}

impl<C: Cardinality, H: Hydration> Query<C, H> {
    /// Orders results. Documents missing a sort field come last.
    pub fn sort(mut self, spec: impl Into<SortSpec>) -> Self {
        self.sort = Some(spec.into());
        self
    }

    /// Keeps at most `limit` results. Zero means no limit.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = (limit > 0).then_some(limit);
        self
    }

    /// Replaces the ids stored at `field` with the documents they refer to.
    ///
    /// The field must be declared with [`ModelDef::populate`](crate::model::ModelDef::populate).
    /// Ids that do not resolve are left in place.
    pub fn populate(mut self, field: impl Into<String>) -> Self {
        self.populate = Some(field.into());
        self
    }

    /// Restricts the fields returned. Hydrated results become partial and merge onto
    /// the stored item when saved.
    pub fn select(mut self, projection: impl Into<Projection>) -> Self {
        self.projection = Some(projection.into());
        self
    }

    /// Returns plain documents instead of hydrated ones.
    pub fn lean(self) -> Query<C, Lean> {
        Query {
            model: self.model,
            loader: self.loader,
            sort: self.sort,
            limit: self.limit,
            populate: self.populate,
            projection: self.projection,
            _shape: PhantomData,
        }
    }

    /// Runs the query.
    ///
    /// # Errors
    ///
    /// Propagates backend errors. Strict stores also reject unsupported filter
    /// operators and unknown populate fields before touching storage.
    pub async fn exec(self) -> DocumentStoreResult<C::Output<H::Item>> {
        let Self {
            model,
            loader,
            sort,
            limit,
            populate,
            projection,
            ..
        } = self;

        let join = match populate {
            Some(field) => model.join_target(&field)?.map(|target| (field, target)),
            None => None,
        };

        let mut rows = match loader {
            Loader::Scan(filter) => {
                let filter = model.prepare_filter(filter)?;
                model.scan_matching(&filter).await?
            }
            Loader::ById(id) => model.load_by_id(&id).await?.into_iter().collect(),
        };

        if let Some(spec) = &sort {
            spec.apply(&mut rows);
        }
        let limit = if C::SINGLE { Some(1) } else { limit };
        if let Some(limit) = limit {
            rows.truncate(limit);
        }

        if let Some((field, target)) = &join {
            populate_rows(&model, field, target, &mut rows).await?;
        }

        if let Some(projection) = &projection {
            for row in &mut rows {
                projection.apply(row);
            }
        }

        debug!(model = %model.name(), rows = rows.len(), "query resolved");

        let partial = projection.is_some();
        let joined = join.as_ref().map(|(field, _)| field.as_str());
        let items = rows
            .into_iter()
            .map(|row| H::finish(&model, row, partial, joined))
            .collect();

        Ok(C::collect(items))
    }
}

impl<C: Cardinality, H: Hydration> IntoFuture for Query<C, H>
where
    C::Output<H::Item>: Send,
{
    type Output = DocumentStoreResult<C::Output<H::Item>>;
    type IntoFuture = BoxFuture<'static, Self::Output>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.exec())
    }
}

/// Resolves `field` on every row against `target`, loading each distinct id once.
async fn populate_rows(model: &Model, field: &str, target: &str, rows: &mut [Document]) -> DocumentStoreResult<()> {
    let mut cache: HashMap<String, Option<Document>> = HashMap::new();

    for row in rows.iter_mut() {
        let Some(value) = resolve_path(row, field).cloned() else {
            continue;
        };

        let joined = match value {
            Bson::Array(ids) => {
                let mut resolved = Vec::with_capacity(ids.len());
                for id in ids {
                    resolved.push(resolve_reference(model, target, &mut cache, id).await?);
                }
                Bson::Array(resolved)
            }
            single => resolve_reference(model, target, &mut cache, single).await?,
        };

        set_path(row, field, joined);
    }

    debug!(model = %model.name(), field, target, loaded = cache.len(), "populated rows");
    Ok(())
}

async fn resolve_reference(
    model: &Model,
    target: &str,
    cache: &mut HashMap<String, Option<Document>>,
    reference: Bson,
) -> DocumentStoreResult<Bson> {
    if !matches!(reference, Bson::String(_) | Bson::Int32(_) | Bson::Int64(_)) {
        return Ok(reference);
    }

    let id = string_form(&reference);
    if !cache.contains_key(&id) {
        let loaded = model
            .client()
            .get_by_key(&ItemKey::for_document(target, &id))
            .await?;
        cache.insert(id.clone(), loaded);
    }

    Ok(match cache.get(&id) {
        Some(Some(document)) => Bson::Document(document.clone()),
        _ => reference,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn inclusion_keeps_id_and_nested_paths() {
        let mut document = doc! { "id": "a", "name": "Ann", "profile": { "age": 30, "city": "Oslo" } };

        Projection::from("profile.city").apply(&mut document);

        assert_eq!(document, doc! { "id": "a", "profile": { "city": "Oslo" } });
    }

    #[test]
    fn exclusion_never_drops_id() {
        let mut document = doc! { "id": "a", "name": "Ann", "score": 3 };

        Projection::from(doc! { "score": 0, "id": 0 }).apply(&mut document);

        assert_eq!(document, doc! { "id": "a", "name": "Ann" });
    }

    #[test]
    fn any_inclusion_wins() {
        assert_eq!(
            Projection::from(doc! { "name": 1, "score": 0 }),
            Projection::include(["name"])
        );
        assert_eq!(Projection::from("-name -score"), Projection::exclude(["name", "score"]));
    }

    #[test]
    fn cardinality_shapes_results() {
        assert_eq!(Many::collect(vec![1, 2]), vec![1, 2]);
        assert_eq!(One::collect(vec![1, 2]), Some(1));
        assert_eq!(One::collect(Vec::<i32>::new()), None);
    }
}
