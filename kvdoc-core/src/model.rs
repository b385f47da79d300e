//! Model definitions and the mutation engine.
//!
//! A [`ModelDef`] describes an entity type: its name, the defaults applied on
//! creation and the fields that can be populated from other models. A [`Model`] is a
//! handle to a definition bound to a store; every read and write of the type goes
//! through it.
//!
//! Every operation other than lookup by id scans the whole table and filters in
//! memory. Multi-document mutations read once and then write each match
//! individually: there is no locking, no version check and no rollback, so concurrent
//! writers race (the last write wins) and a failure part way through leaves the
//! earlier writes in place.

use bson::{Bson, Document};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    aggregate::Pipeline,
    backend::ItemKey,
    client::StorageClient,
    codec,
    document::{CREATED_AT, ID, MODEL, PRIMARY_KEY, SORT_KEY, UPDATED_AT, to_document},
    error::{DocumentStoreError, DocumentStoreResult},
    filter::{DocumentEvaluator, Filter},
    hydrated::HydratedDocument,
    query::{Hydrated, Loader, Many, One, Query},
    store::StoreContext,
    update::Update,
};

/// The schema-light definition of a model.
///
/// # Example
///
/// ```ignore
/// let comment = ModelDef::new("Comment")
///     .default_value("likes", 0)
///     .default_value("hidden", false)
///     .populate("author", "User");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModelDef {
    name: String,
    defaults: Document,
    populate: HashMap<String, String>,
}

impl ModelDef {
    /// Starts a definition with no defaults and no joins.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the value `field` takes when a created document omits it.
    pub fn default_value(mut self, field: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.defaults.insert(field.into(), value.into());
        self
    }

    /// Replaces all defaults at once.
    pub fn defaults(mut self, defaults: Document) -> Self {
        self.defaults = defaults;
        self
    }

    /// Declares that `field` holds ids of documents of the `target` model.
    pub fn populate(mut self, field: impl Into<String>, target: impl Into<String>) -> Self {
        self.populate.insert(field.into(), target.into());
        self
    }

    /// The registered model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The values merged under every created document.
    pub fn default_values(&self) -> &Document {
        &self.defaults
    }

    /// The model `field` joins to, if it is a populate field.
    pub fn populate_target(&self, field: &str) -> Option<&str> {
        self.populate.get(field).map(String::as_str)
    }
}

/// Options for `update_one` and `find_one_and_update`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Create a document when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    /// Options with `upsert` enabled.
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

/// Outcome of an update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Documents matched by the filter.
    pub matched_count: u64,
    /// Documents written back.
    pub modified_count: u64,
    /// The id of the document created by an upsert.
    pub upserted_id: Option<String>,
}

/// Outcome of a delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    /// Documents removed from storage.
    pub deleted_count: u64,
}

/// A model definition bound to a store.
///
/// Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Model {
    definition: Arc<ModelDef>,
    context: Arc<StoreContext>,
}

impl Model {
    pub(crate) fn new(definition: Arc<ModelDef>, context: Arc<StoreContext>) -> Self {
        Self { definition, context }
    }

    /// The model name, also the `model` field of every stored document.
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// The definition this handle was resolved from.
    pub fn definition(&self) -> &ModelDef {
        &self.definition
    }

    pub(crate) fn client(&self) -> &StorageClient {
        &self.context.client
    }

    pub(crate) fn strict(&self) -> bool {
        self.context.options.strict
    }

    pub(crate) fn key(&self, id: &str) -> ItemKey {
        ItemKey::for_document(self.name(), id)
    }

    /// Creates a document: defaults, then `payload`, then the system fields.
    pub async fn create(&self, payload: Document) -> DocumentStoreResult<HydratedDocument> {
        self.insert(Uuid::new_v4().to_string(), payload).await
    }

    /// Creates a document from a serializable value.
    pub async fn create_from<T: Serialize>(&self, value: &T) -> DocumentStoreResult<HydratedDocument> {
        let payload = to_document(value)?;
        self.create(payload).await
    }

    /// Looks a document up by id with a single point read.
    pub fn find_by_id(&self, id: impl Into<String>) -> Query<One, Hydrated> {
        Query::new(self.clone(), Loader::ById(id.into()))
    }

    /// Finds every document matching `filter`.
    pub fn find(&self, filter: impl Into<Filter>) -> Query<Many, Hydrated> {
        Query::new(self.clone(), Loader::Scan(filter.into()))
    }

    /// Finds the first document matching `filter`, after any sort.
    pub fn find_one(&self, filter: impl Into<Filter>) -> Query<One, Hydrated> {
        Query::new(self.clone(), Loader::Scan(filter.into()))
    }

    /// Counts the documents matching `filter`.
    pub async fn count_documents(&self, filter: impl Into<Filter>) -> DocumentStoreResult<u64> {
        let filter = self.prepare_filter(filter.into())?;
        Ok(self.scan_matching(&filter).await?.len() as u64)
    }

    /// Whether any document matches `filter`.
    pub async fn exists(&self, filter: impl Into<Filter>) -> DocumentStoreResult<bool> {
        Ok(self.count_documents(filter).await? > 0)
    }

    /// Applies `update` to every matching document, writing each one back separately.
    pub async fn update_many(
        &self,
        filter: impl Into<Filter>,
        update: impl Into<Update>,
    ) -> DocumentStoreResult<UpdateResult> {
        let filter = self.prepare_filter(filter.into())?;
        let update = update.into().sanitize(self.strict())?;
        let matches = self.scan_matching(&filter).await?;
        let mut result = UpdateResult {
            matched_count: matches.len() as u64,
            ..UpdateResult::default()
        };

        for document in matches {
            if self.rewrite(document, &update).await? {
                result.modified_count += 1;
            }
        }

        debug!(model = %self.name(), matched = result.matched_count, modified = result.modified_count, "update many");
        Ok(result)
    }

    /// Applies `update` to the first matching document, or upserts.
    pub async fn update_one(
        &self,
        filter: impl Into<Filter>,
        update: impl Into<Update>,
        options: UpdateOptions,
    ) -> DocumentStoreResult<UpdateResult> {
        let filter = self.prepare_filter(filter.into())?;
        let update = update.into().sanitize(self.strict())?;

        match self.scan_matching(&filter).await?.into_iter().next() {
            Some(document) => {
                let modified = self.rewrite(document, &update).await?;
                Ok(UpdateResult {
                    matched_count: 1,
                    modified_count: modified as u64,
                    upserted_id: None,
                })
            }
            None if options.upsert => {
                let created = self.upsert(&filter, &update).await?;
                Ok(UpdateResult {
                    upserted_id: Some(created.id().to_string()),
                    ..UpdateResult::default()
                })
            }
            None => Ok(UpdateResult::default()),
        }
    }

    /// Updates the first matching document and returns it as updated.
    ///
    /// With `upsert`, a missing match creates a document seeded from the filter's
    /// equality conditions plus the update. An `id` equality in the filter is kept as
    /// the new document's id, so repeated upserts by id address the same document.
    /// If that id already belongs to a document the filter did not match, the upsert
    /// gets a fresh id instead of overwriting it.
    ///
    /// # Errors
    ///
    /// Strict stores return [`DocumentStoreError::DuplicateId`] instead of picking a
    /// fresh id.
    pub async fn find_one_and_update(
        &self,
        filter: impl Into<Filter>,
        update: impl Into<Update>,
        options: UpdateOptions,
    ) -> DocumentStoreResult<Option<HydratedDocument>> {
        let filter = self.prepare_filter(filter.into())?;
        let update = update.into().sanitize(self.strict())?;

        match self.scan_matching(&filter).await?.into_iter().next() {
            Some(document) => {
                let mut hydrated = HydratedDocument::from_stored(self.clone(), document, false, None);
                hydrated.apply(&update);
                hydrated.save().await?;
                Ok(Some(hydrated))
            }
            None if options.upsert => Ok(Some(self.upsert(&filter, &update).await?)),
            None => Ok(None),
        }
    }

    /// Deletes every matching document with one point delete each.
    pub async fn delete_many(&self, filter: impl Into<Filter>) -> DocumentStoreResult<DeleteResult> {
        let filter = self.prepare_filter(filter.into())?;
        let mut result = DeleteResult::default();

        for document in self.scan_matching(&filter).await? {
            if self.remove(&document).await? {
                result.deleted_count += 1;
            }
        }

        debug!(model = %self.name(), deleted = result.deleted_count, "delete many");
        Ok(result)
    }

    /// Deletes the first matching document.
    pub async fn delete_one(&self, filter: impl Into<Filter>) -> DocumentStoreResult<DeleteResult> {
        let filter = self.prepare_filter(filter.into())?;

        let deleted = match self.scan_matching(&filter).await?.first() {
            Some(document) => self.remove(document).await?,
            None => false,
        };

        Ok(DeleteResult { deleted_count: deleted as u64 })
    }

    /// Runs an aggregation pipeline over every document of the model.
    pub async fn aggregate(&self, pipeline: impl Into<Pipeline>) -> DocumentStoreResult<Vec<Document>> {
        let pipeline = pipeline.into();
        if self.strict() {
            pipeline.ensure_supported()?;
        }

        let rows = self.client().scan_all(Some(self.name())).await?;
        pipeline.run(rows)
    }

    pub(crate) fn prepare_filter(&self, filter: Filter) -> DocumentStoreResult<Filter> {
        if self.strict() {
            filter.ensure_supported()?;
        } else {
            for (path, operator) in filter.unsupported() {
                warn!(model = %self.name(), path, operator, "unsupported filter operator never matches");
            }
        }

        Ok(filter)
    }

    pub(crate) async fn scan_matching(&self, filter: &Filter) -> DocumentStoreResult<Vec<Document>> {
        let documents = self.client().scan_all(Some(self.name())).await?;
        Ok(DocumentEvaluator::filter_documents(documents, filter))
    }

    pub(crate) async fn load_by_id(&self, id: &str) -> DocumentStoreResult<Option<Document>> {
        let item = self.client().get_by_key(&self.key(id)).await?;
        Ok(item.filter(|item| item.get(MODEL).and_then(Bson::as_str) == Some(self.name())))
    }

    /// Resolves the model a populate field joins to.
    ///
    /// Lenient stores log and return `None` for fields without a join definition and
    /// for targets missing from the registry.
    pub(crate) fn join_target(&self, field: &str) -> DocumentStoreResult<Option<String>> {
        let Some(target) = self.definition.populate_target(field) else {
            if self.strict() {
                return Err(DocumentStoreError::UnknownPopulateField {
                    model: self.name().to_string(),
                    field: field.to_string(),
                });
            }
            warn!(model = %self.name(), field, "no populate definition for field");
            return Ok(None);
        };

        if !self.context.registry.contains(target) {
            if self.strict() {
                return Err(DocumentStoreError::ModelNotFound(target.to_string()));
            }
            warn!(model = %self.name(), field, target, "populate target is not registered");
            return Ok(None);
        }

        Ok(Some(target.to_string()))
    }

    /// Normalizes `document`, stamps the identity fields for `id` and writes it.
    pub(crate) async fn persist(&self, id: &str, document: Document) -> DocumentStoreResult<Document> {
        let key = self.key(id);
        let mut document = codec::normalize_document(document);

        document.insert(ID, id);
        document.insert(MODEL, self.name());
        document.insert(PRIMARY_KEY, key.primary_key);
        document.insert(SORT_KEY, key.sort_key);

        self.client().put(document.clone()).await?;
        Ok(document)
    }

    async fn insert(&self, id: String, payload: Document) -> DocumentStoreResult<HydratedDocument> {
        let mut document = self.definition.default_values().clone();
        for (field, value) in payload {
            document.insert(field, value);
        }

        let now = codec::now();
        document.insert(CREATED_AT, now.clone());
        document.insert(UPDATED_AT, now);

        let document = self.persist(&id, document).await?;
        debug!(model = %self.name(), id = %id, "created document");

        Ok(HydratedDocument::new(self.clone(), id, document))
    }

    async fn upsert(&self, filter: &Filter, update: &Update) -> DocumentStoreResult<HydratedDocument> {
        let mut seed = filter.seed_document();
        update.apply(&mut seed);

        let id = match filter.id_equality() {
            Some(id) if self.load_by_id(&id).await?.is_some() => {
                if self.strict() {
                    return Err(DocumentStoreError::DuplicateId {
                        model: self.name().to_string(),
                        id,
                    });
                }
                warn!(model = %self.name(), id = %id, "upsert id is taken, assigning a new one");
                Uuid::new_v4().to_string()
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };
        self.insert(id, seed).await
    }

    async fn rewrite(&self, mut document: Document, update: &Update) -> DocumentStoreResult<bool> {
        let Some(id) = stored_id(&document) else {
            warn!(model = %self.name(), "skipping stored item without an id");
            return Ok(false);
        };

        update.apply(&mut document);
        touch(&mut document);
        self.persist(&id, document).await?;
        Ok(true)
    }

    async fn remove(&self, document: &Document) -> DocumentStoreResult<bool> {
        let Some(id) = stored_id(document) else {
            warn!(model = %self.name(), "skipping stored item without an id");
            return Ok(false);
        };

        self.client().delete(&self.key(&id)).await?;
        Ok(true)
    }
}

pub(crate) fn stored_id(document: &Document) -> Option<String> {
    document.get(ID).and_then(Bson::as_str).map(str::to_string)
}

/// Refreshes `updatedAt`, never letting it fall behind `createdAt`.
pub(crate) fn touch(document: &mut Document) {
    let now = codec::now();
    let updated_at = match document.get(CREATED_AT).and_then(Bson::as_str) {
        Some(created_at) if created_at > now.as_str() => created_at.to_string(),
        _ => now,
    };

    document.insert(UPDATED_AT, updated_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn touch_never_moves_before_creation() {
        let mut future = doc! { "createdAt": "9999-01-01T00:00:00.000Z" };
        let mut past = doc! { "createdAt": "2000-01-01T00:00:00.000Z" };

        touch(&mut future);
        touch(&mut past);

        assert_eq!(future.get_str("updatedAt").unwrap(), "9999-01-01T00:00:00.000Z");
        assert!(past.get_str("updatedAt").unwrap() > "2000-01-01T00:00:00.000Z");
    }

    #[test]
    fn definitions_collect_defaults_and_joins() {
        let definition = ModelDef::new("Comment")
            .default_value("likes", 0)
            .populate("author", "User");

        assert_eq!(definition.default_values(), &doc! { "likes": 0 });
        assert_eq!(definition.populate_target("author"), Some("User"));
        assert_eq!(definition.populate_target("likes"), None);
    }
}
