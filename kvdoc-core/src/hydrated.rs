//! Documents bound to their model.

use bson::{Bson, Document};
use serde::de::DeserializeOwned;
use std::ops::{Deref, DerefMut};
use tracing::{debug, warn};

use crate::{
    document::{CREATED_AT, ID, from_document, resolve_path, set_path},
    error::DocumentStoreResult,
    model::{Model, stored_id, touch},
    update::Update,
};

/// A stored document together with the model it belongs to.
///
/// Dereferences to the underlying [`Document`], so it can be read and edited in place
/// before calling [`save`](Self::save).
///
/// # Example
///
/// ```ignore
/// let mut player = players.find_by_id(id).await?.expect("player exists");
/// player.set("score", 42);
/// player.save().await?;
/// ```
#[derive(Debug, Clone)]
pub struct HydratedDocument {
    model: Model,
    id: String,
    document: Document,
    created_at: Option<Bson>,
    partial: bool,
    joined: Option<String>,
}

impl HydratedDocument {
    pub(crate) fn new(model: Model, id: String, document: Document) -> Self {
        let created_at = document.get(CREATED_AT).cloned();
        Self {
            model,
            id,
            document,
            created_at,
            partial: false,
            joined: None,
        }
    }

    /// Wraps a document read from storage.
    ///
    /// `partial` marks a projected read; `joined` names the field a populate replaced.
    pub(crate) fn from_stored(model: Model, document: Document, partial: bool, joined: Option<String>) -> Self {
        let id = stored_id(&document).unwrap_or_default();
        Self {
            partial,
            joined,
            ..Self::new(model, id, document)
        }
    }

    /// The document id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The model the document belongs to.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Whether the document was read through a projection.
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    /// The current in-memory state.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Unwraps the document, dropping the model handle.
    pub fn into_document(self) -> Document {
        self.document
    }

    /// Reads a dotted path.
    pub fn get(&self, path: &str) -> Option<&Bson> {
        resolve_path(&self.document, path)
    }

    /// Writes a dotted path, creating intermediate documents.
    pub fn set(&mut self, path: &str, value: impl Into<Bson>) -> bool {
        set_path(&mut self.document, path, value.into())
    }

    /// Applies update operators in memory. Nothing is written until [`save`](Self::save).
    pub fn apply(&mut self, update: &Update) {
        update.apply(&mut self.document);
    }

    /// Deserializes the document into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> DocumentStoreResult<T> {
        from_document(self.document.clone())
    }

    /// Writes the current state back, refreshing `updatedAt`.
    ///
    /// The identity fields and `createdAt` are restored to their stored values, and
    /// populated values are written back as ids. A partial document is merged onto the
    /// stored item so fields outside the projection survive. If that item has been
    /// deleted in the meantime, nothing is written.
    ///
    /// # Errors
    ///
    /// Propagates backend errors; the in-memory document is left unchanged on failure.
    pub async fn save(&mut self) -> DocumentStoreResult<()> {
        let mut document = self.document.clone();

        if let Some(field) = &self.joined {
            depopulate(&mut document, field);
        }

        if self.partial {
            let Some(stored) = self.model.load_by_id(&self.id).await? else {
                warn!(model = %self.model.name(), id = %self.id, "partial document is no longer stored, skipping save");
                return Ok(());
            };
            document = merge(stored, document);
        }

        if let Some(created_at) = &self.created_at {
            document.insert(CREATED_AT, created_at.clone());
        }
        touch(&mut document);

        let saved = self.model.persist(&self.id, document).await?;
        debug!(model = %self.model.name(), id = %self.id, "saved document");

        // Joined values stay resolved in memory.
        let joined_root = self.joined.as_deref().and_then(|field| field.split('.').next());
        for (field, value) in saved {
            if Some(field.as_str()) != joined_root {
                self.document.insert(field, value);
            }
        }
        self.created_at = self.document.get(CREATED_AT).cloned();
        self.partial = false;

        Ok(())
    }

    /// Deletes this document from storage.
    pub async fn delete_one(&self) -> DocumentStoreResult<()> {
        self.model.client().delete(&self.model.key(&self.id)).await?;
        debug!(model = %self.model.name(), id = %self.id, "deleted document");
        Ok(())
    }
}

impl Deref for HydratedDocument {
    type Target = Document;

    fn deref(&self) -> &Self::Target {
        &self.document
    }
}

impl DerefMut for HydratedDocument {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.document
    }
}

impl From<HydratedDocument> for Document {
    fn from(value: HydratedDocument) -> Self {
        value.into_document()
    }
}

/// Replaces joined documents at `field` with their ids.
fn depopulate(document: &mut Document, field: &str) {
    let Some(value) = resolve_path(document, field).cloned() else {
        return;
    };

    let restored = match value {
        Bson::Array(items) => Bson::Array(items.into_iter().map(joined_id).collect()),
        other => joined_id(other),
    };
    set_path(document, field, restored);
}

fn joined_id(value: Bson) -> Bson {
    match value {
        Bson::Document(joined) => match joined.get(ID) {
            Some(id) => id.clone(),
            None => Bson::Document(joined),
        },
        other => other,
    }
}

/// Overlays `partial` onto `stored`, descending into nested documents.
fn merge(mut stored: Document, partial: Document) -> Document {
    for (field, value) in partial {
        let merged = match (stored.remove(&field), value) {
            (Some(Bson::Document(base)), Bson::Document(overlay)) => Bson::Document(merge(base, overlay)),
            (_, value) => value,
        };
        stored.insert(field, merged);
    }

    stored
}
