//! The model registry: name-to-definition lookup used for joins.
//!
//! The registry is an explicit value rather than process-wide state. It is assembled
//! once with [`ModelRegistryBuilder`], frozen by [`ModelRegistryBuilder::build`], and
//! handed to [`DocumentStore`](crate::store::DocumentStore). After that it is read-only
//! and can be shared freely between tasks; there is no removal.
//!
//! ```ignore
//! use bson::doc;
//! use kvdoc::{model::ModelDef, registry::ModelRegistry};
//!
//! let registry = ModelRegistry::builder()
//!     .register(ModelDef::new("User").default_value("likes", 0))
//!     .register(ModelDef::new("Comment").populate("author", "User"))
//!     .build()?;
//!
//! assert!(registry.resolve("User").is_some());
//! ```

use std::{collections::HashMap, sync::Arc};

use crate::{
    error::{DocumentStoreError, DocumentStoreResult},
    model::ModelDef,
};

/// An immutable, cheaply cloneable set of model definitions.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: Arc<HashMap<String, Arc<ModelDef>>>,
}

impl ModelRegistry {
    /// Starts an empty registry builder.
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    /// Looks a model definition up by name.
    pub fn resolve(&self, name: &str) -> Option<Arc<ModelDef>> {
        self.models.get(name).cloned()
    }

    /// Whether a model named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// The registered model names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names = self.models.keys().map(String::as_str).collect::<Vec<_>>();
        names.sort_unstable();
        names
    }
}

/// Collects model definitions before the registry is frozen.
#[derive(Debug, Default)]
pub struct ModelRegistryBuilder {
    models: Vec<ModelDef>,
}

impl ModelRegistryBuilder {
    /// Adds a model definition.
    pub fn register(mut self, model: ModelDef) -> Self {
        self.models.push(model);
        self
    }

    /// Freezes the registry.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::DuplicateModel`] if two definitions share a name.
    pub fn build(self) -> DocumentStoreResult<ModelRegistry> {
        let mut models = HashMap::with_capacity(self.models.len());

        for model in self.models {
            let name = model.name().to_string();
            if models.insert(name.clone(), Arc::new(model)).is_some() {
                return Err(DocumentStoreError::DuplicateModel(name));
            }
        }

        Ok(ModelRegistry { models: Arc::new(models) })
    }
}
