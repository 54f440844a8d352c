//! Lazily populated cache of engines keyed by index name.
//!
//! The registry is an ordinary value owned by the application and passed
//! to whatever needs an engine. Construction goes through one factory under
//! a single write lock with a second lookup, so concurrent first access to
//! an index name builds exactly one engine.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use unisearch_core::{Engine, EngineConfig, Operation, Result};

/// Builds the engine for an index name.
pub type EngineFactory = Box<dyn Fn(&str) -> Result<Arc<dyn Engine>> + Send + Sync>;

/// Index name to engine cache.
pub struct EngineRegistry {
    factory: EngineFactory,
    engines: RwLock<HashMap<String, Arc<dyn Engine>>>,
}

impl EngineRegistry {
    /// Create a registry that builds engines with `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&str) -> Result<Arc<dyn Engine>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            engines: RwLock::new(HashMap::new()),
        }
    }

    /// Create a registry whose engines come from [`crate::create_engine`].
    pub fn from_config(config: EngineConfig) -> Self {
        Self::new(move |index_name| crate::create_engine(&config, index_name))
    }

    /// The engine for `index_name`, if one has been created.
    pub fn get(&self, index_name: &str) -> Option<Arc<dyn Engine>> {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index_name)
            .cloned()
    }

    /// The engine for `index_name`, creating it on first request.
    ///
    /// # Errors
    ///
    /// Returns the factory's error. Nothing is cached on failure, so a
    /// later call tries again.
    pub fn get_or_create(&self, index_name: &str) -> Result<Arc<dyn Engine>> {
        if let Some(engine) = self.get(index_name) {
            return Ok(engine);
        }

        let mut engines = self
            .engines
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(engine) = engines.get(index_name) {
            return Ok(Arc::clone(engine));
        }

        let engine = (self.factory)(index_name)
            .map_err(|e| e.in_operation(Operation::CreateIndex, index_name))?;
        log::info!(
            "Created {} engine for index '{index_name}'",
            engine.backend()
        );
        engines.insert(index_name.to_string(), Arc::clone(&engine));
        Ok(engine)
    }

    /// Drop the cached engine for `index_name`, returning it.
    pub fn remove(&self, index_name: &str) -> Option<Arc<dyn Engine>> {
        self.engines
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(index_name)
    }

    /// Number of cached engines.
    pub fn len(&self) -> usize {
        self.engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` when no engine has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached index names, sorted.
    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .engines
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("index_names", &self.index_names())
            .finish_non_exhaustive()
    }
}
