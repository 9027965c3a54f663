use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use super::{parse_model, SpecError, SpecStore};
use crate::model::ServiceModel;

/// Loads service models from a [`SpecStore`] and memoises them.
///
/// Loading is idempotent: every call for the same identifier returns the
/// same `Arc`. Concurrent first loads may parse twice, but only the first
/// model inserted is ever handed out.
pub struct ServiceModelLoader {
    store: Arc<dyn SpecStore>,
    cache: DashMap<String, Arc<ServiceModel>>,
}

impl ServiceModelLoader {
    pub fn new(store: Arc<dyn SpecStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    /// Returns the model for `service_id`, parsing it on first use.
    ///
    /// # Errors
    ///
    /// - [`SpecError::NotFound`] if the store has no document.
    /// - [`SpecError::Store`] if the store fails.
    /// - [`SpecError::Invalid`] if the document does not validate.
    pub fn load(&self, service_id: &str) -> Result<Arc<ServiceModel>, SpecError> {
        if let Some(model) = self.cache.get(service_id) {
            return Ok(Arc::clone(model.value()));
        }

        let document = self
            .store
            .fetch(service_id)
            .map_err(|source| SpecError::Store {
                service: service_id.to_string(),
                source,
            })?
            .ok_or_else(|| SpecError::NotFound(service_id.to_string()))?;

        let model = Arc::new(parse_model(service_id, &document)?);
        debug!(
            service = service_id,
            protocol = %model.protocol(),
            operations = model.operations().count(),
            "loaded service model"
        );

        let entry = self
            .cache
            .entry(service_id.to_string())
            .or_insert(model);
        Ok(Arc::clone(entry.value()))
    }

    /// Identifiers of models loaded so far.
    #[must_use]
    pub fn cached(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.cache.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for ServiceModelLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceModelLoader")
            .field("cached", &self.cached())
            .finish_non_exhaustive()
    }
}
