//! In-memory association store.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use super::association::{Association, AssociationClass};
use super::store::AssociationStore;

/// Process-local store. Clones share the same map.
///
/// Expired entries are swept on every write, so handles that are never
/// looked up again do not accumulate.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    associations: Arc<RwLock<HashMap<(AssociationClass, String), Association>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        tracing::debug!("creating new in-memory association store");
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.associations.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.associations.read().await.is_empty()
    }
}

impl AssociationStore for MemoryStore {
    type Error = Infallible;

    async fn store(
        &self,
        class: AssociationClass,
        association: Association,
    ) -> Result<(), Self::Error> {
        tracing::trace!(?class, handle = association.handle(), "MemoryStore::store");
        let mut associations = self.associations.write().await;
        let before = associations.len();
        let now = Utc::now();
        associations.retain(|_, existing| !existing.is_expired_at(now));
        let swept = before - associations.len();
        if swept > 0 {
            tracing::debug!(swept, "evicted expired associations");
        }
        associations.insert((class, association.handle().to_string()), association);
        Ok(())
    }

    async fn get(
        &self,
        class: AssociationClass,
        handle: &str,
    ) -> Result<Option<Association>, Self::Error> {
        tracing::trace!(?class, handle, "MemoryStore::get");
        Ok(self
            .associations
            .read()
            .await
            .get(&(class, handle.to_string()))
            .cloned())
    }

    async fn remove(&self, class: AssociationClass, handle: &str) -> Result<(), Self::Error> {
        tracing::trace!(?class, handle, "MemoryStore::remove");
        self.associations
            .write()
            .await
            .remove(&(class, handle.to_string()));
        Ok(())
    }
}
