//! In-process identity store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use artefact_core::{ArtefactId, ArtefactIdentity, NewArtefactIdentity};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::{IdentityFilter, IdentityStore, StoreError};

/// [`IdentityStore`] held in memory. Ids start at 1 and are never reused.
#[derive(Debug)]
pub struct MemoryIdentityStore {
    rows: RwLock<BTreeMap<ArtefactId, ArtefactIdentity>>,
    next_id: AtomicU64,
}

impl Default for MemoryIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of stored identities.
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    fn select(&self, pred: impl Fn(&ArtefactIdentity) -> bool) -> Vec<ArtefactIdentity> {
        self.rows.read().values().filter(|i| pred(i)).cloned().collect()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn by_name(&self, name: &str) -> Result<Vec<ArtefactIdentity>, StoreError> {
        Ok(self.select(|i| i.name == name))
    }

    async fn by_id(&self, id: ArtefactId) -> Result<ArtefactIdentity, StoreError> {
        self.rows
            .read()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn save(&self, identity: &NewArtefactIdentity) -> Result<ArtefactIdentity, StoreError> {
        let id = ArtefactId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let saved = ArtefactIdentity {
            id,
            domain: identity.domain.clone(),
            name: identity.name.clone(),
            url: identity.url.clone(),
            created_at: Utc::now(),
        };
        self.rows.write().insert(id, saved.clone());
        Ok(saved)
    }

    async fn update(&self, identity: &ArtefactIdentity) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        let slot = rows
            .get_mut(&identity.id)
            .ok_or(StoreError::NotFound(identity.id))?;
        slot.url = identity.url.clone();
        Ok(())
    }

    async fn find(&self, filter: &IdentityFilter) -> Result<Vec<ArtefactIdentity>, StoreError> {
        Ok(self.select(|i| filter.matches(i)))
    }
}
