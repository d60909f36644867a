use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::entity::Entity;
use crate::record::RecordId;
use crate::search::{self, Searchable};

/// Shared handle a view owns; coordinators only keep a weak reference to it.
pub type StoreHandle<T> = Arc<RwLock<CollectionStore<T>>>;

/// Ordered, id-unique list of normalized entities for one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionStore<T> {
    entities: Vec<T>,
}

impl<T> Default for CollectionStore<T> {
    fn default() -> Self {
        Self {
            entities: Vec::new(),
        }
    }
}

impl<T: Entity> CollectionStore<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shared() -> StoreHandle<T> {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Replaces the whole sequence. Later duplicates of an id are dropped.
    pub fn replace_all(&mut self, entities: Vec<T>) {
        let mut unique: Vec<T> = Vec::with_capacity(entities.len());
        for entity in entities {
            if unique.iter().any(|existing| existing.id() == entity.id()) {
                debug!(collection = T::KIND.collection(), id = %entity.id(), "duplicate dropped");
                continue;
            }
            unique.push(entity);
        }
        self.entities = unique;
    }

    /// Appends `entity`. An entity whose id is already present replaces the
    /// existing entry in place instead; returns whether it was appended.
    pub fn insert(&mut self, entity: T) -> bool {
        if let Some(slot) = self
            .entities
            .iter_mut()
            .find(|existing| existing.id() == entity.id())
        {
            *slot = entity;
            return false;
        }
        self.entities.push(entity);
        true
    }

    /// Replaces the entity with `id` by `updater(existing)`.
    ///
    /// Missing ids are a silent no-op (the view may be stale); returns whether
    /// an entity was replaced.
    pub fn replace_by_id(&mut self, id: &RecordId, updater: impl FnOnce(&T) -> T) -> bool {
        let Some(slot) = self.entities.iter_mut().find(|entity| entity.id() == id) else {
            debug!(collection = T::KIND.collection(), id = %id, "replace skipped, id not in store");
            return false;
        };
        *slot = updater(slot);
        true
    }

    /// Removes the entity with `id`; absent ids are a no-op.
    pub fn remove_by_id(&mut self, id: &RecordId) -> Option<T> {
        let index = self.entities.iter().position(|entity| entity.id() == id)?;
        Some(self.entities.remove(index))
    }

    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<&T> {
        self.entities.iter().find(|entity| entity.id() == id)
    }

    #[must_use]
    pub fn contains(&self, id: &RecordId) -> bool {
        self.get(id).is_some()
    }

    #[must_use]
    pub fn entities(&self) -> &[T] {
        &self.entities
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl<T: Entity + Searchable> CollectionStore<T> {
    #[must_use]
    pub fn filtered(&self, query: &str) -> Vec<&T> {
        search::filter(&self.entities, query)
    }
}
