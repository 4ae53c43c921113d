// src/core/registry.rs

//! A named arena: entities are stored by a stable numeric id and looked up by name.
//!
//! Cross-references between entities (a route's bound queues, a session's declared
//! queues) hold ids, so renaming an entity never invalidates them.

use crate::core::BrokerError;
use indexmap::IndexMap;
use std::collections::HashMap;

pub type EntityId = u64;

/// Implemented by every entity kept in a [`Registry`].
pub trait Named {
    fn name(&self) -> &str;
    fn set_name(&mut self, name: String);
}

#[derive(Debug)]
pub struct Registry<T> {
    kind: &'static str,
    next_id: EntityId,
    by_id: HashMap<EntityId, T>,
    // Insertion-ordered so listings are stable.
    by_name: IndexMap<String, EntityId>,
}

impl<T: Named> Registry<T> {
    /// `kind` is used in error messages, e.g. `"Queue"`.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            next_id: 1,
            by_id: HashMap::new(),
            by_name: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> Result<EntityId, BrokerError> {
        if self.by_name.contains_key(value.name()) {
            return Err(BrokerError::AlreadyExists(self.kind));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.by_name.insert(value.name().to_owned(), id);
        self.by_id.insert(id, value);
        Ok(id)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn id_of(&self, name: &str) -> Option<EntityId> {
        self.by_name.get(name).copied()
    }

    /// Like [`Registry::id_of`], but a missing name is a `NotFound` error.
    pub fn lookup(&self, name: &str) -> Result<EntityId, BrokerError> {
        self.id_of(name).ok_or(BrokerError::NotFound(self.kind))
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.by_id.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.by_id.get_mut(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<&T> {
        self.id_of(name).and_then(|id| self.by_id.get(&id))
    }

    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut T> {
        let id = self.id_of(name)?;
        self.by_id.get_mut(&id)
    }

    /// Renames an entity in place, keeping its id and its position in listings.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<EntityId, BrokerError> {
        let index = self
            .by_name
            .get_index_of(from)
            .ok_or(BrokerError::NotFound(self.kind))?;
        if self.by_name.contains_key(to) {
            return Err(BrokerError::AlreadyExists(self.kind));
        }
        let Some((_, id)) = self.by_name.shift_remove_index(index) else {
            return Err(BrokerError::NotFound(self.kind));
        };
        self.by_name.shift_insert(index, to.to_owned(), id);
        if let Some(entity) = self.by_id.get_mut(&id) {
            entity.set_name(to.to_owned());
        }
        Ok(id)
    }

    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let entity = self.by_id.remove(&id)?;
        self.by_name.shift_remove(entity.name());
        Some(entity)
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.by_name
            .values()
            .filter_map(|id| self.by_id.get(id).map(|e| (*id, e)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> {
        self.by_id.iter_mut().map(|(id, e)| (*id, e))
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.by_name.values().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Removes every entity. Ids are never reused.
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_name.clear();
    }
}
