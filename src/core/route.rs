// src/core/route.rs

//! Routes map a routing key to the set of queues a message pushed under that key reaches.

use crate::core::BrokerError;
use crate::core::registry::{EntityId, Named};
use bitflags::bitflags;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RouteFlags: u32 {
        const AUTO_DELETE = 1;
        const ROUND_ROBIN = 4;
    }
}

#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub flags: RouteFlags,
    keys: IndexMap<String, IndexSet<EntityId>>,
    cursors: HashMap<String, usize>,
}

impl Named for Route {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl Route {
    pub fn new(name: String, flags: RouteFlags) -> Self {
        Self {
            name,
            flags,
            keys: IndexMap::new(),
            cursors: HashMap::new(),
        }
    }

    pub fn bind(&mut self, key: &str, queue: EntityId) -> Result<(), BrokerError> {
        let bound = self.keys.entry(key.to_owned()).or_default();
        if !bound.insert(queue) {
            return Err(BrokerError::AlreadyExists("Binding"));
        }
        Ok(())
    }

    pub fn unbind(&mut self, key: &str, queue: EntityId) -> Result<(), BrokerError> {
        let bound = self
            .keys
            .get_mut(key)
            .ok_or(BrokerError::NotFound("Binding"))?;
        if !bound.shift_remove(&queue) {
            return Err(BrokerError::NotFound("Binding"));
        }
        if bound.is_empty() {
            self.drop_key(key);
        }
        Ok(())
    }

    /// Removes `queue` from every key. Returns true if any binding was removed.
    pub fn unbind_queue(&mut self, queue: EntityId) -> bool {
        let mut removed = false;
        let mut emptied = Vec::new();
        for (key, bound) in self.keys.iter_mut() {
            if bound.shift_remove(&queue) {
                removed = true;
                if bound.is_empty() {
                    emptied.push(key.clone());
                }
            }
        }
        for key in emptied {
            self.drop_key(&key);
        }
        removed
    }

    pub fn references(&self, queue: EntityId) -> bool {
        self.keys.values().any(|bound| bound.contains(&queue))
    }

    /// Resolves the queues a push under `key` must reach. A round-robin route
    /// yields one queue per call, rotating through the bound set.
    pub fn targets(&mut self, key: &str) -> Option<Vec<EntityId>> {
        let bound = self.keys.get(key)?;
        if bound.is_empty() {
            return None;
        }
        if !self.flags.contains(RouteFlags::ROUND_ROBIN) {
            return Some(bound.iter().copied().collect());
        }
        let cursor = self.cursors.entry(key.to_owned()).or_insert(0);
        let idx = *cursor % bound.len();
        *cursor = idx + 1;
        bound.get_index(idx).map(|q| vec![*q])
    }

    pub fn keys(&self) -> impl Iterator<Item = (&str, &IndexSet<EntityId>)> {
        self.keys.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn drop_key(&mut self, key: &str) {
        self.keys.shift_remove(key);
        self.cursors.remove(key);
    }
}
