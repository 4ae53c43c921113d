// src/core/broker/routes.rs

use super::{Broker, validate_name};
use crate::core::BrokerError;
use crate::core::registry::EntityId;
use crate::core::route::{Route, RouteFlags};
use bytes::Bytes;
use tokio::time::Instant;
use tracing::{info, warn};

/// A row of `route_list`.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteSummary {
    pub name: String,
    pub flags: u32,
    pub keys: u32,
}

impl Broker {
    pub fn route_create(&mut self, name: &str, flags: u32) -> Result<EntityId, BrokerError> {
        validate_name("Route", name)?;
        let flags = RouteFlags::from_bits(flags)
            .ok_or_else(|| BrokerError::InvalidArgument(format!("unknown route flags 0x{flags:x}")))?;
        let id = self.routes.insert(Route::new(name.to_owned(), flags))?;
        info!("Route '{}' created (flags {:?}).", name, flags);
        self.mark_dirty();
        Ok(id)
    }

    pub fn route_exist(&self, name: &str) -> bool {
        self.routes.contains(name)
    }

    pub fn route_list(&self) -> Vec<RouteSummary> {
        self.routes
            .iter()
            .map(|(_, r)| RouteSummary {
                name: r.name.clone(),
                flags: r.flags.bits(),
                keys: r.key_count() as u32,
            })
            .collect()
    }

    /// Lists each routing key with the names of the queues bound to it.
    pub fn route_keys(&self, name: &str) -> Result<Vec<(String, Vec<String>)>, BrokerError> {
        let route = self
            .routes
            .by_name(name)
            .ok_or(BrokerError::NotFound("Route"))?;
        Ok(route
            .keys()
            .map(|(key, bound)| {
                let queues = bound
                    .iter()
                    .filter_map(|id| self.queues.get(*id).map(|q| q.name.clone()))
                    .collect();
                (key.to_owned(), queues)
            })
            .collect())
    }

    pub fn route_rename(&mut self, from: &str, to: &str) -> Result<(), BrokerError> {
        validate_name("Route", to)?;
        self.routes.rename(from, to)?;
        self.mark_dirty();
        Ok(())
    }

    pub fn route_bind(&mut self, name: &str, queue: &str, key: &str) -> Result<(), BrokerError> {
        let route_id = self.routes.lookup(name)?;
        let queue_id = self.queues.lookup(queue)?;
        if let Some(route) = self.routes.get_mut(route_id) {
            route.bind(key, queue_id)?;
        }
        if let Some(q) = self.queues.get_mut(queue_id) {
            q.routes.insert(route_id);
        }
        self.mark_dirty();
        Ok(())
    }

    pub fn route_unbind(&mut self, name: &str, queue: &str, key: &str) -> Result<(), BrokerError> {
        let route_id = self.routes.lookup(name)?;
        let queue_id = self.queues.lookup(queue)?;
        let route = self
            .routes
            .get_mut(route_id)
            .ok_or(BrokerError::NotFound("Route"))?;
        route.unbind(key, queue_id)?;
        let still_bound = route.references(queue_id);
        let drop_route = route.flags.contains(RouteFlags::AUTO_DELETE) && route.is_empty();
        if !still_bound && let Some(q) = self.queues.get_mut(queue_id) {
            q.routes.shift_remove(&route_id);
        }
        if drop_route {
            self.remove_route(route_id);
        }
        self.mark_dirty();
        Ok(())
    }

    /// Pushes a copy of the message into every queue bound to `key`, or into the next
    /// queue in rotation for a round-robin route. Each target succeeds or fails on its
    /// own; returns the number of queues that accepted the message.
    pub fn route_push(
        &mut self,
        name: &str,
        key: &str,
        expire_ms: u32,
        payload: Bytes,
        now: Instant,
    ) -> Result<u32, BrokerError> {
        let route = self
            .routes
            .by_name_mut(name)
            .ok_or(BrokerError::NotFound("Route"))?;
        let targets = route
            .targets(key)
            .ok_or(BrokerError::NotFound("Routing key"))?;

        let mut accepted = 0;
        for queue_id in targets {
            match self.push_to_queue(queue_id, expire_ms, payload.clone(), now) {
                Ok(()) => accepted += 1,
                Err(e) => warn!(
                    "Route '{}' push to queue {} under key '{}' failed: {}",
                    name, queue_id, key, e
                ),
            }
        }
        Ok(accepted)
    }

    pub fn route_delete(&mut self, name: &str) -> Result<(), BrokerError> {
        let id = self.routes.lookup(name)?;
        self.remove_route(id);
        self.mark_dirty();
        Ok(())
    }

    /// Removes a route and its back-references from every bound queue.
    pub(crate) fn remove_route(&mut self, id: EntityId) {
        let Some(route) = self.routes.remove(id) else {
            return;
        };
        for (_, bound) in route.keys() {
            for queue_id in bound {
                if let Some(q) = self.queues.get_mut(*queue_id) {
                    q.routes.shift_remove(&id);
                }
            }
        }
        info!("Route '{}' deleted.", route.name);
    }

    /// Drops every binding of a deleted queue from a route, removing the route if it is
    /// auto-delete and now empty.
    pub(crate) fn detach_queue_from_route(&mut self, route_id: EntityId, queue_id: EntityId) {
        let Some(route) = self.routes.get_mut(route_id) else {
            return;
        };
        route.unbind_queue(queue_id);
        if route.flags.contains(RouteFlags::AUTO_DELETE) && route.is_empty() {
            self.remove_route(route_id);
        }
    }
}
