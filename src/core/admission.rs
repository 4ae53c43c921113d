// src/core/admission.rs

//! Memory-ceiling and client-count admission control.

use crate::core::BrokerError;
use crate::core::metrics;
use crate::core::protocol::CommandFlags;
use tracing::{info, warn};

/// Bookkeeping cost charged for every queue, route, channel and user.
pub const ENTITY_OVERHEAD: usize = 256;
/// Bookkeeping cost charged for every connected session.
pub const SESSION_OVERHEAD: usize = 1024;

#[derive(Debug)]
pub struct Admission {
    /// 0 means unlimited.
    max_memory: u64,
    max_clients: usize,
    used_memory: u64,
    over_limit: bool,
}

impl Admission {
    pub fn new(max_memory: u64, max_clients: usize) -> Self {
        Self {
            max_memory,
            max_clients,
            used_memory: 0,
            over_limit: false,
        }
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    pub fn used_memory(&self) -> u64 {
        self.used_memory
    }

    pub fn is_over_limit(&self) -> bool {
        self.over_limit
    }

    /// Checked synchronously when a new session is registered.
    pub fn admit_client(&self, connected: usize) -> Result<(), BrokerError> {
        if connected >= self.max_clients {
            return Err(BrokerError::TooManyClients);
        }
        Ok(())
    }

    /// Records a fresh memory figure and re-evaluates the ceiling.
    pub fn observe_memory(&mut self, used: u64) {
        self.used_memory = used;
        metrics::MEMORY_USED_BYTES.set(used as f64);
        let over = self.max_memory != 0 && used > self.max_memory;
        if over != self.over_limit {
            if over {
                warn!(
                    "Memory ceiling exceeded ({} > {} bytes). Refusing DENY_OOM commands.",
                    used, self.max_memory
                );
            } else {
                info!(
                    "Memory usage back under the ceiling ({} <= {} bytes).",
                    used, self.max_memory
                );
            }
            self.over_limit = over;
            metrics::OVER_MEMORY_LIMIT.set(if over { 1.0 } else { 0.0 });
        }
    }

    /// Rejects commands flagged `DENY_OOM` while the ceiling is exceeded.
    pub fn check_command(&self, flags: CommandFlags) -> Result<(), BrokerError> {
        if self.is_over_limit() && flags.contains(CommandFlags::DENY_OOM) {
            return Err(BrokerError::OutOfMemory);
        }
        Ok(())
    }
}
