// src/core/engine.rs

//! The engine task: the single owner of all broker state.
//!
//! Connection tasks never touch the broker. They send `EngineEvent`s over an unbounded
//! channel, and the engine applies them one at a time, interleaved with its timers.

use crate::core::broker::Broker;
use crate::core::handler::dispatch;
use crate::core::persistence;
use crate::core::protocol::{Request, Response};
use crate::core::session::SessionId;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// How often expired messages, timed-out confirmations and idle sessions are handled.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);
/// How often the memory ceiling is re-evaluated.
const MEMORY_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Everything a connection task can tell the engine.
#[derive(Debug)]
pub enum EngineEvent {
    /// A new connection. Dropping `outbound` (by refusing or later removing the
    /// session) is what tells the connection task to hang up.
    Connect {
        id: SessionId,
        addr: String,
        outbound: mpsc::UnboundedSender<Response>,
    },
    Request {
        id: SessionId,
        request: Request,
    },
    Disconnect {
        id: SessionId,
    },
}

/// A cloneable sender for engine events, shared by every connection task.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineEvent>,
    next_id: Arc<AtomicU64>,
}

impl EngineHandle {
    pub fn next_session_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns false once the engine has stopped.
    pub fn send(&self, event: EngineEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Timer settings for the engine loop.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Autosave period; zero disables autosave.
    pub storage_timeout: Duration,
    pub save_on_shutdown: bool,
}

pub struct Engine {
    broker: Broker,
    rx: mpsc::UnboundedReceiver<EngineEvent>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(broker: Broker, options: EngineOptions) -> (Self, EngineHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = EngineHandle {
            tx,
            next_id: Arc::new(AtomicU64::new(0)),
        };
        (
            Self {
                broker,
                rx,
                options,
            },
            handle,
        )
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut Broker {
        &mut self.broker
    }

    /// Applies a single event.
    pub fn handle_event(&mut self, event: EngineEvent, now: Instant) {
        match event {
            EngineEvent::Connect { id, addr, outbound } => {
                // On refusal `outbound` is dropped here and the connection closes unanswered.
                let _ = self.broker.register_session(id, addr, outbound, now);
            }
            EngineEvent::Request { id, request } => dispatch(&mut self.broker, id, request, now),
            EngineEvent::Disconnect { id } => {
                self.broker.remove_session(id);
            }
        }
    }

    /// Runs the once-per-second maintenance pass.
    pub fn tick(&mut self, now: Instant) {
        self.broker.sweep_expired(now);
        if !self.broker.settings.client_timeout.is_zero() {
            self.broker.close_idle_sessions(now);
        }
    }

    /// Drives the engine until shutdown is signalled or every handle is dropped, then
    /// performs the final save.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        info!("Engine task started.");
        let mut maintenance = periodic(MAINTENANCE_INTERVAL);
        let mut memory_check = periodic(MEMORY_CHECK_INTERVAL);
        let mut autosave = if self.options.storage_timeout.is_zero() {
            info!("Autosave is disabled.");
            None
        } else {
            Some(periodic(self.options.storage_timeout))
        };

        loop {
            tokio::select! {
                // Timers go before the event channel; a busy channel must not starve them.
                biased;
                _ = shutdown_rx.recv() => {
                    info!("Engine received shutdown signal.");
                    break;
                }
                _ = maintenance.tick() => self.tick(Instant::now()),
                _ = memory_check.tick() => self.broker.check_memory(),
                _ = tick_optional(&mut autosave) => {
                    if self.broker.persistence.dirty() > 0 {
                        persistence::spawn_background_save(&self.broker);
                    }
                }
                event = self.rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event, Instant::now()),
                        None => {
                            debug!("All engine handles dropped.");
                            break;
                        }
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&mut self) {
        while self.broker.persistence.is_saving() {
            debug!("Waiting for in-progress snapshot save to finish before shutting down...");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let dirty = self.broker.persistence.dirty();
        if self.options.save_on_shutdown && dirty > 0 {
            info!("Performing final snapshot save on shutdown ({} changes)...", dirty);
            match persistence::save_blocking(&self.broker) {
                Ok(()) => info!("Final snapshot save completed successfully."),
                Err(e) => error!("CRITICAL: Final snapshot save on shutdown failed: {}", e),
            }
        }
        info!("Engine task finished.");
    }
}

fn periodic(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick_optional(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
