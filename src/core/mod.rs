// src/core/mod.rs

//! The broker engine: protocol, entities, delivery logic and persistence.

pub mod acl;
pub mod admission;
pub mod broker;
pub mod channel;
pub mod commands;
pub mod engine;
pub mod errors;
pub mod handler;
pub mod metrics;
pub mod persistence;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod route;
pub mod session;

pub use commands::Command;
pub use errors::BrokerError;
