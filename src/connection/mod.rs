// src/connection/mod.rs

//! Manages the lifecycle of a single client connection: frame decoding, forwarding
//! requests to the engine, and writing replies and events back in order.

mod guard;
mod handler;
mod outbound;

pub use guard::ConnectionGuard;
pub use handler::ConnectionHandler;
pub use outbound::OutboundQueue;
