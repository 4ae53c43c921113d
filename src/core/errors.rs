// src/core/errors.rs

//! Defines the primary error type for the broker engine.

use crate::core::protocol::ErrorTag;
use std::sync::Arc;
use thiserror::Error;

/// Every failure a broker operation can produce.
///
/// Handler-level variants are reported to the requesting client as an `ERR` frame and the
/// session stays open. `Protocol` and `TooManyClients` terminate the connection instead.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    AlreadyExists(&'static str),

    #[error("Not authorized to run '{0}'")]
    NotAuthorized(&'static str),

    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Queue is full")]
    QueueFull,

    #[error("Message exceeds the queue's maximum message size")]
    MessageTooLarge,

    #[error("No message available")]
    Empty,

    #[error("Queue has not been declared by this client")]
    NotDeclared,

    #[error("OOM command not allowed when used memory > 'max_memory'")]
    OutOfMemory,

    #[error("Too many clients")]
    TooManyClients,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Persistence Error: {0}")]
    Persistence(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl BrokerError {
    /// Returns true when the error must close the connection instead of producing a reply.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            BrokerError::Io(_)
                | BrokerError::Protocol(_)
                | BrokerError::TooManyClients
        )
    }

    /// Maps the error onto the tag carried by an `ERR` response frame.
    pub fn tag(&self) -> ErrorTag {
        match self {
            BrokerError::NotFound(_) => ErrorTag::NotFound,
            BrokerError::AlreadyExists(_) => ErrorTag::AlreadyExists,
            BrokerError::NotAuthorized(_) => ErrorTag::NotAuthorized,
            BrokerError::NotAuthenticated => ErrorTag::NotAuthenticated,
            BrokerError::QueueFull => ErrorTag::QueueFull,
            BrokerError::MessageTooLarge => ErrorTag::MessageTooLarge,
            BrokerError::Empty => ErrorTag::Empty,
            BrokerError::NotDeclared => ErrorTag::NotDeclared,
            BrokerError::OutOfMemory => ErrorTag::OutOfMemory,
            BrokerError::InvalidArgument(_) => ErrorTag::InvalidArgument,
            BrokerError::Persistence(_) => ErrorTag::Persistence,
            BrokerError::Io(_)
            | BrokerError::Protocol(_)
            | BrokerError::TooManyClients
            | BrokerError::Internal(_) => ErrorTag::Internal,
        }
    }
}

// std::io::Error is not Clone, so it lives behind an Arc.
impl Clone for BrokerError {
    fn clone(&self) -> Self {
        match self {
            BrokerError::Io(e) => BrokerError::Io(Arc::clone(e)),
            BrokerError::Protocol(s) => BrokerError::Protocol(s.clone()),
            BrokerError::NotFound(s) => BrokerError::NotFound(s),
            BrokerError::AlreadyExists(s) => BrokerError::AlreadyExists(s),
            BrokerError::NotAuthorized(s) => BrokerError::NotAuthorized(s),
            BrokerError::NotAuthenticated => BrokerError::NotAuthenticated,
            BrokerError::QueueFull => BrokerError::QueueFull,
            BrokerError::MessageTooLarge => BrokerError::MessageTooLarge,
            BrokerError::Empty => BrokerError::Empty,
            BrokerError::NotDeclared => BrokerError::NotDeclared,
            BrokerError::OutOfMemory => BrokerError::OutOfMemory,
            BrokerError::TooManyClients => BrokerError::TooManyClients,
            BrokerError::InvalidArgument(s) => BrokerError::InvalidArgument(s.clone()),
            BrokerError::Persistence(s) => BrokerError::Persistence(s.clone()),
            BrokerError::Internal(s) => BrokerError::Internal(s.clone()),
        }
    }
}

impl PartialEq for BrokerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BrokerError::Io(e1), BrokerError::Io(e2)) => e1.to_string() == e2.to_string(),
            (BrokerError::Protocol(s1), BrokerError::Protocol(s2)) => s1 == s2,
            (BrokerError::NotFound(s1), BrokerError::NotFound(s2)) => s1 == s2,
            (BrokerError::AlreadyExists(s1), BrokerError::AlreadyExists(s2)) => s1 == s2,
            (BrokerError::NotAuthorized(s1), BrokerError::NotAuthorized(s2)) => s1 == s2,
            (BrokerError::InvalidArgument(s1), BrokerError::InvalidArgument(s2)) => s1 == s2,
            (BrokerError::Persistence(s1), BrokerError::Persistence(s2)) => s1 == s2,
            (BrokerError::Internal(s1), BrokerError::Internal(s2)) => s1 == s2,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl From<std::io::Error> for BrokerError {
    fn from(e: std::io::Error) -> Self {
        BrokerError::Io(Arc::new(e))
    }
}

impl From<std::str::Utf8Error> for BrokerError {
    fn from(_: std::str::Utf8Error) -> Self {
        BrokerError::Protocol("invalid UTF-8 in name or string field".into())
    }
}

impl From<std::string::FromUtf8Error> for BrokerError {
    fn from(_: std::string::FromUtf8Error) -> Self {
        BrokerError::Protocol("invalid UTF-8 in name or string field".into())
    }
}
