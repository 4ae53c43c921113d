// src/core/acl/mod.rs

//! Users, permission bits and the check performed before every command.

pub mod permissions;
pub mod user;

pub use permissions::Permissions;
pub use user::{AuthenticatedUser, User};

use crate::core::BrokerError;
use crate::core::protocol::CommandId;

/// Verifies that `auth` may run `command`.
///
/// Public commands always pass. An unauthenticated session fails closed with
/// `NotAuthenticated`; a user without the command's bit gets `NotAuthorized`.
pub fn check_permission(
    command: CommandId,
    auth: Option<&AuthenticatedUser>,
) -> Result<(), BrokerError> {
    let Some(required) = command.required_permission() else {
        return Ok(());
    };
    let Some(user) = auth else {
        return Err(BrokerError::NotAuthenticated);
    };
    if user.permissions.contains(required) {
        Ok(())
    } else {
        Err(BrokerError::NotAuthorized(command.name()))
    }
}
