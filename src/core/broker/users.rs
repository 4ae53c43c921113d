// src/core/broker/users.rs

use super::{Broker, validate_name};
use crate::core::BrokerError;
use crate::core::acl::{AuthenticatedUser, Permissions, User};
use crate::core::session::SessionId;
use tracing::{info, warn};

/// Bit 0 of the optional `auth` flags byte.
pub const AUTH_FLAG_NOACK: u8 = 1;

fn parse_permissions(bits: u64) -> Result<Permissions, BrokerError> {
    Permissions::from_bits(bits).ok_or_else(|| {
        BrokerError::InvalidArgument(format!("unknown permission bits 0x{bits:x}"))
    })
}

impl Broker {
    /// Authenticates a session. On failure the session is left unauthenticated.
    pub fn auth(
        &mut self,
        session: SessionId,
        name: &str,
        password: &str,
        flags: u8,
    ) -> Result<(), BrokerError> {
        let identity = self
            .users
            .by_name(name)
            .filter(|user| user.verify_password(password))
            .map(AuthenticatedUser::from);
        let s = self.session_mut_or_err(session)?;
        s.noack = flags & AUTH_FLAG_NOACK != 0;
        match identity {
            Some(identity) => {
                info!("Session {} authenticated as '{}'.", session, identity.name);
                s.auth = Some(identity);
                Ok(())
            }
            None => {
                warn!("Failed authentication for '{}' from {}.", name, s.addr);
                s.auth = None;
                Err(BrokerError::NotAuthenticated)
            }
        }
    }

    /// Creates the configured administrator with every permission if it is missing.
    pub fn ensure_admin(&mut self) -> Result<(), BrokerError> {
        let name = self.settings.admin_name.clone();
        if self.users.contains(&name) {
            return Ok(());
        }
        validate_name("User", &name)?;
        let admin = User::new(name.clone(), &self.settings.admin_password, Permissions::all())?;
        self.users.insert(admin)?;
        info!("Created administrator account '{}'.", name);
        Ok(())
    }

    pub fn user_create(&mut self, name: &str, password: &str, perms: u64) -> Result<(), BrokerError> {
        validate_name("User", name)?;
        let permissions = parse_permissions(perms)?;
        if self.users.contains(name) {
            return Err(BrokerError::AlreadyExists("User"));
        }
        self.users
            .insert(User::new(name.to_owned(), password, permissions)?)?;
        info!("User '{}' created.", name);
        self.mark_dirty();
        Ok(())
    }

    pub fn user_list(&self) -> Vec<(String, Permissions)> {
        self.users
            .iter()
            .map(|(_, u)| (u.name.clone(), u.permissions))
            .collect()
    }

    pub fn user_rename(&mut self, from: &str, to: &str) -> Result<(), BrokerError> {
        validate_name("User", to)?;
        self.guard_admin(from, "renamed")?;
        self.users.rename(from, to)?;
        self.mark_dirty();
        Ok(())
    }

    /// Replaces a user's permissions. Sessions already authenticated as that user keep
    /// the set they cached at `auth` time.
    pub fn user_set_perm(&mut self, name: &str, perms: u64) -> Result<(), BrokerError> {
        let permissions = parse_permissions(perms)?;
        let user = self
            .users
            .by_name_mut(name)
            .ok_or(BrokerError::NotFound("User"))?;
        user.permissions = permissions;
        self.mark_dirty();
        Ok(())
    }

    pub fn user_delete(&mut self, name: &str) -> Result<(), BrokerError> {
        self.guard_admin(name, "deleted")?;
        let id = self.users.lookup(name)?;
        self.users.remove(id);
        info!("User '{}' deleted.", name);
        self.mark_dirty();
        Ok(())
    }

    fn guard_admin(&self, name: &str, action: &str) -> Result<(), BrokerError> {
        if name == self.settings.admin_name {
            return Err(BrokerError::InvalidArgument(format!(
                "the administrator account cannot be {action}"
            )));
        }
        Ok(())
    }
}
