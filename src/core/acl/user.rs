// src/core/acl/user.rs

use super::permissions::Permissions;
use crate::core::BrokerError;
use crate::core::registry::Named;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;

/// A broker account.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub name: String,
    /// The Argon2 password hash in PHC string format.
    pub password_hash: String,
    pub permissions: Permissions,
}

impl User {
    /// Creates a user, hashing the plaintext password.
    pub fn new(name: String, password: &str, permissions: Permissions) -> Result<Self, BrokerError> {
        Ok(Self {
            name,
            password_hash: hash_password(password)?,
            permissions,
        })
    }

    /// Restores a user whose password was hashed earlier, e.g. from a snapshot.
    pub fn from_hash(name: String, password_hash: String, permissions: Permissions) -> Self {
        Self {
            name,
            password_hash,
            permissions,
        }
    }

    pub fn verify_password(&self, password: &str) -> bool {
        match PasswordHash::new(&self.password_hash) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(_) => false,
        }
    }
}

impl Named for User {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

pub fn hash_password(password: &str) -> Result<String, BrokerError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| BrokerError::Internal("Password hashing failed".to_string()))
}

/// The identity a session caches after a successful `auth`.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    pub name: String,
    pub permissions: Permissions,
}

impl From<&User> for AuthenticatedUser {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            permissions: user.permissions,
        }
    }
}
