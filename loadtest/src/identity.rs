//! Synthetic user identities
//!
//! A worker id maps to a login deterministically; nothing is stored.

use crate::config::UsersConfig;

/// Login credentials of one virtual user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: usize,
    pub email: String,
    pub password: String,
}

impl Identity {
    pub fn for_id(id: usize, users: &UsersConfig) -> Self {
        Self {
            id,
            email: generate_email(id, users),
            password: users.password.clone(),
        }
    }
}

/// Email of the account provisioned for worker `id`
pub fn generate_email(id: usize, users: &UsersConfig) -> String {
    format!("{}{}@{}", users.email_prefix, id, users.email_domain)
}
