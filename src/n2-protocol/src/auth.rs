// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Authorization and token handling utilities.

use std::collections::HashMap;

use n2_core::{Actor, PermissionSet, RoleTable};

/// Strip the "Bearer " prefix from a token string (case-insensitive).
///
/// If the string starts with "Bearer " (ignoring case), returns the remainder.
/// Otherwise returns the original trimmed string.
pub fn strip_bearer(value: &str) -> &str {
    let trimmed = value.trim();
    let prefix = "bearer ";
    if trimmed.len() >= prefix.len() && trimmed[..prefix.len()].eq_ignore_ascii_case(prefix) {
        trimmed[prefix.len()..].trim_start()
    } else {
        trimmed
    }
}

/// Maps session tokens to roles and roles to permissions.
#[derive(Debug, Clone)]
pub struct RoleResolver {
    roles: RoleTable,
    tokens: HashMap<String, String>,
    default_role: String,
}

impl RoleResolver {
    pub fn new(roles: RoleTable, tokens: HashMap<String, String>, default_role: String) -> Self {
        Self {
            roles,
            tokens,
            default_role,
        }
    }

    fn actor_for(&self, role: &str) -> Actor {
        let permissions = self
            .roles
            .permissions(role)
            .unwrap_or_else(PermissionSet::empty);
        Actor::new(role, permissions)
    }

    /// Role held by a session that never presented a token.
    pub fn default_actor(&self) -> Actor {
        self.actor_for(&self.default_role)
    }

    /// Resolve a presented token to the role it grants.
    pub fn resolve(&self, token: &str) -> Result<Actor, String> {
        let candidate = strip_bearer(token);
        match self.tokens.get(candidate) {
            Some(role) => Ok(self.actor_for(role)),
            None => Err("invalid authorization token".into()),
        }
    }
}
