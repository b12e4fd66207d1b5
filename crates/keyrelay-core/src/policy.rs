//! Authorization tiers.
//!
//! Every protected route declares the policy it requires; the admission gate
//! evaluates it against the privileges stored for the caller's passkey.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Privileges;

/// The privilege tier a route requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthorizationPolicy {
    /// Tier A: granted when either flag is set.
    SuperUserOrSudoer,
    /// Tier B: granted only to super users.
    SuperUserOnly,
}

impl AuthorizationPolicy {
    /// Check whether `privileges` satisfy this policy.
    pub fn permits(&self, privileges: &Privileges) -> bool {
        match self {
            AuthorizationPolicy::SuperUserOrSudoer => privileges.super_user || privileges.sudoer,
            AuthorizationPolicy::SuperUserOnly => privileges.super_user,
        }
    }
}

impl fmt::Display for AuthorizationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthorizationPolicy::SuperUserOrSudoer => f.write_str("super-user-or-sudoer"),
            AuthorizationPolicy::SuperUserOnly => f.write_str("super-user-only"),
        }
    }
}
