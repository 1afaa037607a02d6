//! Role and decision types for the authorization gate
//!
//! Callers carry exactly one [`Role`]. The gate turns a role plus an
//! operation request into a [`GateDecision`], which always has a
//! human-readable reason because the reason is returned to the caller and
//! written to the audit log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Privilege level of a caller
///
/// # Examples
///
/// ```rust
/// use calc_api::auth::permissions::Role;
///
/// assert_eq!(Role::Admin.to_string(), "admin");
/// assert_eq!("user".parse::<Role>().unwrap(), Role::User);
/// assert!(Role::Admin.is_admin());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// No valid credentials presented
    Anonymous,
    /// Authenticated, subject to input thresholds
    User,
    /// Unrestricted
    Admin,
}

impl Role {
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, Role::Anonymous)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Anonymous => "anonymous",
            Role::User => "user",
            Role::Admin => "admin",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anonymous" => Ok(Role::Anonymous),
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// Result of an authorization check
///
/// Both outcomes carry the reason text shown to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: String,
}

impl GateDecision {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}
