//! Permission levels for API operations

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::schemas::OrgRole;

/// Permission levels for API operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
#[derive(Default)]
pub enum PermissionLevel {
    /// No authentication - probes and public lookups
    #[default]
    Public = 0,
    /// Authenticated user - normal API operations
    Authenticated = 1,
    /// Admin - company approval and destructive operations
    Admin = 2,
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionLevel::Public => write!(f, "PUBLIC"),
            PermissionLevel::Authenticated => write!(f, "AUTHENTICATED"),
            PermissionLevel::Admin => write!(f, "ADMIN"),
        }
    }
}

impl PermissionLevel {
    /// Permission level granted to an organization role at login
    pub fn for_role(role: OrgRole) -> Self {
        match role {
            OrgRole::Admin => PermissionLevel::Admin,
            OrgRole::Company | OrgRole::Retailer | OrgRole::Customer => {
                PermissionLevel::Authenticated
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_ordering() {
        assert!(PermissionLevel::Admin > PermissionLevel::Authenticated);
        assert!(PermissionLevel::Authenticated > PermissionLevel::Public);
    }

    #[test]
    fn test_role_mapping() {
        assert_eq!(
            PermissionLevel::for_role(OrgRole::Admin),
            PermissionLevel::Admin
        );
        assert_eq!(
            PermissionLevel::for_role(OrgRole::Company),
            PermissionLevel::Authenticated
        );
        assert_eq!(
            PermissionLevel::for_role(OrgRole::Customer),
            PermissionLevel::Authenticated
        );
    }
}
