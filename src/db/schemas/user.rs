//! User document schema
//!
//! One collection for every account kind: platform admins, manufacturing
//! companies, retailers, and customers. Companies and retailers are the
//! organizations mirrored to the ledger as `Company` records.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::mongo::{IntoIndexes, Metadata, MutMetadata};

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// Organization role of an account
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    Admin,
    Company,
    Retailer,
    #[default]
    Customer,
}

impl fmt::Display for OrgRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrgRole::Admin => write!(f, "admin"),
            OrgRole::Company => write!(f, "company"),
            OrgRole::Retailer => write!(f, "retailer"),
            OrgRole::Customer => write!(f, "customer"),
        }
    }
}

impl OrgRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(OrgRole::Admin),
            "company" => Some(OrgRole::Company),
            "retailer" => Some(OrgRole::Retailer),
            "customer" => Some(OrgRole::Customer),
            _ => None,
        }
    }
}

/// Admin approval status for companies and retailers
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
        }
    }
}

impl ApprovalStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// User identifier (email)
    pub identifier: String,

    /// Argon2 password hash
    pub password_hash: String,

    /// Display name shown in projections and API responses
    pub display_name: String,

    /// Organization role (admin, company, retailer, customer)
    #[serde(default)]
    pub org_role: OrgRole,

    /// Company or shop name (companies and retailers)
    #[serde(default)]
    pub company_name: String,

    /// Optional location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Admin approval status (companies and retailers start pending)
    #[serde(default)]
    pub approval_status: ApprovalStatus,

    /// Token version for invalidation (increment to invalidate all tokens)
    #[serde(default)]
    pub token_version: i32,

    /// Whether the user account is active
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl UserDoc {
    /// Create a new user document
    pub fn new(
        identifier: String,
        password_hash: String,
        display_name: String,
        org_role: OrgRole,
        company_name: String,
        location: Option<String>,
    ) -> Self {
        // Customers and admins need no approval; organizations start pending
        let approval_status = match org_role {
            OrgRole::Company | OrgRole::Retailer => ApprovalStatus::Pending,
            OrgRole::Admin | OrgRole::Customer => ApprovalStatus::Approved,
        };

        Self {
            _id: None,
            metadata: Metadata::default(),
            identifier,
            password_hash,
            display_name,
            org_role,
            company_name,
            location,
            approval_status,
            token_version: 1,
            is_active: true,
        }
    }

    /// Whether this account is an organization mirrored to the ledger
    pub fn is_organization(&self) -> bool {
        matches!(self.org_role, OrgRole::Company | OrgRole::Retailer)
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on identifier
            (
                doc! { "identifier": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("identifier_unique".to_string())
                        .build(),
                ),
            ),
            // Index on org_role for company/retailer listings
            (
                doc! { "org_role": 1 },
                Some(
                    IndexOptions::builder()
                        .name("org_role_index".to_string())
                        .build(),
                ),
            ),
            // Index on approval_status for admin review queues
            (
                doc! { "approval_status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("approval_status_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
