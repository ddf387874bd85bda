//! Product type document schema
//!
//! Product types are catalog entries only; they never reach the ledger.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, Metadata, MutMetadata};

/// Collection name for product types
pub const PRODUCT_TYPE_COLLECTION: &str = "product_types";

/// Product type document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProductTypeDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Product type name (unique per company)
    pub name: String,

    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Company that created this product type
    pub created_by: ObjectId,
}

impl ProductTypeDoc {
    pub fn new(name: String, description: Option<String>, created_by: ObjectId) -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            name,
            description,
            created_by,
        }
    }
}

impl IntoIndexes for ProductTypeDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "created_by": 1, "name": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("company_name_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ProductTypeDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
