//! Batch document schema
//!
//! A production batch of a single product type, mirrored to the ledger
//! as a `Batch` chaincode record keyed by the document id.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, Metadata, MutMetadata};

/// Collection name for batches
pub const BATCH_COLLECTION: &str = "batches";

/// Batch document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BatchDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Human-readable batch number, e.g. "B-2024-001"
    pub batch_no: String,

    /// Product type produced in this batch
    pub product_type: ObjectId,

    /// Company that owns this batch
    pub company: ObjectId,

    /// Number of units in the batch
    pub quantity: i64,

    /// Production start date
    pub start_date: DateTime,

    /// Production end date, absent while the batch is open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime>,
}

impl BatchDoc {
    pub fn new(
        batch_no: String,
        product_type: ObjectId,
        company: ObjectId,
        quantity: i64,
        start_date: DateTime,
        end_date: Option<DateTime>,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            batch_no,
            product_type,
            company,
            quantity,
            start_date,
            end_date,
        }
    }
}

// bson::DateTime carries no Default, so the derive is unavailable here
impl Default for BatchDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            batch_no: String::new(),
            product_type: ObjectId::default(),
            company: ObjectId::default(),
            quantity: 0,
            start_date: DateTime::from_millis(0),
            end_date: None,
        }
    }
}

impl IntoIndexes for BatchDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "company": 1, "batch_no": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("company_batch_no_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "product_type": 1 },
                Some(
                    IndexOptions::builder()
                        .name("product_type_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for BatchDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
