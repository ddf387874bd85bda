//! Product item document schema
//!
//! One physical unit produced in a batch, mirrored to the ledger as a
//! `Product` chaincode record keyed by the document id.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::mongo::{IntoIndexes, Metadata, MutMetadata};

/// Collection name for product items
pub const PRODUCT_COLLECTION: &str = "products";

/// Lifecycle status of a product item
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    InProduction,
    WithRetailer,
    Sold,
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProductStatus::InProduction => write!(f, "in_production"),
            ProductStatus::WithRetailer => write!(f, "with_retailer"),
            ProductStatus::Sold => write!(f, "sold"),
        }
    }
}

/// Product item document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ProductDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Serial number, unique per company
    pub serial_no: String,

    /// Batch this item was produced in
    pub batch: ObjectId,

    /// Product type (denormalized from the batch for direct filtering)
    pub product_type: ObjectId,

    /// Manufacturing company
    pub company: ObjectId,

    /// Retailer currently holding this item, if transferred
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retailer: Option<ObjectId>,

    /// Retail price in minor currency units
    pub price: i64,

    /// Lifecycle status
    #[serde(default)]
    pub status: ProductStatus,
}

impl ProductDoc {
    pub fn new(
        serial_no: String,
        batch: ObjectId,
        product_type: ObjectId,
        company: ObjectId,
        price: i64,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            serial_no,
            batch,
            product_type,
            company,
            retailer: None,
            price,
            status: ProductStatus::InProduction,
        }
    }
}

impl IntoIndexes for ProductDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "company": 1, "serial_no": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("company_serial_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "batch": 1 },
                Some(
                    IndexOptions::builder()
                        .name("batch_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "retailer": 1 },
                Some(
                    IndexOptions::builder()
                        .name("retailer_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ProductDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
