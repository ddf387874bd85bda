//! Customer sale document schema
//!
//! Records a retailer selling a product item to an end customer, mirrored
//! to the ledger as a `Customer` chaincode record keyed by the document id.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, Metadata, MutMetadata};

/// Collection name for customer sales
pub const SALE_COLLECTION: &str = "sales";

/// Customer sale document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SaleDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Product item that was sold
    pub product: ObjectId,

    /// Retailer that made the sale
    pub retailer: ObjectId,

    /// Customer name
    pub customer_name: String,

    /// Customer email
    pub customer_email: String,

    /// Sale price in minor currency units
    pub price: i64,

    /// When the sale happened
    pub sold_at: DateTime,
}

impl SaleDoc {
    pub fn new(
        product: ObjectId,
        retailer: ObjectId,
        customer_name: String,
        customer_email: String,
        price: i64,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            product,
            retailer,
            customer_name,
            customer_email,
            price,
            sold_at: DateTime::now(),
        }
    }
}

// bson::DateTime carries no Default, so the derive is unavailable here
impl Default for SaleDoc {
    fn default() -> Self {
        Self {
            _id: None,
            metadata: Metadata::default(),
            product: ObjectId::default(),
            retailer: ObjectId::default(),
            customer_name: String::new(),
            customer_email: String::new(),
            price: 0,
            sold_at: DateTime::from_millis(0),
        }
    }
}

impl IntoIndexes for SaleDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "product": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("product_unique".to_string())
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

impl MutMetadata for SaleDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
