//! Document schemas for traceway collections

pub mod batch;
pub mod product;
pub mod product_type;
pub mod sale;
pub mod user;

pub use batch::{BatchDoc, BATCH_COLLECTION};
pub use crate::db::mongo::Metadata;
pub use product::{ProductDoc, ProductStatus, PRODUCT_COLLECTION};
pub use product_type::{ProductTypeDoc, PRODUCT_TYPE_COLLECTION};
pub use sale::{SaleDoc, SALE_COLLECTION};
pub use user::{ApprovalStatus, OrgRole, UserDoc, USER_COLLECTION};
