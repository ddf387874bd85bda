//! Canonical projections of domain records
//!
//! A projection is the externally-visible state of a record: the exact
//! field set the ledger stored a digest of at write time. Reads must
//! recompute it byte-for-byte, so everything here is normalized:
//!
//! - identifiers become hex strings, never ObjectId values
//! - dates become ISO-8601 strings with millisecond precision and a Z suffix
//! - referenced documents collapse to a minimal `{id, name}` object
//! - an absent optional reference is an explicit `null`, never omitted
//!
//! Key order is enforced by the value type itself: projections are backed
//! by a `BTreeMap`, so serialization order is sorted key order no matter how
//! a projection was assembled. (`serde_json::Map` is not usable here: bson
//! turns on serde_json's `preserve_order` feature, which makes `Map`
//! insertion-ordered in any build that links bson.) Every endpoint that
//! digests an entity type goes through the one builder below for it.

use std::collections::BTreeMap;

use bson::oid::ObjectId;
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::db::schemas::{BatchDoc, ProductDoc, ProductTypeDoc, SaleDoc, UserDoc};

/// A required related record could not be resolved while projecting.
///
/// Recovered per-record: the caller skips reconciliation for the record and
/// reports it unverified. Never surfaced as a request failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unresolved reference '{field}' while projecting {entity}")]
pub struct ReferenceResolutionError {
    pub entity: &'static str,
    pub field: &'static str,
}

impl ReferenceResolutionError {
    fn new(entity: &'static str, field: &'static str) -> Self {
        Self { entity, field }
    }
}

/// Canonical projection of one domain record
///
/// Wraps a `BTreeMap`, whose sorted-key serialization is the canonical
/// form fed to the digest function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Projection(BTreeMap<String, Value>);

impl Projection {
    pub fn new() -> Self {
        Projection(BTreeMap::new())
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    /// Canonical JSON serialization (sorted keys, compact)
    pub fn canonical_json(&self) -> String {
        // BTreeMap<String, Value> cannot fail to serialize
        serde_json::to_string(&self.0).expect("projection serialization cannot fail")
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.0
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::new()
    }
}

impl From<BTreeMap<String, Value>> for Projection {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Projection(map)
    }
}

/// Render a bson DateTime as ISO-8601 with millisecond precision
fn iso_date(dt: bson::DateTime) -> Value {
    Value::String(
        dt.to_chrono()
            .to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

/// Minimal `{id, name}` shape for a referenced record
fn ref_summary(id: ObjectId, name: &str) -> Value {
    json!({ "id": id.to_hex(), "name": name })
}

fn require_id(
    id: Option<ObjectId>,
    entity: &'static str,
) -> Result<ObjectId, ReferenceResolutionError> {
    id.ok_or(ReferenceResolutionError::new(entity, "_id"))
}

/// Project a company or retailer account as a ledger `Company` record
pub fn company(user: &UserDoc) -> Result<Projection, ReferenceResolutionError> {
    let id = require_id(user._id, "company")?;

    let mut p = Projection::new();
    p.insert("id", Value::String(id.to_hex()));
    p.insert("name", Value::String(user.company_name.clone()));
    p.insert("email", Value::String(user.identifier.clone()));
    p.insert("role", Value::String(user.org_role.to_string()));
    p.insert(
        "location",
        user.location
            .as_ref()
            .map(|l| Value::String(l.clone()))
            .unwrap_or(Value::Null),
    );
    p.insert("status", Value::String(user.approval_status.to_string()));
    Ok(p)
}

/// Project a batch as a ledger `Batch` record
///
/// `product_type` and `company` must already be resolved; either missing is
/// a reference resolution failure.
pub fn batch(
    batch: &BatchDoc,
    product_type: Option<&ProductTypeDoc>,
    company: Option<&UserDoc>,
) -> Result<Projection, ReferenceResolutionError> {
    let id = require_id(batch._id, "batch")?;
    let product_type =
        product_type.ok_or(ReferenceResolutionError::new("batch", "product_type"))?;
    let company = company.ok_or(ReferenceResolutionError::new("batch", "company"))?;
    let pt_id = require_id(product_type._id, "batch")?;
    let company_id = require_id(company._id, "batch")?;

    let mut p = Projection::new();
    p.insert("id", Value::String(id.to_hex()));
    p.insert("batchNo", Value::String(batch.batch_no.clone()));
    p.insert("quantity", json!(batch.quantity));
    p.insert("startDate", iso_date(batch.start_date));
    p.insert(
        "endDate",
        batch.end_date.map(iso_date).unwrap_or(Value::Null),
    );
    p.insert("productType", ref_summary(pt_id, &product_type.name));
    p.insert("company", ref_summary(company_id, &company.company_name));
    Ok(p)
}

/// Project a product item as a ledger `Product` record
pub fn product(
    product: &ProductDoc,
    batch: Option<&BatchDoc>,
    product_type: Option<&ProductTypeDoc>,
    company: Option<&UserDoc>,
    retailer: Option<&UserDoc>,
) -> Result<Projection, ReferenceResolutionError> {
    let id = require_id(product._id, "product")?;
    let batch = batch.ok_or(ReferenceResolutionError::new("product", "batch"))?;
    let product_type =
        product_type.ok_or(ReferenceResolutionError::new("product", "product_type"))?;
    let company = company.ok_or(ReferenceResolutionError::new("product", "company"))?;
    let batch_id = require_id(batch._id, "product")?;
    let pt_id = require_id(product_type._id, "product")?;
    let company_id = require_id(company._id, "product")?;

    // Retailer is genuinely optional: null until the item is transferred
    let retailer_value = match retailer {
        Some(r) => ref_summary(require_id(r._id, "product")?, &r.company_name),
        None => Value::Null,
    };

    let mut p = Projection::new();
    p.insert("id", Value::String(id.to_hex()));
    p.insert("serialNo", Value::String(product.serial_no.clone()));
    p.insert("price", json!(product.price));
    p.insert("status", Value::String(product.status.to_string()));
    p.insert("batch", ref_summary(batch_id, &batch.batch_no));
    p.insert("productType", ref_summary(pt_id, &product_type.name));
    p.insert("company", ref_summary(company_id, &company.company_name));
    p.insert("retailer", retailer_value);
    Ok(p)
}

/// Project a customer sale as a ledger `Customer` record
pub fn sale(
    sale: &SaleDoc,
    product: Option<&ProductDoc>,
    retailer: Option<&UserDoc>,
) -> Result<Projection, ReferenceResolutionError> {
    let id = require_id(sale._id, "sale")?;
    let product = product.ok_or(ReferenceResolutionError::new("sale", "product"))?;
    let retailer = retailer.ok_or(ReferenceResolutionError::new("sale", "retailer"))?;
    let product_id = require_id(product._id, "sale")?;
    let retailer_id = require_id(retailer._id, "sale")?;

    let mut p = Projection::new();
    p.insert("id", Value::String(id.to_hex()));
    p.insert("customerName", Value::String(sale.customer_name.clone()));
    p.insert("customerEmail", Value::String(sale.customer_email.clone()));
    p.insert("price", json!(sale.price));
    p.insert("soldAt", iso_date(sale.sold_at));
    p.insert("product", ref_summary(product_id, &product.serial_no));
    p.insert("retailer", ref_summary(retailer_id, &retailer.company_name));
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{ApprovalStatus, OrgRole};

    fn oid(hex: &str) -> ObjectId {
        ObjectId::parse_str(hex).unwrap()
    }

    fn sample_company() -> UserDoc {
        UserDoc {
            _id: Some(oid("64b1f0c2a1b2c3d4e5f60718")),
            identifier: "maker@example.com".into(),
            display_name: "Acme Foods".into(),
            org_role: OrgRole::Company,
            company_name: "Acme Foods".into(),
            location: Some("Rotterdam".into()),
            approval_status: ApprovalStatus::Approved,
            ..Default::default()
        }
    }

    #[test]
    fn test_company_projection_shape() {
        let p = company(&sample_company()).unwrap();
        let map = p.as_map();
        assert_eq!(map["id"], json!("64b1f0c2a1b2c3d4e5f60718"));
        assert_eq!(map["name"], json!("Acme Foods"));
        assert_eq!(map["status"], json!("approved"));
        // Keys serialize sorted regardless of insertion order
        let keys: Vec<&String> = map.keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_absent_location_is_explicit_null() {
        let mut user = sample_company();
        user.location = None;
        let p = company(&user).unwrap();
        assert_eq!(p.as_map()["location"], Value::Null);
        assert!(p.canonical_json().contains("\"location\":null"));
    }

    #[test]
    fn test_missing_id_is_reference_error() {
        let mut user = sample_company();
        user._id = None;
        let err = company(&user).unwrap_err();
        assert_eq!(err.field, "_id");
    }

    #[test]
    fn test_batch_requires_resolved_references() {
        let b = BatchDoc {
            _id: Some(oid("64b1f0c2a1b2c3d4e5f60719")),
            batch_no: "B-1".into(),
            product_type: oid("64b1f0c2a1b2c3d4e5f60720"),
            company: oid("64b1f0c2a1b2c3d4e5f60718"),
            quantity: 100,
            start_date: bson::DateTime::from_millis(1_704_067_200_000),
            end_date: None,
            ..Default::default()
        };

        let err = batch(&b, None, Some(&sample_company())).unwrap_err();
        assert_eq!(err.field, "product_type");
    }

    #[test]
    fn test_dates_render_with_millis_and_z() {
        // 2024-01-01T00:00:00Z
        let b = BatchDoc {
            _id: Some(oid("64b1f0c2a1b2c3d4e5f60719")),
            batch_no: "B-1".into(),
            product_type: oid("64b1f0c2a1b2c3d4e5f60720"),
            company: oid("64b1f0c2a1b2c3d4e5f60718"),
            quantity: 100,
            start_date: bson::DateTime::from_millis(1_704_067_200_000),
            end_date: None,
            ..Default::default()
        };
        let pt = ProductTypeDoc {
            _id: Some(oid("64b1f0c2a1b2c3d4e5f60720")),
            name: "Olive Oil".into(),
            description: None,
            created_by: oid("64b1f0c2a1b2c3d4e5f60718"),
            ..Default::default()
        };

        let p = batch(&b, Some(&pt), Some(&sample_company())).unwrap();
        assert_eq!(p.as_map()["startDate"], json!("2024-01-01T00:00:00.000Z"));
        assert_eq!(p.as_map()["endDate"], Value::Null);
    }
}
