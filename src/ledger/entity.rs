//! Entity kinds mirrored to the ledger
//!
//! The chaincode endpoints are not uniform: each entity type has its own
//! path segment, read function, and - historically - its own key for the
//! record identifier in read responses. That variation lives here and
//! nowhere else.

use std::fmt;

/// Domain entity types that participate in ledger reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Batch,
    Product,
    Company,
    Customer,
}

impl EntityKind {
    /// Path segment in `POST {base}/channels/{channel}/chaincodes/{this}`
    pub fn chaincode(&self) -> &'static str {
        match self {
            EntityKind::Batch => "Batch",
            EntityKind::Product => "Product",
            EntityKind::Company => "Company",
            EntityKind::Customer => "Customer",
        }
    }

    /// Chaincode read function returning `{id, blockHash}` pairs
    pub fn read_fcn(&self) -> &'static str {
        match self {
            EntityKind::Batch => "GetBatchWithHash",
            EntityKind::Product => "GetProductWithHash",
            EntityKind::Company => "GetCompanyWithHash",
            EntityKind::Customer => "GetCustomerWithHash",
        }
    }

    /// Chaincode write function recording a new digest
    pub fn create_fcn(&self) -> &'static str {
        match self {
            EntityKind::Batch => "CreateBatch",
            EntityKind::Product => "CreateProductItem",
            EntityKind::Company => "EditCompany",
            EntityKind::Customer => "CreateCustomer",
        }
    }

    /// Key under which read responses carry the record identifier
    ///
    /// The chaincode is inconsistent across entity types; this table is the
    /// single place that knows about it.
    pub fn response_id_field(&self) -> &'static str {
        match self {
            EntityKind::Batch => "BatchID",
            EntityKind::Product => "ProductId",
            EntityKind::Company | EntityKind::Customer => "id",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.chaincode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_entity_id_fields() {
        assert_eq!(EntityKind::Batch.response_id_field(), "BatchID");
        assert_eq!(EntityKind::Product.response_id_field(), "ProductId");
        assert_eq!(EntityKind::Company.response_id_field(), "id");
        assert_eq!(EntityKind::Customer.response_id_field(), "id");
    }

    #[test]
    fn test_read_fcn_names() {
        assert_eq!(EntityKind::Batch.read_fcn(), "GetBatchWithHash");
        assert_eq!(EntityKind::Customer.read_fcn(), "GetCustomerWithHash");
    }
}
