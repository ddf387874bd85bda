//! Product item routes
//!
//! Items are mirrored on create, re-mirrored when transferred to a
//! retailer, and reconciled on every read.

use bson::{doc, oid::ObjectId};
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::Claims;
use crate::db::schemas::{
    ApprovalStatus, BatchDoc, OrgRole, ProductDoc, ProductStatus, ProductTypeDoc, UserDoc,
    BATCH_COLLECTION, PRODUCT_COLLECTION, PRODUCT_TYPE_COLLECTION, USER_COLLECTION,
};
use crate::ledger::{projection, EntityKind, ProjectedRecord, Projection, TokenState};
use crate::routes::helpers::{
    collection, db_error, error_response, json_response, pagination, parse_json_body,
    parse_object_id, require_grant, verified_item, BoxBody, ListResponse,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProductRequest {
    serial_no: String,
    batch: String,
    price: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest {
    retailer: String,
}

/// Load referenced documents and project a page of product items.
pub(crate) async fn project_products(
    state: &AppState,
    products: &[ProductDoc],
) -> Result<Vec<ProjectedRecord>, Response<BoxBody>> {
    let batch_ids: Vec<ObjectId> = products.iter().map(|p| p.batch).collect();
    let type_ids: Vec<ObjectId> = products.iter().map(|p| p.product_type).collect();
    let mut user_ids: Vec<ObjectId> = products.iter().map(|p| p.company).collect();
    user_ids.extend(products.iter().filter_map(|p| p.retailer));

    let batches = collection::<BatchDoc>(state, BATCH_COLLECTION)
        .await?
        .find_many(doc! { "_id": { "$in": batch_ids } })
        .await
        .map_err(db_error)?;
    let types = collection::<ProductTypeDoc>(state, PRODUCT_TYPE_COLLECTION)
        .await?
        .find_many(doc! { "_id": { "$in": type_ids } })
        .await
        .map_err(db_error)?;
    let users = collection::<UserDoc>(state, USER_COLLECTION)
        .await?
        .find_many(doc! { "_id": { "$in": user_ids } })
        .await
        .map_err(db_error)?;

    let batches_by_id: HashMap<ObjectId, &BatchDoc> =
        batches.iter().filter_map(|b| b._id.map(|id| (id, b))).collect();
    let types_by_id: HashMap<ObjectId, &ProductTypeDoc> =
        types.iter().filter_map(|t| t._id.map(|id| (id, t))).collect();
    let users_by_id: HashMap<ObjectId, &UserDoc> =
        users.iter().filter_map(|u| u._id.map(|id| (id, u))).collect();

    let records = products
        .iter()
        .map(|p| {
            let id = p._id.map(|id| id.to_hex()).unwrap_or_default();
            let retailer = p.retailer.and_then(|r| users_by_id.get(&r).copied());
            let projection = match projection::product(
                p,
                batches_by_id.get(&p.batch).copied(),
                types_by_id.get(&p.product_type).copied(),
                users_by_id.get(&p.company).copied(),
                retailer,
            ) {
                Ok(proj) => Some(proj),
                Err(e) => {
                    warn!(product = %id, error = %e, "Skipping projection");
                    None
                }
            };
            ProjectedRecord { id, projection }
        })
        .collect();

    Ok(records)
}

fn role_filter(claims: &Claims) -> Result<bson::Document, Response<BoxBody>> {
    match claims.org_role {
        OrgRole::Company => {
            let id = parse_object_id(&claims.sub)?;
            Ok(doc! { "company": id })
        }
        OrgRole::Retailer => {
            let id = parse_object_id(&claims.sub)?;
            Ok(doc! { "retailer": id })
        }
        OrgRole::Admin | OrgRole::Customer => Ok(doc! {}),
    }
}

/// GET /api/products
pub async fn handle_list(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    claims: Claims,
    token: TokenState,
) -> Response<BoxBody> {
    let (page, limit) = pagination(&req, &state);

    let filter = match role_filter(&claims) {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    let products = match collection::<ProductDoc>(&state, PRODUCT_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let result = match products.find_page(filter, page, limit).await {
        Ok(p) => p,
        Err(e) => return db_error(e),
    };

    let records = match project_products(&state, &result.items).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let projections: Vec<Option<Projection>> =
        records.iter().map(|r| r.projection.clone()).collect();

    let verifications = state
        .ledger
        .verify_batch(EntityKind::Product, records, &token)
        .await;

    let items = projections
        .iter()
        .zip(verifications.iter())
        .map(|(p, v)| verified_item(p.as_ref(), v))
        .collect();

    json_response(
        StatusCode::OK,
        &ListResponse {
            items,
            page: result.page,
            limit: result.limit,
            total: result.total,
        },
    )
}

/// GET /api/products/{id}
pub async fn handle_get(
    state: Arc<AppState>,
    _claims: Claims,
    token: TokenState,
    id: &str,
) -> Response<BoxBody> {
    let object_id = match parse_object_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let products = match collection::<ProductDoc>(&state, PRODUCT_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let product = match products.find_by_id(object_id).await {
        Ok(Some(p)) => p,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Product not found", "NOT_FOUND"),
        Err(e) => return db_error(e),
    };

    let mut records = match project_products(&state, std::slice::from_ref(&product)).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let record = records.remove(0);
    let projection = record.projection.clone();

    let verification = state
        .ledger
        .verify_one(EntityKind::Product, record.id, record.projection, &token)
        .await;

    json_response(
        StatusCode::OK,
        &verified_item(projection.as_ref(), &verification),
    )
}

/// POST /api/products
pub async fn handle_create(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    claims: Claims,
    token: TokenState,
) -> Response<BoxBody> {
    if claims.org_role != OrgRole::Company {
        return error_response(
            StatusCode::FORBIDDEN,
            "Only companies can create products",
            "FORBIDDEN",
        );
    }

    let grant = match require_grant(&token) {
        Ok(g) => g,
        Err(resp) => return resp,
    };

    let body: CreateProductRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid JSON body: {}", e),
                "BAD_REQUEST",
            )
        }
    };

    if body.serial_no.trim().is_empty() || body.price < 0 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "serialNo and a non-negative price are required",
            "BAD_REQUEST",
        );
    }

    let company_id = match parse_object_id(&claims.sub) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let batch_id = match parse_object_id(&body.batch) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let batches = match collection::<BatchDoc>(&state, BATCH_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let batch = match batches.find_by_id(batch_id).await {
        Ok(Some(b)) => b,
        Ok(None) => return error_response(StatusCode::BAD_REQUEST, "Unknown batch", "BAD_REQUEST"),
        Err(e) => return db_error(e),
    };

    if batch.company != company_id {
        return error_response(
            StatusCode::FORBIDDEN,
            "Batch belongs to another company",
            "FORBIDDEN",
        );
    }

    let types = match collection::<ProductTypeDoc>(&state, PRODUCT_TYPE_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let product_type = match types.find_by_id(batch.product_type).await {
        Ok(Some(pt)) => pt,
        Ok(None) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Batch references a missing product type",
                "DB_ERROR",
            )
        }
        Err(e) => return db_error(e),
    };

    let users = match collection::<UserDoc>(&state, USER_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let company = match users.find_by_id(company_id).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            return error_response(StatusCode::UNAUTHORIZED, "Unknown account", "UNAUTHORIZED")
        }
        Err(e) => return db_error(e),
    };

    let products = match collection::<ProductDoc>(&state, PRODUCT_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match products
        .find_one(doc! { "company": company_id, "serial_no": body.serial_no.trim() })
        .await
    {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "A product with this serial number already exists",
                "ALREADY_EXISTS",
            )
        }
        Ok(None) => {}
        Err(e) => return db_error(e),
    }

    let mut product = ProductDoc::new(
        body.serial_no.trim().to_string(),
        batch_id,
        batch.product_type,
        company_id,
        body.price,
    );

    let id = match products.insert_one(product.clone()).await {
        Ok(id) => id,
        Err(e) => return db_error(e),
    };
    product._id = Some(id);

    let proj = match projection::product(&product, Some(&batch), Some(&product_type), Some(&company), None)
    {
        Ok(p) => p,
        Err(e) => {
            warn!(product = %id, error = %e, "Projection failed after insert");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Product stored but could not be projected",
                "PROJECTION_ERROR",
            );
        }
    };

    match state
        .ledger
        .mirror_write(EntityKind::Product, &id.to_hex(), &proj, &grant)
        .await
    {
        Ok(hash) => {
            info!("Product created and mirrored: {} ({})", body.serial_no, id);
            json_response(
                StatusCode::CREATED,
                &json!({ "id": id.to_hex(), "hash": hash }),
            )
        }
        Err(e) => {
            warn!(product = %id, error = %e, "Ledger mirror failed");
            error_response(
                StatusCode::BAD_GATEWAY,
                format!(
                    "Product {} stored but not mirrored to the ledger",
                    id.to_hex()
                ),
                "LEDGER_WRITE",
            )
        }
    }
}

/// POST /api/products/{id}/transfer
///
/// Moves an item from its manufacturer to an approved retailer. The ledger
/// record is re-mirrored with the item's new state, so the stored digest
/// keeps matching what reads recompute.
pub async fn handle_transfer(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    claims: Claims,
    token: TokenState,
    id: &str,
) -> Response<BoxBody> {
    if claims.org_role != OrgRole::Company {
        return error_response(
            StatusCode::FORBIDDEN,
            "Only companies can transfer products",
            "FORBIDDEN",
        );
    }

    let grant = match require_grant(&token) {
        Ok(g) => g,
        Err(resp) => return resp,
    };

    let object_id = match parse_object_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let company_id = match parse_object_id(&claims.sub) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let body: TransferRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid JSON body: {}", e),
                "BAD_REQUEST",
            )
        }
    };
    let retailer_id = match parse_object_id(&body.retailer) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let products = match collection::<ProductDoc>(&state, PRODUCT_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let mut product = match products.find_by_id(object_id).await {
        Ok(Some(p)) => p,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Product not found", "NOT_FOUND"),
        Err(e) => return db_error(e),
    };

    if product.company != company_id {
        return error_response(
            StatusCode::FORBIDDEN,
            "Product belongs to another company",
            "FORBIDDEN",
        );
    }
    if product.status != ProductStatus::InProduction {
        return error_response(
            StatusCode::CONFLICT,
            format!("Product cannot be transferred while {}", product.status),
            "INVALID_STATE",
        );
    }

    let users = match collection::<UserDoc>(&state, USER_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let retailer = match users.find_by_id(retailer_id).await {
        Ok(Some(u)) if u.org_role == OrgRole::Retailer => u,
        Ok(Some(_)) | Ok(None) => {
            return error_response(StatusCode::BAD_REQUEST, "Unknown retailer", "BAD_REQUEST")
        }
        Err(e) => return db_error(e),
    };
    if retailer.approval_status != ApprovalStatus::Approved {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Retailer is not approved",
            "BAD_REQUEST",
        );
    }

    if let Err(e) = products
        .update_one(
            doc! { "_id": object_id },
            doc! { "$set": {
                "retailer": retailer_id,
                "status": "with_retailer",
                "metadata.updated_at": bson::DateTime::now(),
            } },
        )
        .await
    {
        return db_error(e);
    }

    product.retailer = Some(retailer_id);
    product.status = ProductStatus::WithRetailer;

    // Re-project with the new holder and refresh the ledger digest
    let mut records = match project_products(&state, std::slice::from_ref(&product)).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let record = records.remove(0);
    let Some(proj) = record.projection else {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Product transferred but could not be projected",
            "PROJECTION_ERROR",
        );
    };

    match state
        .ledger
        .mirror_write(EntityKind::Product, &record.id, &proj, &grant)
        .await
    {
        Ok(hash) => {
            info!(
                "Product {} transferred to retailer {}",
                record.id, retailer_id
            );
            json_response(
                StatusCode::OK,
                &json!({ "id": record.id, "hash": hash, "status": product.status.to_string() }),
            )
        }
        Err(e) => {
            warn!(product = %record.id, error = %e, "Ledger mirror failed");
            error_response(
                StatusCode::BAD_GATEWAY,
                format!(
                    "Product {} transferred but not mirrored to the ledger",
                    record.id
                ),
                "LEDGER_WRITE",
            )
        }
    }
}
