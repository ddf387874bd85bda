//! Production batch routes
//!
//! Batches are mirrored to the ledger on create and reconciled on every
//! read. Read handlers never fail on ledger trouble; they report records
//! unverified instead.

use bson::{doc, oid::ObjectId};
use chrono::{DateTime as ChronoDateTime, Utc};
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::Claims;
use crate::db::schemas::{
    BatchDoc, OrgRole, ProductTypeDoc, UserDoc, BATCH_COLLECTION, PRODUCT_TYPE_COLLECTION,
    USER_COLLECTION,
};
use crate::ledger::{projection, EntityKind, ProjectedRecord, Projection, TokenState};
use crate::routes::helpers::{
    collection, db_error, error_response, json_response, pagination, parse_json_body,
    parse_object_id, require_grant, verified_item, BoxBody, ListResponse,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBatchRequest {
    batch_no: String,
    product_type: String,
    quantity: i64,
    start_date: String,
    #[serde(default)]
    end_date: Option<String>,
}

fn parse_rfc3339(raw: &str) -> Option<bson::DateTime> {
    ChronoDateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| bson::DateTime::from_chrono(dt.with_timezone(&Utc)))
}

/// Load referenced documents and project a page of batches. Batches whose
/// references cannot be resolved stay unprojected and report unverified.
async fn project_batches(
    state: &AppState,
    batches: &[BatchDoc],
) -> Result<Vec<ProjectedRecord>, Response<BoxBody>> {
    let type_ids: Vec<ObjectId> = batches.iter().map(|b| b.product_type).collect();
    let company_ids: Vec<ObjectId> = batches.iter().map(|b| b.company).collect();

    let types = collection::<ProductTypeDoc>(state, PRODUCT_TYPE_COLLECTION)
        .await?
        .find_many(doc! { "_id": { "$in": type_ids } })
        .await
        .map_err(db_error)?;
    let companies = collection::<UserDoc>(state, USER_COLLECTION)
        .await?
        .find_many(doc! { "_id": { "$in": company_ids } })
        .await
        .map_err(db_error)?;

    let types_by_id: HashMap<ObjectId, &ProductTypeDoc> =
        types.iter().filter_map(|t| t._id.map(|id| (id, t))).collect();
    let companies_by_id: HashMap<ObjectId, &UserDoc> =
        companies.iter().filter_map(|c| c._id.map(|id| (id, c))).collect();

    let records = batches
        .iter()
        .map(|b| {
            let id = b._id.map(|id| id.to_hex()).unwrap_or_default();
            let projection = match projection::batch(
                b,
                types_by_id.get(&b.product_type).copied(),
                companies_by_id.get(&b.company).copied(),
            ) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(batch = %id, error = %e, "Skipping projection");
                    None
                }
            };
            ProjectedRecord { id, projection }
        })
        .collect();

    Ok(records)
}

fn role_filter(claims: &Claims) -> Result<bson::Document, Response<BoxBody>> {
    // Companies see their own batches; admins and buyers see everything
    if claims.org_role == OrgRole::Company {
        let id = parse_object_id(&claims.sub)?;
        Ok(doc! { "company": id })
    } else {
        Ok(doc! {})
    }
}

/// GET /api/batches
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

    let batches = match collection::<BatchDoc>(&state, BATCH_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let result = match batches.find_page(filter, page, limit).await {
        Ok(p) => p,
        Err(e) => return db_error(e),
    };

    let records = match project_batches(&state, &result.items).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let projections: Vec<Option<Projection>> =
        records.iter().map(|r| r.projection.clone()).collect();

    let verifications = state
        .ledger
        .verify_batch(EntityKind::Batch, records, &token)
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

/// GET /api/batches/{id}
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

    let batches = match collection::<BatchDoc>(&state, BATCH_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let batch = match batches.find_by_id(object_id).await {
        Ok(Some(b)) => b,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Batch not found", "NOT_FOUND"),
        Err(e) => return db_error(e),
    };

    let mut records = match project_batches(&state, std::slice::from_ref(&batch)).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let record = records.remove(0);
    let projection = record.projection.clone();

    let verification = state
        .ledger
        .verify_one(EntityKind::Batch, record.id, record.projection, &token)
        .await;

    json_response(
        StatusCode::OK,
        &verified_item(projection.as_ref(), &verification),
    )
}

/// POST /api/batches
pub async fn handle_create(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    claims: Claims,
    token: TokenState,
) -> Response<BoxBody> {
    if claims.org_role != OrgRole::Company {
        return error_response(
            StatusCode::FORBIDDEN,
            "Only companies can create batches",
            "FORBIDDEN",
        );
    }

    // Writes are aborted without a ledger grant; reads merely degrade
    let grant = match require_grant(&token) {
        Ok(g) => g,
        Err(resp) => return resp,
    };

    let body: CreateBatchRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid JSON body: {}", e),
                "BAD_REQUEST",
            )
        }
    };

    if body.batch_no.trim().is_empty() || body.quantity <= 0 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "batchNo and a positive quantity are required",
            "BAD_REQUEST",
        );
    }

    let Some(start_date) = parse_rfc3339(&body.start_date) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "startDate must be an RFC 3339 timestamp",
            "BAD_REQUEST",
        );
    };
    let end_date = match &body.end_date {
        Some(raw) => match parse_rfc3339(raw) {
            Some(dt) => Some(dt),
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "endDate must be an RFC 3339 timestamp",
                    "BAD_REQUEST",
                )
            }
        },
        None => None,
    };

    let company_id = match parse_object_id(&claims.sub) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let product_type_id = match parse_object_id(&body.product_type) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let types = match collection::<ProductTypeDoc>(&state, PRODUCT_TYPE_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let product_type = match types.find_by_id(product_type_id).await {
        Ok(Some(pt)) => pt,
        Ok(None) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "Unknown product type",
                "BAD_REQUEST",
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

    let batches = match collection::<BatchDoc>(&state, BATCH_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    match batches
        .find_one(doc! { "company": company_id, "batch_no": body.batch_no.trim() })
        .await
    {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "A batch with this number already exists",
                "ALREADY_EXISTS",
            )
        }
        Ok(None) => {}
        Err(e) => return db_error(e),
    }

    let mut batch = BatchDoc::new(
        body.batch_no.trim().to_string(),
        product_type_id,
        company_id,
        body.quantity,
        start_date,
        end_date,
    );

    let id = match batches.insert_one(batch.clone()).await {
        Ok(id) => id,
        Err(e) => return db_error(e),
    };
    batch._id = Some(id);

    let proj = match projection::batch(&batch, Some(&product_type), Some(&company)) {
        Ok(p) => p,
        Err(e) => {
            warn!(batch = %id, error = %e, "Projection failed after insert");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Batch stored but could not be projected",
                "PROJECTION_ERROR",
            );
        }
    };

    match state
        .ledger
        .mirror_write(EntityKind::Batch, &id.to_hex(), &proj, &grant)
        .await
    {
        Ok(hash) => {
            info!("Batch created and mirrored: {} ({})", body.batch_no, id);
            json_response(
                StatusCode::CREATED,
                &json!({ "id": id.to_hex(), "hash": hash }),
            )
        }
        Err(e) => {
            // Stored locally; reconciliation will flag it unverified
            warn!(batch = %id, error = %e, "Ledger mirror failed");
            error_response(
                StatusCode::BAD_GATEWAY,
                format!("Batch {} stored but not mirrored to the ledger", id.to_hex()),
                "LEDGER_WRITE",
            )
        }
    }
}
