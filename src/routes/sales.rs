//! Customer sale routes
//!
//! A sale closes a product item's lifecycle: the item flips to sold and
//! the sale is mirrored to the ledger as a `Customer` record.

use bson::{doc, oid::ObjectId};
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::Claims;
use crate::db::schemas::{
    OrgRole, ProductDoc, ProductStatus, SaleDoc, UserDoc, PRODUCT_COLLECTION, SALE_COLLECTION,
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
struct CreateSaleRequest {
    product: String,
    customer_name: String,
    customer_email: String,
    price: i64,
}

/// Load referenced documents and project a page of sales.
async fn project_sales(
    state: &AppState,
    sales: &[SaleDoc],
) -> Result<Vec<ProjectedRecord>, Response<BoxBody>> {
    let product_ids: Vec<ObjectId> = sales.iter().map(|s| s.product).collect();
    let retailer_ids: Vec<ObjectId> = sales.iter().map(|s| s.retailer).collect();

    let products = collection::<ProductDoc>(state, PRODUCT_COLLECTION)
        .await?
        .find_many(doc! { "_id": { "$in": product_ids } })
        .await
        .map_err(db_error)?;
    let retailers = collection::<UserDoc>(state, USER_COLLECTION)
        .await?
        .find_many(doc! { "_id": { "$in": retailer_ids } })
        .await
        .map_err(db_error)?;

    let products_by_id: HashMap<ObjectId, &ProductDoc> =
        products.iter().filter_map(|p| p._id.map(|id| (id, p))).collect();
    let retailers_by_id: HashMap<ObjectId, &UserDoc> =
        retailers.iter().filter_map(|u| u._id.map(|id| (id, u))).collect();

    let records = sales
        .iter()
        .map(|s| {
            let id = s._id.map(|id| id.to_hex()).unwrap_or_default();
            let projection = match projection::sale(
                s,
                products_by_id.get(&s.product).copied(),
                retailers_by_id.get(&s.retailer).copied(),
            ) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(sale = %id, error = %e, "Skipping projection");
                    None
                }
            };
            ProjectedRecord { id, projection }
        })
        .collect();

    Ok(records)
}

fn role_filter(claims: &Claims) -> Result<Option<bson::Document>, Response<BoxBody>> {
    match claims.org_role {
        OrgRole::Retailer => {
            let id = parse_object_id(&claims.sub)?;
            Ok(Some(doc! { "retailer": id }))
        }
        OrgRole::Admin => Ok(Some(doc! {})),
        OrgRole::Company | OrgRole::Customer => Ok(None),
    }
}

/// GET /api/sales
pub async fn handle_list(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    claims: Claims,
    token: TokenState,
) -> Response<BoxBody> {
    let (page, limit) = pagination(&req, &state);

    let filter = match role_filter(&claims) {
        Ok(Some(f)) => f,
        Ok(None) => {
            return error_response(
                StatusCode::FORBIDDEN,
                "Only retailers and admins can list sales",
                "FORBIDDEN",
            )
        }
        Err(resp) => return resp,
    };

    let sales = match collection::<SaleDoc>(&state, SALE_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let result = match sales.find_page(filter, page, limit).await {
        Ok(p) => p,
        Err(e) => return db_error(e),
    };

    let records = match project_sales(&state, &result.items).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let projections: Vec<Option<Projection>> =
        records.iter().map(|r| r.projection.clone()).collect();

    let verifications = state
        .ledger
        .verify_batch(EntityKind::Customer, records, &token)
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

/// GET /api/sales/{id}
pub async fn handle_get(
    state: Arc<AppState>,
    claims: Claims,
    token: TokenState,
    id: &str,
) -> Response<BoxBody> {
    let object_id = match parse_object_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let sales = match collection::<SaleDoc>(&state, SALE_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let sale = match sales.find_by_id(object_id).await {
        Ok(Some(s)) => s,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "Sale not found", "NOT_FOUND"),
        Err(e) => return db_error(e),
    };

    // Retailers only see their own sales
    if claims.org_role == OrgRole::Retailer {
        let retailer_id = match parse_object_id(&claims.sub) {
            Ok(id) => id,
            Err(resp) => return resp,
        };
        if sale.retailer != retailer_id {
            return error_response(StatusCode::NOT_FOUND, "Sale not found", "NOT_FOUND");
        }
    } else if claims.org_role != OrgRole::Admin {
        return error_response(
            StatusCode::FORBIDDEN,
            "Only retailers and admins can view sales",
            "FORBIDDEN",
        );
    }

    let mut records = match project_sales(&state, std::slice::from_ref(&sale)).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let record = records.remove(0);
    let projection = record.projection.clone();

    let verification = state
        .ledger
        .verify_one(EntityKind::Customer, record.id, record.projection, &token)
        .await;

    json_response(
        StatusCode::OK,
        &verified_item(projection.as_ref(), &verification),
    )
}

/// POST /api/sales
pub async fn handle_create(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    claims: Claims,
    token: TokenState,
) -> Response<BoxBody> {
    if claims.org_role != OrgRole::Retailer {
        return error_response(
            StatusCode::FORBIDDEN,
            "Only retailers can record sales",
            "FORBIDDEN",
        );
    }

    let grant = match require_grant(&token) {
        Ok(g) => g,
        Err(resp) => return resp,
    };

    let body: CreateSaleRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid JSON body: {}", e),
                "BAD_REQUEST",
            )
        }
    };

    if body.customer_name.trim().is_empty()
        || body.customer_email.trim().is_empty()
        || body.price < 0
    {
        return error_response(
            StatusCode::BAD_REQUEST,
            "customerName, customerEmail and a non-negative price are required",
            "BAD_REQUEST",
        );
    }

    let retailer_id = match parse_object_id(&claims.sub) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let product_id = match parse_object_id(&body.product) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let products = match collection::<ProductDoc>(&state, PRODUCT_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let mut product = match products.find_by_id(product_id).await {
        Ok(Some(p)) => p,
        Ok(None) => {
            return error_response(StatusCode::BAD_REQUEST, "Unknown product", "BAD_REQUEST")
        }
        Err(e) => return db_error(e),
    };

    if product.retailer != Some(retailer_id) {
        return error_response(
            StatusCode::FORBIDDEN,
            "Product is not held by this retailer",
            "FORBIDDEN",
        );
    }
    if product.status != ProductStatus::WithRetailer {
        return error_response(
            StatusCode::CONFLICT,
            format!("Product cannot be sold while {}", product.status),
            "INVALID_STATE",
        );
    }

    let users = match collection::<UserDoc>(&state, USER_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let retailer = match users.find_by_id(retailer_id).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            return error_response(StatusCode::UNAUTHORIZED, "Unknown account", "UNAUTHORIZED")
        }
        Err(e) => return db_error(e),
    };

    let sales = match collection::<SaleDoc>(&state, SALE_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    // The unique index on product also guards this, but checking first
    // gives a clean conflict response
    match sales.find_one(doc! { "product": product_id }).await {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "This product has already been sold",
                "ALREADY_EXISTS",
            )
        }
        Ok(None) => {}
        Err(e) => return db_error(e),
    }

    let mut sale = SaleDoc::new(
        product_id,
        retailer_id,
        body.customer_name.trim().to_string(),
        body.customer_email.trim().to_string(),
        body.price,
    );

    let id = match sales.insert_one(sale.clone()).await {
        Ok(id) => id,
        Err(e) => return db_error(e),
    };
    sale._id = Some(id);

    if let Err(e) = products
        .update_one(
            doc! { "_id": product_id },
            doc! { "$set": {
                "status": "sold",
                "metadata.updated_at": bson::DateTime::now(),
            } },
        )
        .await
    {
        // The sale is already stored; a retry would hit the duplicate
        // guard, so the response has to name the record that exists
        warn!(sale = %id, error = %e, "Product status update failed after sale insert");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(
                "Sale {} stored but the product status was not updated",
                id.to_hex()
            ),
            "SALE_INCOMPLETE",
        );
    }
    product.status = ProductStatus::Sold;

    let proj = match projection::sale(&sale, Some(&product), Some(&retailer)) {
        Ok(p) => p,
        Err(e) => {
            warn!(sale = %id, error = %e, "Projection failed after insert");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Sale {} stored but could not be projected", id.to_hex()),
                "PROJECTION_ERROR",
            );
        }
    };

    match state
        .ledger
        .mirror_write(EntityKind::Customer, &id.to_hex(), &proj, &grant)
        .await
    {
        Ok(hash) => {
            // The item changed state, so its own ledger digest is refreshed
            // as well; failure here only costs verification, not the sale
            match crate::routes::products::project_products(&state, std::slice::from_ref(&product))
                .await
            {
                Ok(mut records) => {
                    let record = records.remove(0);
                    if let Some(product_proj) = record.projection {
                        if let Err(e) = state
                            .ledger
                            .mirror_write(EntityKind::Product, &record.id, &product_proj, &grant)
                            .await
                        {
                            warn!(product = %product_id, error = %e, "Product re-mirror failed");
                        }
                    }
                }
                Err(_) => {
                    warn!(product = %product_id, "Product re-projection failed after sale");
                }
            }

            info!("Sale recorded and mirrored: {} (product {})", id, product_id);
            json_response(
                StatusCode::CREATED,
                &json!({ "id": id.to_hex(), "hash": hash }),
            )
        }
        Err(e) => {
            warn!(sale = %id, error = %e, "Ledger mirror failed");
            error_response(
                StatusCode::BAD_GATEWAY,
                format!("Sale {} stored but not mirrored to the ledger", id.to_hex()),
                "LEDGER_WRITE",
            )
        }
    }
}
