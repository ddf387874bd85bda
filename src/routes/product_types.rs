//! Product type catalog routes
//!
//! Catalog entries only; product types never reach the ledger, so these
//! handlers carry no verification fields.

use bson::doc;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::auth::Claims;
use crate::db::schemas::{OrgRole, ProductTypeDoc, PRODUCT_TYPE_COLLECTION};
use crate::routes::helpers::{
    error_response, json_response, pagination, parse_json_body, parse_object_id, BoxBody,
    ListResponse,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProductTypeRequest {
    name: String,
    #[serde(default)]
    description: Option<String>,
}

fn render(pt: &ProductTypeDoc) -> serde_json::Value {
    json!({
        "id": pt._id.map(|id| id.to_hex()),
        "name": pt.name,
        "description": pt.description,
        "createdBy": pt.created_by.to_hex(),
        "createdAt": pt
            .metadata
            .created_at
            .and_then(|d| d.try_to_rfc3339_string().ok()),
    })
}

/// GET /api/product-types
pub async fn handle_list(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    claims: Claims,
) -> Response<BoxBody> {
    let (page, limit) = pagination(&req, &state);

    let Some(mongo) = &state.mongo else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Database not available",
            "DB_UNAVAILABLE",
        );
    };

    let collection = match mongo
        .collection::<ProductTypeDoc>(PRODUCT_TYPE_COLLECTION)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
                "DB_ERROR",
            )
        }
    };

    // Companies see their own catalog; everyone else sees all of it
    let filter = if claims.org_role == OrgRole::Company {
        match parse_object_id(&claims.sub) {
            Ok(id) => doc! { "created_by": id },
            Err(resp) => return resp,
        }
    } else {
        doc! {}
    };

    let result = match collection.find_page(filter, page, limit).await {
        Ok(p) => p,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
                "DB_ERROR",
            )
        }
    };

    json_response(
        StatusCode::OK,
        &ListResponse {
            items: result.items.iter().map(render).collect(),
            page: result.page,
            limit: result.limit,
            total: result.total,
        },
    )
}

/// GET /api/product-types/{id}
pub async fn handle_get(
    state: Arc<AppState>,
    _claims: Claims,
    id: &str,
) -> Response<BoxBody> {
    let object_id = match parse_object_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let Some(mongo) = &state.mongo else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Database not available",
            "DB_UNAVAILABLE",
        );
    };

    let collection = match mongo
        .collection::<ProductTypeDoc>(PRODUCT_TYPE_COLLECTION)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
                "DB_ERROR",
            )
        }
    };

    match collection.find_by_id(object_id).await {
        Ok(Some(pt)) => json_response(StatusCode::OK, &render(&pt)),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Product type not found", "NOT_FOUND"),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Database error: {}", e),
            "DB_ERROR",
        ),
    }
}

/// POST /api/product-types
pub async fn handle_create(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    claims: Claims,
) -> Response<BoxBody> {
    if claims.org_role != OrgRole::Company {
        return error_response(
            StatusCode::FORBIDDEN,
            "Only companies can create product types",
            "FORBIDDEN",
        );
    }

    let body: CreateProductTypeRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid JSON body: {}", e),
                "BAD_REQUEST",
            )
        }
    };

    if body.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "name is required", "BAD_REQUEST");
    }

    let created_by = match parse_object_id(&claims.sub) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let Some(mongo) = &state.mongo else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Database not available",
            "DB_UNAVAILABLE",
        );
    };

    let collection = match mongo
        .collection::<ProductTypeDoc>(PRODUCT_TYPE_COLLECTION)
        .await
    {
        Ok(c) => c,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
                "DB_ERROR",
            )
        }
    };

    match collection
        .find_one(doc! { "created_by": created_by, "name": body.name.trim() })
        .await
    {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "A product type with this name already exists",
                "ALREADY_EXISTS",
            )
        }
        Ok(None) => {}
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
                "DB_ERROR",
            )
        }
    }

    let pt = ProductTypeDoc::new(body.name.trim().to_string(), body.description, created_by);

    match collection.insert_one(pt).await {
        Ok(id) => {
            info!("Product type created: {} by {}", id, claims.identifier);
            json_response(StatusCode::CREATED, &json!({ "id": id.to_hex() }))
        }
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Database error: {}", e),
            "DB_ERROR",
        ),
    }
}
