//! HTTP route handlers
//!
//! `/auth/*` is handled by [`auth_routes`]; everything under `/api/*`
//! goes through [`handle_api_request`], which authenticates the caller
//! and provisions a request-scoped ledger token before dispatching.

pub mod auth_routes;
pub mod batches;
pub mod companies;
pub mod health;
pub mod helpers;
pub mod product_types;
pub mod products;
pub mod sales;

pub use auth_routes::handle_auth_request;

use hyper::{Method, Request, Response, StatusCode};
use std::sync::Arc;

use crate::ledger::TokenState;
use crate::routes::helpers::{
    authenticate, cors_preflight, error_response, ledger_identity, BoxBody,
};
use crate::server::AppState;

/// Route `/api/*` requests. Returns `None` for paths outside `/api`.
pub async fn handle_api_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    if !req.uri().path().starts_with("/api") {
        return None;
    }

    if req.method() == Method::OPTIONS {
        return Some(cors_preflight());
    }

    let claims = match authenticate(&req, &state) {
        Ok(c) => c,
        Err(resp) => return Some(resp),
    };

    // Own the path so handlers can take the request body
    let path = req
        .uri()
        .path()
        .trim_end_matches('/')
        .to_string();
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    // Product types never reach the ledger; every other entity route gets
    // one token for the whole request
    let token = if matches!(segments.as_slice(), ["api", "product-types", ..]) {
        TokenState::NotRequested
    } else {
        state
            .ledger
            .acquire_token(&ledger_identity(&claims, &state))
            .await
    };

    let method = req.method().clone();
    let response = match (&method, segments.as_slice()) {
        (&Method::GET, ["api", "product-types"]) => {
            product_types::handle_list(req, state, claims).await
        }
        (&Method::POST, ["api", "product-types"]) => {
            product_types::handle_create(req, state, claims).await
        }
        (&Method::GET, ["api", "product-types", id]) => {
            product_types::handle_get(state, claims, id).await
        }

        (&Method::GET, ["api", "batches"]) => {
            batches::handle_list(req, state, claims, token).await
        }
        (&Method::POST, ["api", "batches"]) => {
            batches::handle_create(req, state, claims, token).await
        }
        (&Method::GET, ["api", "batches", id]) => {
            batches::handle_get(state, claims, token, id).await
        }

        (&Method::GET, ["api", "products"]) => {
            products::handle_list(req, state, claims, token).await
        }
        (&Method::POST, ["api", "products"]) => {
            products::handle_create(req, state, claims, token).await
        }
        (&Method::GET, ["api", "products", id]) => {
            products::handle_get(state, claims, token, id).await
        }
        (&Method::POST, ["api", "products", id, "transfer"]) => {
            products::handle_transfer(req, state, claims, token, id).await
        }

        (&Method::GET, ["api", "companies"]) => {
            companies::handle_list(req, state, claims, token).await
        }
        (&Method::GET, ["api", "companies", id]) => {
            companies::handle_get(state, claims, token, id).await
        }
        (&Method::POST, ["api", "companies", id, "status"]) => {
            companies::handle_status(req, state, claims, token, id).await
        }

        (&Method::GET, ["api", "sales"]) => sales::handle_list(req, state, claims, token).await,
        (&Method::POST, ["api", "sales"]) => {
            sales::handle_create(req, state, claims, token).await
        }
        (&Method::GET, ["api", "sales", id]) => {
            sales::handle_get(state, claims, token, id).await
        }

        _ => error_response(StatusCode::NOT_FOUND, "API endpoint not found", "NOT_FOUND"),
    };

    Some(response)
}
