//! HTTP routes for authentication
//!
//! - POST /auth/register - Create an account (companies start pending)
//! - POST /auth/login    - Authenticate and get a JWT
//! - GET  /auth/me       - Current user info from token

use bson::doc;
use hyper::{Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{hash_password, verify_password, PermissionLevel, TokenInput};
use crate::db::schemas::{OrgRole, UserDoc, USER_COLLECTION};
use crate::ledger::LedgerIdentity;
use crate::routes::helpers::{
    authenticate, cors_preflight, error_response, json_response, jwt_validator, parse_json_body,
    BoxBody, ErrorResponse,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub identifier: String,
    pub password: String,
    #[serde(default)]
    pub display_name: String,
    /// "company", "retailer", or "customer"
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub location: Option<String>,
}

fn default_role() -> String {
    "customer".to_string()
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub user_id: String,
    pub identifier: String,
    pub display_name: String,
    pub role: OrgRole,
    pub approval_status: String,
    pub expires_at: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub user_id: String,
    pub identifier: String,
    pub display_name: String,
    pub role: OrgRole,
    pub company_name: String,
    pub permission_level: String,
}

/// POST /auth/register
///
/// Flow:
/// 1. Validate required fields
/// 2. Check whether the identifier already exists
/// 3. Hash password with argon2 and store the account
/// 4. Best-effort register the identity with the ledger
/// 5. Generate and return a JWT token
async fn handle_register(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: RegisterRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid JSON body: {}", e),
                "BAD_REQUEST",
            )
        }
    };

    if body.identifier.is_empty() || body.password.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: identifier, password",
            "BAD_REQUEST",
        );
    }

    let Some(role) = OrgRole::parse(&body.role).filter(|r| *r != OrgRole::Admin) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "role must be one of: company, retailer, customer",
            "BAD_REQUEST",
        );
    };

    if matches!(role, OrgRole::Company | OrgRole::Retailer) && body.company_name.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "companyName is required for company and retailer accounts",
            "BAD_REQUEST",
        );
    }

    let jwt = match jwt_validator(&state) {
        Ok(j) => j,
        Err(resp) => return resp,
    };

    let Some(mongo) = &state.mongo else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Database not available",
            "DB_UNAVAILABLE",
        );
    };

    let collection = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
                "DB_ERROR",
            )
        }
    };

    match collection.find_one(doc! { "identifier": &body.identifier }).await {
        Ok(Some(_)) => {
            return error_response(
                StatusCode::CONFLICT,
                "An account with this identifier already exists",
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

    let password_hash = match hash_password(&body.password) {
        Ok(h) => h,
        Err(e) => {
            warn!("Password hashing failed: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Registration failed",
                "AUTH_ERROR",
            );
        }
    };

    let display_name = if body.display_name.is_empty() {
        body.identifier
            .split('@')
            .next()
            .unwrap_or("User")
            .to_string()
    } else {
        body.display_name.clone()
    };

    let user = UserDoc::new(
        body.identifier.clone(),
        password_hash,
        display_name.clone(),
        role,
        body.company_name.clone(),
        body.location.clone(),
    );
    let approval_status = user.approval_status.to_string();

    let user_id = match collection.insert_one(user).await {
        Ok(id) => id,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
                "DB_ERROR",
            )
        }
    };

    info!(
        "Registered {} account {} ({})",
        role, body.identifier, user_id
    );

    // Best-effort ledger enrollment; approval later re-provisions anyway
    if matches!(role, OrgRole::Company | OrgRole::Retailer) {
        let identity = LedgerIdentity {
            user_id: user_id.to_hex(),
            org_name: state.args.ledger_org.clone(),
            company_name: body.company_name.clone(),
        };
        if let Err(e) = state.ledger.client().register_identity(&identity).await {
            warn!(user = %user_id, error = %e, "Ledger enrollment at signup failed (non-fatal)");
        }
    }

    let input = TokenInput {
        user_id: user_id.to_hex(),
        identifier: body.identifier.clone(),
        display_name,
        org_role: role,
        company_name: body.company_name,
        permission_level: PermissionLevel::for_role(role),
        token_version: 1,
    };

    match jwt.generate_token(input.clone()) {
        Ok(token) => {
            let expires_at = jwt
                .verify_token(&token)
                .claims
                .map(|c| c.exp)
                .unwrap_or(0);

            json_response(
                StatusCode::CREATED,
                &AuthResponse {
                    token,
                    user_id: input.user_id,
                    identifier: input.identifier,
                    display_name: input.display_name,
                    role,
                    approval_status,
                    expires_at,
                },
            )
        }
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Token generation failed: {}", e),
            "AUTH_ERROR",
        ),
    }
}

/// POST /auth/login
async fn handle_login(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let body: LoginRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid JSON body: {}", e),
                "BAD_REQUEST",
            )
        }
    };

    if body.identifier.is_empty() || body.password.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Missing required fields: identifier, password",
            "BAD_REQUEST",
        );
    }

    let jwt = match jwt_validator(&state) {
        Ok(j) => j,
        Err(resp) => return resp,
    };

    let Some(mongo) = &state.mongo else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Database not available",
            "DB_UNAVAILABLE",
        );
    };

    let collection = match mongo.collection::<UserDoc>(USER_COLLECTION).await {
        Ok(c) => c,
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
                "DB_ERROR",
            )
        }
    };

    let user = match collection
        .find_one(doc! { "identifier": &body.identifier, "is_active": true })
        .await
    {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!("Login failed - user not found: {}", body.identifier);
            // Generic error to prevent user enumeration
            return error_response(
                StatusCode::UNAUTHORIZED,
                "Invalid credentials",
                "INVALID_CREDENTIALS",
            );
        }
        Err(e) => {
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
                "DB_ERROR",
            )
        }
    };

    let password_valid = match verify_password(&body.password, &user.password_hash) {
        Ok(valid) => valid,
        Err(e) => {
            warn!("Password verification error: {}", e);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Authentication error",
                "AUTH_ERROR",
            );
        }
    };

    if !password_valid {
        warn!("Login failed - invalid password: {}", body.identifier);
        return error_response(
            StatusCode::UNAUTHORIZED,
            "Invalid credentials",
            "INVALID_CREDENTIALS",
        );
    }

    let user_id = user
        ._id
        .map(|id| id.to_hex())
        .unwrap_or_default();

    let input = TokenInput {
        user_id: user_id.clone(),
        identifier: user.identifier.clone(),
        display_name: user.display_name.clone(),
        org_role: user.org_role,
        company_name: user.company_name.clone(),
        permission_level: PermissionLevel::for_role(user.org_role),
        token_version: user.token_version,
    };

    match jwt.generate_token(input) {
        Ok(token) => {
            let expires_at = jwt
                .verify_token(&token)
                .claims
                .map(|c| c.exp)
                .unwrap_or(0);

            info!("Login: {} ({})", user.identifier, user.org_role);
            json_response(
                StatusCode::OK,
                &AuthResponse {
                    token,
                    user_id,
                    identifier: user.identifier,
                    display_name: user.display_name,
                    role: user.org_role,
                    approval_status: user.approval_status.to_string(),
                    expires_at,
                },
            )
        }
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Token generation failed: {}", e),
            "AUTH_ERROR",
        ),
    }
}

/// GET /auth/me
async fn handle_me(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Response<BoxBody> {
    let claims = match authenticate(&req, &state) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    json_response(
        StatusCode::OK,
        &MeResponse {
            user_id: claims.sub,
            identifier: claims.identifier,
            display_name: claims.display_name,
            role: claims.org_role,
            company_name: claims.company_name,
            permission_level: claims.permission_level.to_string(),
        },
    )
}

/// Route /auth/* requests
pub async fn handle_auth_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
) -> Option<Response<BoxBody>> {
    let path = req.uri().path();
    let method = req.method();

    if !path.starts_with("/auth") {
        return None;
    }

    if method == Method::OPTIONS {
        return Some(cors_preflight());
    }

    // Remove query string for matching
    let path = path.split('?').next().unwrap_or(path);

    let response = match (method, path) {
        (&Method::POST, "/auth/register") => handle_register(req, state).await,
        (&Method::POST, "/auth/login") => handle_login(req, state).await,
        (&Method::GET, "/auth/me") => handle_me(req, state).await,

        (_, "/auth/register") | (_, "/auth/login") | (_, "/auth/me") => json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            &ErrorResponse {
                error: "Method not allowed".into(),
                code: None,
            },
        ),

        _ => json_response(
            StatusCode::NOT_FOUND,
            &ErrorResponse {
                error: "Auth endpoint not found".into(),
                code: None,
            },
        ),
    };

    Some(response)
}
