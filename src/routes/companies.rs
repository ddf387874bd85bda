//! Organization routes
//!
//! Companies and retailers live in the users collection; this surface
//! exposes them as organizations, reconciled against the ledger's
//! `Company` records. Approval mirrors the organization to the ledger.

use bson::doc;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::Claims;
use crate::db::schemas::{ApprovalStatus, OrgRole, UserDoc, USER_COLLECTION};
use crate::ledger::{projection, EntityKind, LedgerIdentity, ProjectedRecord, Projection, TokenState};
use crate::routes::helpers::{
    collection, db_error, error_response, json_response, pagination, parse_json_body,
    parse_object_id, require_grant, verified_item, BoxBody, ListResponse,
};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
struct StatusRequest {
    /// "approved" or "rejected"
    status: String,
}

fn project_organizations(orgs: &[UserDoc]) -> Vec<ProjectedRecord> {
    orgs.iter()
        .map(|u| {
            let id = u._id.map(|id| id.to_hex()).unwrap_or_default();
            let projection = match projection::company(u) {
                Ok(p) => Some(p),
                Err(e) => {
                    warn!(company = %id, error = %e, "Skipping projection");
                    None
                }
            };
            ProjectedRecord { id, projection }
        })
        .collect()
}

fn org_filter() -> bson::Document {
    doc! { "org_role": { "$in": ["company", "retailer"] } }
}

/// GET /api/companies
pub async fn handle_list(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    _claims: Claims,
    token: TokenState,
) -> Response<BoxBody> {
    let (page, limit) = pagination(&req, &state);

    let users = match collection::<UserDoc>(&state, USER_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let result = match users.find_page(org_filter(), page, limit).await {
        Ok(p) => p,
        Err(e) => return db_error(e),
    };

    let records = project_organizations(&result.items);
    let projections: Vec<Option<Projection>> =
        records.iter().map(|r| r.projection.clone()).collect();

    let verifications = state
        .ledger
        .verify_batch(EntityKind::Company, records, &token)
        .await;

    let items = projections
        .iter()
        .zip(verifications.iter())
        .zip(result.items.iter())
        .map(|((p, v), u)| {
            let mut item = verified_item(p.as_ref(), v);
            // Approval state is local-only; surface it alongside the record
            if let Some(map) = item.as_object_mut() {
                map.insert(
                    "approvalStatus".to_string(),
                    json!(u.approval_status.to_string()),
                );
            }
            item
        })
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

/// GET /api/companies/{id}
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

    let users = match collection::<UserDoc>(&state, USER_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let org = match users.find_by_id(object_id).await {
        Ok(Some(u)) if u.is_organization() => u,
        Ok(Some(_)) | Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, "Organization not found", "NOT_FOUND")
        }
        Err(e) => return db_error(e),
    };

    let mut records = project_organizations(std::slice::from_ref(&org));
    let record = records.remove(0);
    let projection = record.projection.clone();

    let verification = state
        .ledger
        .verify_one(EntityKind::Company, record.id, record.projection, &token)
        .await;

    let mut item = verified_item(projection.as_ref(), &verification);
    if let Some(map) = item.as_object_mut() {
        map.insert(
            "approvalStatus".to_string(),
            json!(org.approval_status.to_string()),
        );
    }

    json_response(StatusCode::OK, &item)
}

/// POST /api/companies/{id}/status
///
/// Admin-only approval decision. Approval enrolls the organization with
/// the ledger and mirrors its `Company` record; rejection is local.
pub async fn handle_status(
    req: Request<hyper::body::Incoming>,
    state: Arc<AppState>,
    claims: Claims,
    token: TokenState,
    id: &str,
) -> Response<BoxBody> {
    if claims.org_role != OrgRole::Admin {
        return error_response(
            StatusCode::FORBIDDEN,
            "Only admins can change approval status",
            "FORBIDDEN",
        );
    }

    let object_id = match parse_object_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let body: StatusRequest = match parse_json_body(req).await {
        Ok(b) => b,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid JSON body: {}", e),
                "BAD_REQUEST",
            )
        }
    };

    let Some(status) = ApprovalStatus::parse(&body.status).filter(|s| *s != ApprovalStatus::Pending)
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "status must be \"approved\" or \"rejected\"",
            "BAD_REQUEST",
        );
    };

    let users = match collection::<UserDoc>(&state, USER_COLLECTION).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let mut org = match users.find_by_id(object_id).await {
        Ok(Some(u)) if u.is_organization() => u,
        Ok(Some(_)) | Ok(None) => {
            return error_response(StatusCode::NOT_FOUND, "Organization not found", "NOT_FOUND")
        }
        Err(e) => return db_error(e),
    };

    // Approval is where the organization reaches the ledger, so it needs
    // a grant up front; rejection never leaves MongoDB
    let grant = if status == ApprovalStatus::Approved {
        match require_grant(&token) {
            Ok(g) => Some(g),
            Err(resp) => return resp,
        }
    } else {
        None
    };

    if let Err(e) = users
        .update_one(
            doc! { "_id": object_id },
            doc! { "$set": {
                "approval_status": status.to_string(),
                "metadata.updated_at": bson::DateTime::now(),
            } },
        )
        .await
    {
        return db_error(e);
    }

    // The mirrored digest must match what reads will recompute, so the
    // in-memory document has to carry the new status before projecting
    org.approval_status = status;

    info!(
        "Organization {} set to {} by {}",
        object_id, status, claims.identifier
    );

    let Some(grant) = grant else {
        return json_response(
            StatusCode::OK,
            &json!({ "id": object_id.to_hex(), "approvalStatus": status.to_string() }),
        );
    };

    // Enroll the approved organization so its own requests can get tokens
    let identity = LedgerIdentity {
        user_id: object_id.to_hex(),
        org_name: state.args.ledger_org.clone(),
        company_name: org.company_name.clone(),
    };
    if let Err(e) = state.ledger.client().register_identity(&identity).await {
        warn!(company = %object_id, error = %e, "Ledger enrollment failed");
    }

    let proj = match projection::company(&org) {
        Ok(p) => p,
        Err(e) => {
            warn!(company = %object_id, error = %e, "Projection failed");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Organization approved but could not be projected",
                "PROJECTION_ERROR",
            );
        }
    };

    match state
        .ledger
        .mirror_write(EntityKind::Company, &object_id.to_hex(), &proj, &grant)
        .await
    {
        Ok(hash) => json_response(
            StatusCode::OK,
            &json!({
                "id": object_id.to_hex(),
                "approvalStatus": status.to_string(),
                "hash": hash,
            }),
        ),
        Err(e) => {
            warn!(company = %object_id, error = %e, "Ledger mirror failed");
            error_response(
                StatusCode::BAD_GATEWAY,
                format!(
                    "Organization {} approved but not mirrored to the ledger",
                    object_id.to_hex()
                ),
                "LEDGER_WRITE",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::digest::digest;
    use crate::ledger::reconcile::{classify, VerificationStatus};

    fn pending_org() -> UserDoc {
        UserDoc {
            _id: Some(bson::oid::ObjectId::parse_str("64b1f0c2a1b2c3d4e5f60718").unwrap()),
            identifier: "maker@example.com".into(),
            display_name: "Acme Foods".into(),
            org_role: OrgRole::Company,
            company_name: "Acme Foods".into(),
            location: Some("Rotterdam".into()),
            approval_status: ApprovalStatus::Pending,
            ..Default::default()
        }
    }

    #[test]
    fn test_approval_mirrors_the_updated_status() {
        // The digest written at approval time must be the one every
        // subsequent read recomputes from the stored document
        let mut org = pending_org();
        org.approval_status = ApprovalStatus::Approved;

        let written = digest(&projection::company(&org).unwrap());
        let read = digest(&projection::company(&org).unwrap());
        assert_eq!(classify(&read, Some(&written)), VerificationStatus::Verified);

        // Mirroring the document as fetched, before the status flip, would
        // leave the record permanently unverified
        let stale = pending_org();
        let stale_digest = digest(&projection::company(&stale).unwrap());
        assert_eq!(
            classify(&read, Some(&stale_digest)),
            VerificationStatus::Unverified
        );
    }
}
