//! Payout request handlers.
//!
//! Creators file requests; operators approve, reject, or stage them. Every
//! completion carries a transaction reference, and the bulk endpoint
//! reports a per-record outcome instead of aborting on the first failure.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use inkpost_models::{PayoutId, PayoutMethod, PayoutRequest, PayoutStatus};
use inkpost_store::StoreError;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Request body for creating a payout request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePayoutRequest {
    /// Amount in minor currency units
    #[validate(range(min = 1))]
    pub amount_cents: u64,
    /// Transfer rail
    pub payout_method: PayoutMethod,
}

/// Payout response.
#[derive(Debug, Serialize)]
pub struct PayoutResponse {
    pub id: String,
    pub user_id: String,
    pub amount_cents: u64,
    pub payout_method: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<String>,
    pub created_at: String,
}

impl From<PayoutRequest> for PayoutResponse {
    fn from(request: PayoutRequest) -> Self {
        Self {
            id: request.id.to_string(),
            user_id: request.user_id,
            amount_cents: request.amount_cents,
            payout_method: request.payout_method.to_string(),
            status: request.status.to_string(),
            transaction_reference: request.transaction_reference,
            admin_notes: request.admin_notes,
            processed_at: request.processed_at.map(|t| t.to_rfc3339()),
            processed_by: request.processed_by,
            created_at: request.created_at.to_rfc3339(),
        }
    }
}

/// POST /api/payouts
///
/// File a withdrawal request for the caller.
pub async fn create_payout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreatePayoutRequest>,
) -> ApiResult<Json<PayoutResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let payout = PayoutRequest::new(&user.uid, request.amount_cents, request.payout_method);
    state.payouts.create(&payout).await?;

    info!(
        payout_id = %payout.id,
        amount_cents = payout.amount_cents,
        method = %payout.payout_method,
        "Payout requested by {}",
        user.uid
    );
    Ok(Json(payout.into()))
}

/// Query parameters for listing payouts.
#[derive(Debug, Deserialize)]
pub struct ListPayoutsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Payout listing response.
#[derive(Debug, Serialize)]
pub struct PayoutListResponse {
    pub payouts: Vec<PayoutResponse>,
}

/// GET /api/payouts
///
/// Operator listing, filtered by status (default: pending).
pub async fn list_payouts(
    State(state): State<AppState>,
    Query(query): Query<ListPayoutsQuery>,
    user: AuthUser,
) -> ApiResult<Json<PayoutListResponse>> {
    user.require_admin()?;

    let status = match query.status.as_deref() {
        Some(s) => parse_status(s)?,
        None => PayoutStatus::Pending,
    };
    let limit = query.limit.unwrap_or(50).min(500);
    let payouts = state.payouts.list_in_status(status, limit).await?;

    Ok(Json(PayoutListResponse {
        payouts: payouts.into_iter().map(Into::into).collect(),
    }))
}

/// GET /api/user/payouts
///
/// The caller's own requests.
pub async fn list_own_payouts(
    State(state): State<AppState>,
    Query(query): Query<ListPayoutsQuery>,
    user: AuthUser,
) -> ApiResult<Json<PayoutListResponse>> {
    let limit = query.limit.unwrap_or(50).min(500);
    let payouts = state.payouts.list_for_user(&user.uid, limit).await?;

    Ok(Json(PayoutListResponse {
        payouts: payouts.into_iter().map(Into::into).collect(),
    }))
}

/// GET /api/payouts/:id
pub async fn get_payout(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<PayoutResponse>> {
    let payout = state
        .payouts
        .get(&PayoutId::from(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Payout request not found"))?;

    user.require_owner_or_admin(&payout.user_id)?;
    Ok(Json(payout.into()))
}

/// Request body for approving a payout.
#[derive(Debug, Deserialize)]
pub struct ApprovePayoutRequest {
    pub transaction_reference: String,
}

/// POST /api/payouts/:id/approve
///
/// Complete a pending request. The transaction reference is mandatory and
/// validated before anything is written.
pub async fn approve_payout(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
    Json(request): Json<ApprovePayoutRequest>,
) -> ApiResult<Json<PayoutResponse>> {
    user.require_admin()?;

    let payout = state
        .payouts
        .transition(&PayoutId::from(id), |p| {
            p.approve(&request.transaction_reference, &user.uid)
        })
        .await?;

    metrics::record_payout_decided("approved");
    info!(
        payout_id = %payout.id,
        reference = %request.transaction_reference,
        "Payout approved by {}",
        user.uid
    );
    Ok(Json(payout.into()))
}

/// Request body for rejecting a payout.
#[derive(Debug, Deserialize)]
pub struct RejectPayoutRequest {
    pub reason: String,
}

/// POST /api/payouts/:id/reject
pub async fn reject_payout(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
    Json(request): Json<RejectPayoutRequest>,
) -> ApiResult<Json<PayoutResponse>> {
    user.require_admin()?;

    let payout = state
        .payouts
        .transition(&PayoutId::from(id), |p| p.reject(&request.reason, &user.uid))
        .await?;

    metrics::record_payout_decided("rejected");
    info!(payout_id = %payout.id, "Payout rejected by {}", user.uid);
    Ok(Json(payout.into()))
}

/// POST /api/payouts/:id/processing
///
/// Stage a pending request while the transfer is being made.
pub async fn mark_payout_processing(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<PayoutResponse>> {
    user.require_admin()?;

    let payout = state
        .payouts
        .transition(&PayoutId::from(id), |p| p.mark_processing())
        .await?;

    info!(payout_id = %payout.id, "Payout marked processing by {}", user.uid);
    Ok(Json(payout.into()))
}

/// Request body for bulk approval.
#[derive(Debug, Deserialize, Validate)]
pub struct BulkApproveRequest {
    /// Request IDs to approve
    #[validate(length(min = 1, max = 100))]
    pub ids: Vec<String>,
    /// Prefix for the synthetic transaction references
    #[validate(length(min = 1, max = 32))]
    pub reference_prefix: String,
}

/// Outcome for one record in a bulk operation.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum BulkOutcome {
    Approved,
    /// Not pending anymore (or a concurrent writer got there first)
    Skipped,
    Errored { detail: String },
}

/// Per-record result in the bulk response.
#[derive(Debug, Serialize)]
pub struct BulkRecordResult {
    pub id: String,
    #[serde(flatten)]
    pub outcome: BulkOutcome,
}

/// Bulk approval response.
#[derive(Debug, Serialize)]
pub struct BulkApproveResponse {
    pub approved: usize,
    pub skipped: usize,
    pub errored: usize,
    pub results: Vec<BulkRecordResult>,
}

/// POST /api/payouts/bulk-approve
///
/// Approve every pending request in the batch with a synthetic reference
/// (`{prefix}-{id}`). Records not in pending are skipped, not failed; the
/// response carries the exact per-record outcome.
pub async fn bulk_approve_payouts(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<BulkApproveRequest>,
) -> ApiResult<Json<BulkApproveResponse>> {
    user.require_admin()?;
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let mut results = Vec::with_capacity(request.ids.len());

    for id in &request.ids {
        let payout_id = PayoutId::from(id.clone());
        let reference = synthetic_reference(&request.reference_prefix, id);

        let outcome = match state
            .payouts
            .transition(&payout_id, |p| p.approve(&reference, &user.uid))
            .await
        {
            Ok(_) => {
                metrics::record_payout_decided("approved");
                BulkOutcome::Approved
            }
            // Not pending anymore, or a racing writer advanced it first.
            Err(StoreError::Transition(_)) | Err(StoreError::Conflict { .. }) => {
                BulkOutcome::Skipped
            }
            Err(e) => {
                warn!(payout_id = %id, "Bulk approve failed: {}", e);
                BulkOutcome::Errored {
                    detail: e.to_string(),
                }
            }
        };

        results.push(BulkRecordResult {
            id: id.clone(),
            outcome,
        });
    }

    let approved = results
        .iter()
        .filter(|r| r.outcome == BulkOutcome::Approved)
        .count();
    let skipped = results
        .iter()
        .filter(|r| r.outcome == BulkOutcome::Skipped)
        .count();
    let errored = results.len() - approved - skipped;

    info!(
        approved,
        skipped, errored,
        "Bulk payout approval by {}",
        user.uid
    );

    Ok(Json(BulkApproveResponse {
        approved,
        skipped,
        errored,
        results,
    }))
}

fn synthetic_reference(prefix: &str, id: &str) -> String {
    format!("{}-{}", prefix, id)
}

fn parse_status(s: &str) -> ApiResult<PayoutStatus> {
    match s {
        "pending" => Ok(PayoutStatus::Pending),
        "processing" => Ok(PayoutStatus::Processing),
        "completed" => Ok(PayoutStatus::Completed),
        "rejected" => Ok(PayoutStatus::Rejected),
        other => Err(ApiError::bad_request(format!("Unknown payout status: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_reference() {
        assert_eq!(synthetic_reference("batch-2026-08", "abc"), "batch-2026-08-abc");
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("rejected").unwrap(), PayoutStatus::Rejected);
        assert!(parse_status("paid").is_err());
    }

    #[test]
    fn test_bulk_outcome_serializes_tagged() {
        let result = BulkRecordResult {
            id: "p-1".into(),
            outcome: BulkOutcome::Errored {
                detail: "redis down".into(),
            },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "errored");
        assert_eq!(json["detail"], "redis down");
        assert_eq!(json["id"], "p-1");
    }
}
