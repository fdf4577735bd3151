//! Payout request records and the approval workflow.
//!
//! Requests are created by a payee and mutated only by an authorized
//! approver. Completion always carries a transaction reference so every
//! paid-out amount can be traced back to a transfer.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{TransitionError, TransitionResult};

/// Unique identifier for a payout request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct PayoutId(pub String);

impl PayoutId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PayoutId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for PayoutId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Transfer rail for a payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMethod {
    Wise,
    Payoneer,
    Stripe,
    BankWire,
    CryptoUsdt,
    CryptoUsdc,
    Paypal,
}

impl PayoutMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutMethod::Wise => "wise",
            PayoutMethod::Payoneer => "payoneer",
            PayoutMethod::Stripe => "stripe",
            PayoutMethod::BankWire => "bank_wire",
            PayoutMethod::CryptoUsdt => "crypto_usdt",
            PayoutMethod::CryptoUsdc => "crypto_usdc",
            PayoutMethod::Paypal => "paypal",
        }
    }

    /// Human-readable label for operator-facing listings.
    pub fn label(&self) -> &'static str {
        match self {
            PayoutMethod::Wise => "Wise",
            PayoutMethod::Payoneer => "Payoneer",
            PayoutMethod::Stripe => "Stripe",
            PayoutMethod::BankWire => "Bank Wire",
            PayoutMethod::CryptoUsdt => "USDT",
            PayoutMethod::CryptoUsdc => "USDC",
            PayoutMethod::Paypal => "PayPal",
        }
    }
}

impl fmt::Display for PayoutMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payout request state.
///
/// Only `pending` requests may transition; `processing`, `completed`, and
/// `rejected` are all final as far as this workflow is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Rejected,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Completed => "completed",
            PayoutStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PayoutStatus::Completed | PayoutStatus::Rejected)
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A creator's request to withdraw earnings.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PayoutRequest {
    /// Unique request ID
    pub id: PayoutId,

    /// Requesting user
    pub user_id: String,

    /// Amount in minor currency units (cents)
    pub amount_cents: u64,

    /// Transfer rail
    pub payout_method: PayoutMethod,

    /// Current state
    #[serde(default)]
    pub status: PayoutStatus,

    /// Transfer reference (required on completion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_reference: Option<String>,

    /// Approver notes (rejection reason lives here)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_notes: Option<String>,

    /// When the request was processed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    /// Who processed the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_by: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl PayoutRequest {
    /// Create a new request in state `pending`.
    pub fn new(user_id: impl Into<String>, amount_cents: u64, method: PayoutMethod) -> Self {
        let now = Utc::now();
        Self {
            id: PayoutId::new(),
            user_id: user_id.into(),
            amount_cents,
            payout_method: method,
            status: PayoutStatus::Pending,
            transaction_reference: None,
            admin_notes: None,
            processed_at: None,
            processed_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Approve a `pending` request. Requires a non-empty transaction
    /// reference; nothing is written when validation fails.
    pub fn approve(
        &mut self,
        transaction_reference: impl Into<String>,
        approver: impl Into<String>,
    ) -> TransitionResult<()> {
        if self.status != PayoutStatus::Pending {
            return Err(TransitionError::invalid(self.status.as_str(), "approve"));
        }
        let reference = transaction_reference.into();
        if reference.trim().is_empty() {
            return Err(TransitionError::MissingAuditData("transaction reference"));
        }
        let now = Utc::now();
        self.status = PayoutStatus::Completed;
        self.transaction_reference = Some(reference);
        self.processed_at = Some(now);
        self.processed_by = Some(approver.into());
        self.updated_at = now;
        Ok(())
    }

    /// Reject a `pending` request with a reason.
    pub fn reject(
        &mut self,
        reason: impl Into<String>,
        approver: impl Into<String>,
    ) -> TransitionResult<()> {
        if self.status != PayoutStatus::Pending {
            return Err(TransitionError::invalid(self.status.as_str(), "reject"));
        }
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(TransitionError::MissingAuditData("rejection reason"));
        }
        let now = Utc::now();
        self.status = PayoutStatus::Rejected;
        self.admin_notes = Some(reason);
        self.processed_at = Some(now);
        self.processed_by = Some(approver.into());
        self.updated_at = now;
        Ok(())
    }

    /// Mark a `pending` request as `processing` (transfer staged, no audit
    /// data required yet).
    pub fn mark_processing(&mut self) -> TransitionResult<()> {
        if self.status != PayoutStatus::Pending {
            return Err(TransitionError::invalid(self.status.as_str(), "process"));
        }
        self.status = PayoutStatus::Processing;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PayoutRequest {
        PayoutRequest::new("creator-1", 125_00, PayoutMethod::Wise)
    }

    #[test]
    fn test_new_request_is_pending() {
        let req = request();
        assert_eq!(req.status, PayoutStatus::Pending);
        assert!(req.transaction_reference.is_none());
        assert!(req.processed_by.is_none());
    }

    #[test]
    fn test_approve_records_audit_trail() {
        let mut req = request();
        req.approve("wise-tx-991", "admin-7").unwrap();
        assert_eq!(req.status, PayoutStatus::Completed);
        assert_eq!(req.transaction_reference.as_deref(), Some("wise-tx-991"));
        assert_eq!(req.processed_by.as_deref(), Some("admin-7"));
        assert!(req.processed_at.is_some());
    }

    #[test]
    fn test_approve_with_empty_reference_is_rejected_unchanged() {
        let mut req = request();
        let err = req.approve("  ", "admin-7").unwrap_err();
        assert_eq!(err, TransitionError::MissingAuditData("transaction reference"));
        assert_eq!(req.status, PayoutStatus::Pending);
        assert!(req.transaction_reference.is_none());
        assert!(req.processed_at.is_none());
    }

    #[test]
    fn test_reject_records_reason() {
        let mut req = request();
        req.reject("KYC incomplete", "admin-7").unwrap();
        assert_eq!(req.status, PayoutStatus::Rejected);
        assert_eq!(req.admin_notes.as_deref(), Some("KYC incomplete"));
        assert!(req.processed_at.is_some());
    }

    #[test]
    fn test_reject_requires_reason() {
        let mut req = request();
        assert!(req.reject("", "admin-7").is_err());
        assert_eq!(req.status, PayoutStatus::Pending);
    }

    #[test]
    fn test_non_pending_requests_are_immutable() {
        let mut req = request();
        req.mark_processing().unwrap();

        assert!(req.approve("tx-1", "admin-7").is_err());
        assert!(req.reject("nope", "admin-7").is_err());
        assert!(req.mark_processing().is_err());
        assert_eq!(req.status, PayoutStatus::Processing);
        assert!(req.transaction_reference.is_none());

        let mut done = request();
        done.approve("tx-2", "admin-7").unwrap();
        assert!(done.approve("tx-3", "admin-8").is_err());
        assert_eq!(done.transaction_reference.as_deref(), Some("tx-2"));
    }

    #[test]
    fn test_mixed_batch_approves_only_pending() {
        let mut batch = vec![request(), request(), request(), request()];
        batch[1].mark_processing().unwrap();
        batch[2].reject("fraud check", "admin-1").unwrap();

        let mut approved = 0;
        for req in batch.iter_mut() {
            let reference = format!("batch-7-{}", req.id);
            if req.approve(&reference, "admin-7").is_ok() {
                approved += 1;
            }
        }

        assert_eq!(approved, 2);
        assert_eq!(batch[0].status, PayoutStatus::Completed);
        assert_eq!(batch[1].status, PayoutStatus::Processing);
        assert_eq!(batch[2].status, PayoutStatus::Rejected);
        assert_eq!(batch[3].status, PayoutStatus::Completed);
        assert_eq!(
            batch[3].transaction_reference,
            Some(format!("batch-7-{}", batch[3].id))
        );
    }

    #[test]
    fn test_method_labels() {
        assert_eq!(PayoutMethod::BankWire.as_str(), "bank_wire");
        assert_eq!(PayoutMethod::BankWire.label(), "Bank Wire");
        assert_eq!(PayoutMethod::CryptoUsdt.label(), "USDT");
    }
}
