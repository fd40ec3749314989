use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::common::PaymentMethod;
use crate::{
    config::LedgerConfig,
    error::{LedgerError, Result},
};

/// Admin request to record an offline payment for a package
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_payment_reference"))]
pub struct RecoveryPaymentRequest {
    #[validate(range(min = 1))]
    pub client_id: i32,

    #[validate(range(min = 1))]
    pub package_id: i32,

    pub payment_method: PaymentMethod,

    #[validate(length(max = 255))]
    pub payment_reference: Option<String>,

    #[validate(length(max = 1000))]
    pub notes: Option<String>,

    #[validate(custom(function = "validate_uuid_v4"))]
    pub idempotency_token: String,

    #[serde(default)]
    pub force: bool,

    #[validate(length(max = 500))]
    pub force_reason: Option<String>,

    #[validate(range(min = 1))]
    pub admin_user_id: i32,
}

impl RecoveryPaymentRequest {
    /// Full pre-transaction validation; returns the parsed idempotency token
    pub fn validate_with(&self, config: &LedgerConfig) -> Result<Uuid> {
        self.validate()?;

        if self.force {
            let reason_len = self
                .force_reason
                .as_deref()
                .map(|r| r.trim().chars().count())
                .unwrap_or(0);
            if (reason_len as u64) < config.force_reason_min_len {
                return Err(LedgerError::Validation(format!(
                    "forceReason must be at least {} characters when force is set",
                    config.force_reason_min_len
                )));
            }
        }

        Uuid::parse_str(&self.idempotency_token)
            .map_err(|e| LedgerError::Validation(format!("idempotencyToken: {}", e)))
    }

    pub fn trimmed_reference(&self) -> Option<&str> {
        self.payment_reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

fn validate_uuid_v4(token: &str) -> std::result::Result<(), ValidationError> {
    match Uuid::parse_str(token) {
        Ok(uuid) if uuid.get_version() == Some(uuid::Version::Random) => Ok(()),
        _ => {
            let mut error = ValidationError::new("uuid_v4");
            error.message = Some(Cow::Borrowed("idempotencyToken must be a v4 UUID"));
            Err(error)
        }
    }
}

fn validate_payment_reference(
    request: &RecoveryPaymentRequest,
) -> std::result::Result<(), ValidationError> {
    if request.payment_method.requires_reference() && request.trimmed_reference().is_none() {
        let mut error = ValidationError::new("payment_reference_required");
        error.message = Some(Cow::Owned(format!(
            "paymentReference is required for {}",
            request.payment_method.as_str()
        )));
        return Err(error);
    }
    Ok(())
}

/// Result of a recovery payment. `reconciled` is set when the order was
/// created by an earlier call carrying the same idempotency token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryOutcome {
    pub order_id: i32,
    pub order_number: String,
    pub sessions_added: i32,
    pub previous_balance: i32,
    pub new_balance: i32,
    pub package_name: String,
    pub total_amount_cents: i64,
    pub reconciled: bool,
}

/// Package of a client's most recent completed order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastPackage {
    pub package_id: i32,
    pub package_name: String,
    pub sessions: i32,
    pub price_cents: i64,
    pub price_per_session_cents: Option<i64>,
    pub package_type: String,
    pub order_id: i32,
}
