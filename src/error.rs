use uuid::Uuid;

/// Every failure a ledger operation can surface. Callers switch on the
/// variant (or on [`LedgerError::code`]) rather than on message text.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Cart {cart_id} not found for user {user_id}")]
    CartNotFound { cart_id: i32, user_id: i32 },

    #[error("Client {0} not found")]
    ClientNotFound(i32),

    #[error("User {0} is not a client or prospect")]
    NotAClient(i32),

    #[error("Package {0} not found")]
    PackageNotFound(i32),

    #[error("Package {0} is inactive and cannot be applied")]
    PackageInactive(i32),

    #[error("Package {0} has no sessions to grant")]
    PackageHasNoSessions(i32),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(
        "Duplicate payment detected: Order #{order_number} was created {seconds_ago}s ago for the same client and package"
    )]
    DuplicatePaymentWindow {
        order_id: i32,
        order_number: String,
        seconds_ago: i64,
    },

    #[error("Client {client_id} has {available} credits, cannot deduct {requested}")]
    InsufficientCredits {
        client_id: i32,
        available: i32,
        requested: i32,
    },

    #[error("Idempotency key {0} collided but no winning order was found")]
    IdempotencyReconciliationFailed(Uuid),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl LedgerError {
    /// Stable machine-readable code for boundary layers
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Database(_) => "DATABASE_ERROR",
            LedgerError::CartNotFound { .. } => "CART_NOT_FOUND",
            LedgerError::ClientNotFound(_) => "CLIENT_NOT_FOUND",
            LedgerError::NotAClient(_) => "NOT_A_CLIENT",
            LedgerError::PackageNotFound(_) => "PACKAGE_NOT_FOUND",
            LedgerError::PackageInactive(_) => "PACKAGE_INACTIVE",
            LedgerError::PackageHasNoSessions(_) => "PACKAGE_HAS_NO_SESSIONS",
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::DuplicatePaymentWindow { .. } => "DUPLICATE_PAYMENT_WINDOW",
            LedgerError::InsufficientCredits { .. } => "INSUFFICIENT_CREDITS",
            LedgerError::IdempotencyReconciliationFailed(_) => "IDEMPOTENCY_RECONCILIATION_FAILED",
            LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<validator::ValidationErrors> for LedgerError {
    fn from(errors: validator::ValidationErrors) -> Self {
        LedgerError::Validation(errors.to_string())
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, LedgerError>;
