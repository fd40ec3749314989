use serde::{Deserialize, Serialize};

/// User role; only prospects and clients can hold session credits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Prospect,
    Client,
    Trainer,
    Admin,
}

impl Role {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "prospect" => Some(Self::Prospect),
            "client" => Some(Self::Client),
            "trainer" => Some(Self::Trainer),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prospect => "prospect",
            Self::Client => "client",
            Self::Trainer => "trainer",
            Self::Admin => "admin",
        }
    }

    pub fn can_hold_credits(&self) -> bool {
        matches!(self, Self::Prospect | Self::Client)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Available,
    Assigned,
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "available" => Some(Self::Available),
            "assigned" => Some(Self::Assigned),
            "scheduled" => Some(Self::Scheduled),
            "confirmed" => Some(Self::Confirmed),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Assigned => "assigned",
            Self::Scheduled => "scheduled",
            Self::Confirmed => "confirmed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Statuses that consume a credit once the session time has passed
    pub fn billable() -> [Self; 2] {
        [Self::Scheduled, Self::Confirmed]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    Active,
    Pending,
    Completed,
    Cancelled,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Pending,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
        }
    }
}

/// Offline payment methods an admin may record for a recovery payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Check,
    CardTerminal,
    BankTransfer,
    Other,
}

impl PaymentMethod {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "cash" => Some(Self::Cash),
            "check" => Some(Self::Check),
            "card_terminal" => Some(Self::CardTerminal),
            "bank_transfer" => Some(Self::BankTransfer),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Check => "check",
            Self::CardTerminal => "card_terminal",
            Self::BankTransfer => "bank_transfer",
            Self::Other => "other",
        }
    }

    /// Methods that leave a traceable external reference (check number, terminal receipt, wire id)
    pub fn requires_reference(&self) -> bool {
        matches!(self, Self::Check | Self::CardTerminal | Self::BankTransfer)
    }
}

/// Which caller converted a paid cart into credits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GrantSource {
    CheckoutWebhook,
    VerifyEndpoint,
    Reconciliation,
}

impl GrantSource {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "checkout-webhook" => Some(Self::CheckoutWebhook),
            "verify-endpoint" => Some(Self::VerifyEndpoint),
            "reconciliation" => Some(Self::Reconciliation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutWebhook => "checkout-webhook",
            Self::VerifyEndpoint => "verify-endpoint",
            Self::Reconciliation => "reconciliation",
        }
    }
}
