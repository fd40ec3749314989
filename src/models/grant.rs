use serde::Serialize;

/// Result of converting a paid cart into session credits
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantOutcome {
    pub granted: bool,
    pub sessions_added: i32,
    pub already_processed: bool,
    /// Audit order written by this grant; `None` when nothing was granted
    pub order_id: Option<i32>,
}

impl GrantOutcome {
    pub fn already_processed() -> Self {
        Self {
            granted: false,
            sessions_added: 0,
            already_processed: true,
            order_id: None,
        }
    }
}
