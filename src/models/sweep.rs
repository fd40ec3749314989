use serde::Serialize;

/// Summary of one deduction sweep
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub processed: usize,
    pub deducted: usize,
    pub no_credits: Vec<NoCreditSession>,
    pub errors: Vec<SweepFailure>,
}

/// Overdue session closed without a deduction because the client ran out of credits
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoCreditSession {
    pub session_id: i32,
    pub client_id: i32,
    pub client_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepFailure {
    pub session_id: i32,
    pub reason: String,
}

/// Client with no credits left but upcoming sessions on the books
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientNeedingPayment {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub available_sessions: i32,
    pub upcoming_sessions: usize,
    pub next_session: Option<time::OffsetDateTime>,
}
