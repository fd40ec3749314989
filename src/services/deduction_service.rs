use crate::{
    error::{LedgerError, Result},
    models::{
        common::{Role, SessionStatus},
        sweep::{ClientNeedingPayment, NoCreditSession, SweepFailure, SweepReport},
    },
    utils::{append_note, rollback_quietly},
};
use sea_orm::{
    entity::*, query::*, sea_query::Expr, DatabaseConnection, DatabaseTransaction,
    TransactionTrait,
};
use std::collections::{BTreeMap, HashMap};
use tracing::{error, info, instrument, warn};

const NOTE_DEDUCTED: &str = "[Auto] Session credit deducted automatically";
const NOTE_NO_CREDITS: &str = "[Auto] Session completed - No credits to deduct";
const NOTE_NO_CLIENT: &str = "[Auto] Session completed - No client found";
const NOTE_PROCESSING_ERROR: &str = "[Auto] Session completed - Deduction failed, needs review";

/// Consumes credits for sessions whose time has passed
pub struct DeductionService {
    db: DatabaseConnection,
}

/// What happened to one client's overdue sessions
struct ClientSettlement {
    deducted: usize,
    no_credits: Vec<NoCreditSession>,
}

impl DeductionService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Convert every overdue scheduled/confirmed session into either a credit
    /// deduction or a no-credit flag.
    ///
    /// Runs in one outer transaction; each client is settled inside its own
    /// savepoint so one client's failure does not discard the others' work.
    /// Not re-entrant: the scheduler must not start overlapping runs.
    #[instrument(skip(self))]
    pub async fn run_deduction_sweep(&self) -> Result<SweepReport> {
        let txn = self.db.begin().await?;
        let now = time::OffsetDateTime::now_utc();

        match self.sweep_in_txn(now, &txn).await {
            Ok(report) => {
                txn.commit().await?;

                info!(
                    processed = report.processed,
                    deducted = report.deducted,
                    "Deduction sweep complete"
                );
                if !report.no_credits.is_empty() {
                    info!(
                        no_credits = report.no_credits.len(),
                        "Sessions completed without available credits"
                    );
                }
                if !report.errors.is_empty() {
                    error!(errors = report.errors.len(), "Deduction sweep recorded errors");
                }

                Ok(report)
            }
            Err(e) => {
                error!(error = %e, "Deduction sweep failed, rolling back entire batch");
                rollback_quietly(txn, "deduction-sweep").await;
                Err(e)
            }
        }
    }

    async fn sweep_in_txn(
        &self,
        now: time::OffsetDateTime,
        txn: &DatabaseTransaction,
    ) -> Result<SweepReport> {
        let mut report = SweepReport::default();

        let overdue = entity::session_records::Entity::find()
            .filter(
                entity::session_records::Column::Status
                    .is_in(SessionStatus::billable().map(|s| s.as_str())),
            )
            .filter(entity::session_records::Column::SessionDate.lt(now))
            .filter(entity::session_records::Column::SessionDeducted.eq(false))
            .filter(entity::session_records::Column::UserId.is_not_null())
            .filter(entity::session_records::Column::IsBlocked.eq(false))
            .order_by_asc(entity::session_records::Column::SessionDate)
            .order_by_asc(entity::session_records::Column::Id)
            .lock_exclusive()
            .all(txn)
            .await?;

        report.processed = overdue.len();
        if overdue.is_empty() {
            return Ok(report);
        }

        let client_ids: Vec<i32> = overdue.iter().filter_map(|s| s.user_id).collect();
        let clients: HashMap<i32, entity::users::Model> = entity::users::Entity::find()
            .filter(entity::users::Column::Id.is_in(client_ids))
            .all(txn)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        // Oldest-due-first within each client, since `overdue` is already sorted
        let mut by_client: BTreeMap<i32, Vec<entity::session_records::Model>> = BTreeMap::new();
        for session in overdue {
            match session.user_id.filter(|id| clients.contains_key(id)) {
                Some(client_id) => by_client.entry(client_id).or_default().push(session),
                None => {
                    report.errors.push(SweepFailure {
                        session_id: session.id,
                        reason: "No client found".to_string(),
                    });
                    close_session(session, NOTE_NO_CLIENT, false, now, txn).await?;
                }
            }
        }

        for (client_id, sessions) in by_client {
            let client_name = clients
                .get(&client_id)
                .map(display_name)
                .unwrap_or_default();

            let savepoint = txn.begin().await?;
            match settle_client(client_id, &client_name, &sessions, now, &savepoint).await {
                Ok(settlement) => {
                    savepoint.commit().await?;
                    report.deducted += settlement.deducted;
                    report.no_credits.extend(settlement.no_credits);
                }
                Err(e) => {
                    warn!(client_id = client_id, error = %e, "Failed to settle client sessions");
                    rollback_quietly(savepoint, "deduction-sweep:client").await;

                    let reason = match e {
                        LedgerError::ClientNotFound(_) => "Client not found on refetch".to_string(),
                        other => format!("Processing error: {}", other.code()),
                    };
                    for session in sessions {
                        report.errors.push(SweepFailure {
                            session_id: session.id,
                            reason: reason.clone(),
                        });
                        close_session(session, NOTE_PROCESSING_ERROR, false, now, txn).await?;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Clients and prospects with no credits left who still have upcoming sessions
    #[instrument(skip(self))]
    pub async fn clients_needing_payment(&self) -> Result<Vec<ClientNeedingPayment>> {
        let now = time::OffsetDateTime::now_utc();

        let exhausted = entity::users::Entity::find()
            .filter(
                entity::users::Column::Role
                    .is_in([Role::Client.as_str(), Role::Prospect.as_str()]),
            )
            .filter(entity::users::Column::AvailableSessions.lte(0))
            .order_by_asc(entity::users::Column::Id)
            .all(&self.db)
            .await?;

        if exhausted.is_empty() {
            return Ok(Vec::new());
        }

        let upcoming = entity::session_records::Entity::find()
            .filter(
                entity::session_records::Column::UserId
                    .is_in(exhausted.iter().map(|c| c.id).collect::<Vec<_>>()),
            )
            .filter(
                entity::session_records::Column::Status
                    .is_in(SessionStatus::billable().map(|s| s.as_str())),
            )
            .filter(entity::session_records::Column::SessionDate.gte(now))
            .order_by_asc(entity::session_records::Column::SessionDate)
            .all(&self.db)
            .await?;

        let mut by_client: HashMap<i32, Vec<time::OffsetDateTime>> = HashMap::new();
        for session in upcoming {
            if let Some(client_id) = session.user_id {
                by_client.entry(client_id).or_default().push(session.session_date);
            }
        }

        Ok(exhausted
            .into_iter()
            .filter_map(|client| {
                let dates = by_client.remove(&client.id)?;
                Some(ClientNeedingPayment {
                    id: client.id,
                    name: display_name(&client),
                    email: client.email,
                    available_sessions: client.available_sessions,
                    upcoming_sessions: dates.len(),
                    next_session: dates.first().copied(),
                })
            })
            .collect())
    }
}

/// Settle one client's overdue sessions under the client's row lock:
/// deduct as many as the balance covers with a single decrement, close the rest.
async fn settle_client(
    client_id: i32,
    client_name: &str,
    sessions: &[entity::session_records::Model],
    now: time::OffsetDateTime,
    txn: &DatabaseTransaction,
) -> Result<ClientSettlement> {
    let client = entity::users::Entity::find_by_id(client_id)
        .lock_exclusive()
        .one(txn)
        .await?
        .ok_or(LedgerError::ClientNotFound(client_id))?;

    let current_credits = client.available_sessions.max(0);
    let deductible = sessions.len().min(current_credits as usize);
    let (covered, uncovered) = sessions.split_at(deductible);

    for session in covered {
        close_session(session.clone(), NOTE_DEDUCTED, true, now, txn).await?;
    }

    if deductible > 0 {
        let amount = deductible as i32;
        let updated = entity::users::Entity::update_many()
            .col_expr(
                entity::users::Column::AvailableSessions,
                Expr::col(entity::users::Column::AvailableSessions).sub(amount),
            )
            .col_expr(entity::users::Column::UpdatedAt, Expr::value(now))
            .filter(entity::users::Column::Id.eq(client_id))
            .filter(entity::users::Column::AvailableSessions.gte(amount))
            .exec(txn)
            .await?;

        if updated.rows_affected != 1 {
            return Err(LedgerError::InsufficientCredits {
                client_id,
                available: current_credits,
                requested: amount,
            });
        }
    }

    let mut no_credits = Vec::with_capacity(uncovered.len());
    for session in uncovered {
        no_credits.push(NoCreditSession {
            session_id: session.id,
            client_id,
            client_name: client_name.to_string(),
            reason: "No available session credits".to_string(),
        });
        close_session(session.clone(), NOTE_NO_CREDITS, false, now, txn).await?;
    }

    if !no_credits.is_empty() {
        info!(
            client_id = client_id,
            deducted = deductible,
            without_credit = no_credits.len(),
            "Client ran out of session credits"
        );
    }

    Ok(ClientSettlement {
        deducted: deductible,
        no_credits,
    })
}

/// Mark a session completed, optionally consuming its credit
async fn close_session(
    session: entity::session_records::Model,
    note: &str,
    deducted: bool,
    now: time::OffsetDateTime,
    txn: &DatabaseTransaction,
) -> Result<()> {
    let notes = append_note(session.notes.as_deref(), note);

    let mut active: entity::session_records::ActiveModel = session.into();
    active.status = Set(SessionStatus::Completed.as_str().to_string());
    active.notes = Set(Some(notes));
    active.updated_at = Set(now);
    if deducted {
        active.session_deducted = Set(true);
        active.deduction_date = Set(Some(now));
    }
    active.update(txn).await?;

    Ok(())
}

fn display_name(client: &entity::users::Model) -> String {
    format!("{} {}", client.first_name, client.last_name)
        .trim()
        .to_string()
}
