use esc_audit::{FieldValue, HistoryDiff, HistoryField};
use esc_schemas::{CommissionStatus, FulfilmentItem, HistoryAction, OrderStatus};
use tracing::{debug, info};

use crate::caller::Caller;
use crate::engine::{log_failure, CommissionEngine};
use crate::error::EngineError;
use crate::payloads::ClaimOutcome;
use crate::state_machine::{CommissionEvent, TransitionError};

const ORDER_UNIQUE_CONSTRAINT: &str = "uq_commission_orders_commission";

impl CommissionEngine {
    /// Claim an open commission for the caller.
    ///
    /// The status flip is one conditional `UPDATE ... WHERE status = 'OPEN'`;
    /// whoever gets the row creates the order in the same transaction. Losers
    /// get [`EngineError::Conflict`].
    pub async fn claim(&self, caller: &Caller, service_code: &str) -> Result<ClaimOutcome, EngineError> {
        self.claim_inner(caller, service_code)
            .await
            .inspect_err(|e| log_failure("claim", &caller.user_id, e))
    }

    async fn claim_inner(&self, caller: &Caller, service_code: &str) -> Result<ClaimOutcome, EngineError> {
        let now = self.now();
        caller.ensure_active(now)?;

        let mut tx = self.begin().await?;
        let claimed =
            esc_db::commissions::claim_open(&mut *tx, service_code, &caller.user_id, now).await?;
        let Some(commission) = claimed else {
            drop(tx);
            return Err(self.explain_unclaimable(caller, service_code).await);
        };

        let order = esc_db::orders::insert_order(
            &mut *tx,
            commission.commission_id,
            &caller.user_id,
            &commission.requester_id,
            commission.escrow_amount,
            now,
        )
        .await
        .map_err(|e| {
            let duplicate = e
                .chain()
                .filter_map(|c| c.downcast_ref::<sqlx::Error>())
                .any(|s| esc_db::is_unique_constraint_violation(s, ORDER_UNIQUE_CONSTRAINT));
            if duplicate {
                EngineError::Conflict(format!("commission {service_code} already has an order"))
            } else {
                EngineError::from(e)
            }
        })?;

        let diff = HistoryDiff::new()
            .with(HistoryField::Status, CommissionStatus::Open, commission.status)
            .with(HistoryField::OrderId, FieldValue::Null, FieldValue::Integer(order.order_id))
            .with(HistoryField::Fulfiller, FieldValue::Null, FieldValue::text(&caller.user_id))
            .with(HistoryField::OrderStatus, FieldValue::Null, OrderStatus::Pending);
        esc_db::history::insert_history(
            &mut *tx,
            commission.commission_id,
            HistoryAction::Accept,
            &caller.user_id,
            &diff,
            now,
        )
        .await?;

        Self::commit(tx).await?;
        info!(
            service_code = %commission.service_code,
            actor = %caller.user_id,
            action = HistoryAction::Accept.as_str(),
            order_id = order.order_id,
            "commission claimed"
        );
        Ok(FulfilmentItem { commission, order })
    }

    /// Why the conditional claim matched no row. Only a commission some
    /// other fulfiller holds and has not settled is a lost race.
    async fn explain_unclaimable(&self, caller: &Caller, service_code: &str) -> EngineError {
        let current = match self.pool.acquire().await {
            Ok(mut conn) => esc_db::commissions::fetch_by_code(&mut *conn, service_code).await,
            Err(e) => return EngineError::from(e),
        };
        match current {
            Err(e) => EngineError::from(e),
            Ok(None) => EngineError::NotFound(format!("commission {service_code}")),
            Ok(Some(c)) if c.requester_id == caller.user_id => EngineError::Forbidden(format!(
                "requester cannot claim their own commission {service_code}"
            )),
            Ok(Some(c)) => match c.status {
                CommissionStatus::PendingReview
                | CommissionStatus::Rejected
                | CommissionStatus::Completed
                | CommissionStatus::Cancelled => {
                    EngineError::from(TransitionError {
                        from: c.status,
                        event: CommissionEvent::Claim,
                    })
                }
                _ => {
                    debug!(
                        service_code,
                        actor = %caller.user_id,
                        status = c.status.as_str(),
                        "claim lost; commission no longer available"
                    );
                    EngineError::Conflict(format!("commission {service_code} is no longer available"))
                }
            },
        }
    }
}
