use chrono::{DateTime, Utc};
use esc_audit::{FieldValue, HistoryDiff, HistoryField};
use esc_ledger::Settlement;
use esc_schemas::{
    CommissionRecord, CommissionStatus, HistoryAction, OrderRecord, OrderStatus, WalletAccount,
};
use sqlx::PgConnection;
use tracing::info;

use super::opt_trimmed;
use crate::caller::Caller;
use crate::engine::{log_failure, CommissionEngine};
use crate::error::EngineError;
use crate::payloads::SettlementOutcome;
use crate::state_machine::{next_status, CommissionEvent};

/// Rows loaded and checked for a settlement, still locked.
struct Settling {
    commission: CommissionRecord,
    order: OrderRecord,
    next: CommissionStatus,
}

impl CommissionEngine {
    async fn lock_for_settlement(
        conn: &mut PgConnection,
        caller: &Caller,
        service_code: &str,
        event: CommissionEvent,
    ) -> Result<Settling, EngineError> {
        let commission = Self::lock_commission(conn, service_code).await?;
        if commission.requester_id != caller.user_id {
            return Err(EngineError::Forbidden(format!(
                "only the requester may settle {service_code}"
            )));
        }
        let next = next_status(commission.status, event)?;
        let order = esc_db::orders::lock_for_commission(conn, commission.commission_id)
            .await?
            .ok_or_else(|| EngineError::OrderMissing(service_code.to_string()))?;
        if order.status != OrderStatus::Pending {
            return Err(EngineError::InvalidState(format!(
                "order for {service_code} is already {}",
                order.status.as_str()
            )));
        }
        Ok(Settling {
            commission,
            order,
            next,
        })
    }

    /// Mark the order finished and write the commission, the wallet movement
    /// and the history row of a settlement.
    #[allow(clippy::too_many_arguments)]
    async fn finish_settlement(
        conn: &mut PgConnection,
        caller: &Caller,
        settling: &mut Settling,
        settlement: &Settlement,
        account: &WalletAccount,
        order_status: OrderStatus,
        action: HistoryAction,
        mut diff: HistoryDiff,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let code = settling.commission.service_code.clone();
        if !esc_db::orders::finish_order(conn, settling.order.order_id, order_status, now).await? {
            return Err(EngineError::InvalidState(format!(
                "order for {code} is no longer pending"
            )));
        }
        settling.order.status = order_status;
        settling.order.finished_at = Some(now);

        diff.record(HistoryField::Status, settling.commission.status, settling.next)
            .record(HistoryField::OrderStatus, OrderStatus::Pending, order_status)
            .record(
                HistoryField::EscrowAmount,
                FieldValue::Amount(settlement.escrow.raw()),
                FieldValue::Amount(settling.commission.escrow_amount),
            );

        settling.commission.status = settling.next;
        settling.commission.updated_at = now;
        esc_db::commissions::store_commission(conn, &settling.commission).await?;

        let description = match action {
            HistoryAction::Complete => "commission payout",
            _ => "commission refund",
        };
        Self::record_movement(conn, account, &settlement.movement, description, now).await?;
        esc_db::history::insert_history(
            conn,
            settling.commission.commission_id,
            action,
            &caller.user_id,
            &diff,
            now,
        )
        .await?;
        Ok(())
    }

    /// Requester confirms receipt: pay escrow minus fee to the fulfiller.
    pub async fn complete(&self, caller: &Caller, service_code: &str) -> Result<SettlementOutcome, EngineError> {
        self.complete_inner(caller, service_code)
            .await
            .inspect_err(|e| log_failure("complete", &caller.user_id, e))
    }

    async fn complete_inner(&self, caller: &Caller, service_code: &str) -> Result<SettlementOutcome, EngineError> {
        let now = self.now();
        caller.ensure_active(now)?;

        let mut tx = self.begin().await?;
        let mut settling =
            Self::lock_for_settlement(&mut *tx, caller, service_code, CommissionEvent::Complete).await?;
        let mut fulfiller = Self::lock_account(&mut *tx, &settling.order.fulfiller_id).await?;
        let settlement = esc_ledger::release_to_fulfiller(
            &mut settling.commission,
            Some(&settling.order),
            &mut fulfiller,
        )?;

        let diff = HistoryDiff::new()
            .with(HistoryField::Payout, FieldValue::Null, FieldValue::Amount(settlement.credited.raw()))
            .with(HistoryField::FeeKept, FieldValue::Null, FieldValue::Amount(settlement.fee_kept.raw()));
        Self::finish_settlement(
            &mut *tx,
            caller,
            &mut settling,
            &settlement,
            &fulfiller,
            OrderStatus::Completed,
            HistoryAction::Complete,
            diff,
            now,
        )
        .await?;

        Self::commit(tx).await?;
        info!(
            service_code = %settling.commission.service_code,
            actor = %caller.user_id,
            action = HistoryAction::Complete.as_str(),
            fulfiller = %settling.order.fulfiller_id,
            payout = settlement.credited.raw(),
            fee = settlement.fee_kept.raw(),
            "commission completed"
        );
        Ok(SettlementOutcome {
            commission: settling.commission,
            order: settling.order,
            credited: settlement.credited.raw(),
            fee_kept: settlement.fee_kept.raw(),
        })
    }

    /// Requester cancels a shipped commission: the full escrow is refunded.
    pub async fn cancel(
        &self,
        caller: &Caller,
        service_code: &str,
        reason: Option<String>,
    ) -> Result<SettlementOutcome, EngineError> {
        self.cancel_inner(caller, service_code, reason)
            .await
            .inspect_err(|e| log_failure("cancel", &caller.user_id, e))
    }

    async fn cancel_inner(
        &self,
        caller: &Caller,
        service_code: &str,
        reason: Option<String>,
    ) -> Result<SettlementOutcome, EngineError> {
        let now = self.now();
        caller.ensure_active(now)?;

        let mut tx = self.begin().await?;
        let mut settling =
            Self::lock_for_settlement(&mut *tx, caller, service_code, CommissionEvent::Cancel).await?;
        let mut requester = Self::lock_account(&mut *tx, &settling.commission.requester_id).await?;
        let settlement = esc_ledger::refund_to_requester(
            &mut settling.commission,
            Some(&settling.order),
            &mut requester,
        )?;

        let diff = HistoryDiff::new()
            .with(HistoryField::Refund, FieldValue::Null, FieldValue::Amount(settlement.credited.raw()))
            .with(
                HistoryField::Reason,
                FieldValue::Null,
                FieldValue::opt_text(opt_trimmed(reason.as_deref()).as_deref()),
            );
        Self::finish_settlement(
            &mut *tx,
            caller,
            &mut settling,
            &settlement,
            &requester,
            OrderStatus::Cancelled,
            HistoryAction::Cancel,
            diff,
            now,
        )
        .await?;

        Self::commit(tx).await?;
        info!(
            service_code = %settling.commission.service_code,
            actor = %caller.user_id,
            action = HistoryAction::Cancel.as_str(),
            refund = settlement.credited.raw(),
            "commission cancelled"
        );
        Ok(SettlementOutcome {
            commission: settling.commission,
            order: settling.order,
            credited: settlement.credited.raw(),
            fee_kept: settlement.fee_kept.raw(),
        })
    }
}
