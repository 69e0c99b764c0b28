use tracing::info;

use crate::caller::Caller;
use crate::engine::{log_failure, CommissionEngine};
use crate::error::EngineError;
use crate::payloads::DeletionOutcome;
use crate::state_machine::{check, CommissionEvent};

impl CommissionEngine {
    /// Delete a commission that has not been claimed yet.
    ///
    /// Refunds its escrow, removes its history, receipt/shipping rows and
    /// (when no other commission uses it) its place, then the commission row.
    /// Wallet log and review rows are kept. The image is removed after commit.
    pub async fn delete_commission(
        &self,
        caller: &Caller,
        service_code: &str,
    ) -> Result<DeletionOutcome, EngineError> {
        self.delete_inner(caller, service_code)
            .await
            .inspect_err(|e| log_failure("delete", &caller.user_id, e))
    }

    async fn delete_inner(&self, caller: &Caller, service_code: &str) -> Result<DeletionOutcome, EngineError> {
        let now = self.now();
        caller.ensure_active(now)?;

        let mut tx = self.begin().await?;
        let mut c = Self::lock_commission(&mut *tx, service_code).await?;
        if c.requester_id != caller.user_id {
            return Err(EngineError::Forbidden(format!(
                "only the requester may delete {service_code}"
            )));
        }
        check(c.status, CommissionEvent::Delete)?;
        if esc_db::orders::count_for_commission(&mut *tx, c.commission_id).await? > 0 {
            return Err(EngineError::InvalidState(format!(
                "commission {service_code} has an order"
            )));
        }

        let mut refunded = 0;
        if c.escrow_amount > 0 {
            let mut account = Self::lock_account(&mut *tx, &c.requester_id).await?;
            let settlement = esc_ledger::refund_to_requester(&mut c, None, &mut account)?;
            Self::record_movement(
                &mut *tx,
                &account,
                &settlement.movement,
                "commission deleted; escrow refunded",
                now,
            )
            .await?;
            refunded = settlement.credited.raw();
        }

        esc_db::history::delete_history(&mut *tx, c.commission_id).await?;
        esc_db::fulfilment::delete_for_commission(&mut *tx, c.commission_id).await?;
        esc_db::commissions::delete_commission(&mut *tx, c.commission_id).await?;
        if let Some(place_id) = c.place_id {
            esc_db::places::delete_place_if_orphaned(&mut *tx, place_id).await?;
        }

        Self::commit(tx).await?;
        info!(
            service_code = %c.service_code,
            actor = %caller.user_id,
            action = "DELETE",
            refunded,
            "commission deleted"
        );

        if let Some(image) = &c.image_ref {
            self.remove_file_logged(&c.service_code, image).await;
        }
        Ok(DeletionOutcome {
            service_code: c.service_code,
            refunded,
        })
    }
}
