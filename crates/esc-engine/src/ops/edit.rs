use esc_audit::HistoryDiff;
use esc_schemas::{CommissionRecord, HistoryAction};
use tracing::info;

use super::commission_fields;
use crate::caller::Caller;
use crate::collaborators::FileKind;
use crate::engine::{log_failure, CommissionEngine};
use crate::error::EngineError;
use crate::payloads::CommissionDraft;
use crate::state_machine::{next_status, CommissionEvent};

impl CommissionEngine {
    /// Replace the requester-editable fields of a commission that is pending
    /// review or rejected, re-quote it and hold or return the difference.
    /// The commission goes back to `PENDING_REVIEW`.
    pub async fn edit_commission(
        &self,
        caller: &Caller,
        service_code: &str,
        draft: CommissionDraft,
    ) -> Result<CommissionRecord, EngineError> {
        self.edit_inner(caller, service_code, draft)
            .await
            .inspect_err(|e| log_failure("edit", &caller.user_id, e))
    }

    async fn edit_inner(
        &self,
        caller: &Caller,
        service_code: &str,
        draft: CommissionDraft,
    ) -> Result<CommissionRecord, EngineError> {
        let now = self.now();
        caller.ensure_active(now)?;
        draft.validate(now)?;
        let priced = self.price(&draft)?;
        let place = self.resolve_place(draft.place_id.as_deref()).await?;
        let new_image_ref = draft
            .image
            .as_ref()
            .map(|img| self.files.allocate_ref(FileKind::CommissionImage, &img.file_name));

        let mut tx = self.begin().await?;
        let mut c = Self::lock_commission(&mut *tx, service_code).await?;
        if c.requester_id != caller.user_id {
            return Err(EngineError::Forbidden(format!(
                "only the requester may edit {service_code}"
            )));
        }
        let next = next_status(c.status, CommissionEvent::Edit)?;
        let mut account = Self::lock_account(&mut *tx, &c.requester_id).await?;
        let before = c.clone();

        let adjustment = esc_ledger::adjust_hold(&mut account, &mut c, priced.quote.total)?;

        c.title = draft.title.trim().to_string();
        c.description = draft.description.trim().to_string();
        c.category = draft.category.trim().to_string();
        c.location = draft.location.trim().to_string();
        c.price_micros = draft.price.raw();
        c.quantity = draft.quantity;
        c.currency = priced.currency;
        c.fx_rate_micros = priced.fx_rate.raw();
        c.fee = priced.quote.fee.raw();
        // Grace days are added again only when a different deadline is supplied.
        if draft.deadline != c.deadline {
            c.deadline = self.deadline_with_grace(draft.deadline);
        }
        let old_image_ref = match &new_image_ref {
            Some(r) => c.image_ref.replace(r.clone()),
            None => None,
        };
        c.place_id = match &place {
            Some(p) => Some(esc_db::places::upsert_place(&mut *tx, p).await?.place_id),
            None => None,
        };
        c.status = next;
        c.updated_at = now;

        esc_db::commissions::store_commission(&mut *tx, &c).await?;
        if let Some(old_place) = before.place_id.filter(|p| Some(*p) != c.place_id) {
            esc_db::places::delete_place_if_orphaned(&mut *tx, old_place).await?;
        }
        if let Some(m) = &adjustment {
            Self::record_movement(&mut *tx, &account, m, "commission escrow adjusted", now).await?;
        }

        let mut diff = HistoryDiff::new();
        for ((field, old), (_, new)) in commission_fields(&before)
            .into_iter()
            .zip(commission_fields(&c))
        {
            diff.record(field, old, new);
        }
        if !diff.is_empty() {
            esc_db::history::insert_history(
                &mut *tx,
                c.commission_id,
                HistoryAction::Edit,
                &caller.user_id,
                &diff,
                now,
            )
            .await?;
        }

        Self::commit(tx).await?;
        info!(
            service_code = %c.service_code,
            actor = %caller.user_id,
            action = HistoryAction::Edit.as_str(),
            escrow = c.escrow_amount,
            delta = adjustment.as_ref().map(|m| -m.amount.raw()).unwrap_or(0),
            "commission edited"
        );

        if let (Some(reference), Some(img)) = (new_image_ref.as_deref(), draft.image.as_ref()) {
            let stored = self
                .store_commission_image(&mut c, reference, old_image_ref.as_deref(), &img.bytes)
                .await;
            if let Some(old) = old_image_ref.filter(|_| stored) {
                self.remove_file_logged(&c.service_code, &old).await;
            }
        }
        Ok(c)
    }
}
