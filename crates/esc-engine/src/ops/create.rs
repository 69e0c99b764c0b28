use esc_audit::{FieldValue, HistoryDiff, HistoryField};
use esc_db::NewCommission;
use esc_schemas::{CommissionRecord, HistoryAction};
use tracing::info;

use super::commission_fields;
use crate::caller::Caller;
use crate::collaborators::FileKind;
use crate::engine::{log_failure, CommissionEngine};
use crate::error::EngineError;
use crate::payloads::CommissionDraft;

impl CommissionEngine {
    /// Create a commission in `PENDING_REVIEW`, holding its total from the
    /// requester's balance.
    ///
    /// Code allocation, the hold, the commission row, the wallet log row and
    /// the CREATE history row commit together or not at all. The image (if
    /// any) is written after commit.
    pub async fn create_commission(
        &self,
        caller: &Caller,
        draft: CommissionDraft,
    ) -> Result<CommissionRecord, EngineError> {
        self.create_inner(caller, draft)
            .await
            .inspect_err(|e| log_failure("create", &caller.user_id, e))
    }

    async fn create_inner(
        &self,
        caller: &Caller,
        draft: CommissionDraft,
    ) -> Result<CommissionRecord, EngineError> {
        let now = self.now();
        caller.ensure_active(now)?;
        draft.validate(now)?;
        let priced = self.price(&draft)?;
        let place = self.resolve_place(draft.place_id.as_deref()).await?;
        let image_ref = draft
            .image
            .as_ref()
            .map(|img| self.files.allocate_ref(FileKind::CommissionImage, &img.file_name));

        let mut tx = self.begin().await?;
        let mut account = Self::lock_account(&mut *tx, &caller.user_id).await?;
        let service_code =
            esc_db::allocate_code(&mut *tx, now, self.settings.commission.code_utc_offset_minutes)
                .await?;
        let movement = esc_ledger::hold(&mut account, priced.quote.total, &service_code)?;

        let place_id = match &place {
            Some(p) => Some(esc_db::places::upsert_place(&mut *tx, p).await?.place_id),
            None => None,
        };

        let mut record = esc_db::commissions::insert_commission(
            &mut *tx,
            &NewCommission {
                service_code: service_code.clone(),
                requester_id: caller.user_id.clone(),
                title: draft.title.trim().to_string(),
                description: draft.description.trim().to_string(),
                category: draft.category.trim().to_string(),
                location: draft.location.trim().to_string(),
                image_ref: image_ref.clone(),
                price_micros: draft.price.raw(),
                quantity: draft.quantity,
                currency: priced.currency,
                fx_rate_micros: priced.fx_rate.raw(),
                fee: priced.quote.fee.raw(),
                escrow_amount: priced.quote.total.raw(),
                deadline: self.deadline_with_grace(draft.deadline),
                place_id,
                created_at: now,
            },
        )
        .await?;

        Self::record_movement(&mut *tx, &account, &movement, "commission escrow hold", now).await?;

        let mut diff = HistoryDiff::new();
        diff.set(HistoryField::ServiceCode, FieldValue::text(&service_code));
        for (field, value) in commission_fields(&record) {
            if !matches!(&value, FieldValue::Text(s) if s.is_empty()) {
                diff.set(field, value);
            }
        }
        esc_db::history::insert_history(
            &mut *tx,
            record.commission_id,
            HistoryAction::Create,
            &caller.user_id,
            &diff,
            now,
        )
        .await?;

        Self::commit(tx).await?;
        info!(
            service_code = %record.service_code,
            actor = %caller.user_id,
            action = HistoryAction::Create.as_str(),
            escrow = record.escrow_amount,
            fee = record.fee,
            "commission created"
        );

        if let (Some(reference), Some(img)) = (image_ref.as_deref(), draft.image.as_ref()) {
            self.store_commission_image(&mut record, reference, None, &img.bytes).await;
        }
        Ok(record)
    }
}
