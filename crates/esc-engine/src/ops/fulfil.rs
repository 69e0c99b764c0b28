use esc_audit::{FieldValue, HistoryDiff, HistoryField};
use esc_schemas::{CommissionRecord, HistoryAction, OrderRecord, ReceiptRecord, ShippingRecord};
use sqlx::PgConnection;
use tracing::info;

use super::opt_trimmed;
use crate::caller::Caller;
use crate::collaborators::FileKind;
use crate::engine::{log_failure, CommissionEngine};
use crate::error::EngineError;
use crate::payloads::{ReceiptUpload, ShipmentInfo};
use crate::state_machine::{next_status, CommissionEvent};

impl CommissionEngine {
    /// Lock the order of a commission and make sure `caller` is its fulfiller.
    async fn lock_fulfiller_order(
        conn: &mut PgConnection,
        commission: &CommissionRecord,
        caller: &Caller,
    ) -> Result<OrderRecord, EngineError> {
        let order = esc_db::orders::lock_for_commission(conn, commission.commission_id)
            .await?
            .ok_or_else(|| {
                EngineError::InvalidState(format!(
                    "commission {} has not been claimed",
                    commission.service_code
                ))
            })?;
        if order.fulfiller_id != caller.user_id {
            return Err(EngineError::Forbidden(format!(
                "only the fulfiller of {} may do this",
                commission.service_code
            )));
        }
        Ok(order)
    }

    /// Upload (or replace) the purchase receipt. The first upload moves a
    /// claimed commission to `SHIPPING`.
    ///
    /// Returns the receipt on record once the file has been written. When the
    /// write fails the previous receipt (and its file) stays in place, so the
    /// result is the previous receipt, or `None` for a first upload.
    pub async fn upload_receipt(
        &self,
        caller: &Caller,
        service_code: &str,
        upload: ReceiptUpload,
    ) -> Result<Option<ReceiptRecord>, EngineError> {
        self.upload_receipt_inner(caller, service_code, upload)
            .await
            .inspect_err(|e| log_failure("upload_receipt", &caller.user_id, e))
    }

    async fn upload_receipt_inner(
        &self,
        caller: &Caller,
        service_code: &str,
        upload: ReceiptUpload,
    ) -> Result<Option<ReceiptRecord>, EngineError> {
        let now = self.now();
        caller.ensure_active(now)?;
        upload.validate()?;
        let reference = self
            .files
            .allocate_ref(FileKind::Receipt, &upload.image.file_name);

        let mut tx = self.begin().await?;
        let mut c = Self::lock_commission(&mut *tx, service_code).await?;
        Self::lock_fulfiller_order(&mut *tx, &c, caller).await?;
        let next = next_status(c.status, CommissionEvent::UploadReceipt)?;

        let previous = esc_db::fulfilment::fetch_receipt(&mut *tx, c.commission_id).await?;
        let receipt = ReceiptRecord {
            commission_id: c.commission_id,
            uploaded_by: caller.user_id.clone(),
            receipt_ref: reference,
            receipt_amount: upload.receipt_amount,
            receipt_date: upload.receipt_date,
            remark: opt_trimmed(upload.remark.as_deref()),
            uploaded_at: now,
        };
        esc_db::fulfilment::upsert_receipt(&mut *tx, &receipt).await?;

        let prev = previous.as_ref();
        let mut diff = HistoryDiff::new();
        diff.record(
            HistoryField::ReceiptRef,
            FieldValue::opt_text(prev.map(|p| p.receipt_ref.as_str())),
            FieldValue::text(&receipt.receipt_ref),
        )
        .record(
            HistoryField::ReceiptAmount,
            FieldValue::opt_amount(prev.and_then(|p| p.receipt_amount)),
            FieldValue::opt_amount(receipt.receipt_amount),
        )
        .record(
            HistoryField::ReceiptDate,
            FieldValue::opt_date(prev.and_then(|p| p.receipt_date)),
            FieldValue::opt_date(receipt.receipt_date),
        )
        .record(
            HistoryField::Remark,
            FieldValue::opt_text(prev.and_then(|p| p.remark.as_deref())),
            FieldValue::opt_text(receipt.remark.as_deref()),
        )
        .record(HistoryField::Status, c.status, next);

        if next != c.status {
            c.status = next;
            c.updated_at = now;
            esc_db::commissions::store_commission(&mut *tx, &c).await?;
        }
        let action = if previous.is_some() {
            HistoryAction::ReuploadReceipt
        } else {
            HistoryAction::UploadReceipt
        };
        esc_db::history::insert_history(&mut *tx, c.commission_id, action, &caller.user_id, &diff, now)
            .await?;

        Self::commit(tx).await?;
        info!(
            service_code = %c.service_code,
            actor = %caller.user_id,
            action = action.as_str(),
            "receipt uploaded"
        );

        Ok(self
            .store_receipt_file(&c.service_code, receipt, previous, &upload.image.bytes)
            .await)
    }

    /// Record (or update) logistics information. The first call moves the
    /// commission to `SHIPPED`; later calls only update the shipping row.
    pub async fn ship(
        &self,
        caller: &Caller,
        service_code: &str,
        info: ShipmentInfo,
    ) -> Result<ShippingRecord, EngineError> {
        self.ship_inner(caller, service_code, info)
            .await
            .inspect_err(|e| log_failure("ship", &caller.user_id, e))
    }

    async fn ship_inner(
        &self,
        caller: &Caller,
        service_code: &str,
        info: ShipmentInfo,
    ) -> Result<ShippingRecord, EngineError> {
        let now = self.now();
        caller.ensure_active(now)?;
        info.validate()?;

        let mut tx = self.begin().await?;
        let mut c = Self::lock_commission(&mut *tx, service_code).await?;
        Self::lock_fulfiller_order(&mut *tx, &c, caller).await?;
        let next = next_status(c.status, CommissionEvent::Ship)?;

        let previous = esc_db::fulfilment::fetch_shipping(&mut *tx, c.commission_id).await?;
        let prev = previous.as_ref();
        let shipping = ShippingRecord {
            commission_id: c.commission_id,
            shipped_by: caller.user_id.clone(),
            logistics_name: info.logistics_name.trim().to_string(),
            tracking_number: opt_trimmed(info.tracking_number.as_deref()),
            remark: opt_trimmed(info.remark.as_deref()),
            shipped_at: prev.map(|p| p.shipped_at).unwrap_or(now),
        };
        esc_db::fulfilment::upsert_shipping(&mut *tx, &shipping).await?;

        let mut diff = HistoryDiff::new();
        diff.record(
            HistoryField::LogisticsName,
            FieldValue::opt_text(prev.map(|p| p.logistics_name.as_str())),
            FieldValue::text(&shipping.logistics_name),
        )
        .record(
            HistoryField::TrackingNumber,
            FieldValue::opt_text(prev.and_then(|p| p.tracking_number.as_deref())),
            FieldValue::opt_text(shipping.tracking_number.as_deref()),
        )
        .record(
            HistoryField::Remark,
            FieldValue::opt_text(prev.and_then(|p| p.remark.as_deref())),
            FieldValue::opt_text(shipping.remark.as_deref()),
        )
        .record(
            HistoryField::ShippedAt,
            prev.map_or(FieldValue::Null, |p| FieldValue::Timestamp(p.shipped_at)),
            FieldValue::Timestamp(shipping.shipped_at),
        )
        .record(HistoryField::Status, c.status, next);

        if next != c.status {
            c.status = next;
            c.updated_at = now;
            esc_db::commissions::store_commission(&mut *tx, &c).await?;
        }
        let action = if previous.is_some() {
            HistoryAction::Reship
        } else {
            HistoryAction::Ship
        };
        if !diff.is_empty() {
            esc_db::history::insert_history(&mut *tx, c.commission_id, action, &caller.user_id, &diff, now)
                .await?;
        }

        Self::commit(tx).await?;
        info!(
            service_code = %c.service_code,
            actor = %caller.user_id,
            action = action.as_str(),
            logistics = %shipping.logistics_name,
            "shipment recorded"
        );
        Ok(shipping)
    }
}
