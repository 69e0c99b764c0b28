//! Engine operations, one module per group of transitions.

mod claim;
mod create;
mod delete;
mod edit;
mod fulfil;
mod moderation;
mod queries;
mod settle;
mod wallet;

use esc_audit::{FieldValue, HistoryField};
use esc_db::NewPlace;
use esc_ledger::{Micros, Quote};
use esc_schemas::CommissionRecord;

use crate::engine::CommissionEngine;
use crate::error::EngineError;
use crate::payloads::CommissionDraft;

pub(crate) struct Priced {
    pub currency: String,
    pub fx_rate: Micros,
    pub quote: Quote,
}

impl CommissionEngine {
    /// Quote a draft at the configured rate for its currency.
    pub(crate) fn price(&self, draft: &CommissionDraft) -> Result<Priced, EngineError> {
        let currency = draft.currency.trim().to_string();
        let fx_rate = self
            .settings
            .pricing
            .fx_rate(&currency)
            .ok_or_else(|| EngineError::validation(format!("unknown currency {currency}")))?;
        let quote = esc_ledger::quote(
            draft.price,
            i64::from(draft.quantity),
            fx_rate,
            self.settings.pricing.fee_rate_bps,
        )?;
        Ok(Priced {
            currency,
            fx_rate,
            quote,
        })
    }

    /// Look up an external place before the transaction opens.
    pub(crate) async fn resolve_place(
        &self,
        external_place_id: Option<&str>,
    ) -> Result<Option<NewPlace>, EngineError> {
        let Some(id) = external_place_id.map(str::trim) else {
            return Ok(None);
        };
        let details = self
            .places
            .resolve(id)
            .await
            .map_err(|e| EngineError::Fatal(e.context(format!("place lookup for {id} failed"))))?
            .ok_or_else(|| EngineError::validation(format!("unknown place {id}")))?;
        Ok(Some(NewPlace {
            external_place_id: id.to_string(),
            name: details.name,
            formatted_address: details.formatted_address,
            latitude: details.latitude,
            longitude: details.longitude,
            map_url: details.map_url,
        }))
    }
}

/// Requester-visible fields tracked by CREATE and EDIT history rows.
pub(crate) fn commission_fields(c: &CommissionRecord) -> [(HistoryField, FieldValue); 14] {
    [
        (HistoryField::Title, FieldValue::text(&c.title)),
        (HistoryField::Description, FieldValue::text(&c.description)),
        (HistoryField::Category, FieldValue::text(&c.category)),
        (HistoryField::Location, FieldValue::text(&c.location)),
        (HistoryField::ImageRef, FieldValue::opt_text(c.image_ref.as_deref())),
        (HistoryField::Price, FieldValue::Micros(c.price_micros)),
        (HistoryField::Quantity, FieldValue::Integer(i64::from(c.quantity))),
        (HistoryField::Currency, FieldValue::text(&c.currency)),
        (HistoryField::FxRate, FieldValue::Micros(c.fx_rate_micros)),
        (HistoryField::Fee, FieldValue::Amount(c.fee)),
        (HistoryField::EscrowAmount, FieldValue::Amount(c.escrow_amount)),
        (HistoryField::Deadline, FieldValue::Timestamp(c.deadline)),
        (HistoryField::Status, c.status.into()),
        (HistoryField::PlaceId, FieldValue::opt_integer(c.place_id)),
    ]
}

pub(crate) fn opt_trimmed(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|t| !t.is_empty()).map(str::to_string)
}
