use esc_audit::HistoryEntry;
use esc_schemas::{
    CommissionRecord, FulfilmentItem, OrderRecord, PlaceRecord, ReceiptRecord, ReviewRecord,
    ShippingRecord,
};
use sqlx::PgConnection;

use crate::engine::CommissionEngine;
use crate::error::EngineError;

impl CommissionEngine {
    async fn existing(conn: &mut PgConnection, service_code: &str) -> Result<CommissionRecord, EngineError> {
        esc_db::commissions::fetch_by_code(conn, service_code)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("commission {service_code}")))
    }

    pub async fn commission(&self, service_code: &str) -> Result<CommissionRecord, EngineError> {
        let mut conn = self.pool.acquire().await?;
        Self::existing(&mut *conn, service_code).await
    }

    /// History rows of a commission, oldest first.
    pub async fn history(&self, service_code: &str) -> Result<Vec<HistoryEntry>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let c = Self::existing(&mut *conn, service_code).await?;
        Ok(esc_db::history::list_history(&mut *conn, c.commission_id).await?)
    }

    /// Reviews of a commission, newest first.
    pub async fn reviews_for(&self, service_code: &str) -> Result<Vec<ReviewRecord>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let c = Self::existing(&mut *conn, service_code).await?;
        Ok(esc_db::reviews::list_for_commission(&mut *conn, c.commission_id).await?)
    }

    pub async fn order(&self, service_code: &str) -> Result<Option<OrderRecord>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let c = Self::existing(&mut *conn, service_code).await?;
        Ok(esc_db::orders::fetch_for_commission(&mut *conn, c.commission_id).await?)
    }

    pub async fn receipt(&self, service_code: &str) -> Result<Option<ReceiptRecord>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let c = Self::existing(&mut *conn, service_code).await?;
        Ok(esc_db::fulfilment::fetch_receipt(&mut *conn, c.commission_id).await?)
    }

    pub async fn shipping(&self, service_code: &str) -> Result<Option<ShippingRecord>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let c = Self::existing(&mut *conn, service_code).await?;
        Ok(esc_db::fulfilment::fetch_shipping(&mut *conn, c.commission_id).await?)
    }

    pub async fn place(&self, service_code: &str) -> Result<Option<PlaceRecord>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let c = Self::existing(&mut *conn, service_code).await?;
        match c.place_id {
            Some(id) => Ok(esc_db::places::fetch_place(&mut *conn, id).await?),
            None => Ok(None),
        }
    }

    /// Commissions the user requested that are not completed or cancelled.
    pub async fn active_commissions(&self, requester_id: &str) -> Result<Vec<CommissionRecord>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(esc_db::commissions::list_active_for_requester(&mut *conn, requester_id).await?)
    }

    /// Orders the user still has to fulfil.
    pub async fn pending_orders(&self, fulfiller_id: &str) -> Result<Vec<FulfilmentItem>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(esc_db::orders::list_pending_for_fulfiller(&mut *conn, fulfiller_id).await?)
    }
}
