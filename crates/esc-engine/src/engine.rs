//! `CommissionEngine`: owns the pool, settings and collaborators, and runs
//! each operation as one transaction.
//!
//! Operations live in `ops/*` as further `impl CommissionEngine` blocks.
//! Each opens its transaction with [`esc_db::begin`], loads and locks the rows
//! it touches (commission, then order, then user), checks the transition,
//! applies ledger movements, appends history and commits. Any `?` before the
//! commit drops the transaction, which rolls it back.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use esc_config::EscrowSettings;
use esc_db::NewWalletLog;
use esc_ledger::Movement;
use esc_schemas::{CommissionRecord, ReceiptRecord, WalletAccount};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, error, warn};

use crate::caller::Caller;
use crate::clock::{Clock, SystemClock};
use crate::collaborators::{FileStore, PlaceResolver};
use crate::error::EngineError;

pub struct CommissionEngine {
    pub(crate) pool: PgPool,
    pub(crate) settings: EscrowSettings,
    pub(crate) files: Arc<dyn FileStore>,
    pub(crate) places: Arc<dyn PlaceResolver>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl CommissionEngine {
    pub fn new(
        pool: PgPool,
        settings: EscrowSettings,
        files: Arc<dyn FileStore>,
        places: Arc<dyn PlaceResolver>,
    ) -> Self {
        Self {
            pool,
            settings,
            files,
            places,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn settings(&self) -> &EscrowSettings {
        &self.settings
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) async fn begin(&self) -> Result<Transaction<'static, Postgres>, EngineError> {
        Ok(esc_db::begin(&self.pool, self.settings.database.lock_timeout_ms).await?)
    }

    pub(crate) async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), EngineError> {
        tx.commit().await.map_err(EngineError::from)
    }

    /// Stored deadline for a supplied one.
    pub(crate) fn deadline_with_grace(&self, supplied: DateTime<Utc>) -> DateTime<Utc> {
        supplied + Duration::days(self.settings.commission.deadline_grace_days)
    }

    /// Build a [`Caller`] from the user row, including its suspension.
    pub async fn resolve_caller(&self, user_id: &str) -> Result<Caller, EngineError> {
        let mut conn = self.pool.acquire().await?;
        let account = esc_db::users::fetch_account(&mut *conn, user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("user {user_id}")))?;
        Ok(Caller::new(account.user_id).with_disabled_until(account.disabled_until))
    }

    // -----------------------------------------------------------------------
    // Shared helpers
    // -----------------------------------------------------------------------

    pub(crate) async fn lock_commission(
        conn: &mut PgConnection,
        service_code: &str,
    ) -> Result<CommissionRecord, EngineError> {
        esc_db::commissions::lock_by_code(conn, service_code)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("commission {service_code}")))
    }

    pub(crate) async fn lock_account(
        conn: &mut PgConnection,
        user_id: &str,
    ) -> Result<WalletAccount, EngineError> {
        esc_db::users::lock_account(conn, user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("user {user_id}")))
    }

    /// Persist the balances a movement produced and append its wallet log row.
    pub(crate) async fn record_movement(
        conn: &mut PgConnection,
        account: &WalletAccount,
        movement: &Movement,
        description: &str,
        at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        esc_db::users::store_balances(conn, account).await?;
        esc_db::users::insert_wallet_log(
            conn,
            &NewWalletLog {
                user_id: movement.user_id.clone(),
                action: movement.action,
                amount: movement.amount.raw(),
                balance: movement.balance_after.raw(),
                escrow_balance: movement.escrow_after.raw(),
                service_code: movement.service_code.clone(),
                description: Some(description.to_string()),
                created_at: at,
            },
        )
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Post-commit file side effects
    // -----------------------------------------------------------------------

    /// Write a commission image after commit. On failure the reference is
    /// put back to `fallback` (the image it replaced, if any) so the row never
    /// points at a missing file; returns whether the bytes were stored.
    pub(crate) async fn store_commission_image(
        &self,
        commission: &mut CommissionRecord,
        reference: &str,
        fallback: Option<&str>,
        bytes: &[u8],
    ) -> bool {
        let Err(err) = self.files.store(reference, bytes).await else {
            return true;
        };
        warn!(
            service_code = %commission.service_code,
            reference,
            fallback = ?fallback,
            error = %format!("{err:#}"),
            "image write failed after commit; restoring previous reference"
        );
        match self.pool.acquire().await {
            Ok(mut conn) => {
                match esc_db::commissions::swap_image_ref(
                    &mut *conn,
                    commission.commission_id,
                    reference,
                    fallback,
                )
                .await
                {
                    Ok(_) => commission.image_ref = fallback.map(str::to_string),
                    Err(e) => warn!(
                        service_code = %commission.service_code,
                        error = %format!("{e:#}"),
                        "swap_image_ref failed"
                    ),
                }
            }
            Err(e) => warn!(error = %e, "could not acquire connection to restore image reference"),
        }
        false
    }

    /// Write a receipt after commit. On failure the receipt row goes back to
    /// `previous` (or away, for a first upload); returns the receipt on record.
    pub(crate) async fn store_receipt_file(
        &self,
        service_code: &str,
        uploaded: ReceiptRecord,
        previous: Option<ReceiptRecord>,
        bytes: &[u8],
    ) -> Option<ReceiptRecord> {
        let Err(err) = self.files.store(&uploaded.receipt_ref, bytes).await else {
            if let Some(old) = &previous {
                self.remove_file_logged(service_code, &old.receipt_ref).await;
            }
            return Some(uploaded);
        };
        warn!(
            service_code,
            reference = %uploaded.receipt_ref,
            error = %format!("{err:#}"),
            "receipt write failed after commit; restoring previous receipt"
        );
        let restored = match self.pool.acquire().await {
            Ok(mut conn) => esc_db::fulfilment::restore_receipt(
                &mut *conn,
                uploaded.commission_id,
                &uploaded.receipt_ref,
                previous.as_ref(),
            )
            .await
            .map_err(|e| format!("{e:#}")),
            Err(e) => Err(e.to_string()),
        };
        match restored {
            Ok(_) => previous,
            Err(e) => {
                warn!(service_code, error = %e, "restore_receipt failed");
                Some(uploaded)
            }
        }
    }

    pub(crate) async fn remove_file_logged(&self, service_code: &str, reference: &str) {
        if let Err(err) = self.files.remove(reference).await {
            warn!(service_code, reference, error = %format!("{err:#}"), "file removal failed after commit");
        }
    }
}

/// Log a failed operation at the level its kind deserves.
pub(crate) fn log_failure(op: &'static str, actor: &str, err: &EngineError) {
    match err {
        EngineError::Fatal(e) => error!(op, actor, error = %format!("{e:#}"), "operation failed"),
        EngineError::Retryable(msg) => warn!(op, actor, error = %msg, "operation rolled back; retryable"),
        other => debug!(op, actor, kind = other.kind(), error = %other, "operation refused"),
    }
}
