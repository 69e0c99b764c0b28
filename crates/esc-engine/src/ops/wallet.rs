use esc_ledger::Money;
use esc_schemas::{WalletAccount, WalletLogEntry};
use tracing::info;

use crate::caller::Caller;
use crate::engine::{log_failure, CommissionEngine};
use crate::error::EngineError;

impl CommissionEngine {
    pub async fn deposit(&self, caller: &Caller, amount: i64) -> Result<WalletAccount, EngineError> {
        self.wallet_move(caller, amount, true)
            .await
            .inspect_err(|e| log_failure("deposit", &caller.user_id, e))
    }

    pub async fn withdraw(&self, caller: &Caller, amount: i64) -> Result<WalletAccount, EngineError> {
        self.wallet_move(caller, amount, false)
            .await
            .inspect_err(|e| log_failure("withdraw", &caller.user_id, e))
    }

    async fn wallet_move(
        &self,
        caller: &Caller,
        amount: i64,
        is_deposit: bool,
    ) -> Result<WalletAccount, EngineError> {
        let now = self.now();
        caller.ensure_active(now)?;
        if amount <= 0 {
            return Err(EngineError::validation(format!("amount must be > 0, got {amount}")));
        }

        let mut tx = self.begin().await?;
        let mut account = Self::lock_account(&mut *tx, &caller.user_id).await?;
        let (movement, description) = if is_deposit {
            (esc_ledger::deposit(&mut account, Money::new(amount))?, "deposit")
        } else {
            (esc_ledger::withdraw(&mut account, Money::new(amount))?, "withdrawal")
        };
        Self::record_movement(&mut *tx, &account, &movement, description, now).await?;
        Self::commit(tx).await?;

        info!(
            actor = %caller.user_id,
            action = movement.action.as_str(),
            amount = movement.amount.raw(),
            balance = account.balance,
            "wallet movement"
        );
        Ok(account)
    }

    pub async fn wallet(&self, user_id: &str) -> Result<WalletAccount, EngineError> {
        let mut conn = self.pool.acquire().await?;
        esc_db::users::fetch_account(&mut *conn, user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("user {user_id}")))
    }

    /// Newest first.
    pub async fn wallet_logs(&self, user_id: &str, limit: i64) -> Result<Vec<WalletLogEntry>, EngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(esc_db::users::list_wallet_logs(&mut *conn, user_id, limit).await?)
    }
}
