//! Test fixtures for DB-backed scenario tests.
//!
//! Every [`Harness`] gets a unique tag; user ids are suffixed with it so
//! scenarios can share one database and run in parallel.

pub mod fakes;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use esc_config::EscrowSettings;
use esc_engine::{
    Caller, CommissionDraft, CommissionEngine, ImageUpload, ReceiptUpload, ShipmentInfo,
};
use esc_ledger::Micros;
use esc_schemas::{CommissionRecord, WalletAccount, WalletLogEntry};
use sqlx::PgPool;
use uuid::Uuid;

pub use fakes::{FixedClock, MemoryFileStore, StaticPlaceResolver};

/// External place id known to every harness resolver.
pub const KNOWN_PLACE: &str = "place-kix-t1";

/// Connect with `ESC_DATABASE_URL` and run migrations. Panics when the
/// variable is missing so an ignored test run with `--include-ignored` fails
/// loudly instead of passing vacuously.
pub async fn test_pool(max_connections: u32) -> Result<PgPool> {
    let url = match std::env::var(esc_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => panic!("DB tests require ESC_DATABASE_URL"),
    };
    let pool = esc_db::connect(&url, max_connections).await?;
    esc_db::migrate(&pool).await?;
    Ok(pool)
}

pub fn unique_tag() -> String {
    Uuid::new_v4().simple().to_string()
}

pub struct Harness {
    pub engine: Arc<CommissionEngine>,
    pub pool: PgPool,
    pub files: Arc<MemoryFileStore>,
    pub places: Arc<StaticPlaceResolver>,
    pub clock: Arc<FixedClock>,
    pub tag: String,
}

impl Harness {
    pub async fn new() -> Result<Self> {
        Self::with_settings(EscrowSettings::default()).await
    }

    pub async fn with_settings(settings: EscrowSettings) -> Result<Self> {
        let pool = test_pool(16).await?;
        let files = Arc::new(MemoryFileStore::new());
        let places = Arc::new(StaticPlaceResolver::new().with_place(
            KNOWN_PLACE,
            "Kansai International Airport Terminal 1",
            34.4347,
            135.2441,
        ));
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let engine = CommissionEngine::new(pool.clone(), settings, files.clone(), places.clone())
            .with_clock(clock.clone());
        Ok(Self {
            engine: Arc::new(engine),
            pool,
            files,
            places,
            clock,
            tag: unique_tag(),
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        esc_engine::Clock::now(self.clock.as_ref())
    }

    pub fn user_id(&self, name: &str) -> String {
        format!("{name}_{}", self.tag)
    }

    /// Create (or reset) a user with `balance` and return it as a caller.
    pub async fn user(&self, name: &str, balance: i64) -> Result<Caller> {
        let user_id = self.user_id(name);
        let mut conn = self.pool.acquire().await?;
        esc_db::users::ensure_user(&mut *conn, &user_id, Some(name)).await?;
        esc_db::users::store_balances(
            &mut *conn,
            &WalletAccount {
                user_id: user_id.clone(),
                balance,
                escrow_balance: 0,
                disabled_until: None,
            },
        )
        .await?;
        Ok(Caller::new(user_id))
    }

    /// Staff identity; reviewers need no user row.
    pub fn reviewer(&self) -> Caller {
        Caller::new(self.user_id("reviewer"))
    }

    pub async fn balance(&self, caller: &Caller) -> Result<i64> {
        Ok(self.engine.wallet(&caller.user_id).await?.balance)
    }

    pub async fn logs_for_code(&self, service_code: &str) -> Result<Vec<WalletLogEntry>> {
        let mut conn = self.pool.acquire().await?;
        esc_db::users::wallet_logs_for_code(&mut *conn, service_code).await
    }

    /// TWD draft due in five days.
    pub fn draft(&self, price_units: i64, quantity: i32) -> CommissionDraft {
        CommissionDraft {
            title: "Royce nama chocolate".to_string(),
            description: "the matcha one if available".to_string(),
            category: "snacks".to_string(),
            location: "New Chitose Airport".to_string(),
            price: Micros::from_units(price_units).unwrap_or(Micros::ONE),
            quantity,
            currency: "TWD".to_string(),
            deadline: self.now() + Duration::days(5),
            place_id: None,
            image: None,
        }
    }

    pub fn image(name: &str) -> ImageUpload {
        ImageUpload {
            file_name: name.to_string(),
            bytes: format!("bytes of {name}").into_bytes(),
        }
    }

    /// Created and approved.
    pub async fn open_commission(&self, requester: &Caller, draft: CommissionDraft) -> Result<CommissionRecord> {
        let c = self
            .engine
            .create_commission(requester, draft)
            .await
            .context("create")?;
        let approved = self
            .engine
            .approve(&self.reviewer(), &c.service_code)
            .await
            .context("approve")?;
        Ok(approved.commission)
    }

    /// Created, approved, claimed by `fulfiller`, receipt uploaded and shipped.
    pub async fn shipped_commission(
        &self,
        requester: &Caller,
        fulfiller: &Caller,
        draft: CommissionDraft,
    ) -> Result<CommissionRecord> {
        let c = self.open_commission(requester, draft).await?;
        self.engine
            .claim(fulfiller, &c.service_code)
            .await
            .context("claim")?;
        self.engine
            .upload_receipt(
                fulfiller,
                &c.service_code,
                ReceiptUpload {
                    image: Self::image("receipt.jpg"),
                    receipt_amount: Some(999),
                    receipt_date: Some(self.now().date_naive()),
                    remark: None,
                },
            )
            .await
            .context("upload_receipt")?;
        self.engine
            .ship(
                fulfiller,
                &c.service_code,
                ShipmentInfo {
                    logistics_name: "Yamato".to_string(),
                    tracking_number: Some("4455-6677-8899".to_string()),
                    remark: None,
                },
            )
            .await
            .context("ship")?;
        Ok(self.engine.commission(&c.service_code).await?)
    }
}
