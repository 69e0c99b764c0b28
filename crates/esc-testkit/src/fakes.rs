//! In-process stand-ins for the engine's collaborators.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use esc_engine::{Clock, FileStore, PlaceDetails, PlaceResolver};

// ---------------------------------------------------------------------------
// MemoryFileStore
// ---------------------------------------------------------------------------

/// File store backed by a map. `fail_writes(true)` makes every `store` fail,
/// to exercise the post-commit failure path.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn get(&self, reference: &str) -> Option<Vec<u8>> {
        self.files.lock().ok()?.get(reference).cloned()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.get(reference).is_some()
    }

    pub fn len(&self) -> usize {
        self.files.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl FileStore for MemoryFileStore {
    async fn store(&self, reference: &str, bytes: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("injected write failure for {reference}");
        }
        self.files
            .lock()
            .map_err(|_| anyhow!("memory file store poisoned"))?
            .insert(reference.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, reference: &str) -> Result<()> {
        self.files
            .lock()
            .map_err(|_| anyhow!("memory file store poisoned"))?
            .remove(reference);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StaticPlaceResolver
// ---------------------------------------------------------------------------

/// Resolves a fixed set of identifiers and counts lookups.
#[derive(Debug, Default)]
pub struct StaticPlaceResolver {
    places: BTreeMap<String, PlaceDetails>,
    looked_up: Mutex<BTreeSet<String>>,
}

impl StaticPlaceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_place(mut self, external_place_id: &str, formatted_address: &str, lat: f64, lng: f64) -> Self {
        self.places.insert(
            external_place_id.to_string(),
            PlaceDetails {
                name: None,
                formatted_address: formatted_address.to_string(),
                latitude: lat,
                longitude: lng,
                map_url: None,
            },
        );
        self
    }

    pub fn was_looked_up(&self, external_place_id: &str) -> bool {
        self.looked_up
            .lock()
            .map(|s| s.contains(external_place_id))
            .unwrap_or(false)
    }
}

#[async_trait::async_trait]
impl PlaceResolver for StaticPlaceResolver {
    async fn resolve(&self, external_place_id: &str) -> Result<Option<PlaceDetails>> {
        if let Ok(mut seen) = self.looked_up.lock() {
            seen.insert(external_place_id.to_string());
        }
        Ok(self.places.get(external_place_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// FixedClock
// ---------------------------------------------------------------------------

/// Manually advanced clock. Times are truncated to microseconds so values
/// read back from Postgres compare equal.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now.trunc_subsecs(6)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut t) = self.now.lock() {
            *t = now.trunc_subsecs(6);
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut t) = self.now.lock() {
            *t += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(t) => *t,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_can_be_told_to_fail() {
        let store = MemoryFileStore::new();
        store.store("commission/a.png", b"x").await.unwrap();
        assert!(store.contains("commission/a.png"));

        store.fail_writes(true);
        assert!(store.store("commission/b.png", b"y").await.is_err());
        assert!(!store.contains("commission/b.png"));

        store.remove("commission/a.png").await.unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn fixed_clock_truncates_to_micros() {
        let t: DateTime<Utc> = "2026-10-18T01:02:03.123456789Z".parse().unwrap();
        let clock = FixedClock::new(t);
        assert_eq!(clock.now().timestamp_subsec_nanos(), 123_456_000);
        clock.advance(Duration::days(1));
        assert_eq!(clock.now().date_naive().to_string(), "2026-10-19");
    }
}
