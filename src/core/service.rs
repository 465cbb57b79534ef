//! Runtime state service: bootstrap and update policy on top of the store
//!
//! `StateService` is the single writer entry point. All writes take the
//! in-process writer gate, so two tasks can never interleave a
//! read-modify-write. Reads do not take the gate; the store's atomic rename
//! already guarantees they observe a complete record.
//!
//! File I/O runs on tokio's blocking pool.

use std::io;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::state::{BootstrapDefaults, RuntimeState};
use crate::core::store::{StateStore, StoreError};

/// Owner of the persisted runtime state
#[derive(Debug)]
pub struct StateService {
    store: StateStore,
    writer: Mutex<()>,
    recent_orders_limit: usize,
}

impl StateService {
    pub fn new(store: StateStore, recent_orders_limit: usize) -> Self {
        Self {
            store,
            writer: Mutex::new(()),
            recent_orders_limit: recent_orders_limit.max(1),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn recent_orders_limit(&self) -> usize {
        self.recent_orders_limit
    }

    /// Current persisted state, without bootstrapping
    pub async fn snapshot(&self) -> Result<Option<RuntimeState>, StoreError> {
        let store = self.store.clone();
        run_blocking(move || store.read()).await
    }

    /// Return the persisted state, creating it from `defaults` on first run
    ///
    /// The freshly built state is returned directly after a successful
    /// write; it is not re-read from disk.
    pub async fn get_or_init(
        &self,
        defaults: &BootstrapDefaults,
    ) -> Result<RuntimeState, StoreError> {
        if let Some(state) = self.snapshot().await? {
            return Ok(state);
        }

        let _writer = self.writer.lock().await;

        // Another task may have bootstrapped while we waited for the gate
        if let Some(state) = self.snapshot().await? {
            return Ok(state);
        }

        let state = self.persist(RuntimeState::bootstrap(defaults)).await?;
        debug!(
            path = %self.store.path().display(),
            mode = %state.mode,
            symbol = %state.symbol,
            timeframe = %state.timeframe,
            "Bootstrapped runtime state"
        );
        Ok(state)
    }

    /// Apply `mutator` to a copy of `current` and persist the result
    ///
    /// `updated_at` is refreshed and never moves backwards relative to
    /// `current`. `recent_orders` is trimmed to the retention limit. On
    /// error nothing is persisted and `current` is left as it was.
    pub async fn apply_update<F>(
        &self,
        current: &RuntimeState,
        mutator: F,
    ) -> Result<RuntimeState, StoreError>
    where
        F: FnOnce(&mut RuntimeState) + Send,
    {
        let _writer = self.writer.lock().await;
        let next = self.prepare(current, mutator);
        self.persist(next).await
    }

    /// Linearizable read-modify-write against the persisted state
    ///
    /// # Errors
    /// - `StoreError::Missing` if no state has been bootstrapped yet
    pub async fn update<F>(&self, mutator: F) -> Result<RuntimeState, StoreError>
    where
        F: FnOnce(&mut RuntimeState) + Send,
    {
        let _writer = self.writer.lock().await;
        let current = self.snapshot().await?.ok_or(StoreError::Missing)?;
        let next = self.prepare(&current, mutator);
        self.persist(next).await
    }

    fn prepare<F>(&self, current: &RuntimeState, mutator: F) -> RuntimeState
    where
        F: FnOnce(&mut RuntimeState),
    {
        let mut next = current.clone();
        mutator(&mut next);
        next.updated_at = Utc::now().max(current.updated_at);
        next.trim_orders(self.recent_orders_limit);
        next
    }

    async fn persist(&self, state: RuntimeState) -> Result<RuntimeState, StoreError> {
        let store = self.store.clone();
        run_blocking(move || store.write(&state).map(|()| state)).await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Io(io::Error::other(e)))?
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Duration;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use crate::core::state::{BotStatus, OrderRecord, OrderSide, TradingMode};

    fn defaults() -> BootstrapDefaults {
        BootstrapDefaults {
            mode: TradingMode::Paper,
            symbol: "BTC-USDT".to_string(),
            timeframe: "15m".to_string(),
        }
    }

    fn service_in(dir: &TempDir, limit: usize) -> StateService {
        let store = StateStore::new(dir.path().join("state").join("runtime.json")).unwrap();
        StateService::new(store, limit)
    }

    #[tokio::test]
    async fn test_get_or_init_fresh_path() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir, 100);

        let state = service.get_or_init(&defaults()).await.unwrap();

        assert_eq!(state.mode, TradingMode::Paper);
        assert_eq!(state.status, BotStatus::NotRunning);
        assert_eq!(state.symbol, "BTC-USDT");
        assert_eq!(state.timeframe, "15m");
        assert!(state.latest_signal.is_none());
        assert!(state.recent_orders.is_empty());
        assert_eq!(service.snapshot().await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_get_or_init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir, 100);

        let first = service.get_or_init(&defaults()).await.unwrap();
        let second = service.get_or_init(&defaults()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.updated_at, second.updated_at);
    }

    #[tokio::test]
    async fn test_get_or_init_returns_existing_state_unchanged() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir, 100);
        let mut existing = RuntimeState::bootstrap(&defaults());
        existing.mode = TradingMode::Demo;
        existing.status = BotStatus::Paused;
        service.store().write(&existing).unwrap();

        let other_defaults = BootstrapDefaults {
            mode: TradingMode::Paper,
            symbol: "ETH-USDT".to_string(),
            timeframe: "1h".to_string(),
        };
        let state = service.get_or_init(&other_defaults).await.unwrap();

        assert_eq!(state, existing);
    }

    #[tokio::test]
    async fn test_concurrent_bootstrap_writes_once() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(service_in(&dir, 100));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move { service.get_or_init(&defaults()).await }));
        }

        let mut states = Vec::new();
        for handle in handles {
            states.push(handle.await.unwrap().unwrap());
        }

        assert!(states.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_apply_update_refreshes_timestamp() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir, 100);
        let initial = service.get_or_init(&defaults()).await.unwrap();

        let mut previous = initial;
        for _ in 0..5 {
            let next = service
                .apply_update(&previous, |s| s.status = BotStatus::Running)
                .await
                .unwrap();
            assert!(next.updated_at >= previous.updated_at);
            previous = next;
        }

        assert_eq!(service.snapshot().await.unwrap(), Some(previous));
    }

    #[tokio::test]
    async fn test_apply_update_never_moves_backwards() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir, 100);
        let mut skewed = RuntimeState::bootstrap(&defaults());
        skewed.updated_at = Utc::now() + Duration::hours(1);
        service.store().write(&skewed).unwrap();

        // Future timestamps are surfaced as-is
        let read = service.get_or_init(&defaults()).await.unwrap();
        assert_eq!(read.updated_at, skewed.updated_at);

        let next = service.apply_update(&read, |s| s.last_error = None).await.unwrap();
        assert_eq!(next.updated_at, skewed.updated_at);
    }

    #[tokio::test]
    async fn test_apply_update_failure_keeps_previous_state() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir, 100);
        let current = service.get_or_init(&defaults()).await.unwrap();

        let result = service.apply_update(&current, |s| s.symbol.clear()).await;

        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(current.symbol, "BTC-USDT");
        assert_eq!(service.snapshot().await.unwrap(), Some(current));
    }

    #[tokio::test]
    async fn test_apply_update_io_failure_keeps_previous_state() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir, 100);
        let current = service.get_or_init(&defaults()).await.unwrap();
        let before = current.clone();
        std::fs::create_dir(service.store().tmp_path()).unwrap();

        let result = service
            .apply_update(&current, |s| {
                s.status = BotStatus::Running;
                s.push_order(OrderRecord::submitted(OrderSide::Buy, Decimal::ONE), 100);
            })
            .await;

        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(current, before);
        assert_eq!(service.snapshot().await.unwrap(), Some(before));
    }

    #[tokio::test]
    async fn test_apply_update_trims_recent_orders() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir, 3);
        let current = service.get_or_init(&defaults()).await.unwrap();

        let orders: Vec<OrderRecord> = (1..=5)
            .map(|i| OrderRecord::submitted(OrderSide::Buy, Decimal::new(i, 3)))
            .collect();
        let expected: Vec<_> = orders[2..].iter().map(|o| o.client_order_id).collect();

        let next = service
            .apply_update(&current, move |s| s.recent_orders.extend(orders))
            .await
            .unwrap();

        let kept: Vec<_> = next.recent_orders.iter().map(|o| o.client_order_id).collect();
        assert_eq!(kept, expected);
    }

    #[tokio::test]
    async fn test_update_requires_bootstrap() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir, 100);

        let result = service.update(|s| s.status = BotStatus::Running).await;
        assert!(matches!(result, Err(StoreError::Missing)));
    }

    #[tokio::test]
    async fn test_concurrent_updates_do_not_lose_writes() {
        let dir = TempDir::new().unwrap();
        let service = Arc::new(service_in(&dir, 100));
        service.get_or_init(&defaults()).await.unwrap();

        let mut handles = Vec::new();
        for i in 1..=20 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service
                    .update(move |s| {
                        s.recent_orders
                            .push(OrderRecord::submitted(OrderSide::Sell, Decimal::new(i, 2)))
                    })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let state = service.snapshot().await.unwrap().unwrap();
        assert_eq!(state.recent_orders.len(), 20);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir, 0);
        assert_eq!(service.recent_orders_limit(), 1);
    }
}
