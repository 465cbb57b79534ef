//! Bot decision loop
//!
//! Drives one decision cycle per interval through a [`CycleHandler`] and
//! persists the outcome via [`StateService::apply_update`]. The loop is the
//! single logical writer of the runtime state while it runs.
//!
//! A failed write is logged and the last persisted state is kept; the next
//! cycle naturally retries with a fresh `updated_at`.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::core::service::StateService;
use crate::core::state::{
    BootstrapDefaults, BotStatus, OrderIntent, OrderRecord, RuntimeState, SignalSnapshot,
};
use crate::core::store::StoreError;

/// Failure reported by a decision cycle
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("Risk check failed: {0}")]
    Risk(String),

    #[error("Execution error: {0}")]
    Execution(String),
}

/// Artifacts produced by one successful decision cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleOutcome {
    /// Replaces `latest_signal` when present
    pub signal: Option<SignalSnapshot>,
    /// Replaces `latest_intent` when present
    pub intent: Option<OrderIntent>,
    /// Drop the stored intent (e.g. it was submitted as an order)
    pub clear_intent: bool,
    /// Appended to `recent_orders`, oldest first
    pub orders: Vec<OrderRecord>,
}

/// One step of the bot's decision logic
#[async_trait]
pub trait CycleHandler: Send + Sync {
    async fn run_cycle(&self, state: &RuntimeState) -> Result<CycleOutcome, CycleError>;
}

/// Handler that produces no artifacts; keeps the state's heartbeat fresh
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleCycle;

#[async_trait]
impl CycleHandler for IdleCycle {
    async fn run_cycle(&self, _state: &RuntimeState) -> Result<CycleOutcome, CycleError> {
        Ok(CycleOutcome::default())
    }
}

/// Fold a cycle result into the state
///
/// Success marks the bot running, applies the outcome and clears
/// `last_error`. Failure marks it errored and records the message, leaving
/// signal, intent and orders untouched.
pub fn apply_cycle_result(state: &mut RuntimeState, result: Result<CycleOutcome, CycleError>) {
    match result {
        Ok(outcome) => {
            state.status = BotStatus::Running;
            state.last_error = None;
            if let Some(signal) = outcome.signal {
                state.latest_signal = Some(signal);
            }
            if outcome.clear_intent {
                state.latest_intent = None;
            }
            if let Some(intent) = outcome.intent {
                state.latest_intent = Some(intent);
            }
            state.recent_orders.extend(outcome.orders);
        }
        Err(e) => {
            state.status = BotStatus::Error;
            state.last_error = Some(e.to_string());
        }
    }
}

/// Run decision cycles until a shutdown signal arrives
///
/// Bootstraps the state if needed, marks it running, then executes one
/// cycle per `cycle_interval`. On shutdown the final state is persisted
/// with status `not_running` and returned.
///
/// # Errors
/// Only the initial bootstrap and the final shutdown write are fatal. A
/// failed write during a cycle keeps its outcome in memory, sets
/// `last_error` and is retried on the next cycle.
pub async fn decision_loop<H>(
    service: Arc<StateService>,
    handler: H,
    defaults: BootstrapDefaults,
    cycle_interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<RuntimeState, StoreError>
where
    H: CycleHandler,
{
    let initial = service.get_or_init(&defaults).await?;
    let mut state = service
        .apply_update(&initial, |s| {
            s.status = BotStatus::Running;
            s.last_error = None;
        })
        .await?;

    info!(
        mode = %state.mode,
        symbol = %state.symbol,
        timeframe = %state.timeframe,
        interval_secs = cycle_interval.as_secs_f64(),
        "Decision loop started"
    );

    let mut ticker = interval(cycle_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycle_count: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => {
                info!(total_cycles = cycle_count, "Decision loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                cycle_count += 1;
                let result = handler.run_cycle(&state).await;
                if let Err(e) = &result {
                    warn!(cycle = cycle_count, error = %e, "Decision cycle failed");
                }

                let mut candidate = state.clone();
                apply_cycle_result(&mut candidate, result);

                match service.apply_update(&candidate, |_| {}).await {
                    Ok(next) => {
                        debug!(cycle = cycle_count, status = %next.status, "Cycle persisted");
                        state = next;
                    }
                    Err(e) => {
                        error!(
                            cycle = cycle_count,
                            error = %e,
                            "Failed to persist cycle result, retrying next cycle"
                        );
                        // Unsaved artifacts stay in the working state for the next write
                        candidate.last_error =
                            Some(format!("Failed to persist cycle result: {}", e));
                        state = candidate;
                    }
                }
            }
        }
    }

    service
        .apply_update(&state, |s| s.status = BotStatus::NotRunning)
        .await
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rust_decimal::Decimal;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use crate::core::logging::init_test_logging;
    use crate::core::state::{OrderSide, TradingMode};
    use crate::core::store::StateStore;

    fn defaults() -> BootstrapDefaults {
        BootstrapDefaults {
            mode: TradingMode::Paper,
            symbol: "BTC-USDT".to_string(),
            timeframe: "15m".to_string(),
        }
    }

    fn service_in(dir: &TempDir, limit: usize) -> Arc<StateService> {
        let store = StateStore::new(dir.path().join("runtime.json")).unwrap();
        Arc::new(StateService::new(store, limit))
    }

    /// Emits one order per cycle, or fails every cycle
    struct ScriptedCycle {
        fail: bool,
        calls: AtomicUsize,
        cycle_tx: mpsc::UnboundedSender<usize>,
    }

    #[async_trait]
    impl CycleHandler for ScriptedCycle {
        async fn run_cycle(&self, _state: &RuntimeState) -> Result<CycleOutcome, CycleError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = self.cycle_tx.send(n);
            if self.fail {
                return Err(CycleError::MarketData("candles unavailable".to_string()));
            }
            Ok(CycleOutcome {
                orders: vec![OrderRecord::submitted(OrderSide::Buy, Decimal::new(n as i64, 3))],
                ..CycleOutcome::default()
            })
        }
    }

    #[test]
    fn test_apply_cycle_result_success_clears_error() {
        let mut state = RuntimeState::bootstrap(&defaults());
        state.status = BotStatus::Error;
        state.last_error = Some("previous failure".to_string());
        state.latest_intent = Some(OrderIntent::market(OrderSide::Buy, Decimal::ONE, "entry"));

        let order = OrderRecord::submitted(OrderSide::Buy, Decimal::ONE);
        apply_cycle_result(
            &mut state,
            Ok(CycleOutcome {
                clear_intent: true,
                orders: vec![order.clone()],
                ..CycleOutcome::default()
            }),
        );

        assert_eq!(state.status, BotStatus::Running);
        assert!(state.last_error.is_none());
        assert!(state.latest_intent.is_none());
        assert_eq!(state.recent_orders, vec![order]);
    }

    #[test]
    fn test_apply_cycle_result_failure_sets_error() {
        let mut state = RuntimeState::bootstrap(&defaults());
        let intent = OrderIntent::market(OrderSide::Sell, Decimal::ONE, "exit");
        state.latest_intent = Some(intent.clone());

        apply_cycle_result(
            &mut state,
            Err(CycleError::Risk("daily loss limit reached".to_string())),
        );

        assert_eq!(state.status, BotStatus::Error);
        assert_eq!(
            state.last_error.as_deref(),
            Some("Risk check failed: daily loss limit reached")
        );
        assert_eq!(state.latest_intent, Some(intent));
    }

    #[tokio::test]
    async fn test_idle_cycle_is_empty() {
        let state = RuntimeState::bootstrap(&defaults());
        let outcome = IdleCycle.run_cycle(&state).await.unwrap();
        assert_eq!(outcome, CycleOutcome::default());
    }

    #[tokio::test]
    async fn test_decision_loop_persists_cycles_and_stops() {
        init_test_logging("okx_bot=debug");
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir, 100);
        let (cycle_tx, mut cycle_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handler = ScriptedCycle {
            fail: false,
            calls: AtomicUsize::new(0),
            cycle_tx,
        };
        let task = tokio::spawn(decision_loop(
            Arc::clone(&service),
            handler,
            defaults(),
            Duration::from_millis(10),
            shutdown_rx,
        ));

        while let Some(n) = cycle_rx.recv().await {
            if n >= 3 {
                break;
            }
        }
        shutdown_tx.send(()).unwrap();

        let final_state = task.await.unwrap().unwrap();
        assert_eq!(final_state.status, BotStatus::NotRunning);
        assert!(final_state.last_error.is_none());
        assert!(final_state.recent_orders.len() >= 3);
        assert_eq!(service.snapshot().await.unwrap(), Some(final_state));
    }

    #[tokio::test]
    async fn test_decision_loop_records_failures() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir, 100);
        let (cycle_tx, mut cycle_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handler = ScriptedCycle {
            fail: true,
            calls: AtomicUsize::new(0),
            cycle_tx,
        };
        let task = tokio::spawn(decision_loop(
            Arc::clone(&service),
            handler,
            defaults(),
            Duration::from_millis(10),
            shutdown_rx,
        ));

        while let Some(n) = cycle_rx.recv().await {
            if n >= 2 {
                break;
            }
        }
        shutdown_tx.send(()).unwrap();

        let final_state = task.await.unwrap().unwrap();
        assert_eq!(final_state.status, BotStatus::NotRunning);
        assert_eq!(
            final_state.last_error.as_deref(),
            Some("Market data error: candles unavailable")
        );
        assert!(final_state.recent_orders.is_empty());
    }

    /// Emits one order per cycle sized by the cycle number and blocks the
    /// store's staging path during `fail_on`
    struct FlakyDiskCycle {
        tmp_path: PathBuf,
        fail_on: usize,
        calls: AtomicUsize,
        seen_tx: mpsc::UnboundedSender<(usize, RuntimeState)>,
    }

    #[async_trait]
    impl CycleHandler for FlakyDiskCycle {
        async fn run_cycle(&self, state: &RuntimeState) -> Result<CycleOutcome, CycleError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let _ = self.seen_tx.send((n, state.clone()));
            if n == self.fail_on {
                std::fs::create_dir(&self.tmp_path).unwrap();
            } else if n == self.fail_on + 1 {
                std::fs::remove_dir(&self.tmp_path).unwrap();
            }
            Ok(CycleOutcome {
                orders: vec![OrderRecord::submitted(OrderSide::Buy, Decimal::from(n as u64))],
                ..CycleOutcome::default()
            })
        }
    }

    #[tokio::test]
    async fn test_decision_loop_retries_failed_write() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir, 100);
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handler = FlakyDiskCycle {
            tmp_path: service.store().tmp_path().to_path_buf(),
            fail_on: 2,
            calls: AtomicUsize::new(0),
            seen_tx,
        };
        let task = tokio::spawn(decision_loop(
            Arc::clone(&service),
            handler,
            defaults(),
            Duration::from_millis(10),
            shutdown_rx,
        ));

        let mut after_failure = None;
        while let Some((n, seen)) = seen_rx.recv().await {
            if n == 3 {
                after_failure = Some(seen);
            }
            if n >= 4 {
                break;
            }
        }
        shutdown_tx.send(()).unwrap();

        // Cycle 3 runs on the unsaved state from cycle 2, with the failure recorded
        let after_failure = after_failure.unwrap();
        assert_eq!(after_failure.recent_orders.len(), 2);
        assert!(after_failure
            .last_error
            .as_deref()
            .unwrap()
            .starts_with("Failed to persist cycle result: IO error"));

        let final_state = task.await.unwrap().unwrap();
        let sizes: Vec<Decimal> = final_state.recent_orders.iter().map(|o| o.size).collect();
        let expected: Vec<Decimal> = (1u64..=3).map(Decimal::from).collect();
        assert_eq!(&sizes[..3], expected.as_slice());
        assert!(final_state.last_error.is_none());
        assert_eq!(service.snapshot().await.unwrap(), Some(final_state));
    }

    #[tokio::test]
    async fn test_decision_loop_fails_on_corrupt_state() {
        let dir = TempDir::new().unwrap();
        let service = service_in(&dir, 100);
        std::fs::write(service.store().path(), b"{}").unwrap();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let result = decision_loop(
            Arc::clone(&service),
            IdleCycle,
            defaults(),
            Duration::from_millis(10),
            shutdown_rx,
        )
        .await;

        assert!(matches!(result, Err(StoreError::CorruptState(_))));
    }
}
