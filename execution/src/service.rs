use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use engine_events::{EventHandler, EventLog, Envelope, EnvelopeKind};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::adapter::ExchangeAdapter;
use crate::error::ExecutionError;
use crate::position::PositionTracker;
use crate::repository::OrderRepository;
use crate::types::{Fill, OrderIntent, OrderState, OrderStatus, OrderType, Side, TimeInForce};

const PRODUCER: &str = "veda";

/// How many times to retry an adapter call that times out before the retry
/// is considered exhausted and the order is rejected. `original_source`'s
/// adapters retry transient transport errors a bounded number of times; we
/// mirror that instead of failing on the first timeout.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CancelOrderPayload {
    client_order_id: String,
}

/// The runner's mode-neutral `PlaceOrder` action, as routed onto `live.*`.
/// Carries none of `OrderIntent`'s run/idempotency/time-in-force fields;
/// those are filled in from the envelope and a freshly generated id.
#[derive(Debug, Serialize, Deserialize)]
struct PlaceOrderPayload {
    symbol: String,
    side: Side,
    #[serde(with = "engine_integration::decimal")]
    qty: Decimal,
    order_type: OrderType,
    #[serde(with = "engine_integration::decimal::option", default)]
    limit_price: Option<Decimal>,
    #[serde(with = "engine_integration::decimal::option", default)]
    stop_price: Option<Decimal>,
}

fn intent_from_payload(run_id: Uuid, payload: PlaceOrderPayload) -> OrderIntent {
    OrderIntent {
        run_id,
        client_order_id: format!("live-{}", Uuid::new_v4()),
        symbol: payload.symbol,
        side: payload.side,
        order_type: payload.order_type,
        qty: payload.qty,
        limit_price: payload.limit_price,
        stop_price: payload.stop_price,
        time_in_force: TimeInForce::Day,
    }
}

/// Idempotent order submission, position derivation from fills, and
/// persistence for one or more live/paper runs, mediated through an
/// [`ExchangeAdapter`].
#[allow(missing_debug_implementations)]
pub struct LiveExecutionService {
    run_ids: Arc<Mutex<HashSet<Uuid>>>,
    adapter: Arc<dyn ExchangeAdapter>,
    repository: Arc<dyn OrderRepository>,
    event_log: Arc<dyn EventLog>,
    positions: PositionTracker,
    retry_policy: RetryPolicy,
}

impl LiveExecutionService {
    pub fn new(
        run_ids: Vec<Uuid>,
        adapter: Arc<dyn ExchangeAdapter>,
        repository: Arc<dyn OrderRepository>,
        event_log: Arc<dyn EventLog>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            run_ids: Arc::new(Mutex::new(run_ids.into_iter().collect())),
            adapter,
            repository,
            event_log,
            positions: PositionTracker::new(),
            retry_policy,
        }
    }

    /// Adds a run to the set this (singleton, shared across live/paper runs)
    /// service will accept `live.PlaceOrder`/`live.CancelOrder` for.
    pub fn register_run(&self, run_id: Uuid) {
        self.run_ids.lock().insert(run_id);
    }

    /// Subscribes to `live.PlaceOrder` and `live.CancelOrder`, filtered to
    /// this instance's configured runs, delegating to `place_order` /
    /// `cancel_order`.
    pub fn subscribe(self: &Arc<Self>) {
        let handler: Arc<dyn EventHandler> = self.clone();
        let run_ids = self.run_ids.clone();
        self.event_log.subscribe_filtered(
            vec!["live.PlaceOrder".to_string(), "live.CancelOrder".to_string()],
            handler,
            Some(Arc::new(move |envelope: &Envelope| {
                envelope.run_id.map(|id| run_ids.lock().contains(&id)).unwrap_or(false)
            })),
        );
    }

    async fn submit_with_retries(
        &self,
        intent: &OrderIntent,
    ) -> Result<crate::types::SubmitOutcome, ExecutionError> {
        let mut last_timeout = None;
        for _ in 0..self.retry_policy.max_attempts {
            match self.adapter.submit_order(intent).await {
                Ok(outcome) => return Ok(outcome),
                Err(ExecutionError::TransportTimeout(d)) => last_timeout = Some(d),
                Err(other) => return Err(other),
            }
        }
        Err(ExecutionError::AdapterRejected(format!(
            "adapter timed out after {} attempts ({:?})",
            self.retry_policy.max_attempts, last_timeout
        )))
    }

    pub async fn place_order(&self, intent: OrderIntent) -> Result<OrderState, ExecutionError> {
        if !self.adapter.is_connected() {
            return Err(ExecutionError::NotConnected);
        }

        if let Some(existing) = self
            .repository
            .get_by_client_order_id(intent.run_id, &intent.client_order_id)
            .await?
        {
            return Ok(existing);
        }

        let now = Utc::now();
        let outcome = self.submit_with_retries(&intent).await?;

        let mut state = OrderState::from_intent(&intent, now);
        state.exchange_order_id = outcome.exchange_order_id.clone();
        state.status = outcome.status;
        state.submitted_at = Some(now);
        state.error_code = outcome.error_code.clone();
        state.reject_reason = outcome.error_message.clone();

        if outcome.status == OrderStatus::Filled {
            if let Some(exchange_order_id) = &state.exchange_order_id {
                if let Some(fetched) = self.adapter.get_order(exchange_order_id).await? {
                    state.filled_qty = fetched.filled_qty;
                    state.filled_avg_price = fetched.filled_avg_price;
                    state.filled_at = Some(now);
                }
            }
        }

        self.repository.upsert(state.clone()).await?;

        let event_type = if outcome.status == OrderStatus::Rejected {
            "orders.Rejected"
        } else {
            "orders.Created"
        };
        let envelope = Envelope::new(
            EnvelopeKind::Event,
            event_type,
            PRODUCER,
            serde_json::to_value(&state).map_err(|e| ExecutionError::StorageFailure(e.to_string()))?,
        )
        .with_run_id(intent.run_id);
        self.event_log.append(envelope).await.map_err(|e| ExecutionError::StorageFailure(e.to_string()))?;

        Ok(state)
    }

    pub async fn cancel_order(
        &self,
        run_id: Uuid,
        client_order_id: &str,
    ) -> Result<OrderState, ExecutionError> {
        let mut state = self
            .repository
            .get_by_client_order_id(run_id, client_order_id)
            .await?
            .ok_or_else(|| ExecutionError::NotFound(client_order_id.to_string()))?;

        let exchange_order_id = state
            .exchange_order_id
            .clone()
            .ok_or_else(|| ExecutionError::NotFound(client_order_id.to_string()))?;

        let cancelled = self.adapter.cancel_order(&exchange_order_id).await?;
        if !cancelled {
            return Err(ExecutionError::AdapterRejected(format!(
                "adapter declined to cancel {exchange_order_id}"
            )));
        }

        state.status = OrderStatus::Cancelled;
        state.cancelled_at = Some(Utc::now());
        self.repository.upsert(state.clone()).await?;

        let envelope = Envelope::new(
            EnvelopeKind::Event,
            "orders.Cancelled",
            PRODUCER,
            serde_json::to_value(&state).map_err(|e| ExecutionError::StorageFailure(e.to_string()))?,
        )
        .with_run_id(run_id);
        self.event_log.append(envelope).await.map_err(|e| ExecutionError::StorageFailure(e.to_string()))?;

        Ok(state)
    }

    pub async fn get_order(
        &self,
        run_id: Uuid,
        client_order_id: &str,
    ) -> Result<Option<OrderState>, ExecutionError> {
        self.repository
            .get_by_client_order_id(run_id, client_order_id)
            .await
    }

    pub async fn list_orders(&self, run_id: Uuid) -> Result<Vec<OrderState>, ExecutionError> {
        self.repository.list_for_run(run_id).await
    }

    /// Appends `fill` to its order, updates `filled_qty` and the
    /// weighted `filled_avg_price`, emits `orders.Filled`, and applies the
    /// fill to the position tracker.
    pub async fn ingest_fill(&self, run_id: Uuid, fill: Fill) -> Result<OrderState, ExecutionError> {
        let mut state = self
            .repository
            .get_by_id(fill.order_id)
            .await?
            .ok_or_else(|| ExecutionError::NotFound(fill.order_id.to_string()))?;

        let prior_qty = state.filled_qty;
        let prior_avg = state.filled_avg_price.unwrap_or(Decimal::ZERO);
        let new_qty = prior_qty + fill.qty;
        state.filled_avg_price = Some(if new_qty.is_zero() {
            Decimal::ZERO
        } else {
            (prior_avg * prior_qty + fill.price * fill.qty) / new_qty
        });
        state.filled_qty = new_qty;
        state.status = if new_qty >= state.qty {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        if state.status == OrderStatus::Filled {
            state.filled_at = Some(fill.timestamp);
        }

        self.repository.upsert(state.clone()).await?;
        self.positions.apply_fill(&state.symbol, state.side, &fill);

        let envelope = Envelope::new(
            EnvelopeKind::Event,
            "orders.Filled",
            PRODUCER,
            serde_json::to_value(&fill).map_err(|e| ExecutionError::StorageFailure(e.to_string()))?,
        )
        .with_run_id(run_id);
        self.event_log.append(envelope).await.map_err(|e| ExecutionError::StorageFailure(e.to_string()))?;

        Ok(state)
    }

    pub fn positions(&self) -> &PositionTracker {
        &self.positions
    }
}

#[async_trait]
impl EventHandler for LiveExecutionService {
    async fn handle(&self, _offset: i64, envelope: &Envelope) {
        let Some(run_id) = envelope.run_id else {
            return;
        };
        match envelope.event_type.as_str() {
            "live.PlaceOrder" => match serde_json::from_value::<PlaceOrderPayload>(envelope.payload.clone()) {
                Ok(payload) => {
                    let intent = intent_from_payload(run_id, payload);
                    if let Err(err) = self.place_order(intent).await {
                        tracing::error!(run_id = %run_id, error = %err, "live.PlaceOrder handling failed");
                    }
                }
                Err(err) => {
                    tracing::error!(run_id = %run_id, error = %err, "live.PlaceOrder payload did not decode");
                }
            },
            "live.CancelOrder" => match serde_json::from_value::<CancelOrderPayload>(envelope.payload.clone()) {
                Ok(payload) => {
                    if let Err(err) = self.cancel_order(run_id, &payload.client_order_id).await {
                        tracing::error!(run_id = %run_id, error = %err, "live.CancelOrder handling failed");
                    }
                }
                Err(err) => {
                    tracing::error!(run_id = %run_id, error = %err, "live.CancelOrder payload did not decode");
                }
            },
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AccountSnapshot, OrderFilter};
    use crate::types::{Bar, OrderType, Position, Side, SubmitOutcome, TimeInForce};
    use chrono::{DateTime, Utc};
    use engine_events::InMemoryEventLog;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    struct FakeAdapter {
        connected: Mutex<bool>,
        submit_calls: Mutex<u32>,
        next_status: Mutex<OrderStatus>,
    }

    impl Default for FakeAdapter {
        fn default() -> Self {
            Self {
                connected: Mutex::new(false),
                submit_calls: Mutex::new(0),
                next_status: Mutex::new(OrderStatus::Accepted),
            }
        }
    }

    #[async_trait]
    impl ExchangeAdapter for FakeAdapter {
        async fn connect(&self) -> Result<(), ExecutionError> {
            *self.connected.lock() = true;
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), ExecutionError> {
            *self.connected.lock() = false;
            Ok(())
        }

        fn is_connected(&self) -> bool {
            *self.connected.lock()
        }

        async fn submit_order(&self, _intent: &OrderIntent) -> Result<SubmitOutcome, ExecutionError> {
            *self.submit_calls.lock() += 1;
            Ok(SubmitOutcome {
                success: true,
                exchange_order_id: Some("ex-1".to_string()),
                status: *self.next_status.lock(),
                error_code: None,
                error_message: None,
            })
        }

        async fn cancel_order(&self, _exchange_order_id: &str) -> Result<bool, ExecutionError> {
            Ok(true)
        }

        async fn get_order(&self, _exchange_order_id: &str) -> Result<Option<OrderState>, ExecutionError> {
            Ok(None)
        }

        async fn list_orders(&self, _filter: OrderFilter) -> Result<Vec<OrderState>, ExecutionError> {
            Ok(Vec::new())
        }

        async fn get_account(&self) -> Result<AccountSnapshot, ExecutionError> {
            Ok(AccountSnapshot { cash: dec!(0), buying_power: dec!(0) })
        }

        async fn get_positions(&self) -> Result<Vec<Position>, ExecutionError> {
            Ok(Vec::new())
        }

        async fn get_position(&self, _symbol: &str) -> Result<Option<Position>, ExecutionError> {
            Ok(None)
        }

        async fn latest_bar(&self, _symbol: &str) -> Result<Option<Bar>, ExecutionError> {
            Ok(None)
        }

        async fn historical_bars(
            &self,
            _symbol: &str,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<Bar>, ExecutionError> {
            Ok(Vec::new())
        }
    }

    fn intent(run_id: Uuid) -> OrderIntent {
        OrderIntent {
            run_id,
            client_order_id: "client-1".to_string(),
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            order_type: OrderType::Market,
            qty: dec!(10),
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
        }
    }

    fn service(adapter: Arc<FakeAdapter>) -> LiveExecutionService {
        LiveExecutionService::new(
            vec![],
            adapter,
            Arc::new(crate::repository::InMemoryOrderRepository::new()),
            Arc::new(InMemoryEventLog::default()),
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn place_order_fails_fast_when_not_connected() {
        let adapter = Arc::new(FakeAdapter::default());
        let svc = service(adapter);
        let run_id = Uuid::new_v4();
        let err = svc.place_order(intent(run_id)).await.expect_err("not connected");
        assert!(matches!(err, ExecutionError::NotConnected));
    }

    #[tokio::test]
    async fn placing_the_same_client_order_id_twice_calls_the_adapter_once() {
        let adapter = Arc::new(FakeAdapter::default());
        adapter.connect().await.unwrap();
        *adapter.next_status.lock() = OrderStatus::Accepted;
        let svc = service(adapter.clone());
        let run_id = Uuid::new_v4();

        let first = svc.place_order(intent(run_id)).await.unwrap();
        let second = svc.place_order(intent(run_id)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(*adapter.submit_calls.lock(), 1);
    }

    #[tokio::test]
    async fn ingesting_a_fill_updates_state_and_applies_to_positions() {
        let adapter = Arc::new(FakeAdapter::default());
        adapter.connect().await.unwrap();
        *adapter.next_status.lock() = OrderStatus::Accepted;
        let svc = service(adapter);
        let run_id = Uuid::new_v4();

        let placed = svc.place_order(intent(run_id)).await.unwrap();
        let fill = Fill {
            order_id: placed.id,
            qty: dec!(10),
            price: dec!(150),
            commission: dec!(1),
            timestamp: Utc::now(),
        };
        let filled = svc.ingest_fill(run_id, fill).await.unwrap();

        assert_eq!(filled.status, OrderStatus::Filled);
        assert_eq!(filled.filled_qty, dec!(10));
        assert_eq!(filled.filled_avg_price, Some(dec!(150)));
        assert_eq!(svc.positions().get_position("AAPL").unwrap().qty, dec!(10));
    }

    #[tokio::test]
    async fn register_run_allows_the_subscription_filter_to_accept_it() {
        let adapter = Arc::new(FakeAdapter::default());
        adapter.connect().await.unwrap();
        *adapter.next_status.lock() = OrderStatus::Accepted;
        let svc = Arc::new(service(adapter));
        let run_id = Uuid::new_v4();
        svc.register_run(run_id);
        svc.subscribe();

        let event_log = svc.event_log.clone();
        let payload = PlaceOrderPayload {
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            order_type: OrderType::Market,
            qty: dec!(10),
            limit_price: None,
            stop_price: None,
        };
        let envelope = Envelope::new(EnvelopeKind::Event, "live.PlaceOrder", "test", serde_json::to_value(payload).unwrap())
            .with_run_id(run_id);
        event_log.append(envelope).await.unwrap();

        assert_eq!(svc.list_orders(run_id).await.unwrap().len(), 1);
    }
}
