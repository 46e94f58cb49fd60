use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::ExecutionError;
use crate::types::OrderState;

/// Durable store of [`OrderState`]. At most one state exists per
/// `(run_id, client_order_id)` pair, which is also what makes place-order
/// idempotency possible.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn upsert(&self, state: OrderState) -> Result<(), ExecutionError>;

    async fn get_by_client_order_id(
        &self,
        run_id: Uuid,
        client_order_id: &str,
    ) -> Result<Option<OrderState>, ExecutionError>;

    async fn get_by_id(&self, order_id: Uuid) -> Result<Option<OrderState>, ExecutionError>;

    async fn list_for_run(&self, run_id: Uuid) -> Result<Vec<OrderState>, ExecutionError>;
}

#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    by_key: Mutex<HashMap<(Uuid, String), OrderState>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn upsert(&self, state: OrderState) -> Result<(), ExecutionError> {
        self.by_key
            .lock()
            .insert((state.run_id, state.client_order_id.clone()), state);
        Ok(())
    }

    async fn get_by_client_order_id(
        &self,
        run_id: Uuid,
        client_order_id: &str,
    ) -> Result<Option<OrderState>, ExecutionError> {
        Ok(self
            .by_key
            .lock()
            .get(&(run_id, client_order_id.to_string()))
            .cloned())
    }

    async fn get_by_id(&self, order_id: Uuid) -> Result<Option<OrderState>, ExecutionError> {
        Ok(self
            .by_key
            .lock()
            .values()
            .find(|state| state.id == order_id)
            .cloned())
    }

    async fn list_for_run(&self, run_id: Uuid) -> Result<Vec<OrderState>, ExecutionError> {
        Ok(self
            .by_key
            .lock()
            .values()
            .filter(|state| state.run_id == run_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderIntent, OrderType, Side, TimeInForce};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn intent(run_id: Uuid, client_order_id: &str) -> OrderIntent {
        OrderIntent {
            run_id,
            client_order_id: client_order_id.to_string(),
            symbol: "AAPL".to_string(),
            side: Side::Buy,
            order_type: OrderType::Market,
            qty: dec!(10),
            limit_price: None,
            stop_price: None,
            time_in_force: TimeInForce::Day,
        }
    }

    #[tokio::test]
    async fn upsert_is_keyed_by_run_and_client_order_id() {
        let repo = InMemoryOrderRepository::new();
        let run_id = Uuid::new_v4();
        let state = OrderState::from_intent(&intent(run_id, "client-1"), Utc::now());
        let order_id = state.id;
        repo.upsert(state).await.unwrap();

        let found = repo
            .get_by_client_order_id(run_id, "client-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, order_id);
        assert!(repo
            .get_by_client_order_id(Uuid::new_v4(), "client-1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn list_for_run_excludes_other_runs() {
        let repo = InMemoryOrderRepository::new();
        let run_a = Uuid::new_v4();
        let run_b = Uuid::new_v4();
        repo.upsert(OrderState::from_intent(&intent(run_a, "a-1"), Utc::now()))
            .await
            .unwrap();
        repo.upsert(OrderState::from_intent(&intent(run_b, "b-1"), Utc::now()))
            .await
            .unwrap();

        let for_a = repo.list_for_run(run_a).await.unwrap();
        assert_eq!(for_a.len(), 1);
        assert_eq!(for_a[0].client_order_id, "a-1");
    }
}
