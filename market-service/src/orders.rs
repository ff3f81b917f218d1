use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use shared::{
    order_number, round_money, tracking_code, MarketError, Order, OrderAction, OrderItem,
    OrderStatus,
};

use crate::ledger::Ledger;
use crate::reservations::StockReservationManager;
use crate::store::MarketStore;

/// One line of a checkout: a reservation to finalize plus the price it was
/// offered at.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutItem {
    pub reservation_id: Uuid,
    pub seller_id: Uuid,
    pub unit_price: BigDecimal,
}

#[derive(Debug, Clone)]
pub struct Checkout {
    pub buyer_id: Uuid,
    pub metodo_envio: Option<String>,
    pub transportadora: Option<String>,
    pub endereco_entrega: serde_json::Value,
    pub items: Vec<CheckoutItem>,
}

/// Drives orders from creation through shipment, delivery or cancellation.
/// Transitions are guarded both here (adjacency) and in storage (conditional
/// update), so two concurrent seller actions cannot both win.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn MarketStore>,
    reservations: StockReservationManager,
    ledger: Ledger,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn MarketStore>,
        reservations: StockReservationManager,
        ledger: Ledger,
    ) -> Self {
        Self {
            store,
            reservations,
            ledger,
        }
    }

    /// Finalizes a buyer's reservations into a PENDENTE order with one item
    /// per seller line. Every reservation is validated up front so a stale
    /// hold aborts the checkout before anything is consumed or written.
    pub async fn checkout(
        &self,
        checkout: Checkout,
        now: DateTime<Utc>,
    ) -> Result<(Order, Vec<OrderItem>), MarketError> {
        for item in &checkout.items {
            let reservation = self
                .store
                .get_reservation(item.reservation_id)
                .await?
                .ok_or(MarketError::ReservationNotFound)?;
            if reservation.status.is_terminal() {
                return Err(MarketError::AlreadyTerminal);
            }
            if reservation.is_expired(now) {
                return Err(MarketError::ReservationExpired);
            }
        }

        let order_id = Uuid::new_v4();
        let mut items = Vec::with_capacity(checkout.items.len());
        for item in &checkout.items {
            let reservation = self.reservations.consume(item.reservation_id, now).await?;
            let subtotal =
                round_money(&(&item.unit_price * BigDecimal::from(reservation.quantity)));
            items.push(OrderItem {
                id: Uuid::new_v4(),
                order_id,
                seller_id: item.seller_id,
                product_id: reservation.product_id,
                quantity: reservation.quantity,
                subtotal,
            });
        }

        let order = Order {
            id: order_id,
            buyer_id: checkout.buyer_id,
            numero: order_number(now),
            status: OrderStatus::Pendente,
            metodo_envio: checkout.metodo_envio,
            transportadora: checkout.transportadora,
            codigo_rastreio: None,
            endereco_entrega: checkout.endereco_entrega,
            data_pedido: now,
        };
        self.store.insert_order(&order, &items).await?;

        info!(order = %order.id, numero = %order.numero, items = items.len(), "order created");
        Ok((order, items))
    }

    /// Applies one seller action to one order. The first transition into
    /// ENVIADO issues the tracking code and settles the seller's VENDA for
    /// that sub-order.
    pub async fn apply_action(
        &self,
        pedido_id: Uuid,
        vendedor_id: Uuid,
        action: OrderAction,
        now: DateTime<Utc>,
    ) -> Result<Order, MarketError> {
        let order = self
            .store
            .get_order(pedido_id)
            .await?
            .ok_or(MarketError::OrderNotFound)?;
        let item = self
            .store
            .get_order_item(pedido_id, vendedor_id)
            .await?
            .ok_or(MarketError::NotOwner)?;

        let from = order.status;
        let to = action.target_status();
        if !from.can_transition_to(to) {
            return Err(MarketError::InvalidTransition { from, to });
        }

        let tracking = match (to, &order.codigo_rastreio) {
            (OrderStatus::Enviado, None) => {
                Some(tracking_code(order.transportadora.as_deref(), now))
            }
            _ => None,
        };

        let changed = self
            .store
            .transition_order(pedido_id, from, to, tracking, now)
            .await?;
        if !changed {
            // Lost a race against another action; report the status that won.
            let current = self
                .store
                .get_order(pedido_id)
                .await?
                .ok_or(MarketError::OrderNotFound)?;
            return Err(MarketError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        if to == OrderStatus::Enviado {
            self.ledger.record_sale(&item, now).await?;
        }

        info!(order = %pedido_id, seller = %vendedor_id, action = action.as_str(), "order transitioned");
        self.store
            .get_order(pedido_id)
            .await?
            .ok_or(MarketError::OrderNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MarketStore, MemoryStore};
    use chrono::Duration;
    use shared::{InventoryLevel, ReservationStatus, TransactionKind};
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    struct Fixture {
        service: OrderService,
        store: Arc<MemoryStore>,
        buyer_id: Uuid,
        seller_id: Uuid,
        product_id: Uuid,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let reservations =
            StockReservationManager::new(store.clone(), Duration::seconds(900));
        let ledger = Ledger::new(store.clone(), dec("0.05"));
        let service = OrderService::new(store.clone(), reservations, ledger);
        Fixture {
            service,
            store,
            buyer_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
        }
    }

    async fn place_order(fx: &Fixture, now: DateTime<Utc>) -> (Order, Vec<OrderItem>) {
        fx.store
            .insert_inventory(&InventoryLevel::new(fx.product_id, 5))
            .await
            .unwrap();
        let reservation = fx
            .service
            .reservations
            .reserve(fx.product_id, 2, "cart-1".into(), Duration::seconds(900), now)
            .await
            .unwrap();
        fx.service
            .checkout(
                Checkout {
                    buyer_id: fx.buyer_id,
                    metodo_envio: Some("sedex".into()),
                    transportadora: Some("Correios".into()),
                    endereco_entrega: serde_json::json!({"cidade": "Curitiba"}),
                    items: vec![CheckoutItem {
                        reservation_id: reservation.id,
                        seller_id: fx.seller_id,
                        unit_price: dec("50.00"),
                    }],
                },
                now,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn checkout_consumes_reservations() {
        let fx = fixture();
        let now = Utc::now();
        let (order, items) = place_order(&fx, now).await;

        assert_eq!(order.status, OrderStatus::Pendente);
        assert!(order.numero.starts_with("PED-"));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].subtotal, dec("100.00"));

        let level = fx.store.get_inventory(fx.product_id).await.unwrap().unwrap();
        assert_eq!(level.sold_quantity, 2);
        assert_eq!(level.reserved_quantity, 0);
    }

    #[tokio::test]
    async fn checkout_rejects_stale_reservation_without_side_effects() {
        let fx = fixture();
        let now = Utc::now();
        fx.store
            .insert_inventory(&InventoryLevel::new(fx.product_id, 5))
            .await
            .unwrap();
        let reservation = fx
            .service
            .reservations
            .reserve(fx.product_id, 1, "cart-1".into(), Duration::zero(), now)
            .await
            .unwrap();

        let result = fx
            .service
            .checkout(
                Checkout {
                    buyer_id: fx.buyer_id,
                    metodo_envio: None,
                    transportadora: None,
                    endereco_entrega: serde_json::json!({}),
                    items: vec![CheckoutItem {
                        reservation_id: reservation.id,
                        seller_id: fx.seller_id,
                        unit_price: dec("10.00"),
                    }],
                },
                now,
            )
            .await;
        assert!(matches!(result, Err(MarketError::ReservationExpired)));

        // Nothing was consumed: the hold is still there for the sweeper.
        let reservation = fx
            .store
            .get_reservation(reservation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reservation.status, ReservationStatus::Active);
    }

    #[tokio::test]
    async fn happy_path_ships_and_delivers() {
        let fx = fixture();
        let now = Utc::now();
        let (order, _) = place_order(&fx, now).await;

        let order = fx
            .service
            .apply_action(order.id, fx.seller_id, OrderAction::MarcarProcessando, now)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Processando);
        assert!(order.codigo_rastreio.is_none());

        let order = fx
            .service
            .apply_action(order.id, fx.seller_id, OrderAction::ConfirmarEnvio, now)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Enviado);
        let code = order.codigo_rastreio.clone().unwrap();
        assert!(code.starts_with("BR"));
        assert!(code.ends_with("CO"));

        let order = fx
            .service
            .apply_action(order.id, fx.seller_id, OrderAction::MarcarEntregue, now)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Entregue);
        // Tracking code survives later transitions.
        assert_eq!(order.codigo_rastreio, Some(code));
    }

    #[tokio::test]
    async fn delivery_cannot_skip_shipment() {
        let fx = fixture();
        let now = Utc::now();
        let (order, _) = place_order(&fx, now).await;

        let result = fx
            .service
            .apply_action(order.id, fx.seller_id, OrderAction::MarcarEntregue, now)
            .await;
        assert!(matches!(
            result,
            Err(MarketError::InvalidTransition {
                from: OrderStatus::Pendente,
                to: OrderStatus::Entregue,
            })
        ));

        let stored = fx.store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pendente);
    }

    #[tokio::test]
    async fn shipped_orders_cannot_be_cancelled() {
        let fx = fixture();
        let now = Utc::now();
        let (order, _) = place_order(&fx, now).await;

        fx.service
            .apply_action(order.id, fx.seller_id, OrderAction::MarcarProcessando, now)
            .await
            .unwrap();
        fx.service
            .apply_action(order.id, fx.seller_id, OrderAction::ConfirmarEnvio, now)
            .await
            .unwrap();

        let result = fx
            .service
            .apply_action(order.id, fx.seller_id, OrderAction::Cancelar, now)
            .await;
        assert!(matches!(result, Err(MarketError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn retried_shipment_confirmation_settles_once() {
        let fx = fixture();
        let now = Utc::now();
        let (order, _) = place_order(&fx, now).await;

        fx.service
            .apply_action(order.id, fx.seller_id, OrderAction::MarcarProcessando, now)
            .await
            .unwrap();
        fx.service
            .apply_action(order.id, fx.seller_id, OrderAction::ConfirmarEnvio, now)
            .await
            .unwrap();

        // The retry is rejected by the state machine and, independently, the
        // ledger refuses a second VENDA for the same item.
        let retry = fx
            .service
            .apply_action(order.id, fx.seller_id, OrderAction::ConfirmarEnvio, now)
            .await;
        assert!(matches!(retry, Err(MarketError::InvalidTransition { .. })));

        let txs = fx
            .store
            .transactions_for_seller(fx.seller_id)
            .await
            .unwrap();
        let vendas: Vec<_> = txs
            .iter()
            .filter(|t| t.tipo == TransactionKind::Venda)
            .collect();
        assert_eq!(vendas.len(), 1);
        assert_eq!(vendas[0].valor, dec("95.00"));
    }

    #[tokio::test]
    async fn unknown_order_and_foreign_seller_are_rejected() {
        let fx = fixture();
        let now = Utc::now();
        let (order, _) = place_order(&fx, now).await;

        let missing = fx
            .service
            .apply_action(Uuid::new_v4(), fx.seller_id, OrderAction::Cancelar, now)
            .await;
        assert!(matches!(missing, Err(MarketError::OrderNotFound)));

        let foreign = fx
            .service
            .apply_action(order.id, Uuid::new_v4(), OrderAction::Cancelar, now)
            .await;
        assert!(matches!(foreign, Err(MarketError::NotOwner)));
    }
}
