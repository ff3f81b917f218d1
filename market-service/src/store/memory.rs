use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared::{
    FinancialTransaction, InventoryLevel, Order, OrderItem, OrderStatus, Reservation,
    ReservationStatus, TransactionKind,
};

use super::MarketStore;

#[derive(Default)]
struct Inner {
    inventory: HashMap<Uuid, InventoryLevel>,
    reservations: HashMap<Uuid, Reservation>,
    orders: HashMap<Uuid, Order>,
    order_items: Vec<OrderItem>,
    transactions: Vec<FinancialTransaction>,
}

/// Mutex-guarded store with the same semantics as the PostgreSQL backend.
/// Backs the test suites and ephemeral development runs; the single lock
/// makes every operation atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store mutex poisoned"))
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn insert_inventory(&self, level: &InventoryLevel) -> Result<()> {
        let mut guard = self.lock()?;
        if guard.inventory.contains_key(&level.product_id) {
            anyhow::bail!("inventory already exists for product {}", level.product_id);
        }
        guard.inventory.insert(level.product_id, level.clone());
        Ok(())
    }

    async fn get_inventory(&self, product_id: Uuid) -> Result<Option<InventoryLevel>> {
        let guard = self.lock()?;
        Ok(guard.inventory.get(&product_id).cloned())
    }

    async fn try_reserve(&self, reservation: &Reservation) -> Result<bool> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        let Some(level) = inner.inventory.get_mut(&reservation.product_id) else {
            return Ok(false);
        };
        if level.available_quantity < reservation.quantity {
            return Ok(false);
        }

        level.available_quantity -= reservation.quantity;
        level.reserved_quantity += reservation.quantity;
        inner
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(true)
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>> {
        let guard = self.lock()?;
        Ok(guard.reservations.get(&id).cloned())
    }

    async fn mark_consumed(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<Reservation>> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        let Some(reservation) = inner.reservations.get_mut(&id) else {
            return Ok(None);
        };
        if reservation.status != ReservationStatus::Active || reservation.is_expired(now) {
            return Ok(None);
        }

        reservation.status = ReservationStatus::Consumed;
        let reservation = reservation.clone();
        if let Some(level) = inner.inventory.get_mut(&reservation.product_id) {
            level.reserved_quantity -= reservation.quantity;
            level.sold_quantity += reservation.quantity;
        }
        Ok(Some(reservation))
    }

    async fn mark_released(&self, id: Uuid) -> Result<Option<Reservation>> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        let Some(reservation) = inner.reservations.get_mut(&id) else {
            return Ok(None);
        };
        if reservation.status != ReservationStatus::Active {
            return Ok(None);
        }

        reservation.status = ReservationStatus::Released;
        let reservation = reservation.clone();
        if let Some(level) = inner.inventory.get_mut(&reservation.product_id) {
            level.reserved_quantity -= reservation.quantity;
            level.available_quantity += reservation.quantity;
        }
        Ok(Some(reservation))
    }

    async fn mark_expired(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<Reservation>> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        let Some(reservation) = inner.reservations.get_mut(&id) else {
            return Ok(None);
        };
        if reservation.status != ReservationStatus::Active || !reservation.is_expired(now) {
            return Ok(None);
        }

        reservation.status = ReservationStatus::Expired;
        let reservation = reservation.clone();
        if let Some(level) = inner.inventory.get_mut(&reservation.product_id) {
            level.reserved_quantity -= reservation.quantity;
            level.available_quantity += reservation.quantity;
        }
        Ok(Some(reservation))
    }

    async fn expire_before(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        let mut count = 0;
        for reservation in inner.reservations.values_mut() {
            if reservation.status == ReservationStatus::Active && reservation.expires_at < now {
                reservation.status = ReservationStatus::Expired;
                if let Some(level) = inner.inventory.get_mut(&reservation.product_id) {
                    level.reserved_quantity -= reservation.quantity;
                    level.available_quantity += reservation.quantity;
                }
                count += 1;
            }
        }
        Ok(count)
    }

    async fn reservations_for_holder(&self, holder_id: &str) -> Result<Vec<Reservation>> {
        let guard = self.lock()?;
        let mut found: Vec<Reservation> = guard
            .reservations
            .values()
            .filter(|r| r.holder_id == holder_id && r.status == ReservationStatus::Active)
            .cloned()
            .collect();
        found.sort_by_key(|r| r.expires_at);
        Ok(found)
    }

    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()> {
        let mut guard = self.lock()?;
        guard.orders.insert(order.id, order.clone());
        guard.order_items.extend_from_slice(items);
        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let guard = self.lock()?;
        Ok(guard.orders.get(&id).cloned())
    }

    async fn get_order_item(
        &self,
        order_id: Uuid,
        seller_id: Uuid,
    ) -> Result<Option<OrderItem>> {
        let guard = self.lock()?;
        Ok(guard
            .order_items
            .iter()
            .find(|i| i.order_id == order_id && i.seller_id == seller_id)
            .cloned())
    }

    async fn transition_order(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        tracking_code: Option<String>,
        _now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut guard = self.lock()?;

        let Some(order) = guard.orders.get_mut(&id) else {
            return Ok(false);
        };
        if order.status != from {
            return Ok(false);
        }

        order.status = to;
        if let Some(code) = tracking_code {
            if order.codigo_rastreio.is_none() {
                order.codigo_rastreio = Some(code);
            }
        }
        Ok(true)
    }

    async fn record_sale_once(&self, tx: &FinancialTransaction) -> Result<bool> {
        let mut guard = self.lock()?;

        let already_recorded = guard.transactions.iter().any(|existing| {
            existing.tipo == TransactionKind::Venda
                && existing.order_item_id == tx.order_item_id
        });
        if already_recorded {
            return Ok(false);
        }

        guard.transactions.push(tx.clone());
        Ok(true)
    }

    async fn seller_balance(&self, seller_id: Uuid) -> Result<BigDecimal> {
        let guard = self.lock()?;
        Ok(guard
            .transactions
            .iter()
            .filter(|t| t.seller_id == seller_id)
            .fold(BigDecimal::from(0), |acc, t| acc + &t.valor))
    }

    async fn transactions_for_seller(
        &self,
        seller_id: Uuid,
    ) -> Result<Vec<FinancialTransaction>> {
        let guard = self.lock()?;
        let mut found: Vec<FinancialTransaction> = guard
            .transactions
            .iter()
            .filter(|t| t.seller_id == seller_id)
            .cloned()
            .collect();
        found.sort_by_key(|t| std::cmp::Reverse(t.data_transacao));
        Ok(found)
    }

    async fn try_withdraw(&self, tx: &FinancialTransaction) -> Result<bool> {
        let mut guard = self.lock()?;

        let balance = guard
            .transactions
            .iter()
            .filter(|t| t.seller_id == tx.seller_id)
            .fold(BigDecimal::from(0), |acc, t| acc + &t.valor);
        if &balance + &tx.valor < BigDecimal::from(0) {
            return Ok(false);
        }

        guard.transactions.push(tx.clone());
        Ok(true)
    }
}
