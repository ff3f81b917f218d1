use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared::{FinancialTransaction, InventoryLevel, Order, OrderItem, OrderStatus, Reservation};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage boundary for the marketplace core. All stock counters,
/// reservation rows, orders and ledger entries are mutated exclusively
/// through these operations; guarded transitions are conditional writes so
/// concurrent callers cannot lose updates.
#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn insert_inventory(&self, level: &InventoryLevel) -> Result<()>;
    async fn get_inventory(&self, product_id: Uuid) -> Result<Option<InventoryLevel>>;

    /// Moves `quantity` from available to reserved and inserts the ACTIVE
    /// row, atomically, iff enough stock is available. Returns false with no
    /// side effects otherwise.
    async fn try_reserve(&self, reservation: &Reservation) -> Result<bool>;
    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>>;
    /// ACTIVE -> CONSUMED, only while unexpired; moves the quantity from
    /// reserved to sold. Returns the consumed row, or None if the guard
    /// failed.
    async fn mark_consumed(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<Reservation>>;
    /// ACTIVE -> RELEASED; returns the quantity to available.
    async fn mark_released(&self, id: Uuid) -> Result<Option<Reservation>>;
    /// ACTIVE -> EXPIRED, only once `expires_at` has passed; returns the
    /// quantity to available.
    async fn mark_expired(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<Reservation>>;
    /// The sweep: expires every ACTIVE row with `expires_at < now` and
    /// returns how many rows changed.
    async fn expire_before(&self, now: DateTime<Utc>) -> Result<u64>;
    async fn reservations_for_holder(&self, holder_id: &str) -> Result<Vec<Reservation>>;

    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()>;
    async fn get_order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn get_order_item(&self, order_id: Uuid, seller_id: Uuid)
        -> Result<Option<OrderItem>>;
    /// Status update guarded on the expected current status. The tracking
    /// code, when given, is only written if none is set yet.
    async fn transition_order(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        tracking_code: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Inserts a VENDA unless one already exists for the same order item.
    /// Returns whether a row was inserted.
    async fn record_sale_once(&self, tx: &FinancialTransaction) -> Result<bool>;
    async fn seller_balance(&self, seller_id: Uuid) -> Result<BigDecimal>;
    async fn transactions_for_seller(&self, seller_id: Uuid)
        -> Result<Vec<FinancialTransaction>>;
    /// Balance check and SAQUE insert in one step; false when the ledger
    /// balance cannot cover the withdrawal.
    async fn try_withdraw(&self, tx: &FinancialTransaction) -> Result<bool>;
}
