use anyhow::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::dsl::sum;
use diesel::prelude::*;
use diesel_async::pooled_connection::bb8::Pool;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use shared::{
    FinancialTransaction, InventoryLevel, Order, OrderItem, OrderStatus, Reservation,
    ReservationStatus, TransactionKind,
};

use crate::models::{DbFinancialTransaction, DbInventory, DbOrder, DbOrderItem, DbReservation};
use crate::schema::{financial_transactions, inventory, order_items, orders, stock_reservations};

use super::MarketStore;

type DbPool = Pool<AsyncPgConnection>;

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MarketStore for PgStore {
    async fn insert_inventory(&self, level: &InventoryLevel) -> Result<()> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(inventory::table)
            .values(DbInventory::from(level))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_inventory(&self, product_id: Uuid) -> Result<Option<InventoryLevel>> {
        let mut conn = self.pool.get().await?;
        let row = inventory::table
            .filter(inventory::product_id.eq(product_id))
            .first::<DbInventory>(&mut conn)
            .await
            .optional()?;
        Ok(row.map(InventoryLevel::from))
    }

    async fn try_reserve(&self, reservation: &Reservation) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let res = reservation.clone();

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                // The availability check lives in the UPDATE itself so two
                // concurrent reserves cannot both pass a stale read.
                let updated = diesel::update(
                    inventory::table
                        .filter(inventory::product_id.eq(res.product_id))
                        .filter(inventory::available_quantity.ge(res.quantity)),
                )
                .set((
                    inventory::available_quantity
                        .eq(inventory::available_quantity - res.quantity),
                    inventory::reserved_quantity
                        .eq(inventory::reserved_quantity + res.quantity),
                    inventory::updated_at.eq(Some(res.created_at)),
                ))
                .execute(conn)
                .await?;

                if updated == 0 {
                    return Ok(false);
                }

                diesel::insert_into(stock_reservations::table)
                    .values(DbReservation::from(&res))
                    .execute(conn)
                    .await?;

                Ok(true)
            })
        })
        .await
    }

    async fn get_reservation(&self, id: Uuid) -> Result<Option<Reservation>> {
        let mut conn = self.pool.get().await?;
        let row = stock_reservations::table
            .filter(stock_reservations::id.eq(id))
            .first::<DbReservation>(&mut conn)
            .await
            .optional()?;
        row.map(Reservation::try_from).transpose()
    }

    async fn mark_consumed(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<Reservation>> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                let row = diesel::update(
                    stock_reservations::table
                        .filter(stock_reservations::id.eq(id))
                        .filter(
                            stock_reservations::status
                                .eq(ReservationStatus::Active.as_str()),
                        )
                        .filter(stock_reservations::expires_at.gt(now)),
                )
                .set((
                    stock_reservations::status.eq(ReservationStatus::Consumed.as_str()),
                    stock_reservations::updated_at.eq(Some(now)),
                ))
                .get_result::<DbReservation>(conn)
                .await
                .optional()?;

                let Some(row) = row else {
                    return Ok(None);
                };

                diesel::update(
                    inventory::table.filter(inventory::product_id.eq(row.product_id)),
                )
                .set((
                    inventory::reserved_quantity
                        .eq(inventory::reserved_quantity - row.quantity),
                    inventory::sold_quantity.eq(inventory::sold_quantity + row.quantity),
                    inventory::updated_at.eq(Some(now)),
                ))
                .execute(conn)
                .await?;

                Ok(Some(Reservation::try_from(row)?))
            })
        })
        .await
    }

    async fn mark_released(&self, id: Uuid) -> Result<Option<Reservation>> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                let row = diesel::update(
                    stock_reservations::table
                        .filter(stock_reservations::id.eq(id))
                        .filter(
                            stock_reservations::status
                                .eq(ReservationStatus::Active.as_str()),
                        ),
                )
                .set((
                    stock_reservations::status.eq(ReservationStatus::Released.as_str()),
                    stock_reservations::updated_at.eq(Some(now)),
                ))
                .get_result::<DbReservation>(conn)
                .await
                .optional()?;

                let Some(row) = row else {
                    return Ok(None);
                };

                diesel::update(
                    inventory::table.filter(inventory::product_id.eq(row.product_id)),
                )
                .set((
                    inventory::reserved_quantity
                        .eq(inventory::reserved_quantity - row.quantity),
                    inventory::available_quantity
                        .eq(inventory::available_quantity + row.quantity),
                    inventory::updated_at.eq(Some(now)),
                ))
                .execute(conn)
                .await?;

                Ok(Some(Reservation::try_from(row)?))
            })
        })
        .await
    }

    async fn mark_expired(&self, id: Uuid, now: DateTime<Utc>) -> Result<Option<Reservation>> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                let row = diesel::update(
                    stock_reservations::table
                        .filter(stock_reservations::id.eq(id))
                        .filter(
                            stock_reservations::status
                                .eq(ReservationStatus::Active.as_str()),
                        )
                        .filter(stock_reservations::expires_at.le(now)),
                )
                .set((
                    stock_reservations::status.eq(ReservationStatus::Expired.as_str()),
                    stock_reservations::updated_at.eq(Some(now)),
                ))
                .get_result::<DbReservation>(conn)
                .await
                .optional()?;

                let Some(row) = row else {
                    return Ok(None);
                };

                diesel::update(
                    inventory::table.filter(inventory::product_id.eq(row.product_id)),
                )
                .set((
                    inventory::reserved_quantity
                        .eq(inventory::reserved_quantity - row.quantity),
                    inventory::available_quantity
                        .eq(inventory::available_quantity + row.quantity),
                    inventory::updated_at.eq(Some(now)),
                ))
                .execute(conn)
                .await?;

                Ok(Some(Reservation::try_from(row)?))
            })
        })
        .await
    }

    async fn expire_before(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                let rows = diesel::update(
                    stock_reservations::table
                        .filter(
                            stock_reservations::status
                                .eq(ReservationStatus::Active.as_str()),
                        )
                        .filter(stock_reservations::expires_at.lt(now)),
                )
                .set((
                    stock_reservations::status.eq(ReservationStatus::Expired.as_str()),
                    stock_reservations::updated_at.eq(Some(now)),
                ))
                .get_results::<DbReservation>(conn)
                .await?;

                for row in &rows {
                    diesel::update(
                        inventory::table.filter(inventory::product_id.eq(row.product_id)),
                    )
                    .set((
                        inventory::reserved_quantity
                            .eq(inventory::reserved_quantity - row.quantity),
                        inventory::available_quantity
                            .eq(inventory::available_quantity + row.quantity),
                        inventory::updated_at.eq(Some(now)),
                    ))
                    .execute(conn)
                    .await?;
                }

                Ok(rows.len() as u64)
            })
        })
        .await
    }

    async fn reservations_for_holder(&self, holder_id: &str) -> Result<Vec<Reservation>> {
        let mut conn = self.pool.get().await?;
        let rows = stock_reservations::table
            .filter(stock_reservations::holder_id.eq(holder_id))
            .filter(stock_reservations::status.eq(ReservationStatus::Active.as_str()))
            .order(stock_reservations::expires_at.asc())
            .load::<DbReservation>(&mut conn)
            .await?;
        rows.into_iter().map(Reservation::try_from).collect()
    }

    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let order_row = DbOrder::from(order);
        let item_rows: Vec<DbOrderItem> = items.iter().map(DbOrderItem::from).collect();

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                diesel::insert_into(orders::table)
                    .values(&order_row)
                    .execute(conn)
                    .await?;

                diesel::insert_into(order_items::table)
                    .values(&item_rows)
                    .execute(conn)
                    .await?;

                Ok(())
            })
        })
        .await
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let mut conn = self.pool.get().await?;
        let row = orders::table
            .filter(orders::id.eq(id))
            .first::<DbOrder>(&mut conn)
            .await
            .optional()?;
        row.map(Order::try_from).transpose()
    }

    async fn get_order_item(
        &self,
        order_id: Uuid,
        seller_id: Uuid,
    ) -> Result<Option<OrderItem>> {
        let mut conn = self.pool.get().await?;
        let row = order_items::table
            .filter(order_items::order_id.eq(order_id))
            .filter(order_items::seller_id.eq(seller_id))
            .first::<DbOrderItem>(&mut conn)
            .await
            .optional()?;
        Ok(row.map(OrderItem::from))
    }

    async fn transition_order(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        tracking_code: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut conn = self.pool.get().await?;

        let target = orders::table
            .filter(orders::id.eq(id))
            .filter(orders::status.eq(from.as_str()));

        let updated = match tracking_code {
            Some(code) => {
                diesel::update(target.filter(orders::codigo_rastreio.is_null()))
                    .set((
                        orders::status.eq(to.as_str()),
                        orders::codigo_rastreio.eq(Some(code)),
                        orders::updated_at.eq(Some(now)),
                    ))
                    .execute(&mut conn)
                    .await?
            }
            None => {
                diesel::update(target)
                    .set((
                        orders::status.eq(to.as_str()),
                        orders::updated_at.eq(Some(now)),
                    ))
                    .execute(&mut conn)
                    .await?
            }
        };

        Ok(updated > 0)
    }

    async fn record_sale_once(&self, tx: &FinancialTransaction) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        // Backed by the partial unique index on (order_item_id) for VENDA
        // rows; a retried request conflicts and inserts nothing.
        let inserted = diesel::insert_into(financial_transactions::table)
            .values(DbFinancialTransaction::from(tx))
            .on_conflict_do_nothing()
            .execute(&mut conn)
            .await?;
        Ok(inserted > 0)
    }

    async fn seller_balance(&self, seller_id: Uuid) -> Result<BigDecimal> {
        let mut conn = self.pool.get().await?;
        let total = financial_transactions::table
            .filter(financial_transactions::seller_id.eq(seller_id))
            .select(sum(financial_transactions::valor))
            .first::<Option<BigDecimal>>(&mut conn)
            .await?;
        Ok(total.unwrap_or_else(|| BigDecimal::from(0)))
    }

    async fn transactions_for_seller(
        &self,
        seller_id: Uuid,
    ) -> Result<Vec<FinancialTransaction>> {
        let mut conn = self.pool.get().await?;
        let rows = financial_transactions::table
            .filter(financial_transactions::seller_id.eq(seller_id))
            .order(financial_transactions::data_transacao.desc())
            .load::<DbFinancialTransaction>(&mut conn)
            .await?;
        rows.into_iter().map(FinancialTransaction::try_from).collect()
    }

    async fn try_withdraw(&self, tx: &FinancialTransaction) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let row = DbFinancialTransaction::from(tx);
        debug_assert_eq!(tx.tipo, TransactionKind::Saque);

        conn.transaction::<_, anyhow::Error, _>(|conn| {
            Box::pin(async move {
                let balance = financial_transactions::table
                    .filter(financial_transactions::seller_id.eq(row.seller_id))
                    .select(sum(financial_transactions::valor))
                    .first::<Option<BigDecimal>>(conn)
                    .await?
                    .unwrap_or_else(|| BigDecimal::from(0));

                if &balance + &row.valor < BigDecimal::from(0) {
                    return Ok(false);
                }

                diesel::insert_into(financial_transactions::table)
                    .values(&row)
                    .execute(conn)
                    .await?;

                Ok(true)
            })
        })
        .await
    }
}
