use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared::{
    FinancialTransaction, InventoryLevel, Order, OrderItem, OrderStatus, Reservation,
    ReservationStatus, TransactionKind, TransactionStatus,
};

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::inventory)]
pub struct DbInventory {
    pub id: Uuid,
    pub product_id: Uuid,
    pub available_quantity: i32,
    pub reserved_quantity: i32,
    pub sold_quantity: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&InventoryLevel> for DbInventory {
    fn from(level: &InventoryLevel) -> Self {
        Self {
            id: level.id,
            product_id: level.product_id,
            available_quantity: level.available_quantity,
            reserved_quantity: level.reserved_quantity,
            sold_quantity: level.sold_quantity,
            created_at: None,
            updated_at: None,
        }
    }
}

impl From<DbInventory> for InventoryLevel {
    fn from(row: DbInventory) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            available_quantity: row.available_quantity,
            reserved_quantity: row.reserved_quantity,
            sold_quantity: row.sold_quantity,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::stock_reservations)]
pub struct DbReservation {
    pub id: Uuid,
    pub product_id: Uuid,
    pub holder_id: String,
    pub quantity: i32,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Reservation> for DbReservation {
    fn from(reservation: &Reservation) -> Self {
        Self {
            id: reservation.id,
            product_id: reservation.product_id,
            holder_id: reservation.holder_id.clone(),
            quantity: reservation.quantity,
            status: reservation.status.as_str().to_string(),
            expires_at: reservation.expires_at,
            created_at: Some(reservation.created_at),
            updated_at: None,
        }
    }
}

impl TryFrom<DbReservation> for Reservation {
    type Error = anyhow::Error;

    fn try_from(row: DbReservation) -> Result<Self, Self::Error> {
        let status = ReservationStatus::parse(&row.status)
            .ok_or_else(|| anyhow::anyhow!("unknown reservation status: {}", row.status))?;
        Ok(Self {
            id: row.id,
            product_id: row.product_id,
            holder_id: row.holder_id,
            quantity: row.quantity,
            status,
            created_at: row.created_at.unwrap_or_else(|| Utc::now()),
            expires_at: row.expires_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::orders)]
pub struct DbOrder {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub numero: String,
    pub status: String,
    pub metodo_envio: Option<String>,
    pub transportadora: Option<String>,
    pub codigo_rastreio: Option<String>,
    pub endereco_entrega: serde_json::Value,
    pub data_pedido: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Order> for DbOrder {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            buyer_id: order.buyer_id,
            numero: order.numero.clone(),
            status: order.status.as_str().to_string(),
            metodo_envio: order.metodo_envio.clone(),
            transportadora: order.transportadora.clone(),
            codigo_rastreio: order.codigo_rastreio.clone(),
            endereco_entrega: order.endereco_entrega.clone(),
            data_pedido: Some(order.data_pedido),
            updated_at: None,
        }
    }
}

impl TryFrom<DbOrder> for Order {
    type Error = anyhow::Error;

    fn try_from(row: DbOrder) -> Result<Self, Self::Error> {
        let status = OrderStatus::parse(&row.status)
            .ok_or_else(|| anyhow::anyhow!("unknown order status: {}", row.status))?;
        Ok(Self {
            id: row.id,
            buyer_id: row.buyer_id,
            numero: row.numero,
            status,
            metodo_envio: row.metodo_envio,
            transportadora: row.transportadora,
            codigo_rastreio: row.codigo_rastreio,
            endereco_entrega: row.endereco_entrega,
            data_pedido: row.data_pedido.unwrap_or_else(|| Utc::now()),
        })
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::order_items)]
pub struct DbOrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub seller_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub subtotal: bigdecimal::BigDecimal,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&OrderItem> for DbOrderItem {
    fn from(item: &OrderItem) -> Self {
        Self {
            id: item.id,
            order_id: item.order_id,
            seller_id: item.seller_id,
            product_id: item.product_id,
            quantity: item.quantity,
            subtotal: item.subtotal.clone(),
            created_at: None,
        }
    }
}

impl From<DbOrderItem> for OrderItem {
    fn from(row: DbOrderItem) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            seller_id: row.seller_id,
            product_id: row.product_id,
            quantity: row.quantity,
            subtotal: row.subtotal,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::financial_transactions)]
pub struct DbFinancialTransaction {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub order_item_id: Option<Uuid>,
    pub tipo: String,
    pub valor: bigdecimal::BigDecimal,
    pub status: String,
    pub data_transacao: Option<DateTime<Utc>>,
}

impl From<&FinancialTransaction> for DbFinancialTransaction {
    fn from(tx: &FinancialTransaction) -> Self {
        Self {
            id: tx.id,
            seller_id: tx.seller_id,
            order_item_id: tx.order_item_id,
            tipo: tx.tipo.as_str().to_string(),
            valor: tx.valor.clone(),
            status: tx.status.as_str().to_string(),
            data_transacao: Some(tx.data_transacao),
        }
    }
}

impl TryFrom<DbFinancialTransaction> for FinancialTransaction {
    type Error = anyhow::Error;

    fn try_from(row: DbFinancialTransaction) -> Result<Self, Self::Error> {
        let tipo = TransactionKind::parse(&row.tipo)
            .ok_or_else(|| anyhow::anyhow!("unknown transaction kind: {}", row.tipo))?;
        let status = TransactionStatus::parse(&row.status)
            .ok_or_else(|| anyhow::anyhow!("unknown transaction status: {}", row.status))?;
        Ok(Self {
            id: row.id,
            seller_id: row.seller_id,
            order_item_id: row.order_item_id,
            tipo,
            valor: row.valor,
            status,
            data_transacao: row.data_transacao.unwrap_or_else(|| Utc::now()),
        })
    }
}
