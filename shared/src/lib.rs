use bigdecimal::BigDecimal;
use bigdecimal::rounding::RoundingMode;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum MarketError {
    #[error("insufficient stock")]
    InsufficientStock,
    #[error("reservation expired")]
    ReservationExpired,
    #[error("reservation not found")]
    ReservationNotFound,
    #[error("reservation already in a terminal state")]
    AlreadyTerminal,
    #[error("order not found")]
    OrderNotFound,
    #[error("order does not belong to this seller")]
    NotOwner,
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("unknown action: {0}")]
    InvalidAction(String),
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Active,
    Consumed,
    Expired,
    Released,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Consumed => "CONSUMED",
            ReservationStatus::Expired => "EXPIRED",
            ReservationStatus::Released => "RELEASED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(ReservationStatus::Active),
            "CONSUMED" => Some(ReservationStatus::Consumed),
            "EXPIRED" => Some(ReservationStatus::Expired),
            "RELEASED" => Some(ReservationStatus::Released),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            ReservationStatus::Active => false,
            ReservationStatus::Consumed
            | ReservationStatus::Expired
            | ReservationStatus::Released => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pendente,
    Processando,
    Enviado,
    Entregue,
    Cancelado,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pendente => "PENDENTE",
            OrderStatus::Processando => "PROCESSANDO",
            OrderStatus::Enviado => "ENVIADO",
            OrderStatus::Entregue => "ENTREGUE",
            OrderStatus::Cancelado => "CANCELADO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDENTE" => Some(OrderStatus::Pendente),
            "PROCESSANDO" => Some(OrderStatus::Processando),
            "ENVIADO" => Some(OrderStatus::Enviado),
            "ENTREGUE" => Some(OrderStatus::Entregue),
            "CANCELADO" => Some(OrderStatus::Cancelado),
            _ => None,
        }
    }

    /// Shipped and delivered orders leave this machine; returns go through a
    /// separate process.
    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        match (self, target) {
            (OrderStatus::Pendente, OrderStatus::Processando) => true,
            (OrderStatus::Pendente, OrderStatus::Cancelado) => true,
            (OrderStatus::Processando, OrderStatus::Enviado) => true,
            (OrderStatus::Processando, OrderStatus::Cancelado) => true,
            (OrderStatus::Enviado, OrderStatus::Entregue) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            OrderStatus::Pendente | OrderStatus::Processando | OrderStatus::Enviado => false,
            OrderStatus::Entregue | OrderStatus::Cancelado => true,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seller actions accepted by the order-action endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAction {
    MarcarProcessando,
    ConfirmarEnvio,
    MarcarEntregue,
    Cancelar,
}

impl OrderAction {
    pub fn parse(s: &str) -> Result<Self, MarketError> {
        match s {
            "marcar_processando" => Ok(OrderAction::MarcarProcessando),
            "confirmar_envio" => Ok(OrderAction::ConfirmarEnvio),
            "marcar_entregue" => Ok(OrderAction::MarcarEntregue),
            "cancelar" => Ok(OrderAction::Cancelar),
            other => Err(MarketError::InvalidAction(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::MarcarProcessando => "marcar_processando",
            OrderAction::ConfirmarEnvio => "confirmar_envio",
            OrderAction::MarcarEntregue => "marcar_entregue",
            OrderAction::Cancelar => "cancelar",
        }
    }

    pub fn target_status(&self) -> OrderStatus {
        match self {
            OrderAction::MarcarProcessando => OrderStatus::Processando,
            OrderAction::ConfirmarEnvio => OrderStatus::Enviado,
            OrderAction::MarcarEntregue => OrderStatus::Entregue,
            OrderAction::Cancelar => OrderStatus::Cancelado,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Venda,
    Saque,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Venda => "VENDA",
            TransactionKind::Saque => "SAQUE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "VENDA" => Some(TransactionKind::Venda),
            "SAQUE" => Some(TransactionKind::Saque),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Concluido,
    Processando,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Concluido => "CONCLUIDO",
            TransactionStatus::Processando => "PROCESSANDO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONCLUIDO" => Some(TransactionStatus::Concluido),
            "PROCESSANDO" => Some(TransactionStatus::Processando),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryLevel {
    pub id: Uuid,
    pub product_id: Uuid,
    pub available_quantity: i32,
    pub reserved_quantity: i32,
    pub sold_quantity: i32,
}

impl InventoryLevel {
    pub fn new(product_id: Uuid, available_quantity: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            available_quantity,
            reserved_quantity: 0,
            sold_quantity: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: Uuid,
    pub product_id: Uuid,
    pub holder_id: String,
    pub quantity: i32,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(
        product_id: Uuid,
        quantity: i32,
        holder_id: String,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id,
            holder_id,
            quantity,
            status: ReservationStatus::Active,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// A reservation is unusable from `expires_at` onward, even before the
    /// sweeper has seen it.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub numero: String,
    pub status: OrderStatus,
    pub metodo_envio: Option<String>,
    pub transportadora: Option<String>,
    pub codigo_rastreio: Option<String>,
    pub endereco_entrega: serde_json::Value,
    pub data_pedido: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub seller_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub subtotal: BigDecimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialTransaction {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub order_item_id: Option<Uuid>,
    pub tipo: TransactionKind,
    pub valor: BigDecimal,
    pub status: TransactionStatus,
    pub data_transacao: DateTime<Utc>,
}

impl FinancialTransaction {
    /// Sale credit for one order item; recorded once the item ships.
    pub fn venda(
        seller_id: Uuid,
        order_item_id: Uuid,
        valor: BigDecimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            seller_id,
            order_item_id: Some(order_item_id),
            tipo: TransactionKind::Venda,
            valor,
            status: TransactionStatus::Concluido,
            data_transacao: now,
        }
    }

    /// Withdrawal request; stays PROCESSANDO until settled externally.
    pub fn saque(seller_id: Uuid, valor: BigDecimal, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            seller_id,
            order_item_id: None,
            tipo: TransactionKind::Saque,
            valor: -valor,
            status: TransactionStatus::Processando,
            data_transacao: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub gross: BigDecimal,
    pub commission: BigDecimal,
    pub net: BigDecimal,
}

/// Gross/commission/net split for one sub-order.
///
/// `net` is rounded from the unrounded difference, so it can differ from
/// `round(gross) - round(commission)` by one cent.
pub fn compute_settlement(subtotal: &BigDecimal, commission_rate: &BigDecimal) -> Settlement {
    let gross = subtotal.clone();
    let commission = &gross * commission_rate;
    let net = &gross - &commission;
    Settlement {
        gross: round_money(&gross),
        commission: round_money(&commission),
        net: round_money(&net),
    }
}

pub fn round_money(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(2, RoundingMode::HalfUp)
}

/// Tracking code issued when a seller confirms shipment: `BR` + epoch millis
/// + a short carrier suffix.
pub fn tracking_code(transportadora: Option<&str>, now: DateTime<Utc>) -> String {
    let suffix: String = transportadora
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(2)
        .collect::<String>()
        .to_uppercase();
    let suffix = if suffix.is_empty() { "XX".to_string() } else { suffix };
    format!("BR{}{}", now.timestamp_millis(), suffix)
}

/// Human-readable order number shown to buyers and sellers.
pub fn order_number(now: DateTime<Utc>) -> String {
    format!("PED-{}", now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn settlement_at_default_rate() {
        let s = compute_settlement(&dec("100.00"), &dec("0.05"));
        assert_eq!(s.gross, dec("100.00"));
        assert_eq!(s.commission, dec("5.00"));
        assert_eq!(s.net, dec("95.00"));
    }

    #[test]
    fn settlement_rounds_each_field_from_unrounded_values() {
        // 10.10 * 0.05 = 0.505 -> 0.51, net 9.595 -> 9.60.
        // round(gross) - round(commission) would give 9.59.
        let s = compute_settlement(&dec("10.10"), &dec("0.05"));
        assert_eq!(s.commission, dec("0.51"));
        assert_eq!(s.net, dec("9.60"));
        assert_ne!(s.net, &s.gross - &s.commission);
    }

    #[test]
    fn settlement_zero_subtotal() {
        let s = compute_settlement(&dec("0.00"), &dec("0.05"));
        assert_eq!(s.gross, dec("0.00"));
        assert_eq!(s.commission, dec("0.00"));
        assert_eq!(s.net, dec("0.00"));
    }

    #[test]
    fn happy_path_transitions() {
        assert!(OrderStatus::Pendente.can_transition_to(OrderStatus::Processando));
        assert!(OrderStatus::Processando.can_transition_to(OrderStatus::Enviado));
        assert!(OrderStatus::Enviado.can_transition_to(OrderStatus::Entregue));
    }

    #[test]
    fn cancellation_only_before_shipment() {
        assert!(OrderStatus::Pendente.can_transition_to(OrderStatus::Cancelado));
        assert!(OrderStatus::Processando.can_transition_to(OrderStatus::Cancelado));
        assert!(!OrderStatus::Enviado.can_transition_to(OrderStatus::Cancelado));
        assert!(!OrderStatus::Entregue.can_transition_to(OrderStatus::Cancelado));
    }

    #[test]
    fn no_skipping_states() {
        assert!(!OrderStatus::Pendente.can_transition_to(OrderStatus::Enviado));
        assert!(!OrderStatus::Pendente.can_transition_to(OrderStatus::Entregue));
        assert!(!OrderStatus::Processando.can_transition_to(OrderStatus::Entregue));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for target in [
            OrderStatus::Pendente,
            OrderStatus::Processando,
            OrderStatus::Enviado,
            OrderStatus::Entregue,
            OrderStatus::Cancelado,
        ] {
            assert!(!OrderStatus::Entregue.can_transition_to(target));
            assert!(!OrderStatus::Cancelado.can_transition_to(target));
        }
    }

    #[test]
    fn action_parsing() {
        assert_eq!(
            OrderAction::parse("confirmar_envio").unwrap(),
            OrderAction::ConfirmarEnvio
        );
        assert_eq!(
            OrderAction::parse("confirmar_envio").unwrap().target_status(),
            OrderStatus::Enviado
        );
        assert!(matches!(
            OrderAction::parse("devolver"),
            Err(MarketError::InvalidAction(a)) if a == "devolver"
        ));
    }

    #[test]
    fn status_round_trip() {
        for status in [
            OrderStatus::Pendente,
            OrderStatus::Processando,
            OrderStatus::Enviado,
            OrderStatus::Entregue,
            OrderStatus::Cancelado,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("ENVIADA"), None);
        assert_eq!(
            ReservationStatus::parse("ACTIVE"),
            Some(ReservationStatus::Active)
        );
    }

    #[test]
    fn reservation_expiry_boundary() {
        let now = Utc::now();
        let r = Reservation::new(Uuid::new_v4(), 1, "cart-1".into(), Duration::zero(), now);
        assert!(r.is_expired(now));
        let r = Reservation::new(Uuid::new_v4(), 1, "cart-1".into(), Duration::seconds(900), now);
        assert!(!r.is_expired(now));
        assert!(r.is_expired(now + Duration::seconds(900)));
    }

    #[test]
    fn tracking_code_format() {
        let now = Utc::now();
        let code = tracking_code(Some("Correios"), now);
        assert!(code.starts_with("BR"));
        assert!(code.ends_with("CO"));
        assert_eq!(tracking_code(None, now).ends_with("XX"), true);
    }

    #[test]
    fn saque_is_negative_and_pending() {
        let tx = FinancialTransaction::saque(Uuid::new_v4(), dec("50.00"), Utc::now());
        assert_eq!(tx.valor, dec("-50.00"));
        assert_eq!(tx.status, TransactionStatus::Processando);
        assert_eq!(tx.tipo, TransactionKind::Saque);
        assert!(tx.order_item_id.is_none());
    }
}
