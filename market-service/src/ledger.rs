use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use shared::{compute_settlement, round_money, FinancialTransaction, MarketError, OrderItem};

use crate::store::MarketStore;

/// Append-only seller ledger: VENDA credits when a sub-order ships, SAQUE
/// debits for withdrawals. A seller's balance is the sum of all signed
/// amounts.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn MarketStore>,
    commission_rate: BigDecimal,
}

impl Ledger {
    pub fn new(store: Arc<dyn MarketStore>, commission_rate: BigDecimal) -> Self {
        Self {
            store,
            commission_rate,
        }
    }

    pub fn commission_rate(&self) -> &BigDecimal {
        &self.commission_rate
    }

    /// Credits the seller the net settlement for one order item. At most one
    /// VENDA per item: a retried request finds the existing row and records
    /// nothing.
    pub async fn record_sale(
        &self,
        item: &OrderItem,
        now: DateTime<Utc>,
    ) -> Result<Option<FinancialTransaction>, MarketError> {
        let settlement = compute_settlement(&item.subtotal, &self.commission_rate);
        let tx =
            FinancialTransaction::venda(item.seller_id, item.id, settlement.net.clone(), now);

        if self.store.record_sale_once(&tx).await? {
            info!(
                seller = %item.seller_id,
                order_item = %item.id,
                gross = %settlement.gross,
                commission = %settlement.commission,
                net = %settlement.net,
                "sale settled"
            );
            Ok(Some(tx))
        } else {
            Ok(None)
        }
    }

    pub async fn balance(&self, seller_id: Uuid) -> Result<BigDecimal, MarketError> {
        Ok(self.store.seller_balance(seller_id).await?)
    }

    pub async fn transactions(
        &self,
        seller_id: Uuid,
    ) -> Result<Vec<FinancialTransaction>, MarketError> {
        Ok(self.store.transactions_for_seller(seller_id).await?)
    }

    /// Inserts a PROCESSANDO SAQUE with the negated amount, pending external
    /// settlement. Rejected outright when the amount is not positive or the
    /// balance cannot cover it.
    pub async fn request_withdrawal(
        &self,
        seller_id: Uuid,
        valor: BigDecimal,
        now: DateTime<Utc>,
    ) -> Result<FinancialTransaction, MarketError> {
        if valor <= BigDecimal::from(0) {
            return Err(MarketError::InsufficientBalance);
        }

        let tx = FinancialTransaction::saque(seller_id, round_money(&valor), now);
        if self.store.try_withdraw(&tx).await? {
            info!(seller = %seller_id, valor = %valor, "withdrawal requested");
            Ok(tx)
        } else {
            Err(MarketError::InsufficientBalance)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use shared::{TransactionKind, TransactionStatus};
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn item(subtotal: &str) -> OrderItem {
        OrderItem {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            seller_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity: 1,
            subtotal: dec(subtotal),
        }
    }

    fn ledger() -> (Ledger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Ledger::new(store.clone(), dec("0.05")), store)
    }

    #[tokio::test]
    async fn sale_credits_net_amount() {
        let (ledger, _store) = ledger();
        let item = item("100.00");

        let tx = ledger.record_sale(&item, Utc::now()).await.unwrap().unwrap();
        assert_eq!(tx.tipo, TransactionKind::Venda);
        assert_eq!(tx.status, TransactionStatus::Concluido);
        assert_eq!(tx.valor, dec("95.00"));

        assert_eq!(ledger.balance(item.seller_id).await.unwrap(), dec("95.00"));
    }

    #[tokio::test]
    async fn retried_sale_records_once() {
        let (ledger, _store) = ledger();
        let item = item("100.00");
        let now = Utc::now();

        assert!(ledger.record_sale(&item, now).await.unwrap().is_some());
        assert!(ledger.record_sale(&item, now).await.unwrap().is_none());

        let txs = ledger.transactions(item.seller_id).await.unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(ledger.balance(item.seller_id).await.unwrap(), dec("95.00"));
    }

    #[tokio::test]
    async fn withdrawal_respects_balance() {
        let (ledger, _store) = ledger();
        let item = item("100.00");
        let seller_id = item.seller_id;
        let now = Utc::now();
        ledger.record_sale(&item, now).await.unwrap();

        let saque = ledger
            .request_withdrawal(seller_id, dec("50.00"), now)
            .await
            .unwrap();
        assert_eq!(saque.valor, dec("-50.00"));
        assert_eq!(saque.status, TransactionStatus::Processando);
        assert_eq!(ledger.balance(seller_id).await.unwrap(), dec("45.00"));

        let overdraft = ledger.request_withdrawal(seller_id, dec("45.01"), now).await;
        assert!(matches!(overdraft, Err(MarketError::InsufficientBalance)));

        let rejected = ledger.request_withdrawal(seller_id, dec("-1.00"), now).await;
        assert!(matches!(rejected, Err(MarketError::InsufficientBalance)));
    }

    #[tokio::test]
    async fn withdrawal_of_entire_balance_is_allowed() {
        let (ledger, _store) = ledger();
        let item = item("100.00");
        let now = Utc::now();
        ledger.record_sale(&item, now).await.unwrap();

        ledger
            .request_withdrawal(item.seller_id, dec("95.00"), now)
            .await
            .unwrap();
        assert_eq!(
            ledger.balance(item.seller_id).await.unwrap(),
            BigDecimal::from(0)
        );
    }
}
