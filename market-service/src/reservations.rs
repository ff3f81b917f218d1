use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use shared::{MarketError, Reservation, ReservationStatus};

use crate::store::MarketStore;

/// Temporary holds on inventory for checkouts in progress. Expired holds are
/// reclaimed by `cleanup_expired`, which an external scheduler invokes; no
/// timer runs in-process and time only passes through the `now` arguments.
#[derive(Clone)]
pub struct StockReservationManager {
    store: Arc<dyn MarketStore>,
    default_ttl: Duration,
}

impl StockReservationManager {
    pub fn new(store: Arc<dyn MarketStore>, default_ttl: Duration) -> Self {
        Self { store, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub async fn reserve(
        &self,
        product_id: Uuid,
        quantity: i32,
        holder_id: String,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Reservation, MarketError> {
        if quantity <= 0 {
            return Err(MarketError::InsufficientStock);
        }

        let reservation = Reservation::new(product_id, quantity, holder_id, ttl, now);
        if self.store.try_reserve(&reservation).await? {
            info!(
                reservation = %reservation.id,
                product = %product_id,
                quantity,
                "stock reserved"
            );
            Ok(reservation)
        } else {
            Err(MarketError::InsufficientStock)
        }
    }

    /// Finalizes a hold into a sale. Expiry is re-checked here even if the
    /// sweeper has not run yet; an overdue hold is expired on the spot and
    /// the caller must re-reserve.
    pub async fn consume(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Reservation, MarketError> {
        if let Some(reservation) = self.store.mark_consumed(id, now).await? {
            return Ok(reservation);
        }

        let reservation = self
            .store
            .get_reservation(id)
            .await?
            .ok_or(MarketError::ReservationNotFound)?;
        if reservation.status != ReservationStatus::Active {
            return Err(MarketError::AlreadyTerminal);
        }

        self.store.mark_expired(id, now).await?;
        Err(MarketError::ReservationExpired)
    }

    /// Explicit cart abandonment; the hold returns to available stock.
    pub async fn release(&self, id: Uuid) -> Result<Reservation, MarketError> {
        if let Some(reservation) = self.store.mark_released(id).await? {
            info!(reservation = %id, "stock reservation released");
            return Ok(reservation);
        }

        self.store
            .get_reservation(id)
            .await?
            .ok_or(MarketError::ReservationNotFound)?;
        Err(MarketError::AlreadyTerminal)
    }

    /// The sweep. Idempotent: a second run with no new expirations reports 0.
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, MarketError> {
        let count = self.store.expire_before(now).await?;
        if count > 0 {
            info!(count, "expired stale stock reservations");
        }
        Ok(count)
    }
}
