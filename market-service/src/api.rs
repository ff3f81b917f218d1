use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use shared::{
    FinancialTransaction, InventoryLevel, MarketError, Order, OrderAction, OrderItem,
    Reservation,
};

use crate::ledger::Ledger;
use crate::orders::{Checkout, CheckoutItem, OrderService};
use crate::reservations::StockReservationManager;
use crate::store::MarketStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MarketStore>,
    pub reservations: StockReservationManager,
    pub orders: OrderService,
    pub ledger: Ledger,
    pub cron_secret: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub success: bool,
    pub deleted_count: u64,
    pub message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveRequest {
    pub product_id: Uuid,
    pub quantity: i32,
    pub holder_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub buyer_id: Uuid,
    pub metodo_envio: Option<String>,
    pub transportadora: Option<String>,
    pub endereco_entrega: serde_json::Value,
    pub items: Vec<CheckoutItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerActionRequest {
    pub vendedor_id: Uuid,
    pub pedido_id: Uuid,
    pub acao: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub seller_id: Uuid,
    pub balance: BigDecimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub valor: BigDecimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedInventoryRequest {
    pub product_id: Uuid,
    pub available_quantity: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderQuery {
    pub holder_id: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(err: MarketError) -> ApiError {
    let status = match &err {
        MarketError::InvalidAction(_) => StatusCode::BAD_REQUEST,
        MarketError::OrderNotFound
        | MarketError::NotOwner
        | MarketError::ReservationNotFound => StatusCode::NOT_FOUND,
        MarketError::InsufficientStock
        | MarketError::ReservationExpired
        | MarketError::AlreadyTerminal
        | MarketError::InvalidTransition { .. }
        | MarketError::InsufficientBalance => StatusCode::CONFLICT,
        MarketError::Storage(e) => {
            error!("storage error: {e:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal error".to_string(),
                }),
            );
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/inventory", post(seed_inventory))
        .route("/inventory/:product_id", get(inventory_level))
        .route(
            "/stock-reservations",
            get(list_reservations).post(create_reservation),
        )
        .route("/stock-reservations/:id/release", post(release_reservation))
        .route(
            "/stock-reservations/cleanup",
            get(cleanup_probe).post(run_cleanup),
        )
        .route("/checkout", post(checkout))
        .route("/seller/orders/actions", post(seller_order_action))
        .route("/sellers/:id/balance", get(seller_balance))
        .route("/sellers/:id/transactions", get(seller_transactions))
        .route("/sellers/:id/withdrawals", post(request_withdrawal))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn seed_inventory(
    State(state): State<AppState>,
    Json(request): Json<SeedInventoryRequest>,
) -> Result<(StatusCode, Json<InventoryLevel>), ApiError> {
    let level = InventoryLevel::new(request.product_id, request.available_quantity);
    state
        .store
        .insert_inventory(&level)
        .await
        .map_err(|e| error_response(MarketError::Storage(e)))?;
    Ok((StatusCode::CREATED, Json(level)))
}

pub async fn inventory_level(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<InventoryLevel>, ApiError> {
    let level = state
        .store
        .get_inventory(product_id)
        .await
        .map_err(|e| error_response(MarketError::Storage(e)))?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "product not found".to_string(),
                }),
            )
        })?;
    Ok(Json(level))
}

/// Active holds for one cart/session, oldest expiry first.
pub async fn list_reservations(
    State(state): State<AppState>,
    Query(query): Query<HolderQuery>,
) -> Result<Json<Vec<Reservation>>, ApiError> {
    let reservations = state
        .store
        .reservations_for_holder(&query.holder_id)
        .await
        .map_err(|e| error_response(MarketError::Storage(e)))?;
    Ok(Json(reservations))
}

pub async fn create_reservation(
    State(state): State<AppState>,
    Json(request): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<Reservation>), ApiError> {
    let reservation = state
        .reservations
        .reserve(
            request.product_id,
            request.quantity,
            request.holder_id,
            state.reservations.default_ttl(),
            Utc::now(),
        )
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

pub async fn release_reservation(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, ApiError> {
    let reservation = state.reservations.release(id).await.map_err(error_response)?;
    Ok(Json(reservation))
}

/// Status probe for the cron invoker; mutates nothing.
pub async fn cleanup_probe() -> Json<CleanupResponse> {
    Json(CleanupResponse {
        success: true,
        deleted_count: 0,
        message: "stock reservation cleanup is available".to_string(),
    })
}

pub async fn run_cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CleanupResponse>, ApiError> {
    if let Some(secret) = &state.cron_secret {
        let expected = format!("Bearer {secret}");
        let authorized = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(|value| value == expected)
            .unwrap_or(false);
        if !authorized {
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "unauthorized".to_string(),
                }),
            ));
        }
    }

    let deleted_count = state
        .reservations
        .cleanup_expired(Utc::now())
        .await
        .map_err(error_response)?;
    Ok(Json(CleanupResponse {
        success: true,
        deleted_count,
        message: format!("{deleted_count} expired reservations released"),
    }))
}

pub async fn checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let (order, items) = state
        .orders
        .checkout(
            Checkout {
                buyer_id: request.buyer_id,
                metodo_envio: request.metodo_envio,
                transportadora: request.transportadora,
                endereco_entrega: request.endereco_entrega,
                items: request.items,
            },
            Utc::now(),
        )
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(CheckoutResponse { order, items })))
}

pub async fn seller_order_action(
    State(state): State<AppState>,
    Json(request): Json<SellerActionRequest>,
) -> Result<Json<Order>, ApiError> {
    let action = OrderAction::parse(&request.acao).map_err(error_response)?;
    let order = state
        .orders
        .apply_action(request.pedido_id, request.vendedor_id, action, Utc::now())
        .await
        .map_err(error_response)?;
    Ok(Json(order))
}

pub async fn seller_balance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let balance = state.ledger.balance(id).await.map_err(error_response)?;
    Ok(Json(BalanceResponse {
        seller_id: id,
        balance,
    }))
}

pub async fn seller_transactions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<FinancialTransaction>>, ApiError> {
    let transactions = state.ledger.transactions(id).await.map_err(error_response)?;
    Ok(Json(transactions))
}

pub async fn request_withdrawal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<WithdrawalRequest>,
) -> Result<(StatusCode, Json<FinancialTransaction>), ApiError> {
    let transaction = state
        .ledger
        .request_withdrawal(id, request.valor, Utc::now())
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(transaction)))
}
