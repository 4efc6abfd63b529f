//! API Server - Routes, Handlers and Error Mapping
//!
//! Every handler is a thin translation between JSON and a use case;
//! no business rule lives here. Errors are rendered as
//! `{"error": code, "message": text}` with a status chosen by kind.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use super::types::{
  ErrorBody, HistoryView, PortfolioView, ReceiptView, RegisteredUser, TradeForm,
};
use crate::adapters::metrics::MetricsRegistry;
use crate::domain::trade::{Quote, TradeSide, UserId};
use crate::error::{LedgerError, TradeError};
use crate::ports::ledger::LedgerStore;
use crate::ports::metrics::MetricsSink;
use crate::ports::quotes::QuoteProvider;
use crate::usecases::{PortfolioValuator, TradeEngine};

/// Header carrying the caller's user id.
pub const USER_HEADER: &str = "x-user-id";

/// Shared handler state.
pub struct ApiState<L: LedgerStore, Q: QuoteProvider> {
  pub ledger: Arc<L>,
  pub engine: Arc<TradeEngine<L, Q>>,
  pub valuator: Arc<PortfolioValuator<L, Q>>,
  /// Cash credited on registration.
  pub initial_cash: Decimal,
  pub metrics: Option<Arc<MetricsRegistry>>,
}

// Derived Clone would require L: Clone and Q: Clone.
impl<L: LedgerStore, Q: QuoteProvider> Clone for ApiState<L, Q> {
  fn clone(&self) -> Self {
    Self {
      ledger: Arc::clone(&self.ledger),
      engine: Arc::clone(&self.engine),
      valuator: Arc::clone(&self.valuator),
      initial_cash: self.initial_cash,
      metrics: self.metrics.clone(),
    }
  }
}

impl<L: LedgerStore, Q: QuoteProvider> ApiState<L, Q> {
  /// Wire the use cases over shared ledger and quote adapters.
  pub fn new(
    ledger: Arc<L>,
    quotes: Arc<Q>,
    initial_cash: Decimal,
    metrics: Option<Arc<MetricsRegistry>>,
  ) -> Self {
    let mut engine = TradeEngine::new(Arc::clone(&ledger), Arc::clone(&quotes));
    let mut valuator = PortfolioValuator::new(Arc::clone(&ledger), quotes);
    if let Some(m) = &metrics {
      let sink: Arc<dyn MetricsSink> = Arc::clone(m) as Arc<dyn MetricsSink>;
      engine = engine.with_metrics(Arc::clone(&sink));
      valuator = valuator.with_metrics(sink);
    }
    Self {
      ledger,
      engine: Arc::new(engine),
      valuator: Arc::new(valuator),
      initial_cash,
      metrics,
    }
  }
}

/// Error returned by every handler.
#[derive(Debug)]
pub enum ApiError {
  /// `x-user-id` missing or not a UUID.
  MissingUser,
  /// Body is not the expected JSON shape.
  BadRequest(String),
  Trade(TradeError),
}

impl From<TradeError> for ApiError {
  fn from(err: TradeError) -> Self {
    Self::Trade(err)
  }
}

impl From<LedgerError> for ApiError {
  fn from(err: LedgerError) -> Self {
    Self::Trade(err.into())
  }
}

impl ApiError {
  /// HTTP status for this error.
  pub fn status(&self) -> StatusCode {
    match self {
      Self::MissingUser | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::Trade(e) => match e {
        TradeError::InvalidShares => StatusCode::BAD_REQUEST,
        TradeError::UnknownSymbol(_) | TradeError::UnknownUser(_) => StatusCode::NOT_FOUND,
        TradeError::InsufficientFunds { .. } | TradeError::InsufficientShares { .. } => {
          StatusCode::UNPROCESSABLE_ENTITY
        }
        TradeError::Conflict { .. } | TradeError::QuoteService(_) => {
          StatusCode::SERVICE_UNAVAILABLE
        }
        TradeError::Ledger(LedgerError::DuplicateUser(_)) => StatusCode::CONFLICT,
        TradeError::Ledger(inner) if inner.is_rejection() => StatusCode::BAD_REQUEST,
        TradeError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }

  /// Stable error code for the response body.
  pub fn code(&self) -> &'static str {
    match self {
      Self::MissingUser => "missing_user",
      Self::BadRequest(_) => "bad_request",
      Self::Trade(TradeError::Ledger(LedgerError::DuplicateUser(_))) => "duplicate_user",
      Self::Trade(e) => e.code(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    let message = match &self {
      Self::MissingUser => format!("header {USER_HEADER} must carry a user id"),
      Self::BadRequest(msg) => msg.clone(),
      Self::Trade(e) => e.to_string(),
    };
    if status.is_server_error() {
      error!(code = self.code(), message = %message, "Request failed");
    }
    let body = ErrorBody {
      error: self.code().to_string(),
      message,
    };
    (status, Json(body)).into_response()
  }
}

/// Build the API router.
pub fn router<L: LedgerStore, Q: QuoteProvider>(state: ApiState<L, Q>) -> Router {
  Router::new()
    .route("/users", post(register::<L, Q>))
    .route("/quote/:symbol", get(quote::<L, Q>))
    .route("/buy", post(buy::<L, Q>))
    .route("/sell", post(sell::<L, Q>))
    .route("/portfolio", get(portfolio::<L, Q>))
    .route("/history", get(history::<L, Q>))
    .with_state(state)
}

/// Serve the API until shutdown is broadcast.
#[instrument(skip(state, shutdown_rx))]
pub async fn serve<L: LedgerStore, Q: QuoteProvider>(
  state: ApiState<L, Q>,
  bind_address: String,
  mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
  let listener = tokio::net::TcpListener::bind(&bind_address).await?;
  info!(address = %bind_address, "API server started");

  axum::serve(listener, router(state))
    .with_graceful_shutdown(async move {
      let _ = shutdown_rx.recv().await;
    })
    .await?;

  Ok(())
}

fn caller(headers: &HeaderMap) -> Result<UserId, ApiError> {
  headers
    .get(USER_HEADER)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.trim().parse().ok())
    .ok_or(ApiError::MissingUser)
}

async fn register<L: LedgerStore, Q: QuoteProvider>(
  State(state): State<ApiState<L, Q>>,
) -> Result<(StatusCode, Json<RegisteredUser>), ApiError> {
  let user = UserId::new();
  let account = state.ledger.open_account(user, state.initial_cash).await?;
  if let Some(metrics) = &state.metrics {
    metrics.accounts_opened.inc();
  }
  info!(user = %user, cash = %account.cash, "Account registered");
  Ok((
    StatusCode::CREATED,
    Json(RegisteredUser {
      user_id: account.user_id,
      cash: account.cash,
    }),
  ))
}

async fn quote<L: LedgerStore, Q: QuoteProvider>(
  State(state): State<ApiState<L, Q>>,
  Path(symbol): Path<String>,
) -> Result<Json<Quote>, ApiError> {
  Ok(Json(state.engine.quote(&symbol).await?))
}

async fn buy<L: LedgerStore, Q: QuoteProvider>(
  State(state): State<ApiState<L, Q>>,
  headers: HeaderMap,
  body: Result<Json<TradeForm>, JsonRejection>,
) -> Result<Json<ReceiptView>, ApiError> {
  trade(&state, TradeSide::Buy, &headers, body).await
}

async fn sell<L: LedgerStore, Q: QuoteProvider>(
  State(state): State<ApiState<L, Q>>,
  headers: HeaderMap,
  body: Result<Json<TradeForm>, JsonRejection>,
) -> Result<Json<ReceiptView>, ApiError> {
  trade(&state, TradeSide::Sell, &headers, body).await
}

async fn trade<L: LedgerStore, Q: QuoteProvider>(
  state: &ApiState<L, Q>,
  side: TradeSide,
  headers: &HeaderMap,
  body: Result<Json<TradeForm>, JsonRejection>,
) -> Result<Json<ReceiptView>, ApiError> {
  let user = caller(headers)?;
  let Json(form) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
  let request = form.into_request()?;
  let receipt = state.engine.execute(user, side, &request).await?;
  Ok(Json(receipt.into()))
}

async fn portfolio<L: LedgerStore, Q: QuoteProvider>(
  State(state): State<ApiState<L, Q>>,
  headers: HeaderMap,
) -> Result<Json<PortfolioView>, ApiError> {
  let user = caller(&headers)?;
  let valuation = state.valuator.valuate(user).await?;
  Ok(Json(valuation.into()))
}

async fn history<L: LedgerStore, Q: QuoteProvider>(
  State(state): State<ApiState<L, Q>>,
  headers: HeaderMap,
) -> Result<Json<HistoryView>, ApiError> {
  let user = caller(&headers)?;
  let transactions = state.ledger.history(user).await?;
  Ok(Json(HistoryView {
    user_id: user,
    transactions,
  }))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapters::persistence::{JournalLedger, LedgerSettings};
  use crate::adapters::quotes::QuoteBook;
  use crate::domain::trade::Symbol;
  use axum::http::HeaderValue;
  use rust_decimal_macros::dec;

  async fn state() -> ApiState<JournalLedger, QuoteBook> {
    let quotes = Arc::new(QuoteBook::new());
    quotes
      .set_quote(Symbol::parse("AAPL").unwrap(), "Apple Inc.", dec!(50.00))
      .await;
    ApiState::new(
      Arc::new(JournalLedger::in_memory(LedgerSettings::default())),
      quotes,
      dec!(10000.00),
      Some(Arc::new(MetricsRegistry::new().unwrap())),
    )
  }

  fn headers_for(user: UserId) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_HEADER, HeaderValue::from_str(&user.to_string()).unwrap());
    headers
  }

  fn form(symbol: &str, shares: i64) -> Result<Json<TradeForm>, JsonRejection> {
    Ok(Json(
      serde_json::from_value(serde_json::json!({ "symbol": symbol, "shares": shares })).unwrap(),
    ))
  }

  #[test]
  fn test_status_mapping() {
    let user = UserId::new();
    let cases = [
      (ApiError::MissingUser, StatusCode::BAD_REQUEST),
      (TradeError::InvalidShares.into(), StatusCode::BAD_REQUEST),
      (TradeError::UnknownSymbol("X".into()).into(), StatusCode::NOT_FOUND),
      (LedgerError::UnknownUser(user).into(), StatusCode::NOT_FOUND),
      (LedgerError::DuplicateUser(user).into(), StatusCode::CONFLICT),
      (
        LedgerError::InsufficientFunds {
          required: dec!(2),
          available: dec!(1),
        }
        .into(),
        StatusCode::UNPROCESSABLE_ENTITY,
      ),
      (
        LedgerError::Conflict { user, attempts: 3 }.into(),
        StatusCode::SERVICE_UNAVAILABLE,
      ),
      (
        TradeError::QuoteService(anyhow::anyhow!("down")).into(),
        StatusCode::SERVICE_UNAVAILABLE,
      ),
      (
        LedgerError::Storage(std::io::Error::other("disk full")).into(),
        StatusCode::INTERNAL_SERVER_ERROR,
      ),
    ];
    for (err, status) in cases {
      assert_eq!(err.status(), status, "{err:?}");
    }
  }

  #[tokio::test]
  async fn test_register_buy_and_history() {
    let state = state().await;
    let (status, Json(user)) = register(State(state.clone())).await.unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(user.cash, dec!(10000.00));

    let headers = headers_for(user.user_id);
    let Json(receipt) = buy(State(state.clone()), headers.clone(), form("aapl", 10))
      .await
      .unwrap();
    assert_eq!(receipt.total, dec!(500.00));
    assert_eq!(receipt.cash_after, dec!(9500.00));
    assert_eq!(receipt.side, TradeSide::Buy);

    let Json(history) = history(State(state.clone()), headers).await.unwrap();
    assert_eq!(history.transactions.len(), 1);
    assert_eq!(
      state.metrics.as_ref().unwrap().accounts_opened.get(),
      1
    );
  }

  #[tokio::test]
  async fn test_missing_user_header() {
    let state = state().await;
    let err = sell(State(state), HeaderMap::new(), form("AAPL", 1))
      .await
      .unwrap_err();
    assert!(matches!(err, ApiError::MissingUser));
  }

  #[tokio::test]
  async fn test_portfolio_for_unknown_user() {
    let state = state().await;
    let err = portfolio(State(state), headers_for(UserId::new()))
      .await
      .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
  }
}
