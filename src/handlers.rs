// region:    --- Imports
use crate::auction::events::LeaderboardEntry;
use crate::bidding::commands::{self as bidding, PlaceBidCommand, WithdrawBidCommand};
use crate::config::Config;
use crate::database::DatabaseManager;
use crate::error::AuctionError;
use crate::idempotency;
use crate::leaderboard::LeaderboardIndex;
use crate::message_broker::RealtimePublisher;
use crate::query;
use crate::ratelimit::RateLimiter;
use crate::rounds::commands as rounds;
use crate::wallet;
use axum::extract::{DefaultBodyLimit, Path, Query, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

// endregion: --- Imports

// region:    --- App State & Router

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseManager>,
    pub leaderboard: Arc<LeaderboardIndex>,
    pub publisher: Arc<dyn RealtimePublisher>,
    pub config: Arc<Config>,
    pub limiter: Arc<RateLimiter>,
}

/// 라우터 구성
pub fn app(state: AppState) -> Router {
    // 테스트 페이지를 위한 cors 설정
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/admin/auction", post(handle_create_auction))
        .route("/admin/auction/:id/start", post(handle_start_round))
        .route("/admin/round/:id/close", post(handle_close_round))
        .route("/admin/auction/:id/stop", post(handle_stop_auction))
        .route("/admin/users/:user_id/deposit", post(handle_deposit))
        .route("/auction/:id", get(handle_get_auction))
        .route("/auction/:id/leaderboard", get(handle_get_leaderboard))
        .route("/auction/:id/bids", get(handle_get_bid_history))
        .route("/auction/:id/bid", post(handle_bid))
        .route("/bid/:id/withdraw", post(handle_withdraw))
        .route("/users/:user_id/wallet", get(handle_get_wallet))
        .route("/users/:user_id/ledger", get(handle_get_ledger))
        .layer(axum::middleware::from_fn(server_time))
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 20))
        .with_state(state)
}

/// 모든 응답에 x-server-time 헤더 부여 (클라이언트의 시계 오차 보정용)
pub async fn server_time(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&Utc::now().timestamp_millis().to_string()) {
        response.headers_mut().insert("x-server-time", value);
    }
    response
}

/// 관리자 토큰 검증 (토큰이 설정되지 않았으면 생략)
fn check_admin(config: &Config, headers: &HeaderMap) -> Result<(), AuctionError> {
    let Some(expected) = &config.admin_token else {
        return Ok(());
    };
    match headers.get("x-admin-token").and_then(|v| v.to_str().ok()) {
        Some(token) if token == expected => Ok(()),
        _ => Err(AuctionError::Unauthorized),
    }
}

/// 멱등성 키 추출
fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

// endregion: --- App State & Router

// region:    --- Admin Handlers

/// 경매 생성 요청 처리
async fn handle_create_auction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(cmd): Json<rounds::CreateAuctionCommand>,
) -> Response {
    info!("{:<12} --> 경매 생성 요청 처리 시작: {:?}", "Handler", cmd);
    if let Err(e) = check_admin(&state.config, &headers) {
        return e.into_response();
    }

    match rounds::create_auction(&state.db, &state.config, cmd).await {
        Ok((auction, round)) => (
            StatusCode::CREATED,
            Json(json!({ "auction": auction, "round": round })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// 라운드 시작 요청 처리 (멱등)
async fn handle_start_round(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    info!("{:<12} --> 라운드 시작 요청: auction={}", "Handler", auction_id);
    if let Err(e) = check_admin(&state.config, &headers) {
        return e.into_response();
    }

    match rounds::start_round(&state.db, &state.config, auction_id).await {
        Ok(round) => Json(round).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 라운드 강제 종료 요청 처리
async fn handle_close_round(
    State(state): State<AppState>,
    Path(round_id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    info!("{:<12} --> 라운드 강제 종료 요청: round={}", "Handler", round_id);
    if let Err(e) = check_admin(&state.config, &headers) {
        return e.into_response();
    }

    match rounds::finish_round(
        &state.db,
        &state.leaderboard,
        state.publisher.as_ref(),
        &state.config,
        round_id,
        true,
    )
    .await
    {
        Ok(_) => Json(json!({ "status": "closed" })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 경매 중단 요청 처리
async fn handle_stop_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    info!("{:<12} --> 경매 중단 요청: auction={}", "Handler", auction_id);
    if let Err(e) = check_admin(&state.config, &headers) {
        return e.into_response();
    }

    match rounds::stop_auction(&state.db, auction_id).await {
        Ok(_) => Json(json!({ "status": "finished" })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 입금 요청
#[derive(Debug, Deserialize)]
struct DepositRequest {
    amount: i64,
}

/// 입금 요청 처리
async fn handle_deposit(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<DepositRequest>,
) -> Response {
    info!(
        "{:<12} --> 입금 요청: user={}, amount={}",
        "Handler", user_id, req.amount
    );
    if let Err(e) = check_admin(&state.config, &headers) {
        return e.into_response();
    }

    let key = idempotency_key(&headers);
    let key_for_ledger = key.clone();
    let scope = format!("deposit:{}", user_id);
    let db = Arc::clone(&state.db);
    let result = idempotency::run_idempotent(&state.db, key.as_deref(), &scope, || async move {
        wallet::credit(&db, user_id, req.amount, key_for_ledger).await?;
        Ok((StatusCode::CREATED, json!({ "status": "credited" })))
    })
    .await;

    match result {
        Ok((status, body)) => (status, Json(body)).into_response(),
        Err(e) => e.into_response(),
    }
}

// endregion: --- Admin Handlers

// region:    --- Public Handlers

/// 경매 상태 조회
async fn handle_get_auction(State(state): State<AppState>, Path(auction_id): Path<i64>) -> Response {
    info!("{:<12} --> 경매 상태 조회 id: {}", "Handler", auction_id);

    let auction = match query::handlers::get_auction(&state.db, auction_id).await {
        Ok(Some(auction)) => auction,
        Ok(None) => return AuctionError::AuctionNotFound.into_response(),
        Err(e) => return e.into_response(),
    };
    let round = match query::handlers::get_active_round(&state.db, auction_id).await {
        Ok(round) => round,
        Err(e) => return e.into_response(),
    };

    Json(json!({
        "auction": auction,
        "round": round,
        "config": { "minBidStepPercent": state.config.min_bid_step_percent },
    }))
    .into_response()
}

/// 리더보드 조회 파라미터
#[derive(Debug, Deserialize)]
struct LeaderboardParams {
    limit: Option<i64>,
}

/// 리더보드 조회
async fn handle_get_leaderboard(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
    Query(params): Query<LeaderboardParams>,
) -> Response {
    info!("{:<12} --> 리더보드 조회 auction: {}", "Handler", auction_id);

    let limit = params.limit.unwrap_or(state.config.top_n);
    if limit <= 0 || limit > 100 {
        return AuctionError::Validation("limit은 1 이상 100 이하여야 합니다.".into())
            .into_response();
    }

    match state.leaderboard.top_or_prime(auction_id, limit).await {
        Ok(bids) => {
            let entries: Vec<LeaderboardEntry> = bids
                .into_iter()
                .map(|b| LeaderboardEntry {
                    id: b.id,
                    user_id: b.user_id,
                    amount: b.amount,
                    timestamp: b.bid_timestamp,
                })
                .collect();
            Json(json!({ "bids": entries })).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// 입찰 요청
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BidRequest {
    user_id: i64,
    amount: i64,
}

/// 입찰 요청 처리
async fn handle_bid(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<BidRequest>,
) -> Response {
    info!(
        "{:<12} --> 입찰 요청: auction={}, user={}, amount={}",
        "Handler", auction_id, req.user_id, req.amount
    );

    // 사용자 단위 속도 제한 (제한기 장애 시 fail-open)
    if !state.limiter.check(&req.user_id.to_string()) {
        return AuctionError::RateLimited.into_response();
    }

    let key = idempotency_key(&headers);
    let scope = format!("bid:{}:{}", auction_id, req.user_id);
    let cmd = PlaceBidCommand {
        auction_id,
        user_id: req.user_id,
        amount: req.amount,
        idempotency_key: key.clone(),
    };
    let state_for_run = state.clone();
    let result = idempotency::run_idempotent(&state.db, key.as_deref(), &scope, || async move {
        let outcome = bidding::handle_place_bid(
            &state_for_run.db,
            &state_for_run.leaderboard,
            state_for_run.publisher.as_ref(),
            &state_for_run.config,
            cmd,
        )
        .await;
        match outcome {
            Ok(bid) => Ok((StatusCode::CREATED, serde_json::to_value(bid).unwrap_or_default())),
            // 공개 입찰 경로에서 비활성 경매는 404로 보고한다
            Err(e @ AuctionError::AuctionNotActive) => Ok((StatusCode::NOT_FOUND, e.body())),
            Err(e) => Err(e),
        }
    })
    .await;

    match result {
        Ok((status, body)) => (status, Json(body)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 입찰 철회 요청
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawRequest {
    user_id: i64,
}

/// 입찰 철회 요청 처리
async fn handle_withdraw(
    State(state): State<AppState>,
    Path(bid_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<WithdrawRequest>,
) -> Response {
    info!(
        "{:<12} --> 입찰 철회 요청: bid={}, user={}",
        "Handler", bid_id, req.user_id
    );

    let key = idempotency_key(&headers);
    let scope = format!("withdraw:{}", bid_id);
    let cmd = WithdrawBidCommand {
        bid_id,
        user_id: req.user_id,
    };
    let state_for_run = state.clone();
    let result = idempotency::run_idempotent(&state.db, key.as_deref(), &scope, || async move {
        bidding::handle_withdraw(
            &state_for_run.db,
            &state_for_run.leaderboard,
            state_for_run.publisher.as_ref(),
            &state_for_run.config,
            cmd,
        )
        .await?;
        Ok((StatusCode::OK, json!({ "status": "withdrawn" })))
    })
    .await;

    match result {
        Ok((status, body)) => (status, Json(body)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 지갑 조회
async fn handle_get_wallet(State(state): State<AppState>, Path(user_id): Path<i64>) -> Response {
    info!("{:<12} --> 지갑 조회 user: {}", "Handler", user_id);
    match wallet::get_wallet(&state.db, user_id).await {
        Ok(wallet) => Json(wallet).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 입찰 이력 조회
async fn handle_get_bid_history(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> Response {
    info!("{:<12} --> 입찰 이력 조회 auction: {}", "Handler", auction_id);
    match query::handlers::get_bid_history(&state.db, auction_id, 100).await {
        Ok(bids) => Json(json!({ "bids": bids })).into_response(),
        Err(e) => e.into_response(),
    }
}

/// 지갑 원장 이력 조회
async fn handle_get_ledger(State(state): State<AppState>, Path(user_id): Path<i64>) -> Response {
    info!("{:<12} --> 원장 이력 조회 user: {}", "Handler", user_id);
    let user = match query::handlers::get_user(&state.db, user_id).await {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };
    match query::handlers::get_ledger_history(&state.db, user_id, 100).await {
        Ok(entries) => Json(json!({ "user": user, "entries": entries })).into_response(),
        Err(e) => e.into_response(),
    }
}

// endregion: --- Public Handlers
