use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 경매 상태
pub mod auction_status {
    pub const ACTIVE: &str = "active";
    pub const PROCESSING: &str = "processing";
    pub const FINISHED: &str = "finished";
}

/// 라운드 상태
pub mod round_status {
    pub const ACTIVE: &str = "active";
    pub const CLOSED: &str = "closed";
}

/// 입찰 상태
pub mod bid_status {
    pub const ACTIVE: &str = "active";
    pub const WINNING: &str = "winning";
    pub const OUTBID: &str = "outbid";
    pub const REFUNDED: &str = "refunded";
}

/// 지갑 원장 기록 사유
pub mod ledger_reason {
    pub const CREDIT: &str = "credit";
    pub const HOLD: &str = "hold";
    pub const REFUND: &str = "refund";
    pub const SETTLE: &str = "settle";
    pub const ADJUSTMENT: &str = "adjustment";
}

// 경매 모델
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: i64,
    pub title: String,
    pub total_items: i64,
    pub status: String,
    pub current_round_number: i64,
    pub created_at: DateTime<Utc>,
}

// 라운드 모델
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Round {
    pub id: i64,
    pub auction_id: i64,
    pub round_number: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
}

// 입찰 모델
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: i64,
    pub auction_id: i64,
    pub user_id: i64,
    pub round_id: i64,
    pub amount: i64,
    pub bid_timestamp: DateTime<Utc>,
    pub status: String,
}

// 지갑 모델
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub user_id: i64,
    pub available_balance: i64,
    pub locked_balance: i64,
}

// 지갑 원장 기록 모델
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: i64,
    pub available_delta: i64,
    pub locked_delta: i64,
    pub reason: String,
    pub auction_id: Option<i64>,
    pub round_id: Option<i64>,
    pub bid_id: Option<i64>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

// 사용자 모델
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub wallet_address: String,
}
