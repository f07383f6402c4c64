// region:    --- Imports
use super::queries;
use crate::auction::model::{Auction, Bid, LedgerEntry, Round, User};
use crate::database::DatabaseManager;
use crate::error::AuctionError;
use sqlx::{Postgres, Transaction};
use tracing::info;

// endregion: --- Imports

// region:    --- Query Handlers

/// 경매 조회
pub async fn get_auction(
    db: &DatabaseManager,
    auction_id: i64,
) -> Result<Option<Auction>, AuctionError> {
    info!("{:<12} --> 경매 조회 id: {}", "Query", auction_id);
    let auction = sqlx::query_as::<_, Auction>(queries::GET_AUCTION)
        .bind(auction_id)
        .fetch_optional(db.pool())
        .await?;
    Ok(auction)
}

/// 활성 라운드 조회
pub async fn get_active_round(
    db: &DatabaseManager,
    auction_id: i64,
) -> Result<Option<Round>, AuctionError> {
    info!("{:<12} --> 활성 라운드 조회 auction: {}", "Query", auction_id);
    let round = sqlx::query_as::<_, Round>(queries::GET_ACTIVE_ROUND)
        .bind(auction_id)
        .fetch_optional(db.pool())
        .await?;
    Ok(round)
}

/// 라운드 조회
pub async fn get_round(db: &DatabaseManager, round_id: i64) -> Result<Option<Round>, AuctionError> {
    info!("{:<12} --> 라운드 조회 id: {}", "Query", round_id);
    let round = sqlx::query_as::<_, Round>(queries::GET_ROUND)
        .bind(round_id)
        .fetch_optional(db.pool())
        .await?;
    Ok(round)
}

/// 입찰 조회
pub async fn get_bid(db: &DatabaseManager, bid_id: i64) -> Result<Option<Bid>, AuctionError> {
    info!("{:<12} --> 입찰 조회 id: {}", "Query", bid_id);
    let bid = sqlx::query_as::<_, Bid>(queries::GET_BID)
        .bind(bid_id)
        .fetch_optional(db.pool())
        .await?;
    Ok(bid)
}

/// 입찰 이력 조회 (최신순)
pub async fn get_bid_history(
    db: &DatabaseManager,
    auction_id: i64,
    limit: i64,
) -> Result<Vec<Bid>, AuctionError> {
    info!("{:<12} --> 입찰 이력 조회 auction: {}", "Query", auction_id);
    let bids = sqlx::query_as::<_, Bid>(queries::GET_BID_HISTORY)
        .bind(auction_id)
        .bind(limit)
        .fetch_all(db.pool())
        .await?;
    Ok(bids)
}

/// 경매의 낙찰 입찰 수 조회
pub async fn count_winning_bids(
    db: &DatabaseManager,
    auction_id: i64,
) -> Result<i64, AuctionError> {
    let count: i64 = sqlx::query_scalar(queries::COUNT_WINNING_BIDS)
        .bind(auction_id)
        .fetch_one(db.pool())
        .await?;
    Ok(count)
}

/// 사용자 조회
pub async fn get_user(db: &DatabaseManager, user_id: i64) -> Result<Option<User>, AuctionError> {
    info!("{:<12} --> 사용자 조회 id: {}", "Query", user_id);
    let user = sqlx::query_as::<_, User>(queries::GET_USER)
        .bind(user_id)
        .fetch_optional(db.pool())
        .await?;
    Ok(user)
}

/// 지갑 원장 이력 조회 (최신순)
pub async fn get_ledger_history(
    db: &DatabaseManager,
    user_id: i64,
    limit: i64,
) -> Result<Vec<LedgerEntry>, AuctionError> {
    info!("{:<12} --> 원장 이력 조회 user: {}", "Query", user_id);
    let entries = sqlx::query_as::<_, LedgerEntry>(queries::GET_LEDGER_HISTORY)
        .bind(user_id)
        .bind(limit)
        .fetch_all(db.pool())
        .await?;
    Ok(entries)
}

// endregion: --- Query Handlers

// region:    --- Transaction-scoped Fetches

/// 트랜잭션 안에서 라운드 조회
pub async fn get_round_tx(
    tx: &mut Transaction<'_, Postgres>,
    round_id: i64,
) -> Result<Option<Round>, AuctionError> {
    let round = sqlx::query_as::<_, Round>(queries::GET_ROUND)
        .bind(round_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(round)
}

/// 트랜잭션 안에서 경매 조회
pub async fn get_auction_tx(
    tx: &mut Transaction<'_, Postgres>,
    auction_id: i64,
) -> Result<Option<Auction>, AuctionError> {
    let auction = sqlx::query_as::<_, Auction>(queries::GET_AUCTION)
        .bind(auction_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(auction)
}

/// 트랜잭션 안에서 유효 입찰 전체 조회 (종료 트랜잭션의 일관된 스냅샷)
pub async fn get_eligible_bids_tx(
    tx: &mut Transaction<'_, Postgres>,
    auction_id: i64,
) -> Result<Vec<Bid>, AuctionError> {
    let bids = sqlx::query_as::<_, Bid>(queries::GET_ELIGIBLE_BIDS)
        .bind(auction_id)
        .fetch_all(&mut **tx)
        .await?;
    Ok(bids)
}

// endregion: --- Transaction-scoped Fetches
