/// 입찰 관련 커맨드 처리
/// 1. 입찰 (최소 입찰가 검증, 자금 홀드, 리더보드 반영, 안티 스나이핑 연장)
/// 2. 입찰 철회 (환불)
// region:    --- Imports
use crate::auction::model::{auction_status, bid_status, ledger_reason, round_status, Bid, Round};
use crate::config::Config;
use crate::database::DatabaseManager;
use crate::error::AuctionError;
use crate::leaderboard::{self, LeaderboardIndex};
use crate::lock::RoundLock;
use crate::message_broker::RealtimePublisher;
use crate::query::handlers as query;
use crate::ranking;
use crate::scheduler;
use crate::wallet::{self, LedgerMeta};
use crate::auction::events::RealtimeEvent;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Transaction};
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Commands

/// 입찰 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBidCommand {
    pub auction_id: i64,
    pub user_id: i64,
    pub amount: i64,
    #[serde(skip)]
    pub idempotency_key: Option<String>,
}

/// 입찰 철회 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawBidCommand {
    pub bid_id: i64,
    pub user_id: i64,
}

/// 1. 입찰
pub async fn handle_place_bid(
    db: &DatabaseManager,
    leaderboard_index: &LeaderboardIndex,
    publisher: &dyn RealtimePublisher,
    config: &Config,
    cmd: PlaceBidCommand,
) -> Result<Bid, AuctionError> {
    info!("{:<12} --> 입찰 요청 처리 시작: {:?}", "Command", cmd);

    if cmd.amount <= 0 {
        return Err(AuctionError::InvalidAmount);
    }

    // 최소 입찰가 검증 (트랜잭션 밖, 읽기 전용)
    if let Some(top) = leaderboard_index
        .top_or_prime(cmd.auction_id, 1)
        .await?
        .first()
    {
        let required = ranking::min_required(top.amount, config.min_bid_step_percent);
        if cmd.amount < required {
            return Err(AuctionError::BidTooLow { required });
        }
    }

    // 경매/라운드 활성 검증
    let auction = query::get_auction(db, cmd.auction_id)
        .await?
        .ok_or(AuctionError::AuctionNotActive)?;
    if auction.status != auction_status::ACTIVE {
        return Err(AuctionError::AuctionNotActive);
    }
    let round = query::get_active_round(db, cmd.auction_id)
        .await?
        .ok_or(AuctionError::RoundNotActive)?;

    // 입찰 시각은 여기서 한 번 캡처해 입찰 타임스탬프로 재사용한다
    let now = Utc::now();
    if now > round.end_time {
        return Err(AuctionError::RoundEnded);
    }

    // 입찰 트랜잭션: 사용자/지갑 보장, 입찰 생성, 자금 홀드
    let auction_id = cmd.auction_id;
    let user_id = cmd.user_id;
    let amount = cmd.amount;
    let round_id = round.id;
    let idempotency_key = cmd.idempotency_key.clone();
    let bid = db
        .transaction(|tx| {
            Box::pin(async move {
                wallet::ensure_user(tx, user_id).await?;
                wallet::ensure_wallet(tx, user_id).await?;

                let bid = sqlx::query_as::<_, Bid>(
                    "INSERT INTO bids (auction_id, user_id, round_id, amount, bid_timestamp, status)
                     VALUES ($1, $2, $3, $4, $5, $6)
                     RETURNING id, auction_id, user_id, round_id, amount, bid_timestamp, status",
                )
                .bind(auction_id)
                .bind(user_id)
                .bind(round_id)
                .bind(amount)
                .bind(now)
                .bind(bid_status::ACTIVE)
                .fetch_one(&mut **tx)
                .await?;

                wallet::apply(
                    tx,
                    user_id,
                    -amount,
                    amount,
                    ledger_reason::HOLD,
                    LedgerMeta {
                        auction_id: Some(auction_id),
                        round_id: Some(round_id),
                        bid_id: Some(bid.id),
                        idempotency_key,
                    },
                )
                .await?;

                Ok::<Bid, AuctionError>(bid)
            })
        })
        .await?;

    // 리더보드 반영 및 이벤트 발행 (커밋 이후)
    if let Err(e) = leaderboard_index.add(&bid).await {
        warn!("{:<12} --> 리더보드 추가 실패 (프라이밍으로 복구): {:?}", "Command", e);
    }
    if let Err(e) =
        leaderboard::publish_top(leaderboard_index, publisher, cmd.auction_id, config.top_n).await
    {
        warn!("{:<12} --> 리더보드 이벤트 발행 실패: {:?}", "Command", e);
    }

    // 안티 스나이핑 연장 (best-effort: 실패해도 입찰은 유지)
    if let Err(e) = extend_round_if_sniped(db, publisher, config, &round).await {
        warn!("{:<12} --> 안티 스나이핑 처리 실패: {:?}", "Command", e);
    }

    Ok(bid)
}

/// 안티 스나이핑 연장
/// `경매 × 라운드` 락으로 직렬화해 동시 막판 입찰이 이중 연장되지 않게 한다.
async fn extend_round_if_sniped(
    db: &DatabaseManager,
    publisher: &dyn RealtimePublisher,
    config: &Config,
    round: &Round,
) -> Result<(), AuctionError> {
    let lock = match RoundLock::try_acquire(
        db.pool(),
        round.auction_id,
        round.id,
        config.round_lock_ttl_ms,
    )
    .await?
    {
        Some(lock) => lock,
        // 다른 입찰이 연장을 처리 중
        None => return Ok(()),
    };

    let result = extend_locked_round(db, publisher, config, round.id).await;
    lock.release(db.pool()).await;
    result
}

/// 락 보유 상태에서의 연장 판정
async fn extend_locked_round(
    db: &DatabaseManager,
    publisher: &dyn RealtimePublisher,
    config: &Config,
    round_id: i64,
) -> Result<(), AuctionError> {
    // 락 획득 후 라운드 재조회 (이미 종료되었으면 no-op)
    let current = match query::get_round(db, round_id).await? {
        Some(r) if r.status == round_status::ACTIVE => r,
        _ => return Ok(()),
    };

    let now = Utc::now();
    let remaining_ms = (current.end_time - now).num_milliseconds();
    if remaining_ms > config.anti_sniping_threshold_ms {
        return Ok(());
    }

    // 종료 시각은 앞으로만 이동한다
    let new_end = current.end_time + Duration::milliseconds(config.anti_sniping_extension_ms);
    let updated = sqlx::query("UPDATE rounds SET end_time = $1 WHERE id = $2 AND status = $3")
        .bind(new_end)
        .bind(round_id)
        .bind(round_status::ACTIVE)
        .execute(db.pool())
        .await?;
    if updated.rows_affected() == 0 {
        return Ok(());
    }

    scheduler::reschedule(db.pool(), round_id, new_end).await?;
    info!(
        "{:<12} --> 라운드 연장: round={}, end_time={}",
        "Command", round_id, new_end
    );

    publisher
        .publish(&RealtimeEvent::RoundExtended {
            auction_id: current.auction_id,
            round_id,
            end_time: new_end,
        })
        .await
}

/// 2. 입찰 철회
pub async fn handle_withdraw(
    db: &DatabaseManager,
    leaderboard_index: &LeaderboardIndex,
    publisher: &dyn RealtimePublisher,
    config: &Config,
    cmd: WithdrawBidCommand,
) -> Result<Bid, AuctionError> {
    info!("{:<12} --> 입찰 철회 처리 시작: {:?}", "Command", cmd);

    let bid = query::get_bid(db, cmd.bid_id)
        .await?
        .ok_or(AuctionError::BidNotFound)?;
    if bid.user_id != cmd.user_id {
        return Err(AuctionError::Forbidden);
    }
    match bid.status.as_str() {
        s if s == bid_status::WINNING => return Err(AuctionError::WinningLocked),
        s if s == bid_status::REFUNDED => return Err(AuctionError::AlreadyRefunded),
        _ => {}
    }

    // 환불 트랜잭션: 입찰 상태 선점 후 잠금 해제
    let bid_id = cmd.bid_id;
    let refunded = db
        .transaction(|tx| {
            Box::pin(async move {
                let claimed = sqlx::query_as::<_, Bid>(
                    "UPDATE bids SET status = $1 WHERE id = $2 AND status IN ($3, $4)
                     RETURNING id, auction_id, user_id, round_id, amount, bid_timestamp, status",
                )
                .bind(bid_status::REFUNDED)
                .bind(bid_id)
                .bind(bid_status::ACTIVE)
                .bind(bid_status::OUTBID)
                .fetch_optional(&mut **tx)
                .await?;

                let bid = match claimed {
                    Some(bid) => bid,
                    // 동시 라운드 종료와 경합한 경우 현재 상태로 오류를 구분한다
                    None => return Err(concurrent_withdraw_error(tx, bid_id).await?),
                };

                wallet::apply(
                    tx,
                    bid.user_id,
                    bid.amount,
                    -bid.amount,
                    ledger_reason::REFUND,
                    LedgerMeta {
                        auction_id: Some(bid.auction_id),
                        round_id: Some(bid.round_id),
                        bid_id: Some(bid.id),
                        idempotency_key: None,
                    },
                )
                .await?;

                Ok(bid)
            })
        })
        .await?;

    // 리더보드 제거 및 이벤트 발행 (커밋 이후)
    if let Err(e) = leaderboard_index.remove(refunded.id).await {
        warn!("{:<12} --> 리더보드 제거 실패: {:?}", "Command", e);
    }
    if let Err(e) =
        leaderboard::publish_top(leaderboard_index, publisher, refunded.auction_id, config.top_n)
            .await
    {
        warn!("{:<12} --> 리더보드 이벤트 발행 실패: {:?}", "Command", e);
    }

    Ok(refunded)
}

/// 철회 선점 실패 시의 오류 판정
async fn concurrent_withdraw_error(
    tx: &mut Transaction<'_, Postgres>,
    bid_id: i64,
) -> Result<AuctionError, AuctionError> {
    let status: Option<String> = sqlx::query_scalar("SELECT status FROM bids WHERE id = $1")
        .bind(bid_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(match status.as_deref() {
        Some(s) if s == bid_status::WINNING => AuctionError::WinningLocked,
        Some(s) if s == bid_status::REFUNDED => AuctionError::AlreadyRefunded,
        _ => AuctionError::BidNotFound,
    })
}

// endregion: --- Commands
