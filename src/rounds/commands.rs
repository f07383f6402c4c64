/// 라운드 수명 주기 커맨드 처리
/// 1. 경매 생성
/// 2. 라운드 시작
/// 3. 라운드 종료 (낙찰 정산, 캐리오버, 다음 라운드 시딩)
/// 4. 경매 중단
// region:    --- Imports
use crate::auction::events::RealtimeEvent;
use crate::auction::model::{
    auction_status, bid_status, ledger_reason, round_status, Auction, Bid, Round,
};
use crate::config::Config;
use crate::database::DatabaseManager;
use crate::error::AuctionError;
use crate::leaderboard::{self, LeaderboardIndex};
use crate::message_broker::RealtimePublisher;
use crate::query::handlers as query;
use crate::ranking;
use crate::scheduler;
use crate::wallet::{self, LedgerMeta};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Commands

/// 경매 생성 명령
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuctionCommand {
    pub title: String,
    pub total_items: i64,
    #[serde(default)]
    pub start_now: bool,
}

/// 라운드 종료 결과
#[derive(Debug)]
pub enum CloseOutcome {
    /// 라운드가 없거나 이미 종료됨 (멱등 no-op)
    NoOp,
    /// 연장된 종료 시각으로 재등록 (stale 작업)
    Rescheduled(DateTime<Utc>),
    /// 종료 완료
    Closed { round: Round, winners: Vec<Bid> },
}

/// 1. 경매 생성
pub async fn create_auction(
    db: &DatabaseManager,
    config: &Config,
    cmd: CreateAuctionCommand,
) -> Result<(Auction, Option<Round>), AuctionError> {
    info!("{:<12} --> 경매 생성 처리 시작: {:?}", "Command", cmd);

    if cmd.title.trim().is_empty() {
        return Err(AuctionError::Validation("title은 비어 있을 수 없습니다.".into()));
    }
    if cmd.total_items <= 0 {
        return Err(AuctionError::Validation("totalItems는 0보다 커야 합니다.".into()));
    }

    let auction = sqlx::query_as::<_, Auction>(
        "INSERT INTO auctions (title, total_items, status, current_round_number)
         VALUES ($1, $2, $3, 0)
         RETURNING id, title, total_items, status, current_round_number, created_at",
    )
    .bind(cmd.title.trim())
    .bind(cmd.total_items)
    .bind(auction_status::ACTIVE)
    .fetch_one(db.pool())
    .await?;

    let round = if cmd.start_now {
        Some(start_round(db, config, auction.id).await?)
    } else {
        None
    };

    Ok((auction, round))
}

/// 2. 라운드 시작
/// 활성 라운드가 이미 있으면 그대로 반환한다 (멱등). 종료 시각이 지난 활성
/// 라운드는 종료 작업을 즉시 실행하도록 재등록한다.
pub async fn start_round(
    db: &DatabaseManager,
    config: &Config,
    auction_id: i64,
) -> Result<Round, AuctionError> {
    info!("{:<12} --> 라운드 시작 처리: auction={}", "Command", auction_id);

    let auction = query::get_auction(db, auction_id)
        .await?
        .ok_or(AuctionError::AuctionNotFound)?;
    if auction.status != auction_status::ACTIVE {
        return Err(AuctionError::AuctionNotActive);
    }

    if let Some(round) = query::get_active_round(db, auction_id).await? {
        let now = Utc::now();
        if now > round.end_time {
            // 워커가 즉시 종료하도록 재등록
            scheduler::reschedule(db.pool(), round.id, now).await?;
        }
        return Ok(round);
    }

    let round = create_next_round(db, config, auction_id, auction.current_round_number + 1).await?;
    Ok(round)
}

/// 다음 라운드 생성 및 종료 작업 등록
async fn create_next_round(
    db: &DatabaseManager,
    config: &Config,
    auction_id: i64,
    round_number: i64,
) -> Result<Round, AuctionError> {
    let now = Utc::now();
    let end_time = now + Duration::milliseconds(config.round_duration_ms);

    let round = db
        .transaction(|tx| {
            Box::pin(async move {
                let round = sqlx::query_as::<_, Round>(
                    "INSERT INTO rounds (auction_id, round_number, start_time, end_time, status)
                     VALUES ($1, $2, $3, $4, $5)
                     RETURNING id, auction_id, round_number, start_time, end_time, status",
                )
                .bind(auction_id)
                .bind(round_number)
                .bind(now)
                .bind(end_time)
                .bind(round_status::ACTIVE)
                .fetch_one(&mut **tx)
                .await?;

                sqlx::query("UPDATE auctions SET current_round_number = $1 WHERE id = $2")
                    .bind(round_number)
                    .bind(auction_id)
                    .execute(&mut **tx)
                    .await?;

                Ok::<_, AuctionError>(round)
            })
        })
        .await?;

    scheduler::schedule(db.pool(), round.id, round.end_time).await?;
    info!(
        "{:<12} --> 라운드 생성: auction={}, round=#{} ({})",
        "Command", auction_id, round_number, round.id
    );
    Ok(round)
}

/// 3. 라운드 종료
/// 스케줄러가 호출한다. force는 관리자 강제 종료로, stale 작업 가드를 건너뛴다.
pub async fn finish_round(
    db: &DatabaseManager,
    leaderboard_index: &LeaderboardIndex,
    publisher: &dyn RealtimePublisher,
    config: &Config,
    round_id: i64,
    force: bool,
) -> Result<CloseOutcome, AuctionError> {
    // 라운드 조회: 없거나 이미 종료면 멱등 no-op (stale 작업 커버)
    let round = match query::get_round(db, round_id).await? {
        Some(r) if r.status == round_status::ACTIVE => r,
        _ => return Ok(CloseOutcome::NoOp),
    };

    // stale 작업 가드: 작업 등록 이후 연장이 일어난 경우 재등록 후 종료하지 않는다
    let now = Utc::now();
    if !force && now < round.end_time {
        scheduler::reschedule(db.pool(), round_id, round.end_time).await?;
        info!(
            "{:<12} --> stale 종료 작업 재등록: round={}, end_time={}",
            "Command", round_id, round.end_time
        );
        return Ok(CloseOutcome::Rescheduled(round.end_time));
    }

    // 종료 트랜잭션: 순위 적용, 낙찰 정산, 캐리오버, 라운드/경매 갱신
    let closed = db
        .transaction(|tx| {
            Box::pin(async move {
                // 종료 선점 (동시 워커의 이중 정산 방지)
                let claimed = sqlx::query_as::<_, Round>(
                    "UPDATE rounds SET status = $1 WHERE id = $2 AND status = $3
                     RETURNING id, auction_id, round_number, start_time, end_time, status",
                )
                .bind(round_status::CLOSED)
                .bind(round_id)
                .bind(round_status::ACTIVE)
                .fetch_optional(&mut **tx)
                .await?;
                let round = match claimed {
                    Some(r) => r,
                    None => return Ok::<Option<(Auction, Round, Vec<Bid>)>, AuctionError>(None),
                };

                let auction = query::get_auction_tx(tx, round.auction_id)
                    .await?
                    .ok_or(AuctionError::AuctionNotFound)?;

                let eligible = query::get_eligible_bids_tx(tx, round.auction_id).await?;
                let (ranked, losers) = ranking::split_winners(eligible, auction.total_items);

                // 낙찰 처리 및 홀드 정산
                // 상태 조건은 스냅샷과 커밋 사이에 끼어든 철회를 덮어쓰지 않게 한다
                let mut winners = Vec::with_capacity(ranked.len());
                for mut winner in ranked {
                    let claimed = sqlx::query_scalar::<_, i64>(
                        "UPDATE bids SET status = $1 WHERE id = $2 AND status IN ($3, $4) RETURNING id",
                    )
                    .bind(bid_status::WINNING)
                    .bind(winner.id)
                    .bind(bid_status::ACTIVE)
                    .bind(bid_status::OUTBID)
                    .fetch_optional(&mut **tx)
                    .await?;
                    if claimed.is_none() {
                        continue;
                    }
                    winner.status = bid_status::WINNING.to_string();

                    wallet::apply(
                        tx,
                        winner.user_id,
                        0,
                        -winner.amount,
                        ledger_reason::SETTLE,
                        LedgerMeta {
                            auction_id: Some(round.auction_id),
                            round_id: Some(round.id),
                            bid_id: Some(winner.id),
                            idempotency_key: None,
                        },
                    )
                    .await?;
                    winners.push(winner);
                }

                // 패찰 처리 (홀드 유지, 다음 라운드로 캐리오버)
                let loser_ids: Vec<i64> = losers.iter().map(|b| b.id).collect();
                if !loser_ids.is_empty() {
                    sqlx::query("UPDATE bids SET status = $1 WHERE id = ANY($2) AND status = $3")
                        .bind(bid_status::OUTBID)
                        .bind(&loser_ids)
                        .bind(bid_status::ACTIVE)
                        .execute(&mut **tx)
                        .await?;
                }

                sqlx::query("UPDATE auctions SET current_round_number = $1 WHERE id = $2")
                    .bind(round.round_number)
                    .bind(round.auction_id)
                    .execute(&mut **tx)
                    .await?;

                Ok(Some((auction, round, winners)))
            })
        })
        .await?;

    let (auction, round, winners) = match closed {
        Some(result) => result,
        None => return Ok(CloseOutcome::NoOp),
    };
    info!(
        "{:<12} --> 라운드 종료: auction={}, round=#{}, winners={}",
        "Command",
        round.auction_id,
        round.round_number,
        winners.len()
    );

    // 리더보드에서 낙찰 입찰 제거 후 이벤트 발행 (커밋 이후, best-effort)
    for winner in &winners {
        if let Err(e) = leaderboard_index.remove(winner.id).await {
            warn!("{:<12} --> 리더보드 제거 실패: bid={}, {:?}", "Command", winner.id, e);
        }
    }
    if let Err(e) =
        leaderboard::publish_top(leaderboard_index, publisher, round.auction_id, config.top_n).await
    {
        warn!("{:<12} --> 리더보드 이벤트 발행 실패: {:?}", "Command", e);
    }
    if let Err(e) = publisher
        .publish(&RealtimeEvent::RoundClosed {
            auction_id: round.auction_id,
            round_id: round.id,
            winners: winners.clone(),
        })
        .await
    {
        warn!("{:<12} --> 라운드 종료 이벤트 발행 실패: {:?}", "Command", e);
    }

    // 경매가 아직 활성이면 다음 라운드 시딩
    if auction.status == auction_status::ACTIVE {
        create_next_round(db, config, round.auction_id, round.round_number + 1).await?;
    }

    Ok(CloseOutcome::Closed { round, winners })
}

/// 4. 경매 중단
/// 진행 중인 라운드는 자신의 종료 작업으로 닫히고, 경매가 더 이상 활성이
/// 아니므로 다음 라운드는 시딩되지 않는다.
pub async fn stop_auction(db: &DatabaseManager, auction_id: i64) -> Result<Auction, AuctionError> {
    info!("{:<12} --> 경매 중단 처리: auction={}", "Command", auction_id);

    let auction = sqlx::query_as::<_, Auction>(
        "UPDATE auctions SET status = $1 WHERE id = $2
         RETURNING id, title, total_items, status, current_round_number, created_at",
    )
    .bind(auction_status::FINISHED)
    .bind(auction_id)
    .fetch_optional(db.pool())
    .await?
    .ok_or(AuctionError::AuctionNotFound)?;

    Ok(auction)
}

// endregion: --- Commands
