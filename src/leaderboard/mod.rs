/// 리더보드 인덱스
/// 입찰 저장소의 캐시이며 진실의 원천이 아니다. 캐시가 비어 있는데 저장소에
/// 유효한 입찰이 있으면 순위대로 상위 K개를 채워 넣는다 (프라이밍).
// region:    --- Imports
use crate::auction::events::{LeaderboardEntry, RealtimeEvent};
use crate::auction::model::{bid_status, Bid};
use crate::error::AuctionError;
use crate::message_broker::RealtimePublisher;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

// endregion: --- Imports

// region:    --- Queries

/// 리더보드 항목 추가 (last-writer-wins)
const ADD_ENTRY: &str = r#"
    INSERT INTO leaderboard_entries (bid_id, auction_id, user_id, amount, bid_timestamp)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (bid_id) DO UPDATE
    SET amount = EXCLUDED.amount, bid_timestamp = EXCLUDED.bid_timestamp
"#;

/// 상위 K 조회 (금액 내림차순, 시각 오름차순)
/// 제거가 누락된 정산/환불 입찰이 캐시에 남아 있어도 노출되지 않는다
const TOP_ENTRIES: &str = r#"
    SELECT b.id, b.auction_id, b.user_id, b.round_id, b.amount, b.bid_timestamp, b.status
    FROM leaderboard_entries e
    JOIN bids b ON b.id = e.bid_id
    WHERE e.auction_id = $1 AND b.status IN ($3, $4)
    ORDER BY e.amount DESC, e.bid_timestamp ASC, e.bid_id ASC
    LIMIT $2
"#;

/// 저장소에서 상위 K 입찰을 캐시로 채움
const PRIME_ENTRIES: &str = r#"
    INSERT INTO leaderboard_entries (bid_id, auction_id, user_id, amount, bid_timestamp)
    SELECT id, auction_id, user_id, amount, bid_timestamp
    FROM bids
    WHERE auction_id = $1 AND status IN ($2, $3)
    ORDER BY amount DESC, bid_timestamp ASC, id ASC
    LIMIT $4
    ON CONFLICT (bid_id) DO NOTHING
"#;

/// 저장소의 유효 입찰 수
const COUNT_ELIGIBLE: &str =
    "SELECT COUNT(*) FROM bids WHERE auction_id = $1 AND status IN ($2, $3)";

// endregion: --- Queries

// region:    --- Leaderboard Index

pub struct LeaderboardIndex {
    pool: Arc<PgPool>,
    prime_size: i64,
}

impl LeaderboardIndex {
    pub fn new(pool: Arc<PgPool>, prime_size: i64) -> Self {
        Self { pool, prime_size }
    }

    /// 입찰 추가
    pub async fn add(&self, bid: &Bid) -> Result<(), AuctionError> {
        sqlx::query(ADD_ENTRY)
            .bind(bid.id)
            .bind(bid.auction_id)
            .bind(bid.user_id)
            .bind(bid.amount)
            .bind(bid.bid_timestamp)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    /// 입찰 제거
    pub async fn remove(&self, bid_id: i64) -> Result<(), AuctionError> {
        sqlx::query("DELETE FROM leaderboard_entries WHERE bid_id = $1")
            .bind(bid_id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    /// 경매의 모든 항목 제거
    pub async fn clear(&self, auction_id: i64) -> Result<(), AuctionError> {
        sqlx::query("DELETE FROM leaderboard_entries WHERE auction_id = $1")
            .bind(auction_id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    /// 상위 limit개 조회
    pub async fn top(&self, auction_id: i64, limit: i64) -> Result<Vec<Bid>, AuctionError> {
        let bids = sqlx::query_as::<_, Bid>(TOP_ENTRIES)
            .bind(auction_id)
            .bind(limit)
            .bind(bid_status::ACTIVE)
            .bind(bid_status::OUTBID)
            .fetch_all(&*self.pool)
            .await?;
        Ok(bids)
    }

    /// 상위 limit개 조회, 캐시가 비어 있으면 저장소에서 프라이밍
    pub async fn top_or_prime(
        &self,
        auction_id: i64,
        limit: i64,
    ) -> Result<Vec<Bid>, AuctionError> {
        let bids = self.top(auction_id, limit).await?;
        if !bids.is_empty() {
            return Ok(bids);
        }

        let eligible: i64 = sqlx::query_scalar(COUNT_ELIGIBLE)
            .bind(auction_id)
            .bind(bid_status::ACTIVE)
            .bind(bid_status::OUTBID)
            .fetch_one(&*self.pool)
            .await?;
        if eligible == 0 {
            return Ok(vec![]);
        }

        info!(
            "{:<12} --> 캐시 프라이밍: auction={}, eligible={}",
            "Leaderboard", auction_id, eligible
        );
        self.prime(auction_id).await?;
        self.top(auction_id, limit).await
    }

    /// 저장소의 유효 입찰 상위 K개를 캐시에 삽입
    pub async fn prime(&self, auction_id: i64) -> Result<(), AuctionError> {
        sqlx::query(PRIME_ENTRIES)
            .bind(auction_id)
            .bind(bid_status::ACTIVE)
            .bind(bid_status::OUTBID)
            .bind(self.prime_size)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }
}

// endregion: --- Leaderboard Index

// region:    --- Events

/// 현재 상위 K를 leaderboard:update 이벤트로 발행
pub async fn publish_top(
    index: &LeaderboardIndex,
    publisher: &dyn RealtimePublisher,
    auction_id: i64,
    top_n: i64,
) -> Result<(), AuctionError> {
    let bids = index.top(auction_id, top_n).await?;
    publisher
        .publish(&RealtimeEvent::LeaderboardUpdate {
            auction_id,
            bids: bids
                .into_iter()
                .map(|b| LeaderboardEntry {
                    id: b.id,
                    user_id: b.user_id,
                    amount: b.amount,
                    timestamp: b.bid_timestamp,
                })
                .collect(),
        })
        .await
}

// endregion: --- Events
