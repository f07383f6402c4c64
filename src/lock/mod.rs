/// 라운드 범위 분산 락
/// `경매 × 라운드` 키의 TTL 행으로 직렬화한다. 만료된 락은 다음 획득 시도가
/// 가로챌 수 있으므로 크래시한 보유자가 이후 입찰을 막지 못한다.
// region:    --- Imports
use crate::error::AuctionError;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

// endregion: --- Imports

// region:    --- Round Lock

/// 락 획득 시도 (이미 만료되지 않은 락이 있으면 None)
const TRY_ACQUIRE: &str = r#"
    INSERT INTO round_locks (lock_key, holder, expires_at)
    VALUES ($1, $2, $3)
    ON CONFLICT (lock_key) DO UPDATE
    SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at
    WHERE round_locks.expires_at <= $4
    RETURNING lock_key
"#;

/// 획득한 락. 보유자 토큰이 일치할 때만 해제된다.
pub struct RoundLock {
    key: String,
    holder: String,
}

impl RoundLock {
    /// 락 획득 시도
    pub async fn try_acquire(
        pool: &PgPool,
        auction_id: i64,
        round_id: i64,
        ttl_ms: i64,
    ) -> Result<Option<RoundLock>, AuctionError> {
        let key = format!("round-lock:{}:{}", auction_id, round_id);
        let holder = Uuid::new_v4().to_string();
        let now = Utc::now();

        let acquired = sqlx::query_scalar::<_, String>(TRY_ACQUIRE)
            .bind(&key)
            .bind(&holder)
            .bind(now + Duration::milliseconds(ttl_ms))
            .bind(now)
            .fetch_optional(pool)
            .await?;

        Ok(acquired.map(|_| RoundLock { key, holder }))
    }

    /// 락 해제
    pub async fn release(self, pool: &PgPool) {
        let result = sqlx::query("DELETE FROM round_locks WHERE lock_key = $1 AND holder = $2")
            .bind(&self.key)
            .bind(&self.holder)
            .execute(pool)
            .await;
        if let Err(e) = result {
            // TTL이 남은 락은 해제 실패 시에도 만료로 풀린다
            warn!("{:<12} --> 락 해제 실패: key={}, {:?}", "Lock", self.key, e);
        }
    }
}

// endregion: --- Round Lock
