/// 라운드 종료 스케줄러
/// 라운드당 하나의 논리적 종료 작업을 `scheduled_closures` 테이블에 유지하고,
/// 워커가 1초 간격으로 기한이 지난 작업을 실행한다. 작업은 at-least-once이며
/// 종료 핸들러는 이미 종료된/없는 라운드에 대해 멱등이다.
// region:    --- Imports
use crate::config::Config;
use crate::database::DatabaseManager;
use crate::error::AuctionError;
use crate::leaderboard::LeaderboardIndex;
use crate::message_broker::RealtimePublisher;
use crate::rounds;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

// endregion: --- Imports

// region:    --- Scheduling

/// 종료 작업 등록 (이미 있으면 실행 시각 교체)
pub async fn schedule(
    pool: &PgPool,
    round_id: i64,
    run_at: DateTime<Utc>,
) -> Result<(), AuctionError> {
    sqlx::query(
        "INSERT INTO scheduled_closures (round_id, run_at) VALUES ($1, $2)
         ON CONFLICT (round_id) DO UPDATE SET run_at = EXCLUDED.run_at",
    )
    .bind(round_id)
    .bind(run_at)
    .execute(pool)
    .await?;
    info!(
        "{:<12} --> 종료 작업 등록: round={}, run_at={}",
        "Scheduler", round_id, run_at
    );
    Ok(())
}

/// 종료 작업 재등록 (연장/즉시 종료 시 기존 작업 대체)
pub async fn reschedule(
    pool: &PgPool,
    round_id: i64,
    run_at: DateTime<Utc>,
) -> Result<(), AuctionError> {
    schedule(pool, round_id, run_at).await
}

// endregion: --- Scheduling

// region:    --- Closure Worker

/// 기한이 지난 종료 작업을 실행하는 워커
pub struct ClosureWorker {
    db: Arc<DatabaseManager>,
    leaderboard: Arc<LeaderboardIndex>,
    publisher: Arc<dyn RealtimePublisher>,
    config: Arc<Config>,
}

impl ClosureWorker {
    pub fn new(
        db: Arc<DatabaseManager>,
        leaderboard: Arc<LeaderboardIndex>,
        publisher: Arc<dyn RealtimePublisher>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            db,
            leaderboard,
            publisher,
            config,
        }
    }

    /// 워커 시작
    pub async fn start(self) {
        tokio::spawn(async move {
            let mut interval = interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                if let Err(e) = self.run_due_closures().await {
                    error!("{:<12} --> 종료 작업 처리 중 오류 발생: {:?}", "Scheduler", e);
                }
            }
        });
    }

    /// 기한이 지난 작업 실행
    /// 핸들러가 스스로 재등록한 작업은 run_at이 미래로 이동해 삭제 조건에서 빠진다.
    /// 실패한 작업은 행이 남아 다음 틱에 재시도된다.
    pub async fn run_due_closures(&self) -> Result<(), AuctionError> {
        let now = Utc::now();
        let due: Vec<i64> =
            sqlx::query_scalar("SELECT round_id FROM scheduled_closures WHERE run_at <= $1")
                .bind(now)
                .fetch_all(self.db.pool())
                .await?;

        for round_id in due {
            debug!("{:<12} --> 종료 작업 실행: round={}", "Scheduler", round_id);
            match rounds::commands::finish_round(
                &self.db,
                &self.leaderboard,
                self.publisher.as_ref(),
                &self.config,
                round_id,
                false,
            )
            .await
            {
                Ok(_) => {
                    sqlx::query(
                        "DELETE FROM scheduled_closures WHERE round_id = $1 AND run_at <= $2",
                    )
                    .bind(round_id)
                    .bind(now)
                    .execute(self.db.pool())
                    .await?;
                }
                Err(e) => {
                    error!(
                        "{:<12} --> 라운드 종료 실패 (다음 틱에 재시도): round={}, {:?}",
                        "Scheduler", round_id, e
                    );
                }
            }
        }
        Ok(())
    }
}

// endregion: --- Closure Worker
