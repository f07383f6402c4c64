/// 데이터베이스 연결 관리
/// 커맨드 계층의 모든 쓰기 작업은 transaction 콤비네이터로 묶인다.
// region:    --- Imports
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

// endregion: --- Imports

// region:    --- Database Manager

pub struct DatabaseManager {
    pool: Arc<PgPool>,
}

impl DatabaseManager {
    /// DATABASE_URL로 연결 풀 생성 (풀 크기는 설정값)
    pub async fn new(max_connections: u32) -> Self {
        let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(&database_url)
            .await
            .expect("데이터베이스 연결 실패");
        info!(
            "{:<12} --> 연결 풀 생성: max_connections={}",
            "Database", max_connections
        );
        Self {
            pool: Arc::new(pool),
        }
    }

    /// 데이터베이스 풀 가져오기
    pub fn get_pool(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 트랜잭션 실행: Ok면 커밋, Err면 롤백
    pub async fn transaction<F, R, E>(&self, f: F) -> Result<R, E>
    where
        F: for<'c> FnOnce(
            &'c mut sqlx::Transaction<'_, sqlx::Postgres>,
        ) -> Pin<Box<dyn Future<Output = Result<R, E>> + Send + 'c>>,
        E: From<sqlx::Error>,
    {
        let mut tx = self.pool.begin().await?;
        match f(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// 스키마 생성 (IF NOT EXISTS, 기존 데이터 유지)
    pub async fn initialize_database(&self) -> Result<(), sqlx::Error> {
        self.run_sql_batch(include_str!("../sql/01-create-schema.sql"))
            .await
    }

    /// 전체 테이블 삭제 후 스키마 재생성 (테스트 전용)
    pub async fn reset_database(&self) -> Result<(), sqlx::Error> {
        self.run_sql_batch(include_str!("../sql/00-recreate-db.sql"))
            .await?;
        self.initialize_database().await
    }

    /// 세미콜론으로 구분된 문장 배치 실행
    async fn run_sql_batch(&self, sql: &str) -> Result<(), sqlx::Error> {
        let statements: Vec<&str> = sql
            .split(';')
            .map(str::trim)
            .filter(|statement| !statement.is_empty())
            .collect();
        for statement in &statements {
            sqlx::query(statement).execute(&*self.pool).await?;
        }
        debug!(
            "{:<12} --> SQL 배치 실행: {}개 문장",
            "Database",
            statements.len()
        );
        Ok(())
    }
}

// endregion: --- Database Manager
