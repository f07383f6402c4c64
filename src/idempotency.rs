/// 요청 멱등성 처리
/// `(키, 스코프)` 단위로 최초 완료 응답을 기억하고 재시도에 그대로 돌려준다.
/// status=0 행은 처리 중 마커이며, INTERNAL 결과는 마커를 지워 같은 키로
/// 재시도할 수 있게 한다.
// region:    --- Imports
use crate::database::DatabaseManager;
use crate::error::AuctionError;
use axum::http::StatusCode;
use serde_json::Value;
use std::future::Future;
use tracing::{info, warn};

// endregion: --- Imports

// region:    --- Idempotency

/// 멱등 실행
/// 키가 없으면 그대로 실행한다. 도메인 오류(4xx)도 완료로 기억한다.
pub async fn run_idempotent<F, Fut>(
    db: &DatabaseManager,
    key: Option<&str>,
    scope: &str,
    f: F,
) -> Result<(StatusCode, Value), AuctionError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(StatusCode, Value), AuctionError>>,
{
    let key = match key {
        Some(k) if !k.is_empty() => k,
        _ => return f().await,
    };

    // 처리 중 마커 선점
    let inserted = sqlx::query(
        "INSERT INTO idempotency_records (idem_key, scope, status) VALUES ($1, $2, 0)
         ON CONFLICT (idem_key, scope) DO NOTHING",
    )
    .bind(key)
    .bind(scope)
    .execute(db.pool())
    .await?;

    if inserted.rows_affected() == 0 {
        // 기존 기록: 처리 중이면 409, 완료면 기억된 응답 재생
        let record: Option<(i32, Option<Value>)> = sqlx::query_as(
            "SELECT status, response FROM idempotency_records WHERE idem_key = $1 AND scope = $2",
        )
        .bind(key)
        .bind(scope)
        .fetch_optional(db.pool())
        .await?;

        return match record {
            Some((0, _)) | None => Err(AuctionError::IdempotencyInProgress),
            Some((status, response)) => {
                info!(
                    "{:<12} --> 멱등 응답 재생: key={}, scope={}, status={}",
                    "Idempotent", key, scope, status
                );
                let status = StatusCode::from_u16(status as u16)
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                Ok((status, response.unwrap_or(Value::Null)))
            }
        };
    }

    let outcome = match f().await {
        Ok(result) => Ok(result),
        // 도메인 오류도 완료로 기억한다
        Err(e) if !e.is_internal() => Ok((e.status(), e.body())),
        Err(e) => Err(e),
    };

    match outcome {
        Ok((status, body)) => {
            finalize(db, key, scope, status, &body).await;
            Ok((status, body))
        }
        Err(e) => {
            // 인프라 오류: 마커를 지워 같은 키의 재시도를 허용한다
            let cleared =
                sqlx::query("DELETE FROM idempotency_records WHERE idem_key = $1 AND scope = $2")
                    .bind(key)
                    .bind(scope)
                    .execute(db.pool())
                    .await;
            if let Err(delete_err) = cleared {
                warn!(
                    "{:<12} --> 멱등 마커 정리 실패: key={}, {:?}",
                    "Idempotent", key, delete_err
                );
            }
            Err(e)
        }
    }
}

/// 완료 응답 기록
async fn finalize(db: &DatabaseManager, key: &str, scope: &str, status: StatusCode, body: &Value) {
    let result = sqlx::query(
        "UPDATE idempotency_records SET status = $3, response = $4
         WHERE idem_key = $1 AND scope = $2",
    )
    .bind(key)
    .bind(scope)
    .bind(status.as_u16() as i32)
    .bind(body)
    .execute(db.pool())
    .await;
    if let Err(e) = result {
        warn!(
            "{:<12} --> 멱등 응답 기록 실패: key={}, scope={}, {:?}",
            "Idempotent", key, scope, e
        );
    }
}

// endregion: --- Idempotency
