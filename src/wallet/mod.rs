/// 지갑 원장
/// 잔액 변경은 저장소가 강제하는 조건부 증감으로만 이루어지고,
/// 같은 트랜잭션 안에서 원장 기록이 함께 추가된다.
// region:    --- Imports
use crate::auction::model::{ledger_reason, Wallet};
use crate::database::DatabaseManager;
use crate::error::AuctionError;
use sqlx::{Postgres, Transaction};
use tracing::info;

// endregion: --- Imports

// region:    --- Ledger Meta

/// 원장 기록에 연결되는 부가 정보
#[derive(Debug, Default, Clone)]
pub struct LedgerMeta {
    pub auction_id: Option<i64>,
    pub round_id: Option<i64>,
    pub bid_id: Option<i64>,
    pub idempotency_key: Option<String>,
}

// endregion: --- Ledger Meta

// region:    --- Wallet Operations

/// 사용자 보장 (최초 입금/입찰 시 지연 생성)
pub async fn ensure_user(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
) -> Result<(), AuctionError> {
    sqlx::query("INSERT INTO users (id, username, wallet_address) VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING")
        .bind(user_id)
        .bind(format!("user-{}", user_id))
        .bind(format!("wallet-{}", user_id))
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// 지갑 보장 (초기 잔액 0/0 멱등 생성)
pub async fn ensure_wallet(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
) -> Result<(), AuctionError> {
    sqlx::query(
        "INSERT INTO wallets (user_id, available_balance, locked_balance) VALUES ($1, 0, 0) ON CONFLICT (user_id) DO NOTHING",
    )
    .bind(user_id)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// 잔액 증감 적용
/// 음수 증감으로 잔액이 0 미만이 되는 경우 행이 갱신되지 않고 INSUFFICIENT_FUNDS로 실패한다.
pub async fn apply(
    tx: &mut Transaction<'_, Postgres>,
    user_id: i64,
    available_delta: i64,
    locked_delta: i64,
    reason: &str,
    meta: LedgerMeta,
) -> Result<Wallet, AuctionError> {
    let wallet = sqlx::query_as::<_, Wallet>(
        "UPDATE wallets
         SET available_balance = available_balance + $2, locked_balance = locked_balance + $3
         WHERE user_id = $1 AND available_balance + $2 >= 0 AND locked_balance + $3 >= 0
         RETURNING user_id, available_balance, locked_balance",
    )
    .bind(user_id)
    .bind(available_delta)
    .bind(locked_delta)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(AuctionError::InsufficientFunds)?;

    // 원장 기록 추가 (append-only)
    sqlx::query(
        "INSERT INTO wallet_ledger (user_id, available_delta, locked_delta, reason, auction_id, round_id, bid_id, idempotency_key)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(user_id)
    .bind(available_delta)
    .bind(locked_delta)
    .bind(reason)
    .bind(meta.auction_id)
    .bind(meta.round_id)
    .bind(meta.bid_id)
    .bind(meta.idempotency_key)
    .execute(&mut **tx)
    .await?;

    Ok(wallet)
}

/// 입금 처리 (사용자/지갑 보장 후 가용 잔액 증가)
pub async fn credit(
    db: &DatabaseManager,
    user_id: i64,
    amount: i64,
    idempotency_key: Option<String>,
) -> Result<Wallet, AuctionError> {
    if amount <= 0 {
        return Err(AuctionError::InvalidAmount);
    }
    info!("{:<12} --> 입금 처리: user={}, amount={}", "Wallet", user_id, amount);

    db.transaction(|tx| {
        Box::pin(async move {
            ensure_user(tx, user_id).await?;
            ensure_wallet(tx, user_id).await?;
            apply(
                tx,
                user_id,
                amount,
                0,
                ledger_reason::CREDIT,
                LedgerMeta {
                    idempotency_key,
                    ..Default::default()
                },
            )
            .await
        })
    })
    .await
}

/// 지갑 조회 (없으면 0/0)
pub async fn get_wallet(db: &DatabaseManager, user_id: i64) -> Result<Wallet, AuctionError> {
    let wallet = sqlx::query_as::<_, Wallet>(
        "SELECT user_id, available_balance, locked_balance FROM wallets WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(db.pool())
    .await?;

    Ok(wallet.unwrap_or(Wallet {
        user_id,
        available_balance: 0,
        locked_balance: 0,
    }))
}

// endregion: --- Wallet Operations
