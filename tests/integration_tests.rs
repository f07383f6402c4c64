use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use round_auction_service::handlers::{self, AppState};
use round_auction_service::ratelimit::RateLimiter;
use tower::ServiceExt;
use round_auction_service::auction::events::RealtimeEvent;
use round_auction_service::auction::model::{
    auction_status, bid_status, round_status, Auction, Bid, Round,
};
use round_auction_service::bidding::commands::{self as bidding, PlaceBidCommand, WithdrawBidCommand};
use round_auction_service::config::Config;
use round_auction_service::database::DatabaseManager;
use round_auction_service::error::AuctionError;
use round_auction_service::idempotency;
use round_auction_service::leaderboard::LeaderboardIndex;
use round_auction_service::message_broker::RealtimePublisher;
use round_auction_service::query;
use round_auction_service::rounds::commands::{self as rounds, CloseOutcome, CreateAuctionCommand};
use round_auction_service::scheduler::{self, ClosureWorker};
use round_auction_service::wallet;
use serial_test::serial;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// 트레이싱 초기화
fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .without_time()
        .with_target(false)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// 발행된 이벤트를 수집하는 테스트용 발행자
#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<RealtimeEvent>>,
}

#[async_trait]
impl RealtimePublisher for RecordingPublisher {
    async fn publish(&self, event: &RealtimeEvent) -> Result<(), AuctionError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

impl RecordingPublisher {
    fn events(&self) -> Vec<RealtimeEvent> {
        self.events.lock().unwrap().clone()
    }
}

struct TestContext {
    db: Arc<DatabaseManager>,
    leaderboard: Arc<LeaderboardIndex>,
    publisher: Arc<RecordingPublisher>,
    config: Config,
}

/// 테스트 환경 설정
async fn setup() -> TestContext {
    init_tracing();
    let config = test_config();
    let db = Arc::new(DatabaseManager::new(config.db_max_connections).await);
    db.initialize_database().await.expect("스키마 초기화 실패");
    TestContext {
        leaderboard: Arc::new(LeaderboardIndex::new(db.get_pool(), config.top_n)),
        publisher: Arc::new(RecordingPublisher::default()),
        db,
        config,
    }
}

/// 테스트 기본 설정 (라운드가 테스트 도중 저절로 끝나지 않도록 넉넉한 지속 시간)
fn test_config() -> Config {
    Config {
        round_duration_ms: 600_000,
        anti_sniping_threshold_ms: 30_000,
        anti_sniping_extension_ms: 60_000,
        top_n: 10,
        min_bid_step_percent: 5,
        round_lock_ttl_ms: 2_000,
        admin_token: None,
        rate_limit_window_ms: 10_000,
        rate_limit_max_requests: 100,
        db_max_connections: 10,
        port: 0,
    }
}

static USER_SEQ: AtomicI64 = AtomicI64::new(0);

/// 실행 간 충돌하지 않는 테스트 사용자 id
fn fresh_user() -> i64 {
    Utc::now().timestamp_micros() + USER_SEQ.fetch_add(1, Ordering::SeqCst)
}

/// 즉시 시작하는 테스트 경매 생성
async fn create_started_auction(ctx: &TestContext, total_items: i64) -> (Auction, Round) {
    let (auction, round) = rounds::create_auction(
        &ctx.db,
        &ctx.config,
        CreateAuctionCommand {
            title: format!("테스트 경매 (N={})", total_items),
            total_items,
            start_now: true,
        },
    )
    .await
    .expect("경매 생성 실패");
    (auction, round.expect("startNow 경매에 라운드가 없음"))
}

async fn deposit(ctx: &TestContext, user_id: i64, amount: i64) {
    wallet::credit(&ctx.db, user_id, amount, None)
        .await
        .expect("입금 실패");
}

async fn place_bid(
    ctx: &TestContext,
    auction_id: i64,
    user_id: i64,
    amount: i64,
) -> Result<Bid, AuctionError> {
    bidding::handle_place_bid(
        &ctx.db,
        &ctx.leaderboard,
        ctx.publisher.as_ref(),
        &ctx.config,
        PlaceBidCommand {
            auction_id,
            user_id,
            amount,
            idempotency_key: None,
        },
    )
    .await
}

async fn close_round(ctx: &TestContext, round_id: i64) -> CloseOutcome {
    rounds::finish_round(
        &ctx.db,
        &ctx.leaderboard,
        ctx.publisher.as_ref(),
        &ctx.config,
        round_id,
        true,
    )
    .await
    .expect("라운드 종료 실패")
}

/// 원장 합계와 지갑 잔액의 일치 검증
async fn assert_ledger_consistent(ctx: &TestContext, user_id: i64) {
    let (available_sum, locked_sum): (i64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(available_delta), 0)::BIGINT, COALESCE(SUM(locked_delta), 0)::BIGINT
         FROM wallet_ledger WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_one(ctx.db.pool())
    .await
    .unwrap();
    let w = wallet::get_wallet(&ctx.db, user_id).await.unwrap();
    assert_eq!(w.available_balance, available_sum, "가용 잔액과 원장 합계 불일치");
    assert_eq!(w.locked_balance, locked_sum, "잠금 잔액과 원장 합계 불일치");
}

/// 단순 라운드 시나리오: 상위 2명 낙찰, 나머지 캐리오버
#[tokio::test]
#[serial]
async fn test_simple_round_close() {
    let ctx = setup().await;
    let (auction, round) = create_started_auction(&ctx, 2).await;

    let (u1, u2, u3, u4) = (fresh_user(), fresh_user(), fresh_user(), fresh_user());
    for user in [u1, u2, u3, u4] {
        deposit(&ctx, user, 1000).await;
    }

    place_bid(&ctx, auction.id, u4, 50).await.unwrap();
    place_bid(&ctx, auction.id, u1, 100).await.unwrap();
    place_bid(&ctx, auction.id, u3, 150).await.unwrap();
    place_bid(&ctx, auction.id, u2, 200).await.unwrap();

    let outcome = close_round(&ctx, round.id).await;
    let winners = match outcome {
        CloseOutcome::Closed { winners, .. } => winners,
        other => panic!("예상 밖의 종료 결과: {:?}", other),
    };
    let winner_users: Vec<i64> = winners.iter().map(|b| b.user_id).collect();
    assert_eq!(winner_users, vec![u2, u3]);
    assert!(winners.iter().all(|b| b.status == bid_status::WINNING));

    // 낙찰자는 홀드가 정산되고, 패찰자는 홀드가 유지된다
    for (user, available, locked) in [(u2, 800, 0), (u3, 850, 0), (u1, 900, 100), (u4, 950, 50)] {
        let w = wallet::get_wallet(&ctx.db, user).await.unwrap();
        assert_eq!((w.available_balance, w.locked_balance), (available, locked));
        assert_ledger_consistent(&ctx, user).await;
    }

    let closed = query::handlers::get_round(&ctx.db, round.id).await.unwrap().unwrap();
    assert_eq!(closed.status, round_status::CLOSED);

    // 다음 라운드 #2가 시딩되고 종료 작업이 등록된다
    let next = query::handlers::get_active_round(&ctx.db, auction.id)
        .await
        .unwrap()
        .expect("다음 라운드가 생성되지 않음");
    assert_eq!(next.round_number, 2);
    let scheduled: Option<i64> =
        sqlx::query_scalar("SELECT round_id FROM scheduled_closures WHERE round_id = $1")
            .bind(next.id)
            .fetch_optional(ctx.db.pool())
            .await
            .unwrap();
    assert_eq!(scheduled, Some(next.id));

    // round:closed 이벤트에 전체 낙찰자 목록이 실린다
    let closed_events: Vec<_> = ctx
        .publisher
        .events()
        .into_iter()
        .filter(|e| matches!(e, RealtimeEvent::RoundClosed { .. }))
        .collect();
    assert_eq!(closed_events.len(), 1);
    if let RealtimeEvent::RoundClosed { winners, .. } = &closed_events[0] {
        assert_eq!(winners.len(), 2);
    }
}

/// 최소 입찰가 시나리오: 상승률 5%에서 102는 거부, 105는 허용
#[tokio::test]
#[serial]
async fn test_min_bid_step() {
    let ctx = setup().await;
    let (auction, _round) = create_started_auction(&ctx, 1).await;

    let (u1, u2) = (fresh_user(), fresh_user());
    deposit(&ctx, u1, 1000).await;
    deposit(&ctx, u2, 1000).await;

    place_bid(&ctx, auction.id, u1, 100).await.unwrap();

    let rejected = place_bid(&ctx, auction.id, u2, 102).await;
    match rejected {
        Err(AuctionError::BidTooLow { required }) => assert_eq!(required, 105),
        other => panic!("BID_TOO_LOW가 아님: {:?}", other),
    }

    place_bid(&ctx, auction.id, u2, 105).await.unwrap();
}

/// 안티 스나이핑 시나리오: 임계 안의 입찰이 라운드를 연장하고 종료 작업을 재등록한다
#[tokio::test]
#[serial]
async fn test_anti_sniping_extension() {
    let ctx = setup().await;
    let mut config = test_config();
    config.round_duration_ms = 30_000;
    config.anti_sniping_threshold_ms = 60_000;
    config.anti_sniping_extension_ms = 120_000;
    let ctx = TestContext { config, ..ctx };

    let (auction, round) = create_started_auction(&ctx, 1).await;
    let u1 = fresh_user();
    deposit(&ctx, u1, 1000).await;

    // 남은 시간 30초 ≤ 임계 60초이므로 연장된다
    place_bid(&ctx, auction.id, u1, 100).await.unwrap();

    let extended = query::handlers::get_round(&ctx.db, round.id).await.unwrap().unwrap();
    assert_eq!(extended.end_time, round.end_time + Duration::milliseconds(120_000));
    assert_eq!(extended.status, round_status::ACTIVE);

    let run_at: chrono::DateTime<Utc> =
        sqlx::query_scalar("SELECT run_at FROM scheduled_closures WHERE round_id = $1")
            .bind(round.id)
            .fetch_one(ctx.db.pool())
            .await
            .unwrap();
    assert_eq!(run_at, extended.end_time);

    assert!(ctx
        .publisher
        .events()
        .iter()
        .any(|e| matches!(e, RealtimeEvent::RoundExtended { .. })));

    // stale 작업 가드: 연장된 종료 시각 전의 종료 시도는 재등록으로 끝난다
    let outcome = rounds::finish_round(
        &ctx.db,
        &ctx.leaderboard,
        ctx.publisher.as_ref(),
        &ctx.config,
        round.id,
        false,
    )
    .await
    .unwrap();
    assert!(matches!(outcome, CloseOutcome::Rescheduled(t) if t == extended.end_time));
    let still_active = query::handlers::get_round(&ctx.db, round.id).await.unwrap().unwrap();
    assert_eq!(still_active.status, round_status::ACTIVE);
}

/// 철회 시나리오: 환불 후 재철회는 ALREADY_REFUNDED
#[tokio::test]
#[serial]
async fn test_withdraw() {
    let ctx = setup().await;
    let (auction, _round) = create_started_auction(&ctx, 1).await;

    let u1 = fresh_user();
    deposit(&ctx, u1, 500).await;
    let bid = place_bid(&ctx, auction.id, u1, 200).await.unwrap();

    let held = wallet::get_wallet(&ctx.db, u1).await.unwrap();
    assert_eq!((held.available_balance, held.locked_balance), (300, 200));

    bidding::handle_withdraw(
        &ctx.db,
        &ctx.leaderboard,
        ctx.publisher.as_ref(),
        &ctx.config,
        WithdrawBidCommand { bid_id: bid.id, user_id: u1 },
    )
    .await
    .unwrap();

    let refunded = wallet::get_wallet(&ctx.db, u1).await.unwrap();
    assert_eq!((refunded.available_balance, refunded.locked_balance), (500, 0));
    let bid_after = query::handlers::get_bid(&ctx.db, bid.id).await.unwrap().unwrap();
    assert_eq!(bid_after.status, bid_status::REFUNDED);
    assert_ledger_consistent(&ctx, u1).await;

    let again = bidding::handle_withdraw(
        &ctx.db,
        &ctx.leaderboard,
        ctx.publisher.as_ref(),
        &ctx.config,
        WithdrawBidCommand { bid_id: bid.id, user_id: u1 },
    )
    .await;
    assert!(matches!(again, Err(AuctionError::AlreadyRefunded)));

    // 다른 사용자의 철회 시도는 금지된다
    let other = bidding::handle_withdraw(
        &ctx.db,
        &ctx.leaderboard,
        ctx.publisher.as_ref(),
        &ctx.config,
        WithdrawBidCommand { bid_id: bid.id, user_id: fresh_user() },
    )
    .await;
    assert!(matches!(other, Err(AuctionError::Forbidden)));
}

/// 캐리오버 시나리오: 패찰 입찰은 홀드를 유지한 채 다음 라운드의 후보로 남는다
#[tokio::test]
#[serial]
async fn test_carry_over() {
    let ctx = setup().await;
    let (auction, round) = create_started_auction(&ctx, 1).await;

    let (u1, u2) = (fresh_user(), fresh_user());
    deposit(&ctx, u1, 1000).await;
    deposit(&ctx, u2, 1000).await;

    let losing = place_bid(&ctx, auction.id, u1, 110).await.unwrap();
    place_bid(&ctx, auction.id, u2, 200).await.unwrap();

    close_round(&ctx, round.id).await;

    let outbid = query::handlers::get_bid(&ctx.db, losing.id).await.unwrap().unwrap();
    assert_eq!(outbid.status, bid_status::OUTBID);
    let w1 = wallet::get_wallet(&ctx.db, u1).await.unwrap();
    assert_eq!((w1.available_balance, w1.locked_balance), (890, 110));
    let w2 = wallet::get_wallet(&ctx.db, u2).await.unwrap();
    assert_eq!((w2.available_balance, w2.locked_balance), (800, 0));

    // 다음 라운드의 최소 입찰가는 캐리오버된 110 기준으로 계산된다
    let u3 = fresh_user();
    deposit(&ctx, u3, 1000).await;
    let too_low = place_bid(&ctx, auction.id, u3, 115).await;
    match too_low {
        Err(AuctionError::BidTooLow { required }) => assert_eq!(required, 116),
        other => panic!("BID_TOO_LOW가 아님: {:?}", other),
    }
    place_bid(&ctx, auction.id, u3, 116).await.unwrap();
}

/// 동률 시나리오: 같은 금액은 먼저 들어온 입찰이 이긴다
#[tokio::test]
#[serial]
async fn test_tie_break() {
    let ctx = setup().await;
    // 동률 입찰을 허용하기 위해 상승률 0%
    let mut config = test_config();
    config.min_bid_step_percent = 0;
    let ctx = TestContext { config, ..ctx };

    // N=1: 먼저 들어온 입찰이 이긴다
    let (auction, round) = create_started_auction(&ctx, 1).await;
    let (u1, u2) = (fresh_user(), fresh_user());
    deposit(&ctx, u1, 1000).await;
    deposit(&ctx, u2, 1000).await;

    let first = place_bid(&ctx, auction.id, u1, 100).await.unwrap();
    tokio::time::sleep(tokio::time::Duration::from_millis(30)).await;
    let second = place_bid(&ctx, auction.id, u2, 100).await.unwrap();
    assert!(first.bid_timestamp < second.bid_timestamp);

    let outcome = close_round(&ctx, round.id).await;
    let winners = match outcome {
        CloseOutcome::Closed { winners, .. } => winners,
        other => panic!("예상 밖의 종료 결과: {:?}", other),
    };
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].id, first.id);

    // N=2: 동률 두 건 모두 낙찰
    let (auction2, round2) = create_started_auction(&ctx, 2).await;
    let (u3, u4) = (fresh_user(), fresh_user());
    deposit(&ctx, u3, 1000).await;
    deposit(&ctx, u4, 1000).await;
    place_bid(&ctx, auction2.id, u3, 100).await.unwrap();
    tokio::time::sleep(tokio::time::Duration::from_millis(30)).await;
    place_bid(&ctx, auction2.id, u4, 100).await.unwrap();

    let outcome = close_round(&ctx, round2.id).await;
    match outcome {
        CloseOutcome::Closed { winners, .. } => assert_eq!(winners.len(), 2),
        other => panic!("예상 밖의 종료 결과: {:?}", other),
    }
}

/// 잔액 부족 입찰은 원자적으로 거부된다
#[tokio::test]
#[serial]
async fn test_insufficient_funds() {
    let ctx = setup().await;
    let (auction, _round) = create_started_auction(&ctx, 1).await;

    let u1 = fresh_user();
    deposit(&ctx, u1, 50).await;

    let rejected = place_bid(&ctx, auction.id, u1, 100).await;
    assert!(matches!(rejected, Err(AuctionError::InsufficientFunds)));

    // 트랜잭션 롤백으로 입찰도 홀드도 남지 않는다
    let w = wallet::get_wallet(&ctx.db, u1).await.unwrap();
    assert_eq!((w.available_balance, w.locked_balance), (50, 0));
    let bid_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bids WHERE user_id = $1")
        .bind(u1)
        .fetch_one(ctx.db.pool())
        .await
        .unwrap();
    assert_eq!(bid_count, 0);
}

/// 종료된 라운드에는 입찰할 수 없다
#[tokio::test]
#[serial]
async fn test_round_ended_rejection() {
    let ctx = setup().await;
    let (auction, round) = create_started_auction(&ctx, 1).await;

    let u1 = fresh_user();
    deposit(&ctx, u1, 1000).await;

    // 종료 시각을 과거로 이동
    sqlx::query("UPDATE rounds SET end_time = $1 WHERE id = $2")
        .bind(Utc::now() - Duration::seconds(5))
        .bind(round.id)
        .execute(ctx.db.pool())
        .await
        .unwrap();

    let rejected = place_bid(&ctx, auction.id, u1, 100).await;
    assert!(matches!(rejected, Err(AuctionError::RoundEnded)));
}

/// 멱등성: 같은 (키, 스코프)의 재시도는 기억된 응답을 돌려주고 한 번만 실행된다
#[tokio::test]
#[serial]
async fn test_idempotent_deposit_replay() {
    let ctx = setup().await;
    let u1 = fresh_user();
    let key = format!("deposit-key-{}", u1);
    let scope = format!("deposit:{}", u1);

    for _ in 0..3 {
        let db = Arc::clone(&ctx.db);
        let key_for_ledger = key.clone();
        let (status, body) =
            idempotency::run_idempotent(&ctx.db, Some(&key), &scope, || async move {
                wallet::credit(&db, u1, 700, Some(key_for_ledger)).await?;
                Ok((axum::http::StatusCode::CREATED, serde_json::json!({ "status": "credited" })))
            })
            .await
            .unwrap();
        assert_eq!(status, axum::http::StatusCode::CREATED);
        assert_eq!(body["status"], "credited");
    }

    // 세 번 재생해도 입금은 한 번
    let w = wallet::get_wallet(&ctx.db, u1).await.unwrap();
    assert_eq!(w.available_balance, 700);
}

/// 캐시 프라이밍: 비워진 리더보드는 저장소에서 순위대로 복구된다
#[tokio::test]
#[serial]
async fn test_leaderboard_priming() {
    let ctx = setup().await;
    let (auction, _round) = create_started_auction(&ctx, 1).await;

    let (u1, u2, u3) = (fresh_user(), fresh_user(), fresh_user());
    for user in [u1, u2, u3] {
        deposit(&ctx, user, 1000).await;
    }
    place_bid(&ctx, auction.id, u1, 100).await.unwrap();
    place_bid(&ctx, auction.id, u2, 150).await.unwrap();
    place_bid(&ctx, auction.id, u3, 300).await.unwrap();

    // 캐시 플러시 후에도 top은 저장소 기준으로 복구되어야 한다
    ctx.leaderboard.clear(auction.id).await.unwrap();
    assert!(ctx.leaderboard.top(auction.id, 10).await.unwrap().is_empty());

    let top = ctx.leaderboard.top_or_prime(auction.id, 10).await.unwrap();
    let amounts: Vec<i64> = top.iter().map(|b| b.amount).collect();
    assert_eq!(amounts, vec![300, 150, 100]);

    // 복구된 최고가 기준으로 최소 입찰가가 적용된다
    let u4 = fresh_user();
    deposit(&ctx, u4, 1000).await;
    let rejected = place_bid(&ctx, auction.id, u4, 301).await;
    assert!(matches!(rejected, Err(AuctionError::BidTooLow { required: 315 })));
}

/// 종료 워커: 기한이 지난 작업을 실행하고, 성공한 작업 행을 정리한다
#[tokio::test]
#[serial]
async fn test_closure_worker_runs_due_jobs() {
    let ctx = setup().await;
    let (auction, round) = create_started_auction(&ctx, 1).await;

    let u1 = fresh_user();
    deposit(&ctx, u1, 1000).await;
    place_bid(&ctx, auction.id, u1, 100).await.unwrap();

    // 라운드 기한을 과거로 옮기고 작업을 즉시 실행 대상으로 재등록
    sqlx::query("UPDATE rounds SET end_time = $1 WHERE id = $2")
        .bind(Utc::now() - Duration::seconds(1))
        .bind(round.id)
        .execute(ctx.db.pool())
        .await
        .unwrap();
    scheduler::reschedule(ctx.db.pool(), round.id, Utc::now()).await.unwrap();

    let publisher: Arc<dyn RealtimePublisher> = ctx.publisher.clone();
    let worker = ClosureWorker::new(
        Arc::clone(&ctx.db),
        Arc::clone(&ctx.leaderboard),
        publisher,
        Arc::new(ctx.config.clone()),
    );
    worker.run_due_closures().await.unwrap();

    let closed = query::handlers::get_round(&ctx.db, round.id).await.unwrap().unwrap();
    assert_eq!(closed.status, round_status::CLOSED);
    let w = wallet::get_wallet(&ctx.db, u1).await.unwrap();
    assert_eq!(w.locked_balance, 0);

    // 처리된 작업 행은 제거된다
    let remaining: Option<i64> =
        sqlx::query_scalar("SELECT round_id FROM scheduled_closures WHERE round_id = $1")
            .bind(round.id)
            .fetch_optional(ctx.db.pool())
            .await
            .unwrap();
    assert_eq!(remaining, None);
}

/// 경매 중단 후에는 다음 라운드가 시딩되지 않고 입찰이 거부된다
#[tokio::test]
#[serial]
async fn test_stop_auction() {
    let ctx = setup().await;
    let (auction, round) = create_started_auction(&ctx, 1).await;

    rounds::stop_auction(&ctx.db, auction.id).await.unwrap();
    close_round(&ctx, round.id).await;

    let next = query::handlers::get_active_round(&ctx.db, auction.id).await.unwrap();
    assert!(next.is_none());

    let u1 = fresh_user();
    deposit(&ctx, u1, 1000).await;
    let rejected = place_bid(&ctx, auction.id, u1, 100).await;
    assert!(matches!(rejected, Err(AuctionError::AuctionNotActive)));
}

/// 라운드 시작은 멱등이다: 활성 라운드가 있으면 그대로 반환한다
#[tokio::test]
#[serial]
async fn test_start_round_idempotent() {
    let ctx = setup().await;
    let (auction, round) = create_started_auction(&ctx, 1).await;

    let again = rounds::start_round(&ctx.db, &ctx.config, auction.id).await.unwrap();
    assert_eq!(again.id, round.id);
    assert_eq!(again.round_number, 1);

    // 중단된 경매에서는 라운드를 시작할 수 없다
    rounds::stop_auction(&ctx.db, auction.id).await.unwrap();
    let rejected = rounds::start_round(&ctx.db, &ctx.config, auction.id).await;
    assert!(matches!(rejected, Err(AuctionError::AuctionNotActive)));

    let missing = rounds::start_round(&ctx.db, &ctx.config, 999_999_999).await;
    assert!(matches!(missing, Err(AuctionError::AuctionNotFound)));
}

/// 낙찰된 입찰은 철회할 수 없다
#[tokio::test]
#[serial]
async fn test_withdraw_winning_locked() {
    let ctx = setup().await;
    let (auction, round) = create_started_auction(&ctx, 1).await;

    let u1 = fresh_user();
    deposit(&ctx, u1, 1000).await;
    let bid = place_bid(&ctx, auction.id, u1, 300).await.unwrap();
    close_round(&ctx, round.id).await;

    let rejected = bidding::handle_withdraw(
        &ctx.db,
        &ctx.leaderboard,
        ctx.publisher.as_ref(),
        &ctx.config,
        WithdrawBidCommand { bid_id: bid.id, user_id: u1 },
    )
    .await;
    assert!(matches!(rejected, Err(AuctionError::WinningLocked)));

    let missing = bidding::handle_withdraw(
        &ctx.db,
        &ctx.leaderboard,
        ctx.publisher.as_ref(),
        &ctx.config,
        WithdrawBidCommand { bid_id: 999_999_999, user_id: u1 },
    )
    .await;
    assert!(matches!(missing, Err(AuctionError::BidNotFound)));
}

/// 금액/입력 검증
#[tokio::test]
#[serial]
async fn test_input_validation() {
    let ctx = setup().await;
    let (auction, _round) = create_started_auction(&ctx, 1).await;
    let u1 = fresh_user();

    let zero_bid = place_bid(&ctx, auction.id, u1, 0).await;
    assert!(matches!(zero_bid, Err(AuctionError::InvalidAmount)));

    let negative_deposit = wallet::credit(&ctx.db, u1, -10, None).await;
    assert!(matches!(negative_deposit, Err(AuctionError::InvalidAmount)));

    let empty_title = rounds::create_auction(
        &ctx.db,
        &ctx.config,
        CreateAuctionCommand { title: "  ".into(), total_items: 1, start_now: false },
    )
    .await;
    assert!(matches!(empty_title, Err(AuctionError::Validation(_))));

    let zero_items = rounds::create_auction(
        &ctx.db,
        &ctx.config,
        CreateAuctionCommand { title: "검증 테스트".into(), total_items: 0, start_now: false },
    )
    .await;
    assert!(matches!(zero_items, Err(AuctionError::Validation(_))));
}

/// 낙찰자는 이후 라운드의 후보 풀에서 빠진다
#[tokio::test]
#[serial]
async fn test_winner_exits_the_pool() {
    let ctx = setup().await;
    let (auction, round) = create_started_auction(&ctx, 1).await;

    let (u1, u2) = (fresh_user(), fresh_user());
    deposit(&ctx, u1, 1000).await;
    deposit(&ctx, u2, 1000).await;

    let carried = place_bid(&ctx, auction.id, u1, 110).await.unwrap();
    let won = place_bid(&ctx, auction.id, u2, 200).await.unwrap();
    close_round(&ctx, round.id).await;

    // 라운드 2: 낙찰된 200은 풀에 없고, 캐리오버된 110이 단독 후보로 낙찰된다
    let round2 = query::handlers::get_active_round(&ctx.db, auction.id)
        .await
        .unwrap()
        .unwrap();
    let outcome = close_round(&ctx, round2.id).await;
    let winners = match outcome {
        CloseOutcome::Closed { winners, .. } => winners,
        other => panic!("예상 밖의 종료 결과: {:?}", other),
    };
    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].id, carried.id);

    // 낙찰 수는 라운드마다 totalItems 이하로 누적된다
    let winning = query::handlers::count_winning_bids(&ctx.db, auction.id).await.unwrap();
    assert_eq!(winning, 2);
    let first_won = query::handlers::get_bid(&ctx.db, won.id).await.unwrap().unwrap();
    assert_eq!(first_won.status, bid_status::WINNING);

    let w1 = wallet::get_wallet(&ctx.db, u1).await.unwrap();
    assert_eq!((w1.available_balance, w1.locked_balance), (890, 0));
    assert_ledger_consistent(&ctx, u1).await;
}

/// 이력 조회: 입찰 이력은 최신순, 원장 이력은 잔액 변화를 그대로 기록한다
#[tokio::test]
#[serial]
async fn test_history_queries() {
    let ctx = setup().await;
    let (auction, _round) = create_started_auction(&ctx, 1).await;

    let u1 = fresh_user();
    deposit(&ctx, u1, 1000).await;
    place_bid(&ctx, auction.id, u1, 100).await.unwrap();
    place_bid(&ctx, auction.id, u1, 200).await.unwrap();

    let history = query::handlers::get_bid_history(&ctx.db, auction.id, 100).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].amount, 200);
    assert_eq!(history[1].amount, 100);

    let user = query::handlers::get_user(&ctx.db, u1).await.unwrap().unwrap();
    assert_eq!(user.username, format!("user-{}", u1));

    let ledger = query::handlers::get_ledger_history(&ctx.db, u1, 100).await.unwrap();
    assert_eq!(ledger.len(), 3); // 입금 1건 + 홀드 2건
    assert_eq!(ledger[0].reason, "hold");
    assert_eq!(ledger[0].available_delta, -200);
    assert_eq!(ledger[0].locked_delta, 200);
    assert_eq!(ledger[2].reason, "credit");
    assert_eq!(ledger[2].available_delta, 1000);
}

/// 스키마 재생성 라운드트립: 비운 뒤에도 전체 흐름이 동작한다
#[tokio::test]
#[serial]
async fn test_reset_database_roundtrip() {
    let ctx = setup().await;
    ctx.db.reset_database().await.unwrap();

    let auctions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM auctions")
        .fetch_one(ctx.db.pool())
        .await
        .unwrap();
    assert_eq!(auctions, 0);

    let (auction, _round) = create_started_auction(&ctx, 1).await;
    assert_eq!(auction.status, auction_status::ACTIVE);
    assert_eq!(auction.current_round_number, 1);
}

// region:    --- HTTP Surface

/// 테스트용 라우터 구성
fn test_app(ctx: &TestContext, config: Config) -> axum::Router {
    handlers::app(AppState {
        db: Arc::clone(&ctx.db),
        leaderboard: Arc::clone(&ctx.leaderboard),
        publisher: ctx.publisher.clone(),
        config: Arc::new(config.clone()),
        limiter: Arc::new(RateLimiter::new(
            config.rate_limit_max_requests,
            config.rate_limit_window_ms,
        )),
    })
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// 모든 응답은 x-server-time 헤더를 실어 보낸다
#[tokio::test]
#[serial]
async fn test_http_wallet_and_server_time() {
    let ctx = setup().await;
    let app = test_app(&ctx, test_config());
    let user_id = fresh_user();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/users/{}/wallet", user_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let server_time: i64 = response
        .headers()
        .get("x-server-time")
        .expect("x-server-time 헤더 누락")
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((Utc::now().timestamp_millis() - server_time).abs() < 60_000);

    let body = response_json(response).await;
    assert_eq!(body["availableBalance"], 0);
    assert_eq!(body["lockedBalance"], 0);
}

/// 관리자 토큰이 설정되면 관리자 경로는 x-admin-token을 요구한다
#[tokio::test]
#[serial]
async fn test_http_admin_auth() {
    let ctx = setup().await;
    let mut config = test_config();
    config.admin_token = Some("secret-token".to_string());

    let payload = serde_json::json!({ "title": "인증 테스트 경매", "totalItems": 1 });

    let denied = test_app(&ctx, config.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/auction")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(denied).await["code"], "UNAUTHORIZED");

    let allowed = test_app(&ctx, config)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/auction")
                .header("content-type", "application/json")
                .header("x-admin-token", "secret-token")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(allowed.status(), StatusCode::CREATED);
    let body = response_json(allowed).await;
    assert_eq!(body["auction"]["totalItems"], 1);
    assert!(body["round"].is_null());
}

/// 공개 입찰 경로에서 없는 경매는 404 AUCTION_NOT_ACTIVE
#[tokio::test]
#[serial]
async fn test_http_bid_on_missing_auction() {
    let ctx = setup().await;
    let app = test_app(&ctx, test_config());

    let payload = serde_json::json!({ "userId": fresh_user(), "amount": 100 });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auction/999999999/bid")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response_json(response).await["code"], "AUCTION_NOT_ACTIVE");
}

/// 리더보드 조회의 limit 검증
#[tokio::test]
#[serial]
async fn test_http_leaderboard_limit_validation() {
    let ctx = setup().await;
    let (auction, _round) = create_started_auction(&ctx, 1).await;
    let app = test_app(&ctx, test_config());

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/auction/{}/leaderboard?limit=0", auction.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(response).await["code"], "VALIDATION_ERROR");
}

// endregion: --- HTTP Surface
