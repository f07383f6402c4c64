// region:    --- Imports
use crate::config::Config;
use crate::database::DatabaseManager;
use crate::handlers::AppState;
use crate::leaderboard::LeaderboardIndex;
use crate::message_broker::{
    KafkaProducer, KafkaPublisher, RealtimePublisher, AUCTION_EVENTS_TOPIC,
};
use crate::ratelimit::RateLimiter;
use crate::scheduler::ClosureWorker;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Modules
mod auction;
mod bidding;
mod config;
mod database;
mod error;
mod handlers;
mod idempotency;
mod leaderboard;
mod lock;
mod message_broker;
mod query;
mod ranking;
mod ratelimit;
mod rounds;
mod scheduler;
mod wallet;

// endregion: --- Modules

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // logging 초기화
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    // 설정 로드
    let config = Arc::new(Config::from_env());

    // DatabaseManager 생성
    let db_manager = Arc::new(DatabaseManager::new(config.db_max_connections).await);

    // 데이터베이스 초기화
    if let Err(e) = db_manager.initialize_database().await {
        error!("{:<12} --> 데이터베이스 초기화 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> 데이터베이스 초기화 성공", "Main");

    // Kafka 프로듀서 생성, 브로커 확인 및 이벤트 토픽 준비
    let kafka_producer = Arc::new(KafkaProducer::from_env());
    if let Err(e) = kafka_producer.ensure_connected() {
        error!("{:<12} --> Kafka 브로커 도달 실패: {:?}", "Main", e);
        return Err(e.into());
    }
    kafka_producer.ensure_topic(AUCTION_EVENTS_TOPIC, 5, 1).await?;
    info!("{:<12} --> Kafka 준비 완료", "Main");

    // 실시간 발행자 및 리더보드 인덱스 생성
    let publisher: Arc<dyn RealtimePublisher> = Arc::new(KafkaPublisher::new(kafka_producer));
    let leaderboard = Arc::new(LeaderboardIndex::new(db_manager.get_pool(), config.top_n));

    // 라운드 종료 워커 시작
    let worker = ClosureWorker::new(
        Arc::clone(&db_manager),
        Arc::clone(&leaderboard),
        Arc::clone(&publisher),
        Arc::clone(&config),
    );
    worker.start().await;

    // 입찰 속도 제한기 생성
    let limiter = Arc::new(RateLimiter::new(
        config.rate_limit_max_requests,
        config.rate_limit_window_ms,
    ));

    // 라우터 설정
    let state = AppState {
        db: Arc::clone(&db_manager),
        leaderboard,
        publisher,
        config: Arc::clone(&config),
        limiter,
    };
    let routes_all = handlers::app(state);

    // 리스너 생성
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await.unwrap();
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr().unwrap()
    );

    // 서버 실행
    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
