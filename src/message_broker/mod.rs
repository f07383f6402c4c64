/// 실시간 이벤트 발행 (Kafka)
/// 이 서비스는 브로커에 쓰기만 한다. 이벤트는 `auction-events` 토픽에 경매 id를
/// 키로 발행되어 경매 단위 순서가 보존되고, 소켓 게이트웨이가 별도 컨슈머로
/// 팬아웃을 맡는다.
// region:    --- Imports
use crate::auction::events::RealtimeEvent;
use crate::error::AuctionError;
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

// endregion: --- Imports

/// 경매 실시간 이벤트 토픽
pub const AUCTION_EVENTS_TOPIC: &str = "auction-events";

// region:    --- Realtime Publisher

/// 실시간 이벤트 발행 트레이트
/// 발행은 커밋 이후의 best-effort 사이드 이펙트이며 실패해도 상태 변경을 되돌리지 않는다.
#[async_trait]
pub trait RealtimePublisher: Send + Sync {
    async fn publish(&self, event: &RealtimeEvent) -> Result<(), AuctionError>;
}

/// Kafka 기반 실시간 발행 구현체
pub struct KafkaPublisher {
    producer: Arc<KafkaProducer>,
}

impl KafkaPublisher {
    pub fn new(producer: Arc<KafkaProducer>) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl RealtimePublisher for KafkaPublisher {
    async fn publish(&self, event: &RealtimeEvent) -> Result<(), AuctionError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| AuctionError::Broker(format!("이벤트 직렬화 실패: {}", e)))?;
        info!(
            "{:<12} --> 실시간 이벤트 발행: auction={}",
            "Realtime",
            event.auction_id()
        );
        self.producer
            .send(
                AUCTION_EVENTS_TOPIC,
                &event.auction_id().to_string(),
                &payload,
            )
            .await
    }
}

// endregion: --- Realtime Publisher

// region:    --- Kafka Producer

pub struct KafkaProducer {
    producer: FutureProducer,
    brokers: String,
}

impl KafkaProducer {
    /// KAFKA_BROKERS 환경 변수로 프로듀서 생성
    pub fn from_env() -> Self {
        let brokers =
            std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string());
        Self::new(&brokers)
    }

    pub fn new(brokers: &str) -> Self {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()
            .expect("Kafka 프로듀서 생성 실패");

        KafkaProducer {
            producer,
            brokers: brokers.to_string(),
        }
    }

    /// 브로커 도달 확인
    /// 기동 시점에 메타데이터 조회가 성공하면 발행 경로가 살아 있는 것으로 본다.
    pub fn ensure_connected(&self) -> Result<(), AuctionError> {
        self.producer
            .client()
            .fetch_metadata(None, Duration::from_secs(5))
            .map_err(|e| {
                AuctionError::Broker(format!("브로커 도달 불가: {}: {:?}", self.brokers, e))
            })?;
        info!("{:<12} --> 브로커 도달 확인: {}", "Broker", self.brokers);
        Ok(())
    }

    /// 이벤트 토픽 준비 (이미 있으면 그대로 사용)
    pub async fn ensure_topic(
        &self,
        topic: &str,
        num_partitions: i32,
        replication_factor: i32,
    ) -> Result<(), AuctionError> {
        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .create()
            .map_err(|e| AuctionError::Broker(format!("어드민 클라이언트 생성 실패: {:?}", e)))?;

        let new_topic = NewTopic::new(
            topic,
            num_partitions,
            TopicReplication::Fixed(replication_factor),
        );
        let results = admin
            .create_topics(&[new_topic], &AdminOptions::new())
            .await
            .map_err(|e| AuctionError::Broker(format!("토픽 준비 실패: {}: {:?}", topic, e)))?;

        for result in results {
            match result {
                Ok(_) => info!("{:<12} --> 토픽 생성: {}", "Broker", topic),
                Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    info!("{:<12} --> 기존 토픽 사용: {}", "Broker", topic)
                }
                Err((name, code)) => {
                    return Err(AuctionError::Broker(format!(
                        "토픽 생성 실패: {}: {:?}",
                        name, code
                    )))
                }
            }
        }
        Ok(())
    }

    /// 이벤트 페이로드 전송
    async fn send(&self, topic: &str, key: &str, payload: &str) -> Result<(), AuctionError> {
        let record = FutureRecord::to(topic).key(key).payload(payload);
        self.producer
            .send(record, Duration::from_secs(0))
            .await
            .map_err(|(e, _)| AuctionError::Broker(format!("이벤트 전송 실패: {:?}", e)))?;
        Ok(())
    }
}

// endregion: --- Kafka Producer
