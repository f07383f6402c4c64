use crate::auction::model::Bid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 리더보드 항목 (실시간 이벤트 페이로드)
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub id: i64,
    pub user_id: i64,
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type")]
pub enum RealtimeEvent {
    // 리더보드 변경 이벤트 (상위 K 입찰)
    #[serde(rename = "leaderboard:update")]
    #[serde(rename_all = "camelCase")]
    LeaderboardUpdate {
        auction_id: i64,
        bids: Vec<LeaderboardEntry>,
    },
    // 라운드 연장 이벤트 (안티 스나이핑)
    #[serde(rename = "round:extended")]
    #[serde(rename_all = "camelCase")]
    RoundExtended {
        auction_id: i64,
        round_id: i64,
        end_time: DateTime<Utc>,
    },
    // 라운드 종료 이벤트 (전체 낙찰자 목록)
    #[serde(rename = "round:closed")]
    #[serde(rename_all = "camelCase")]
    RoundClosed {
        auction_id: i64,
        round_id: i64,
        winners: Vec<Bid>,
    },
}

impl RealtimeEvent {
    /// 이벤트가 속한 경매 id (브로커 파티션 키)
    pub fn auction_id(&self) -> i64 {
        match self {
            RealtimeEvent::LeaderboardUpdate { auction_id, .. }
            | RealtimeEvent::RoundExtended { auction_id, .. }
            | RealtimeEvent::RoundClosed { auction_id, .. } => *auction_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_extended_serializes_with_type_tag() {
        let event = RealtimeEvent::RoundExtended {
            auction_id: 7,
            round_id: 3,
            end_time: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "round:extended");
        assert_eq!(value["auctionId"], 7);
        assert_eq!(value["roundId"], 3);
        assert!(value["endTime"].is_string());
    }

    #[test]
    fn leaderboard_update_round_trips() {
        let event = RealtimeEvent::LeaderboardUpdate {
            auction_id: 1,
            bids: vec![LeaderboardEntry {
                id: 10,
                user_id: 2,
                amount: 500,
                timestamp: Utc::now(),
            }],
        };
        let text = serde_json::to_string(&event).unwrap();
        let parsed: RealtimeEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.auction_id(), 1);
    }
}
