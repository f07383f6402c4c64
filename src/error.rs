/// 경매 도메인 오류 타입
/// 각 오류는 HTTP 상태 코드와 응답 코드 문자열로 매핑된다.
// region:    --- Imports
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

// endregion: --- Imports

// region:    --- Error

#[derive(Debug, Error)]
pub enum AuctionError {
    #[error("요청이 유효하지 않습니다: {0}")]
    Validation(String),

    #[error("금액은 0보다 커야 합니다.")]
    InvalidAmount,

    #[error("관리자 인증에 실패했습니다.")]
    Unauthorized,

    #[error("다른 사용자의 입찰입니다.")]
    Forbidden,

    #[error("경매를 찾을 수 없습니다.")]
    AuctionNotFound,

    #[error("입찰을 찾을 수 없습니다.")]
    BidNotFound,

    #[error("경매가 활성 상태가 아닙니다.")]
    AuctionNotActive,

    #[error("활성 라운드가 없습니다.")]
    RoundNotActive,

    #[error("라운드가 이미 종료되었습니다.")]
    RoundEnded,

    #[error("입찰 금액이 최소 입찰가보다 낮습니다.")]
    BidTooLow { required: i64 },

    #[error("잔액이 부족합니다.")]
    InsufficientFunds,

    #[error("낙찰된 입찰은 철회할 수 없습니다.")]
    WinningLocked,

    #[error("이미 환불된 입찰입니다.")]
    AlreadyRefunded,

    #[error("같은 멱등성 키의 요청이 처리 중입니다.")]
    IdempotencyInProgress,

    #[error("요청이 너무 많습니다. 잠시 후 다시 시도해 주세요.")]
    RateLimited,

    #[error("데이터베이스 오류: {0}")]
    Database(#[from] sqlx::Error),

    #[error("메시지 브로커 오류: {0}")]
    Broker(String),
}

impl AuctionError {
    /// 응답 코드 문자열
    pub fn code(&self) -> &'static str {
        match self {
            AuctionError::Validation(_) => "VALIDATION_ERROR",
            AuctionError::InvalidAmount => "INVALID_AMOUNT",
            AuctionError::Unauthorized => "UNAUTHORIZED",
            AuctionError::Forbidden => "FORBIDDEN",
            AuctionError::AuctionNotFound => "AUCTION_NOT_FOUND",
            AuctionError::BidNotFound => "BID_NOT_FOUND",
            AuctionError::AuctionNotActive => "AUCTION_NOT_ACTIVE",
            AuctionError::RoundNotActive => "ROUND_NOT_ACTIVE",
            AuctionError::RoundEnded => "ROUND_ENDED",
            AuctionError::BidTooLow { .. } => "BID_TOO_LOW",
            AuctionError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            AuctionError::WinningLocked => "WINNING_LOCKED",
            AuctionError::AlreadyRefunded => "ALREADY_REFUNDED",
            AuctionError::IdempotencyInProgress => "IDEMPOTENCY_IN_PROGRESS",
            AuctionError::RateLimited => "RATE_LIMITED",
            AuctionError::Database(_) | AuctionError::Broker(_) => "INTERNAL",
        }
    }

    /// HTTP 상태 코드
    /// AUCTION_NOT_ACTIVE는 기본 409이며, 공개 입찰 경로에서는 핸들러가 404로 재매핑한다.
    pub fn status(&self) -> StatusCode {
        match self {
            AuctionError::Validation(_) | AuctionError::InvalidAmount => StatusCode::BAD_REQUEST,
            AuctionError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuctionError::Forbidden => StatusCode::FORBIDDEN,
            AuctionError::AuctionNotFound | AuctionError::BidNotFound => StatusCode::NOT_FOUND,
            AuctionError::AuctionNotActive
            | AuctionError::RoundNotActive
            | AuctionError::RoundEnded
            | AuctionError::BidTooLow { .. }
            | AuctionError::InsufficientFunds
            | AuctionError::WinningLocked
            | AuctionError::AlreadyRefunded
            | AuctionError::IdempotencyInProgress => StatusCode::CONFLICT,
            AuctionError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuctionError::Database(_) | AuctionError::Broker(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 인프라 오류 여부 (멱등성 키를 소비하지 않고 재시도 가능)
    pub fn is_internal(&self) -> bool {
        matches!(self, AuctionError::Database(_) | AuctionError::Broker(_))
    }

    /// 오류 응답 바디
    pub fn body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        if let AuctionError::BidTooLow { required } = self {
            body["required"] = serde_json::json!(required);
        }
        body
    }
}

impl IntoResponse for AuctionError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

// endregion: --- Error

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses_follow_the_taxonomy() {
        assert_eq!(AuctionError::BidTooLow { required: 105 }.code(), "BID_TOO_LOW");
        assert_eq!(
            AuctionError::BidTooLow { required: 105 }.status(),
            StatusCode::CONFLICT
        );
        assert_eq!(AuctionError::InvalidAmount.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AuctionError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AuctionError::Broker("down".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AuctionError::Broker("down".into()).code(), "INTERNAL");
    }

    #[test]
    fn bid_too_low_body_carries_required_amount() {
        let body = AuctionError::BidTooLow { required: 105 }.body();
        assert_eq!(body["code"], "BID_TOO_LOW");
        assert_eq!(body["required"], 105);
    }

    #[test]
    fn internal_flag_marks_infra_errors_only() {
        assert!(AuctionError::Broker("x".into()).is_internal());
        assert!(!AuctionError::InsufficientFunds.is_internal());
    }
}

// endregion: --- Tests
