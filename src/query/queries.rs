/// 경매 조회
pub const GET_AUCTION: &str =
    "SELECT id, title, total_items, status, current_round_number, created_at FROM auctions WHERE id = $1";

/// 활성 라운드 조회 (경매당 최대 1개)
pub const GET_ACTIVE_ROUND: &str = r#"
    SELECT id, auction_id, round_number, start_time, end_time, status
    FROM rounds
    WHERE auction_id = $1 AND status = 'active'
    ORDER BY round_number DESC
    LIMIT 1
"#;

/// 라운드 조회
pub const GET_ROUND: &str =
    "SELECT id, auction_id, round_number, start_time, end_time, status FROM rounds WHERE id = $1";

/// 입찰 조회
pub const GET_BID: &str =
    "SELECT id, auction_id, user_id, round_id, amount, bid_timestamp, status FROM bids WHERE id = $1";

/// 유효 입찰 조회 (캐리오버 포함, 낙찰자는 풀에서 제외)
pub const GET_ELIGIBLE_BIDS: &str = r#"
    SELECT id, auction_id, user_id, round_id, amount, bid_timestamp, status
    FROM bids
    WHERE auction_id = $1 AND status IN ('active', 'outbid')
"#;

/// 경매의 낙찰 입찰 수 조회
pub const COUNT_WINNING_BIDS: &str =
    "SELECT COUNT(*) FROM bids WHERE auction_id = $1 AND status = 'winning'";

/// 입찰 이력 조회
pub const GET_BID_HISTORY: &str = r#"
    SELECT id, auction_id, user_id, round_id, amount, bid_timestamp, status
    FROM bids
    WHERE auction_id = $1
    ORDER BY bid_timestamp DESC
    LIMIT $2
"#;

/// 사용자 조회
pub const GET_USER: &str = "SELECT id, username, wallet_address FROM users WHERE id = $1";

/// 지갑 원장 이력 조회
pub const GET_LEDGER_HISTORY: &str = r#"
    SELECT id, user_id, available_delta, locked_delta, reason, auction_id, round_id, bid_id, idempotency_key, created_at
    FROM wallet_ledger
    WHERE user_id = $1
    ORDER BY id DESC
    LIMIT $2
"#;
