/// 서비스 설정
/// 모든 값은 환경 변수에서 읽고, 없으면 기본값을 사용한다.
// region:    --- Imports
use std::env;
use tracing::info;

// endregion: --- Imports

// region:    --- Config

#[derive(Debug, Clone)]
pub struct Config {
    /// 라운드 기본 지속 시간 (ms)
    pub round_duration_ms: i64,
    /// 안티 스나이핑 임계 시간 (ms)
    pub anti_sniping_threshold_ms: i64,
    /// 안티 스나이핑 연장 시간 (ms)
    pub anti_sniping_extension_ms: i64,
    /// 리더보드 크기 (top K)
    pub top_n: i64,
    /// 최소 입찰 상승률 (%)
    pub min_bid_step_percent: i64,
    /// 라운드 락 TTL (ms)
    pub round_lock_ttl_ms: i64,
    /// 관리자 토큰 (없으면 관리자 인증 생략)
    pub admin_token: Option<String>,
    /// 입찰 요청 제한: 윈도우 (ms)
    pub rate_limit_window_ms: u64,
    /// 입찰 요청 제한: 윈도우당 최대 요청 수
    pub rate_limit_max_requests: usize,
    /// 데이터베이스 연결 풀 크기
    pub db_max_connections: u32,
    /// 웹 서버 포트
    pub port: u16,
}

impl Config {
    /// 환경 변수에서 설정 로드
    pub fn from_env() -> Self {
        let config = Self {
            round_duration_ms: env_i64("ROUND_DURATION_MS", 300_000),
            anti_sniping_threshold_ms: env_i64("ANTI_SNIPING_THRESHOLD_MS", 30_000),
            anti_sniping_extension_ms: env_i64("ANTI_SNIPING_EXTENSION_MS", 60_000),
            top_n: env_i64("TOP_N", 10),
            min_bid_step_percent: env_i64("MIN_BID_STEP_PERCENT", 5),
            round_lock_ttl_ms: env_i64("ROUND_LOCK_TTL_MS", 2_000),
            admin_token: env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
            rate_limit_window_ms: env_i64("RATE_LIMIT_WINDOW_MS", 10_000) as u64,
            rate_limit_max_requests: env_i64("RATE_LIMIT_MAX_REQUESTS", 100) as usize,
            db_max_connections: env_i64("DB_MAX_CONNECTIONS", 10) as u32,
            port: env_i64("PORT", 3000) as u16,
        };
        info!("{:<12} --> 설정 로드 완료: {:?}", "Config", config);
        config
    }
}

/// i64 환경 변수 파싱 (파싱 실패 시 기본값)
fn env_i64(key: &str, default: i64) -> i64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

// endregion: --- Config

// region:    --- Tests


// endregion: --- Tests
