/// 입찰 요청 속도 제한
/// 사용자별 슬라이딩 윈도우. 제한기 자체의 장애로 입찰이 막히지 않도록
/// 잠금 실패 시에는 요청을 허용한다 (fail-open).
// region:    --- Imports
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

// endregion: --- Imports

// region:    --- Rate Limiter

pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    entries: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_ms: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_millis(window_ms),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// 요청 허용 여부 (허용 시 윈도우에 기록)
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let Ok(mut entries) = self.entries.lock() else {
            return true;
        };

        let window = entries.entry(key.to_string()).or_default();
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() >= self.max_requests {
            return false;
        }
        window.push_back(now);
        true
    }
}

// endregion: --- Rate Limiter

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_the_limit_then_rejects() {
        let limiter = RateLimiter::new(3, 10_000);
        assert!(limiter.check("u1"));
        assert!(limiter.check("u1"));
        assert!(limiter.check("u1"));
        assert!(!limiter.check("u1"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1, 10_000);
        assert!(limiter.check("u1"));
        assert!(limiter.check("u2"));
        assert!(!limiter.check("u1"));
    }

    #[test]
    fn window_expiry_frees_capacity() {
        let limiter = RateLimiter::new(1, 10);
        assert!(limiter.check("u1"));
        assert!(!limiter.check("u1"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(limiter.check("u1"));
    }
}

// endregion: --- Tests
