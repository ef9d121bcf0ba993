//! 슬라이딩 윈도우 rate limiter
//!
//! [`RateLimiter`]는 외부 취약점 소스에 대한 요청 예산을 관리합니다.
//! 윈도우 W 안에서 허용된 요청 시각을 기록해 두고, 기록이 K개 미만일 때만
//! 새 요청을 허용합니다. 한도는 소스의 속성이므로 프로세스 전체에서
//! `Arc<RateLimiter>` 하나를 모든 스캔이 공유합니다.
//!
//! 대기는 `tokio::time::sleep_until`로 이루어지므로 busy-wait이 없고,
//! 테스트에서는 tokio의 paused clock으로 시간을 빨리 감을 수 있습니다.
//!
//! ```
//! # async fn example() -> Result<(), dephealth_scanner::ScannerError> {
//! use std::time::Duration;
//! use dephealth_scanner::{RateLimitPolicy, RateLimiter};
//!
//! let limiter = RateLimiter::new(RateLimitPolicy::ANONYMOUS, Duration::from_secs(60));
//! limiter.acquire().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use dephealth_core::metrics as m;

use crate::config::RateLimitPolicy;
use crate::error::ScannerError;

/// 슬라이딩 윈도우 rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    max_wait: Duration,
    /// 윈도우 안에서 허용된 요청 시각 (오래된 순)
    granted: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// 정책과 최대 대기 시간으로 limiter를 생성합니다.
    pub fn new(policy: RateLimitPolicy, max_wait: Duration) -> Self {
        Self {
            policy,
            max_wait,
            granted: Mutex::new(VecDeque::with_capacity(policy.max_requests)),
        }
    }

    /// 적용 중인 정책
    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// 최대 대기 시간
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// 요청 슬롯 하나를 얻습니다.
    ///
    /// 슬롯이 없으면 가장 오래된 기록이 윈도우 밖으로 나갈 때까지 대기합니다.
    /// 다음 슬롯이 최대 대기 시간 안에 생길 수 없으면 즉시
    /// `RateLimitTimeout`을 반환합니다.
    ///
    /// 취소에 안전합니다. 슬롯은 허용되는 순간에만 기록됩니다.
    pub async fn acquire(&self) -> Result<(), ScannerError> {
        let started = Instant::now();
        let deadline = deadline_after(started, self.max_wait);

        loop {
            let next_slot = {
                let mut granted = self.granted.lock().await;
                let now = Instant::now();
                prune(&mut granted, now, self.policy.window);

                if granted.len() < self.policy.max_requests {
                    granted.push_back(now);
                    let waited = now.duration_since(started);
                    histogram!(m::SCANNER_RATE_LIMIT_WAIT_SECONDS).record(waited.as_secs_f64());
                    if !waited.is_zero() {
                        debug!(waited_ms = waited.as_millis() as u64, "rate limit slot acquired");
                    }
                    return Ok(());
                }

                match granted.front() {
                    Some(oldest) => deadline_after(*oldest, self.policy.window),
                    // max_requests == 0: 슬롯이 생기지 않음
                    None => return Err(self.timed_out(started)),
                }
            };

            if next_slot > deadline {
                return Err(self.timed_out(started));
            }

            tokio::time::sleep_until(next_slot).await;
        }
    }

    fn timed_out(&self, started: Instant) -> ScannerError {
        let waited_ms = Instant::now().duration_since(started).as_millis() as u64;
        counter!(m::SCANNER_RATE_LIMIT_TIMEOUTS_TOTAL).increment(1);
        warn!(
            waited_ms,
            max_wait_ms = self.max_wait.as_millis() as u64,
            "rate limit wait would exceed maximum"
        );
        ScannerError::RateLimitTimeout { waited_ms }
    }

    /// 지금 바로 사용할 수 있는 슬롯 수
    pub async fn available(&self) -> usize {
        let mut granted = self.granted.lock().await;
        prune(&mut granted, Instant::now(), self.policy.window);
        self.policy.max_requests.saturating_sub(granted.len())
    }
}

/// `start + wait`을 계산하되, 넘치면 약 30년 뒤로 고정합니다.
pub(crate) fn deadline_after(start: Instant, wait: Duration) -> Instant {
    start
        .checked_add(wait)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

fn prune(granted: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = granted.front() {
        if now.duration_since(oldest) >= window {
            granted.pop_front();
        } else {
            break;
        }
    }
}
