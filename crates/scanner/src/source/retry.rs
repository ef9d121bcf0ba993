//! 재시도 상태 기계
//!
//! 재시도 루프를 명시적인 상태 전이로 표현합니다.
//!
//! ```text
//! Attempting(0) --success--> Succeeded
//!      |  \--terminal--> Failed
//!      | retryable (n < max_retries)
//!      v
//! Backoff(0, delay) --elapsed--> Attempting(1) --> ...
//!                                    | retryable (n == max_retries)
//!                                    v
//!                                  Failed
//! ```
//!
//! 지연은 `base * 2^n`을 `max_delay`로 자른 뒤, jitter가 켜져 있으면
//! `[d/2, d]` 구간에서 무작위로 고릅니다.

use std::time::Duration;

use rand::Rng;

/// 재시도 정책
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 최초 시도 이후 최대 재시도 횟수
    pub max_retries: u32,
    /// 기본 지연
    pub base_delay: Duration,
    /// 최대 지연
    pub max_delay: Duration,
    /// jitter 적용 여부
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// jitter 적용 전 지연: `min(base * 2^attempt, max_delay)`
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// `attempt`번째 실패 뒤의 대기 시간
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let capped = self.capped_delay(attempt);
        if !self.jitter {
            return capped;
        }
        let capped_ms = capped.as_millis() as u64;
        let half = capped_ms / 2;
        let jittered = half + rand::rng().random_range(0..=capped_ms - half);
        Duration::from_millis(jittered)
    }

    /// 최대 시도 횟수 (최초 1회 + 재시도)
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// 한 번의 시도 결과 분류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 성공
    Success,
    /// 재시도하면 회복될 수 있는 실패 (429/5xx/연결 실패)
    Retryable,
    /// 재시도해도 소용없는 실패
    Terminal,
}

/// 재시도 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// n번째 시도 중 (0부터)
    Attempting(u32),
    /// n번째 시도 실패 후 대기 중
    Backoff {
        /// 실패한 시도 번호
        attempt: u32,
        /// 대기 시간
        delay: Duration,
    },
    /// 성공으로 종료
    Succeeded,
    /// 실패로 종료
    Failed,
}

impl RetryState {
    /// 종료 상태인지 확인합니다.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// 재시도 상태 기계
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    state: RetryState,
    attempts: u32,
}

impl RetryMachine {
    /// `Attempting(0)` 상태로 시작합니다.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Attempting(0),
            attempts: 0,
        }
    }

    /// 현재 상태
    pub fn state(&self) -> RetryState {
        self.state
    }

    /// 지금까지 완료된 시도 횟수
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// `Attempting` 상태에서 시도 결과를 반영합니다.
    ///
    /// 다른 상태에서는 아무것도 바꾸지 않습니다.
    pub fn record(&mut self, outcome: AttemptOutcome) -> RetryState {
        let RetryState::Attempting(n) = self.state else {
            return self.state;
        };
        self.attempts += 1;
        self.state = match outcome {
            AttemptOutcome::Success => RetryState::Succeeded,
            AttemptOutcome::Terminal => RetryState::Failed,
            AttemptOutcome::Retryable if n < self.policy.max_retries => RetryState::Backoff {
                attempt: n,
                delay: self.policy.delay_for(n),
            },
            AttemptOutcome::Retryable => RetryState::Failed,
        };
        self.state
    }

    /// `Backoff` 대기가 끝났음을 반영합니다.
    pub fn backoff_elapsed(&mut self) -> RetryState {
        if let RetryState::Backoff { attempt, .. } = self.state {
            self.state = RetryState::Attempting(attempt + 1);
        }
        self.state
    }
}
