//! 재연결 백오프 정책
//!
//! [`BackoffPolicy`]는 n번째 재시도 전에 얼마나 기다릴지를 계산하는 순수 값 객체입니다.
//! 실제 sleep 과 시도 횟수 집계는 [`TransportSession`](crate::transport::TransportSession)이
//! 담당합니다.
//!
//! # 지연 계산
//! ```text
//! raw     = initial × multiplier^attempt
//! capped  = min(raw, max)
//! delay   = uniform[capped × (1 − jitter), capped × (1 + jitter)]   (jitter > 0)
//!         = capped                                                  (jitter = 0)
//! ```

use std::time::Duration;

use rand::Rng;
use tailpost_core::config::BackoffConfig;

use crate::error::AgentError;

/// 지수 백오프 + 지터 정책
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// 첫 재시도 지연
    pub initial_delay: Duration,
    /// 지터 적용 전 지연 상한
    pub max_delay: Duration,
    /// 시도마다 곱해지는 배수 (>= 1.0)
    pub multiplier: f64,
    /// 지터 비율 (0.0 ~ 1.0)
    pub jitter_factor: f64,
    /// 최대 재시도 횟수. `None`이면 무제한
    pub max_attempts: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: None,
        }
    }
}

impl BackoffPolicy {
    /// core 설정에서 정책을 생성합니다.
    pub fn from_core(core: &BackoffConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(core.initial_delay_ms),
            max_delay: Duration::from_millis(core.max_delay_ms),
            multiplier: core.multiplier,
            jitter_factor: core.jitter_factor,
            max_attempts: core.max_attempts,
        }
    }

    /// 지터 없는 고정 지연 정책 (테스트 및 결정적 재시도용)
    pub fn fixed(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    /// 정책 불변식을 검증합니다.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.initial_delay > self.max_delay {
            return Err(AgentError::Config {
                field: "backoff.initial_delay".to_owned(),
                reason: "must not exceed max_delay".to_owned(),
            });
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(AgentError::Config {
                field: "backoff.multiplier".to_owned(),
                reason: format!("must be a finite value >= 1.0, got {}", self.multiplier),
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(AgentError::Config {
                field: "backoff.jitter_factor".to_owned(),
                reason: format!("must be within 0.0-1.0, got {}", self.jitter_factor),
            });
        }
        Ok(())
    }

    /// 지터 적용 전 지연 (`min(initial × multiplier^attempt, max)`)
    ///
    /// 부동소수점으로 계산하며, 상한에 도달하면 곧바로 `max_delay`를 반환하므로
    /// 큰 `attempt`에서도 overflow 가 없습니다.
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 || self.initial_delay.is_zero() {
            return self.initial_delay.min(self.max_delay);
        }

        let max = self.max_delay.as_secs_f64();
        let raw = self.initial_delay.as_secs_f64() * self.multiplier.powf(f64::from(attempt));
        if !raw.is_finite() || raw >= max {
            return self.max_delay;
        }
        secs_to_duration(raw)
            .max(self.initial_delay)
            .min(self.max_delay)
    }

    /// `attempt` 번째 재시도 전 대기 시간을 계산합니다 (0부터 시작).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    /// 주어진 난수 생성기로 지연을 계산합니다.
    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let capped = self.capped_delay(attempt);
        if self.jitter_factor <= 0.0 {
            return capped;
        }
        let (low, high) = self.jitter_range_secs(capped);
        secs_to_duration(rng.gen_range(low..=high))
    }

    /// `attempt`에 대해 가능한 지연의 최소/최대값 (양끝 포함)
    pub fn jitter_bounds(&self, attempt: u32) -> (Duration, Duration) {
        let capped = self.capped_delay(attempt);
        if self.jitter_factor <= 0.0 {
            return (capped, capped);
        }
        let (low, high) = self.jitter_range_secs(capped);
        (secs_to_duration(low), secs_to_duration(high))
    }

    /// 연속 실패 횟수가 허용 한도를 넘었는지 확인합니다.
    ///
    /// `max_attempts = M`이면 최초 시도 1회 + 재시도 M회, 즉 총 M+1회
    /// 연속 실패 후 소진됩니다.
    pub fn is_exhausted(&self, consecutive_failures: u32) -> bool {
        matches!(self.max_attempts, Some(max) if consecutive_failures > max)
    }

    fn jitter_range_secs(&self, capped: Duration) -> (f64, f64) {
        let secs = capped.as_secs_f64();
        let low = (secs * (1.0 - self.jitter_factor)).max(0.0);
        let high = secs * (1.0 + self.jitter_factor);
        (low, high)
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
