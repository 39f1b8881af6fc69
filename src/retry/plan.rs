use std::str::FromStr;
use std::time::Duration;

use rand::Rng;

use crate::errors::Error;

/// Strategy for adding randomness to delay calculations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JitterStrategy {
    None,
    Full,
    Decorrelated,
}

/// Backoff for re-arming a background renewal after it failed.
#[derive(Clone, Debug)]
pub struct RetryPlan {
    /// Total renewal attempts per expiry, the timer-fired one included.
    pub max_attempts: u8,
    pub initial_delay: Duration,
    pub multiplier: f32,
    pub max_delay: Duration,
    pub jitter: JitterStrategy,
}

impl RetryPlan {
    pub fn new(
        max_attempts: u8,
        initial_delay: Duration,
        multiplier: f32,
        max_delay: Duration,
        jitter: JitterStrategy,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            multiplier,
            max_delay,
            jitter,
        }
    }

    pub fn default_plan() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_delay: Duration::from_secs(5 * 60),
            jitter: JitterStrategy::Full,
        }
    }

    /// A plan that never re-arms after a failed renewal.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default_plan()
        }
    }

    /// Whether another attempt may follow `attempt` failed ones.
    pub fn allows(&self, attempt: u8) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before `attempt` (2 is the first retry).
    pub fn delay_for_attempt(&self, attempt: u8, rng: &mut impl Rng) -> Duration {
        if attempt <= 2 {
            return self.apply_jitter(self.initial_delay.min(self.max_delay), rng);
        }
        let exp = (self.multiplier as f64).powi((attempt as i32) - 2);
        let delay = Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        self.apply_jitter(delay, rng)
    }

    fn apply_jitter(&self, delay: Duration, rng: &mut impl Rng) -> Duration {
        let factor = match self.jitter {
            JitterStrategy::None => 1.0,
            JitterStrategy::Full => rng.gen_range(0.0..1.0),
            JitterStrategy::Decorrelated => rng.gen_range(0.5..1.5),
        };
        delay.mul_f64(factor)
    }
}

impl FromStr for JitterStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(JitterStrategy::None),
            "full" => Ok(JitterStrategy::Full),
            "decorrelated" => Ok(JitterStrategy::Decorrelated),
            other => Err(Error::Config(format!(
                "Unknown jitter strategy '{}'; expected 'none', 'full' or 'decorrelated'",
                other
            ))),
        }
    }
}
