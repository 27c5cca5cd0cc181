use rand::Rng;
use std::time::Duration;

/// How long to wait after the `attempt`-th failure (1-based) before trying again.
pub trait Backoff {
    fn delay(&self, attempt: u32) -> Duration;
}

impl<B: Backoff + ?Sized> Backoff for Box<B> {
    fn delay(&self, attempt: u32) -> Duration {
        (**self).delay(attempt)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Fixed(pub Duration);

impl Backoff for Fixed {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

/// Doubles from `base` on every attempt, never exceeding `max`.
#[derive(derive_new::new, Debug, Clone, Copy)]
pub struct Exponential {
    base: Duration,
    max: Duration,
}

impl Backoff for Exponential {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Full jitter: uniform between zero and whatever `inner` would have waited.
#[derive(derive_new::new, Debug, Clone, Copy)]
pub struct Jittered<B> {
    inner: B,
}

impl<B: Backoff> Backoff for Jittered<B> {
    fn delay(&self, attempt: u32) -> Duration {
        let ceiling = self.inner.delay(attempt);
        if ceiling.is_zero() {
            return ceiling;
        }
        rand::thread_rng().gen_range(Duration::ZERO..=ceiling)
    }
}
