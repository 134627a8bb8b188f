//! Fixed-rate gating for loop bodies.
//!
//! A [`Throttler`] spaces out the starts of successive invocations: each
//! [`call`](Throttler::call) waits out whatever remains of the period
//! before running its body, so starts are at least one period apart no
//! matter how fast the bodies themselves finish. The wait is an ordinary
//! suspension point, which keeps throttled loops cancellable.

use crate::cx::Cx;
use crate::error::Result;
use crate::types::Time;

use std::future::Future;
use std::time::Duration;

/// A gate that permits at most one iteration per period.
#[derive(Debug, Clone)]
pub struct Throttler {
    period: Duration,
    last_fire: Option<Time>,
}

impl Throttler {
    /// A throttler allowing one call per `period`.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            last_fire: None,
        }
    }

    /// A throttler allowing `per_second` calls each second.
    ///
    /// A non-positive rate disables pacing entirely.
    #[must_use]
    pub fn from_rate(per_second: f64) -> Self {
        let period = if per_second > 0.0 {
            Duration::from_secs_f64(1.0 / per_second)
        } else {
            Duration::ZERO
        };
        Self::new(period)
    }

    /// The configured interval between permitted starts.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Runs `body`, first waiting out the remainder of the period.
    ///
    /// The first call runs immediately. Pacing is measured start to start;
    /// time the body spends running is not counted against the budget.
    /// The wait observes pending interrupts like any other sleep.
    pub async fn call<T, F, Fut>(&mut self, cx: &Cx, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(last) = self.last_fire {
            let next_allowed = last + self.period;
            let now = cx.now();
            if now < next_allowed {
                let wait = next_allowed.duration_since(now);
                cx.state.borrow().metrics.throttle_waited(wait);
                cx.sleep_until(next_allowed).await?;
            }
        }
        self.last_fire = Some(cx.now());
        body().await
    }

    /// Repeats `body` at the throttled rate.
    ///
    /// Runs `iterations` times when given, or until the body errors or the
    /// task is cancelled when `None`.
    pub async fn throttled_loop<F, Fut>(
        &mut self,
        cx: &Cx,
        iterations: Option<u64>,
        mut body: F,
    ) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        match iterations {
            Some(count) => {
                for _ in 0..count {
                    self.call(cx, &mut body).await?;
                }
            }
            None => loop {
                self.call(cx, &mut body).await?;
            },
        }
        Ok(())
    }
}
