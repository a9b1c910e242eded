use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval};

/// Periodic timer polled by the session loop
///
/// Stopping drops the interval, so no tick can be observed after `stop`
/// returns.
pub(crate) struct TickTimer {
    period: Duration,
    interval: Option<Interval>,
}

impl TickTimer {
    pub(crate) fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            interval: None,
        }
    }

    pub(crate) fn period(&self) -> Duration {
        self.period
    }

    /// (Re)start with the first tick one period from now
    pub(crate) fn start(&mut self) {
        self.interval = Some(interval_at(Instant::now() + self.period, self.period));
    }

    pub(crate) fn stop(&mut self) {
        self.interval = None;
    }

    #[cfg(test)]
    pub(crate) fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Wait for the next tick; pending forever while stopped
    pub(crate) async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
