//! Keep-alive pings for a live connection.

use std::time::Duration;

use eufy_motion_core::{FrameSink, TransportError};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

/// Default ping period.
pub const PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Repeating ping timer scoped to one connection.
///
/// The timer lives inside the attempt that created it; dropping the prober
/// cancels it.
#[derive(Debug)]
pub struct LivenessProber {
    interval: Interval,
    sent: u64,
}

impl LivenessProber {
    /// Start the timer. The first tick fires one `period` from now.
    #[must_use]
    pub fn start(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, sent: 0 }
    }

    /// Wait for the next tick.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }

    /// Send one ping.
    ///
    /// # Errors
    /// Returns error if the transport rejects the ping.
    pub async fn probe(&mut self, sink: &mut dyn FrameSink) -> Result<(), TransportError> {
        sink.ping().await?;
        self.sent += 1;
        tracing::trace!(sent = self.sent, "liveness probe sent");
        Ok(())
    }

    /// Pings sent so far.
    #[must_use]
    pub const fn probes_sent(&self) -> u64 {
        self.sent
    }
}
