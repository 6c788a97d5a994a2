#![forbid(unsafe_code)]

use std::time::Duration;

/// Configuration for a [`SegmentTracker`](crate::SegmentTracker).
#[derive(Clone, Debug)]
pub struct TrackerOptions {
    /// Lower bound on how far behind the live edge playback stays. The
    /// effective delay also honors the manifest's suggested presentation
    /// delay and the segment duration.
    pub live_delay: Duration,
    /// Signed bias, in segments, applied to the computed live start
    /// position. Policy knob; 0 trusts the delay arithmetic alone.
    pub live_start_offset: i64,
    /// Start position for static streams (beginning when unset).
    pub start_position: Option<Duration>,
    /// Bandwidth budget consulted by representation switching; unlimited
    /// when unset.
    pub max_bandwidth: Option<u64>,
    /// Floor for the reload cadence, protecting the origin from manifests
    /// that advertise pathologically small update periods.
    pub min_reload_interval: Duration,
    /// Deadline for the initial manifest load.
    pub open_timeout: Duration,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            live_delay: Duration::from_secs(10),
            live_start_offset: 0,
            start_position: None,
            max_bandwidth: None,
            min_reload_interval: Duration::from_secs(1),
            open_timeout: Duration::from_secs(15),
        }
    }
}

impl TrackerOptions {
    /// Set the configured minimum live delay.
    pub fn with_live_delay(mut self, delay: Duration) -> Self {
        self.live_delay = delay;
        self
    }

    /// Set the live start bias in segments.
    pub fn with_live_start_offset(mut self, offset: i64) -> Self {
        self.live_start_offset = offset;
        self
    }

    /// Set the start position for static streams.
    pub fn with_start_position(mut self, position: Duration) -> Self {
        self.start_position = Some(position);
        self
    }

    /// Set the bandwidth budget for representation switching.
    pub fn with_max_bandwidth(mut self, bandwidth: u64) -> Self {
        self.max_bandwidth = Some(bandwidth);
        self
    }

    /// Set the reload cadence floor.
    pub fn with_min_reload_interval(mut self, interval: Duration) -> Self {
        self.min_reload_interval = interval;
        self
    }

    /// Set the initial-load deadline.
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }
}
