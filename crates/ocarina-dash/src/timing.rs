#![forbid(unsafe_code)]

//! Buffering-window and live-delay arithmetic.
//!
//! Pure functions over a playlist snapshot; the tracker wires them to its
//! current snapshot and configuration. All results are wall-clock durations.

use std::time::Duration;

use crate::{options::TrackerOptions, playlist::Playlist};

/// Delay factor, in segments, for conventional live streams.
const LIVE_DELAY_SEGMENTS: u32 = 3;
/// Delay factor, in segments, for low-latency streams.
const LOW_LATENCY_DELAY_SEGMENTS: u32 = 1;

const DEFAULT_MIN_BUFFERING: Duration = Duration::from_secs(6);
const DEFAULT_MAX_BUFFERING: Duration = Duration::from_secs(30);
/// Fallback reload period when a live manifest gives no update hints at all.
const DEFAULT_UPDATE_PERIOD: Duration = Duration::from_secs(2);

pub(crate) fn is_low_latency(playlist: &Playlist) -> bool {
    playlist.low_latency
}

/// How far behind the live edge playback intentionally stays.
///
/// `max(configured delay, suggested presentation delay, k × segment
/// duration)` where `k` shrinks for low-latency streams. Always at least one
/// segment duration, so a freshly published segment has time to become
/// fetchable.
pub(crate) fn live_delay(
    playlist: &Playlist,
    options: &TrackerOptions,
    segment_duration: Duration,
) -> Duration {
    let factor = if is_low_latency(playlist) {
        LOW_LATENCY_DELAY_SEGMENTS
    } else {
        LIVE_DELAY_SEGMENTS
    };
    options
        .live_delay
        .max(playlist.suggested_presentation_delay.unwrap_or(Duration::ZERO))
        .max(segment_duration * factor)
        .max(segment_duration)
}

/// Minimum media time the controller keeps buffered before starting.
pub(crate) fn min_buffering(playlist: &Playlist) -> Duration {
    playlist
        .min_buffer_time
        .unwrap_or(Duration::ZERO)
        .max(DEFAULT_MIN_BUFFERING)
}

/// Upper bound on buffered-ahead media time.
pub(crate) fn max_buffering(playlist: &Playlist) -> Duration {
    playlist
        .max_buffer_time
        .unwrap_or(Duration::ZERO)
        .max(DEFAULT_MAX_BUFFERING)
        .max(min_buffering(playlist))
}

/// Distance kept between the live edge and the playable position; used by
/// the controller to pace prefetch. Static streams are bounded by the
/// buffering cap instead.
pub(crate) fn buffering_offset(
    playlist: &Playlist,
    options: &TrackerOptions,
    segment_duration: Duration,
) -> Duration {
    if playlist.is_live() {
        live_delay(playlist, options, segment_duration)
    } else {
        max_buffering(playlist)
    }
}

/// Period between scheduled manifest reloads.
///
/// Low-latency streams refresh at half a segment duration so newly published
/// segments are seen promptly; everything else trusts the manifest's minimum
/// update period. Floored by the configured cadence minimum.
pub(crate) fn reload_interval(
    playlist: &Playlist,
    options: &TrackerOptions,
    segment_duration: Duration,
) -> Duration {
    let base = playlist.minimum_update_period.unwrap_or_else(|| {
        if segment_duration > Duration::ZERO {
            segment_duration
        } else {
            DEFAULT_UPDATE_PERIOD
        }
    });
    let interval = if is_low_latency(playlist) && segment_duration > Duration::ZERO {
        base.min(segment_duration / 2)
    } else {
        base
    };
    interval.max(options.min_reload_interval)
}
