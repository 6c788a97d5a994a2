#![forbid(unsafe_code)]

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicI64, AtomicUsize, Ordering},
};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;

use crate::packet::{MediaPacket, MediaType};

#[derive(Clone, Copy)]
enum Stamp {
    TimePos,
    Pts,
}

impl Stamp {
    fn of(self, packet: &MediaPacket) -> i64 {
        match self {
            Stamp::TimePos => packet.time_pos,
            Stamp::Pts => packet.pts,
        }
    }
}

#[derive(Default)]
struct Inner {
    packets: VecDeque<MediaPacket>,
    /// Index of the next packet to hand out. `== packets.len()` when drained.
    cursor: usize,
    /// Codec config carried by a trimmed history packet, attached to the
    /// next popped packet so decoder reconfiguration survives trimming.
    dropped_extra_data: Option<Bytes>,
    /// Fallback for packets that declare no duration of their own.
    default_packet_duration: i64,
}

impl Inner {
    fn effective_duration(&self, packet: &MediaPacket) -> i64 {
        if packet.duration > 0 {
            packet.duration
        } else {
            self.default_packet_duration
        }
    }
}

/// Ordered buffer of demuxed packets for one elementary stream.
///
/// Producer (demux) and consumer (playback) may run on different threads:
/// structural mutation goes through one mutex, while the bookkeeping reads
/// (`len`, `duration`, timestamps) are lock-free atomics so position queries
/// never wait behind a producer burst.
///
/// Consumed packets are retained as backward history until a clearing call
/// trims them; the history kept behind the read cursor is bounded by
/// [`set_max_backward_duration`](Self::set_max_backward_duration).
pub struct MediaPacketQueue {
    inner: Mutex<Inner>,
    media_type: MediaType,
    /// Sum of declared durations at/after the read cursor.
    duration: AtomicI64,
    /// Sum of declared durations of everything retained.
    total_duration: AtomicI64,
    len: AtomicUsize,
    max_backward_duration: AtomicI64,
    first_time_pos: AtomicI64,
    last_time_pos: AtomicI64,
    current_pts: AtomicI64,
    last_pts: AtomicI64,
}

const STAMP_UNSET: i64 = i64::MIN;

impl MediaPacketQueue {
    pub fn new(media_type: MediaType) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            media_type,
            duration: AtomicI64::new(0),
            total_duration: AtomicI64::new(0),
            len: AtomicUsize::new(0),
            max_backward_duration: AtomicI64::new(0),
            first_time_pos: AtomicI64::new(STAMP_UNSET),
            last_time_pos: AtomicI64::new(STAMP_UNSET),
            current_pts: AtomicI64::new(STAMP_UNSET),
            last_pts: AtomicI64::new(STAMP_UNSET),
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// Append a packet. O(1) amortized.
    pub fn add_packet(&self, packet: MediaPacket) {
        let mut inner = self.inner.lock();
        let eff = inner.effective_duration(&packet);
        self.duration.fetch_add(eff, Ordering::Release);
        self.total_duration.fetch_add(eff, Ordering::Release);
        self.len.fetch_add(1, Ordering::Release);
        self.last_time_pos.store(packet.time_pos, Ordering::Release);
        self.last_pts.store(packet.pts, Ordering::Release);
        if inner.packets.is_empty() {
            self.first_time_pos.store(packet.time_pos, Ordering::Release);
        }
        if inner.cursor == inner.packets.len() {
            self.current_pts.store(packet.pts, Ordering::Release);
        }
        inner.packets.push_back(packet);
    }

    /// Pop the packet at the read cursor, advancing it.
    ///
    /// `None` means the consumer caught up with the producer ("needs more
    /// data"), not an error. The popped packet stays in the queue as
    /// backward history until trimmed.
    pub fn pop_packet(&self) -> Option<MediaPacket> {
        let mut inner = self.inner.lock();
        if inner.cursor >= inner.packets.len() {
            return None;
        }
        let mut packet = inner.packets[inner.cursor].clone();
        let eff = inner.effective_duration(&packet);
        inner.cursor += 1;
        self.duration.fetch_sub(eff, Ordering::Release);
        self.current_pts.store(
            inner
                .packets
                .get(inner.cursor)
                .map_or(STAMP_UNSET, |p| p.pts),
            Ordering::Release,
        );
        match inner.dropped_extra_data.take() {
            Some(extra) if packet.extra_data.is_none() => packet.extra_data = Some(extra),
            _ => {}
        }
        Some(packet)
    }

    /// Remove everything; used on hard flush (seek, stop).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.packets.clear();
        inner.cursor = 0;
        inner.dropped_extra_data = None;
        self.duration.store(0, Ordering::Release);
        self.total_duration.store(0, Ordering::Release);
        self.len.store(0, Ordering::Release);
        self.first_time_pos.store(STAMP_UNSET, Ordering::Release);
        self.last_time_pos.store(STAMP_UNSET, Ordering::Release);
        self.current_pts.store(STAMP_UNSET, Ordering::Release);
        self.last_pts.store(STAMP_UNSET, Ordering::Release);
    }

    /// Reset the read cursor to the beginning without discarding packets.
    pub fn rewind(&self) {
        let mut inner = self.inner.lock();
        inner.cursor = 0;
        self.duration
            .store(self.total_duration.load(Ordering::Acquire), Ordering::Release);
        self.current_pts.store(
            inner.packets.front().map_or(STAMP_UNSET, |p| p.pts),
            Ordering::Release,
        );
    }

    /// Trim history older than `time_pos`, keeping at most the configured
    /// backward duration behind the read cursor. Never removes the packet at
    /// or after the cursor. Returns the media time dropped.
    pub fn clear_before_time_pos(&self, time_pos: i64) -> i64 {
        self.trim_front(time_pos, Stamp::TimePos)
    }

    /// Same as [`clear_before_time_pos`](Self::clear_before_time_pos), keyed
    /// on presentation timestamps.
    pub fn clear_before_pts(&self, pts: i64) -> i64 {
        self.trim_front(pts, Stamp::Pts)
    }

    fn trim_front(&self, before: i64, stamp: Stamp) -> i64 {
        let cap = self.max_backward_duration.load(Ordering::Acquire);
        let target = before.saturating_sub(cap);
        let mut inner = self.inner.lock();
        let mut dropped = 0i64;

        while inner.cursor > 0 {
            let backward = self.total_duration.load(Ordering::Acquire)
                - self.duration.load(Ordering::Acquire);
            let front = &inner.packets[0];
            if backward <= cap && stamp.of(front) >= target {
                break;
            }
            let eff = inner.effective_duration(front);
            let Some(removed) = inner.packets.pop_front() else {
                break;
            };
            if let Some(extra) = removed.extra_data {
                inner.dropped_extra_data = Some(extra);
            }
            inner.cursor -= 1;
            dropped += eff;
            self.total_duration.fetch_sub(eff, Ordering::Release);
            self.len.fetch_sub(1, Ordering::Release);
        }

        self.first_time_pos.store(
            inner.packets.front().map_or(STAMP_UNSET, |p| p.time_pos),
            Ordering::Release,
        );
        if dropped > 0 {
            trace!(dropped, retained = inner.packets.len(), "queue: trimmed history");
        }
        dropped
    }

    /// Discard packets at or after `time_pos`; used when a seek invalidates
    /// buffered-ahead data.
    pub fn clear_after_time_pos(&self, time_pos: i64) {
        let mut inner = self.inner.lock();
        while let Some(last) = inner.packets.back() {
            if last.time_pos < time_pos {
                break;
            }
            let eff = inner.effective_duration(last);
            let idx = inner.packets.len() - 1;
            inner.packets.pop_back();
            if idx < inner.cursor {
                // Removed a consumed packet; the cursor shrinks with the queue.
                inner.cursor = idx;
                self.duration.store(0, Ordering::Release);
            } else {
                self.duration.fetch_sub(eff, Ordering::Release);
            }
            self.total_duration.fetch_sub(eff, Ordering::Release);
            self.len.fetch_sub(1, Ordering::Release);
        }
        self.last_time_pos.store(
            inner.packets.back().map_or(STAMP_UNSET, |p| p.time_pos),
            Ordering::Release,
        );
        self.last_pts.store(
            inner.packets.back().map_or(STAMP_UNSET, |p| p.pts),
            Ordering::Release,
        );
        self.current_pts.store(
            inner
                .packets
                .get(inner.cursor)
                .map_or(STAMP_UNSET, |p| p.pts),
            Ordering::Release,
        );
        if inner.packets.is_empty() {
            self.first_time_pos.store(STAMP_UNSET, Ordering::Release);
        }
    }

    /// Timeline position of the closest key frame at or before `time_pos`.
    pub fn key_time_pos_before(&self, time_pos: i64) -> Option<i64> {
        let inner = self.inner.lock();
        inner
            .packets
            .iter()
            .filter(|p| p.key && p.time_pos <= time_pos)
            .map(|p| p.time_pos)
            .max()
    }

    /// Presentation timestamp of the first key frame at or after `pts`.
    pub fn first_key_pts(&self, pts: i64) -> Option<i64> {
        let inner = self.inner.lock();
        inner
            .packets
            .iter()
            .filter(|p| p.key && p.pts >= pts)
            .map(|p| p.pts)
            .min()
    }

    /// Timeline position of the last key frame in the queue.
    pub fn last_key_time_pos(&self) -> Option<i64> {
        let inner = self.inner.lock();
        inner
            .packets
            .iter()
            .rev()
            .find(|p| p.key)
            .map(|p| p.time_pos)
    }

    /// First position at or after the read cursor from which a
    /// representation/segment switch resumes without a visible glitch: a key
    /// frame whose boundary with the preceding packet has no timestamp
    /// discontinuity.
    ///
    /// Returns the position and how many queued packets would be discarded
    /// to reach it, so callers can bound the cost of switching.
    pub fn find_seamless_point(&self) -> Option<(i64, usize)> {
        let inner = self.inner.lock();
        for idx in inner.cursor..inner.packets.len() {
            let packet = &inner.packets[idx];
            if !packet.key {
                continue;
            }
            if idx > 0 {
                let prev = &inner.packets[idx - 1];
                let expected = prev.time_pos + inner.effective_duration(prev);
                let tolerance = inner.effective_duration(prev) / 2;
                if (packet.time_pos - expected).abs() > tolerance {
                    continue;
                }
            }
            return Some((packet.time_pos, idx - inner.cursor));
        }
        None
    }

    // O(1) bookkeeping reads, safe to call concurrently with add_packet.

    /// Number of retained packets, backward history included.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffered media time ahead of the read cursor.
    pub fn duration(&self) -> i64 {
        self.duration.load(Ordering::Acquire)
    }

    /// Media time of everything retained, backward history included.
    pub fn total_duration(&self) -> i64 {
        self.total_duration.load(Ordering::Acquire)
    }

    /// Presentation timestamp at the read cursor.
    pub fn pts(&self) -> Option<i64> {
        stamp_opt(self.current_pts.load(Ordering::Acquire))
    }

    pub fn last_pts(&self) -> Option<i64> {
        stamp_opt(self.last_pts.load(Ordering::Acquire))
    }

    pub fn first_time_pos(&self) -> Option<i64> {
        stamp_opt(self.first_time_pos.load(Ordering::Acquire))
    }

    pub fn last_time_pos(&self) -> Option<i64> {
        stamp_opt(self.last_time_pos.load(Ordering::Acquire))
    }

    /// Configure the retained-history cap consulted by the clearing calls.
    pub fn set_max_backward_duration(&self, duration: i64) {
        self.max_backward_duration.store(duration, Ordering::Release);
    }

    pub fn max_backward_duration(&self) -> i64 {
        self.max_backward_duration.load(Ordering::Acquire)
    }

    /// Fallback duration for packets that declare none (common for audio
    /// streams where the demuxer only stamps timestamps).
    pub fn set_default_packet_duration(&self, duration: i64) {
        self.inner.lock().default_packet_duration = duration;
    }

    pub fn default_packet_duration(&self) -> i64 {
        self.inner.lock().default_packet_duration
    }
}

fn stamp_opt(value: i64) -> Option<i64> {
    (value != STAMP_UNSET).then_some(value)
}
