#![forbid(unsafe_code)]

//! Per-representation segment tracking.
//!
//! A [`SegmentTracker`] turns a playback position into concrete
//! [`DashSegment`] references against the current playlist snapshot, and for
//! live streams owns a background worker that refreshes the snapshot on the
//! manifest's cadence. Queries are synchronous and cheap: they read one
//! snapshot pointer under a lock and never wait behind a reload in flight.

use std::{
    sync::{
        atomic::{AtomicU64, AtomicU8, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

use chrono::Utc;
use ocarina_io::{read_all, ByteRange, DataSource, InterruptFlag};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, trace, warn};
use url::Url;

use crate::{
    error::{DashError, DashResult},
    options::TrackerOptions,
    playlist::{
        rescale_to_us, AdaptationSet, ManifestParser, Playlist, Representation, SegmentIndex,
        StreamType,
    },
    rate_limiter::ReloadRateLimiter,
    segment::{fill_template, DashSegment, SegmentKind, SEGMENT_NUMBER_UNSET},
    sidx::SidxBox,
    timing,
};

const STATE_UNINITIALIZED: u8 = 0;
const STATE_INITIALIZING: u8 = 1;
const STATE_READY: u8 = 2;
const STATE_STOPPED: u8 = 3;

/// Lifecycle of a tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerState {
    Uninitialized,
    Initializing,
    Ready,
    Stopped,
}

/// Static facts about the tracked representation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub bandwidth: u64,
    pub lang: Option<String>,
}

#[derive(Default)]
struct Wake {
    /// Single-slot forced-reload request; re-requests coalesce into one
    /// fetch.
    reload_pending: bool,
    stop: bool,
}

struct Shared {
    playlist: RwLock<Option<Arc<Playlist>>>,
    /// Segments synthesized from a `sidx` index for `Indexed`
    /// representations.
    indexed: RwLock<Vec<DashSegment>>,
    current_segment: AtomicU64,
    state: AtomicU8,
    interrupt: InterruptFlag,
    wake: Mutex<Wake>,
    cond: Condvar,
}

impl Shared {
    fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }
}

/// Tracks one representation of one adaptation set.
///
/// The tracker owns its transport's interrupt hook: `interrupt(true)` (and
/// drop) flip it to abort in-flight fetches, so a source instance should not
/// be shared with unrelated consumers.
pub struct SegmentTracker {
    shared: Arc<Shared>,
    source: Arc<dyn DataSource>,
    parser: Arc<dyn ManifestParser>,
    limiter: Arc<ReloadRateLimiter>,
    options: TrackerOptions,
    manifest_url: Url,
    adaptation_id: u32,
    representation_id: String,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SegmentTracker {
    pub fn new(
        manifest_url: Url,
        adaptation_id: u32,
        representation_id: impl Into<String>,
        source: Arc<dyn DataSource>,
        parser: Arc<dyn ManifestParser>,
        limiter: Arc<ReloadRateLimiter>,
        options: TrackerOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                playlist: RwLock::new(None),
                indexed: RwLock::new(Vec::new()),
                current_segment: AtomicU64::new(SEGMENT_NUMBER_UNSET),
                state: AtomicU8::new(STATE_UNINITIALIZED),
                interrupt: InterruptFlag::new(),
                wake: Mutex::new(Wake::default()),
                cond: Condvar::new(),
            }),
            source,
            parser,
            limiter,
            options,
            manifest_url,
            adaptation_id,
            representation_id: representation_id.into(),
            worker: Mutex::new(None),
        }
    }

    // Lifecycle

    /// Fetch and parse the manifest synchronously on the caller's thread.
    ///
    /// On success the tracker is `Ready` and, for live manifests, the reload
    /// worker is running.
    pub fn init(&self) -> DashResult<()> {
        match self.shared.state.compare_exchange(
            STATE_UNINITIALIZED,
            STATE_INITIALIZING,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(STATE_STOPPED) => return Err(DashError::Interrupted),
            Err(_) => return Ok(()), // already initializing or ready
        }

        let started = Instant::now();
        let playlist = match load_playlist(
            self.source.as_ref(),
            self.parser.as_ref(),
            &self.manifest_url,
            &self.shared.interrupt,
        ) {
            Ok(playlist) => playlist,
            Err(e) => {
                self.shared
                    .state
                    .store(STATE_UNINITIALIZED, Ordering::Release);
                return Err(e);
            }
        };
        if started.elapsed() > self.options.open_timeout {
            self.shared
                .state
                .store(STATE_UNINITIALIZED, Ordering::Release);
            return Err(DashError::Timeout);
        }

        let live = playlist.is_live();
        debug!(
            url = %self.manifest_url,
            live,
            adaptation = self.adaptation_id,
            representation = %self.representation_id,
            "ocarina-dash: tracker initialized"
        );
        *self.shared.playlist.write() = Some(Arc::new(playlist));
        self.limiter.publish();
        self.shared.state.store(STATE_READY, Ordering::Release);

        if live {
            self.spawn_worker();
        }
        Ok(())
    }

    /// Cooperative cancellation.
    ///
    /// `interrupt(true)` moves the tracker to `Stopped`: queries return the
    /// not-available sentinel, the in-flight fetch aborts within the
    /// transport timeout, and the reload worker exits. `interrupt(false)`
    /// only clears the transport hook; a stopped tracker stays stopped.
    pub fn interrupt(&self, flag: bool) {
        if flag {
            debug!(url = %self.manifest_url, "ocarina-dash: tracker interrupted");
            self.shared.state.store(STATE_STOPPED, Ordering::Release);
            self.shared.interrupt.set(true);
            self.source.interrupt(true);
            let mut wake = self.shared.wake.lock();
            wake.stop = true;
            self.shared.cond.notify_all();
        } else {
            self.shared.interrupt.set(false);
            self.source.interrupt(false);
        }
    }

    /// Force a reload outside the schedule.
    ///
    /// Coalesces with an in-flight scheduled reload; at most one manifest
    /// fetch is outstanding per tracker.
    pub fn reload_playlist(&self) -> DashResult<()> {
        if self.shared.state() == STATE_STOPPED {
            return Err(DashError::Interrupted);
        }
        if self.worker.lock().is_some() {
            let mut wake = self.shared.wake.lock();
            wake.reload_pending = true;
            self.shared.cond.notify_all();
            return Ok(());
        }

        // No worker running (static manifest): reload on the caller's thread.
        let playlist = load_playlist(
            self.source.as_ref(),
            self.parser.as_ref(),
            &self.manifest_url,
            &self.shared.interrupt,
        )?;
        *self.shared.playlist.write() = Some(Arc::new(playlist));
        self.limiter.publish();
        Ok(())
    }

    pub fn state(&self) -> TrackerState {
        match self.shared.state() {
            STATE_INITIALIZING => TrackerState::Initializing,
            STATE_READY => TrackerState::Ready,
            STATE_STOPPED => TrackerState::Stopped,
            _ => TrackerState::Uninitialized,
        }
    }

    pub fn is_inited(&self) -> bool {
        self.shared.state() == STATE_READY
    }

    pub fn is_live(&self) -> bool {
        self.snapshot().is_some_and(|p| p.is_live())
    }

    fn spawn_worker(&self) {
        let shared = Arc::clone(&self.shared);
        let source = Arc::clone(&self.source);
        let parser = Arc::clone(&self.parser);
        let limiter = Arc::clone(&self.limiter);
        let options = self.options.clone();
        let url = self.manifest_url.clone();
        let adaptation_id = self.adaptation_id;
        let representation_id = self.representation_id.clone();

        let handle = std::thread::Builder::new()
            .name("ocarina-reload".to_string())
            .spawn(move || {
                reload_loop(
                    &shared,
                    source.as_ref(),
                    parser.as_ref(),
                    &limiter,
                    &url,
                    adaptation_id,
                    &representation_id,
                    &options,
                );
            })
            .expect("failed to spawn reload thread");
        *self.worker.lock() = Some(handle);
    }

    // Snapshot access

    /// Current playlist snapshot; `None` before `init` or after interrupt.
    pub fn snapshot(&self) -> Option<Arc<Playlist>> {
        if self.shared.state() == STATE_STOPPED {
            return None;
        }
        self.shared.playlist.read().clone()
    }

    fn with_representation<T>(
        &self,
        f: impl FnOnce(&Playlist, &Representation) -> Option<T>,
    ) -> Option<T> {
        let snapshot = self.snapshot()?;
        let rep = snapshot.representation(self.adaptation_id, &self.representation_id)?;
        f(&snapshot, rep)
    }

    fn resolve(&self, playlist: &Playlist, uri: &str) -> Option<Url> {
        let base = playlist.base_url.as_ref().unwrap_or(&self.manifest_url);
        base.join(uri).ok()
    }

    // Position queries

    /// Segment to start playback from.
    ///
    /// Static streams honor the configured start position; live streams
    /// start at the live edge minus the live delay, clamped into the
    /// available window. Sets the position cursor.
    pub fn start_segment(&self) -> Option<DashSegment> {
        self.with_representation(|playlist, rep| {
            let number = self.start_number(playlist, rep)?;
            let segment = self.segment_for(playlist, rep, number)?;
            self.shared
                .current_segment
                .store(number, Ordering::Release);
            trace!(number, "ocarina-dash: start segment selected");
            Some(segment)
        })
    }

    /// Next segment after the last returned one, or `None` past the end of
    /// the currently known window (the cursor stays put so a live reload
    /// can extend the window and resume).
    pub fn next_segment(&self) -> Option<DashSegment> {
        let current = self.shared.current_segment.load(Ordering::Acquire);
        if current == SEGMENT_NUMBER_UNSET {
            return self.start_segment();
        }
        self.with_representation(|playlist, rep| {
            let (first, last) = self.segment_span(playlist, rep)?;
            // A live window may have slid past the cursor; never re-issue
            // numbers below it.
            let next = (current + 1).max(first);
            if next > last {
                return None;
            }
            let segment = self.segment_for(playlist, rep, next)?;
            self.shared.current_segment.store(next, Ordering::Release);
            Some(segment)
        })
    }

    /// Initialization segment carrying codec configuration, if any.
    pub fn init_segment(&self) -> Option<DashSegment> {
        self.with_representation(|playlist, rep| {
            let (uri, range) = match &rep.index {
                SegmentIndex::Template(template) => (
                    fill_template(template.initialization.as_deref()?, &rep.id, 0, 0),
                    None,
                ),
                SegmentIndex::List(list) => (list.initialization.clone()?, None),
                SegmentIndex::Indexed(base) => (base.uri.clone(), base.init_range),
            };
            let url = self.resolve(playlist, &uri)?;
            Some(DashSegment {
                sequence: 0,
                start_time: 0,
                duration: 0,
                url,
                range,
                kind: SegmentKind::Init,
            })
        })
    }

    /// Byte range holding the `sidx` box of an indexed representation.
    pub fn index_segment(&self) -> Option<DashSegment> {
        self.with_representation(|playlist, rep| match &rep.index {
            SegmentIndex::Indexed(base) => {
                let url = self.resolve(playlist, &base.uri)?;
                Some(DashSegment {
                    sequence: 0,
                    start_time: 0,
                    duration: 0,
                    url,
                    range: Some(base.index_range),
                    kind: SegmentKind::Index,
                })
            }
            _ => None,
        })
    }

    /// Position cursor; [`SEGMENT_NUMBER_UNSET`] before the first query.
    pub fn current_segment(&self) -> u64 {
        self.shared.current_segment.load(Ordering::Acquire)
    }

    /// Move the position cursor explicitly (seek).
    pub fn set_current_segment(&self, number: u64) {
        self.shared.current_segment.store(number, Ordering::Release);
    }

    /// Timeline position of the current segment.
    pub fn current_position(&self) -> Option<Duration> {
        let current = self.shared.current_segment.load(Ordering::Acquire);
        if current == SEGMENT_NUMBER_UNSET {
            return None;
        }
        self.with_representation(|playlist, rep| {
            let segment = self.segment_for(playlist, rep, current)?;
            Some(Duration::from_micros(segment.start_time.max(0) as u64))
        })
    }

    /// Seek the cursor to the segment containing `position`. Returns the
    /// chosen segment number.
    pub fn set_current_position(&self, position: Duration) -> Option<u64> {
        let number = self.segment_number_by_time(position)?;
        self.set_current_segment(number);
        Some(number)
    }

    /// Segment number containing the given timeline position.
    pub fn segment_number_by_time(&self, position: Duration) -> Option<u64> {
        self.with_representation(|playlist, rep| {
            self.number_for_time(playlist, rep, position.as_micros() as i64)
        })
    }

    pub fn last_segment_number(&self) -> Option<u64> {
        self.with_representation(|playlist, rep| self.segment_span(playlist, rep).map(|(_, l)| l))
    }

    /// Segments left after the cursor in the currently known window.
    pub fn remaining_segment_count(&self) -> u64 {
        let current = self.shared.current_segment.load(Ordering::Acquire);
        self.with_representation(|playlist, rep| {
            let (first, last) = self.segment_span(playlist, rep)?;
            if current == SEGMENT_NUMBER_UNSET {
                Some(last - first + 1)
            } else {
                Some(last.saturating_sub(current))
            }
        })
        .unwrap_or(0)
    }

    /// All segments of the currently known window, in playback order.
    pub fn segment_list(&self) -> Vec<DashSegment> {
        self.with_representation(|playlist, rep| {
            let (first, last) = self.segment_span(playlist, rep)?;
            Some(
                (first..=last)
                    .filter_map(|n| self.segment_for(playlist, rep, n))
                    .collect::<Vec<_>>(),
            )
        })
        .unwrap_or_default()
    }

    // Timing hints

    /// Nominal duration of one segment of the tracked representation.
    pub fn segment_duration(&self) -> Option<Duration> {
        self.with_representation(|_, rep| {
            let us = self.nominal_segment_duration_us(rep);
            (us > 0).then(|| Duration::from_micros(us as u64))
        })
    }

    /// Total presentation duration for static streams.
    pub fn duration(&self) -> Option<Duration> {
        self.snapshot()?.media_presentation_duration
    }

    /// How far behind the live edge playback stays. Zero for static
    /// streams.
    pub fn live_delay(&self) -> Duration {
        self.with_representation(|playlist, rep| {
            if !playlist.is_live() {
                return Some(Duration::ZERO);
            }
            let seg = Duration::from_micros(self.nominal_segment_duration_us(rep).max(0) as u64);
            Some(timing::live_delay(playlist, &self.options, seg))
        })
        .unwrap_or(Duration::ZERO)
    }

    /// Media time between the cursor and the end of the known window.
    pub fn min_ahead_time(&self) -> Duration {
        let current = self.shared.current_segment.load(Ordering::Acquire);
        self.with_representation(|playlist, rep| {
            let (first, last) = self.segment_span(playlist, rep)?;
            let from = if current == SEGMENT_NUMBER_UNSET {
                first
            } else if current >= last {
                return Some(Duration::ZERO);
            } else {
                current + 1
            };
            let ahead_us: i64 = (from..=last)
                .filter_map(|n| self.segment_for(playlist, rep, n))
                .map(|s| s.duration)
                .sum();
            Some(Duration::from_micros(ahead_us.max(0) as u64))
        })
        .unwrap_or(Duration::ZERO)
    }

    /// Distance the download pacer keeps from the live edge (live) or the
    /// buffering cap (static).
    pub fn buffering_offset(&self) -> Duration {
        self.with_representation(|playlist, rep| {
            let seg = Duration::from_micros(self.nominal_segment_duration_us(rep).max(0) as u64);
            Some(timing::buffering_offset(playlist, &self.options, seg))
        })
        .unwrap_or(Duration::ZERO)
    }

    pub fn max_buffering(&self) -> Duration {
        self.snapshot()
            .map(|p| timing::max_buffering(&p))
            .unwrap_or(Duration::ZERO)
    }

    pub fn min_buffering(&self) -> Duration {
        self.snapshot()
            .map(|p| timing::min_buffering(&p))
            .unwrap_or(Duration::ZERO)
    }

    // Representation switching and stream facts

    /// Pure bitrate-switch selection: the highest-bandwidth candidate within
    /// the configured budget, or the lowest one when nothing fits. `Some`
    /// whenever the set is non-empty; no tracker state changes.
    pub fn next_representation<'a>(
        &self,
        adaptation: &'a AdaptationSet,
        current: Option<&Representation>,
    ) -> Option<&'a Representation> {
        let budget = self.options.max_bandwidth.unwrap_or(u64::MAX);
        let candidate = adaptation
            .representations
            .iter()
            .filter(|r| r.bandwidth <= budget)
            .max_by_key(|r| r.bandwidth)
            .or_else(|| adaptation.representations.iter().min_by_key(|r| r.bandwidth))?;
        if let Some(current) = current {
            trace!(
                from = %current.id,
                to = %candidate.id,
                "ocarina-dash: representation selection"
            );
        }
        Some(candidate)
    }

    /// The representation this tracker follows, from the current snapshot.
    pub fn current_representation(&self) -> Option<Representation> {
        self.with_representation(|_, rep| Some(rep.clone()))
    }

    pub fn stream_type(&self) -> StreamType {
        self.snapshot()
            .and_then(|p| p.adaptation(self.adaptation_id).map(|a| a.content_type))
            .unwrap_or_default()
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.snapshot().and_then(|p| {
            let adaptation = p.adaptation(self.adaptation_id)?;
            let rep = adaptation
                .representations
                .iter()
                .find(|r| r.id == self.representation_id)?;
            Some(StreamInfo {
                width: rep.width,
                height: rep.height,
                bandwidth: rep.bandwidth,
                lang: adaptation.lang.clone(),
            })
        })
    }

    pub fn playlist_url(&self) -> &Url {
        &self.manifest_url
    }

    /// Base URL segments resolve against.
    pub fn base_url(&self) -> Url {
        self.snapshot()
            .and_then(|p| p.base_url.clone())
            .unwrap_or_else(|| self.manifest_url.clone())
    }

    // Segment-index glue

    /// Synthesize segment references from a parsed `sidx` box.
    ///
    /// `first_byte_offset` is the absolute offset of the first subsegment
    /// within the media file (index segment end plus the box's
    /// `first_offset`). Byte ranges are a running offset over entry sizes;
    /// durations are rescaled to microseconds. A malformed entry fails with
    /// a parse error, leaving previously synthesized segments intact.
    pub fn parse_index(
        &self,
        sidx: &SidxBox,
        url: &Url,
        first_byte_offset: u64,
    ) -> DashResult<usize> {
        if sidx.timescale == 0 {
            return Err(DashError::Parse("sidx: zero timescale".to_string()));
        }
        let mut indexed = self.shared.indexed.write();
        let mut offset = first_byte_offset;
        let mut sequence = indexed.last().map_or(0, |s| s.sequence + 1);
        let mut start_time = indexed.last().map_or_else(
            || rescale_to_us(sidx.earliest_presentation_time, u64::from(sidx.timescale)),
            DashSegment::end_time,
        );

        let mut added = 0usize;
        for entry in &sidx.entries {
            if entry.referenced_size == 0 || entry.subsegment_duration == 0 {
                return Err(DashError::Parse(format!(
                    "sidx: malformed entry at sequence {sequence}"
                )));
            }
            let duration = rescale_to_us(
                u64::from(entry.subsegment_duration),
                u64::from(sidx.timescale),
            );
            let size = u64::from(entry.referenced_size);
            let segment = DashSegment::media(sequence, start_time, duration, url.clone())
                .with_range(ByteRange::new(offset, Some(offset + size - 1)));
            indexed.push(segment);
            offset += size;
            start_time += duration;
            sequence += 1;
            added += 1;
        }
        debug!(added, total = indexed.len(), "ocarina-dash: segments synthesized from sidx");
        Ok(added)
    }

    // Internal segment arithmetic

    fn nominal_segment_duration_us(&self, rep: &Representation) -> i64 {
        match &rep.index {
            SegmentIndex::Template(template) => template.segment_duration_us(),
            SegmentIndex::List(list) => list
                .entries
                .first()
                .map_or(0, |e| rescale_to_us(e.duration, list.timescale)),
            SegmentIndex::Indexed(_) => {
                self.shared.indexed.read().first().map_or(0, |s| s.duration)
            }
        }
    }

    /// First and last currently-available sequence numbers.
    fn segment_span(&self, playlist: &Playlist, rep: &Representation) -> Option<(u64, u64)> {
        match &rep.index {
            SegmentIndex::List(list) => {
                if list.entries.is_empty() {
                    return None;
                }
                let first = list.start_number;
                Some((first, first + list.entries.len() as u64 - 1))
            }
            SegmentIndex::Template(template) => {
                let seg_us = template.segment_duration_us();
                if seg_us <= 0 {
                    return None;
                }
                if playlist.is_live() {
                    let edge = live_edge_us(playlist)?;
                    let available = edge / seg_us;
                    if available == 0 {
                        return None;
                    }
                    let last = template.start_number + available as u64 - 1;
                    let first = match playlist.time_shift_buffer_depth {
                        Some(depth) => {
                            let earliest = (edge - depth.as_micros() as i64).max(0);
                            template.start_number + (earliest / seg_us) as u64
                        }
                        None => template.start_number,
                    };
                    Some((first.min(last), last))
                } else {
                    let total_us = playlist.media_presentation_duration?.as_micros() as i64;
                    let count = (total_us + seg_us - 1) / seg_us;
                    if count <= 0 {
                        return None;
                    }
                    Some((
                        template.start_number,
                        template.start_number + count as u64 - 1,
                    ))
                }
            }
            SegmentIndex::Indexed(_) => {
                let indexed = self.shared.indexed.read();
                match (indexed.first(), indexed.last()) {
                    (Some(first), Some(last)) => Some((first.sequence, last.sequence)),
                    _ => None,
                }
            }
        }
    }

    fn segment_for(
        &self,
        playlist: &Playlist,
        rep: &Representation,
        number: u64,
    ) -> Option<DashSegment> {
        match &rep.index {
            SegmentIndex::List(list) => {
                let index = number.checked_sub(list.start_number)? as usize;
                let entry = list.entries.get(index)?;
                let start_units: u64 = list.entries[..index].iter().map(|e| e.duration).sum();
                let url = self.resolve(playlist, &entry.uri)?;
                let mut segment = DashSegment::media(
                    number,
                    rescale_to_us(start_units, list.timescale),
                    rescale_to_us(entry.duration, list.timescale),
                    url,
                );
                if let Some(range) = entry.range {
                    segment = segment.with_range(range);
                }
                Some(segment)
            }
            SegmentIndex::Template(template) => {
                let index = number.checked_sub(template.start_number)?;
                let time_units = index * template.duration + template.presentation_time_offset;
                let uri = fill_template(&template.media, &rep.id, number, time_units);
                let url = self.resolve(playlist, &uri)?;
                let seg_us = template.segment_duration_us();
                Some(DashSegment::media(
                    number,
                    index as i64 * seg_us,
                    seg_us,
                    url,
                ))
            }
            SegmentIndex::Indexed(_) => {
                let indexed = self.shared.indexed.read();
                indexed.iter().find(|s| s.sequence == number).cloned()
            }
        }
    }

    fn number_for_time(
        &self,
        playlist: &Playlist,
        rep: &Representation,
        time_us: i64,
    ) -> Option<u64> {
        let (first, last) = self.segment_span(playlist, rep)?;
        let number = match &rep.index {
            SegmentIndex::List(list) => {
                let mut elapsed: i64 = 0;
                let mut found = None;
                for (i, entry) in list.entries.iter().enumerate() {
                    let next = elapsed + rescale_to_us(entry.duration, list.timescale);
                    if time_us < next {
                        found = Some(list.start_number + i as u64);
                        break;
                    }
                    elapsed = next;
                }
                found?
            }
            SegmentIndex::Template(template) => {
                let seg_us = template.segment_duration_us();
                if seg_us <= 0 {
                    return None;
                }
                template.start_number + (time_us.max(0) / seg_us) as u64
            }
            SegmentIndex::Indexed(_) => {
                let indexed = self.shared.indexed.read();
                indexed
                    .iter()
                    .find(|s| time_us >= s.start_time && time_us < s.end_time())
                    .map(|s| s.sequence)?
            }
        };
        Some(number.clamp(first, last))
    }

    fn start_number(&self, playlist: &Playlist, rep: &Representation) -> Option<u64> {
        let (first, last) = self.segment_span(playlist, rep)?;
        if playlist.is_live() {
            let seg_us = self.nominal_segment_duration_us(rep);
            if seg_us <= 0 {
                return Some(last);
            }
            let delay = timing::live_delay(
                playlist,
                &self.options,
                Duration::from_micros(seg_us as u64),
            )
            .as_micros() as i64;
            let number = match live_edge_us(playlist) {
                Some(edge) => {
                    let target = (edge - delay).max(0);
                    self.number_for_time(playlist, rep, target).unwrap_or(first)
                }
                // No wall-clock anchor in the manifest: back off a delay's
                // worth of segments from the end of the known window.
                None => last.saturating_sub((delay / seg_us).max(0) as u64),
            };
            let number = number.saturating_add_signed(self.options.live_start_offset);
            Some(number.clamp(first, last))
        } else {
            match self.options.start_position {
                Some(position) => Some(
                    self.number_for_time(playlist, rep, position.as_micros() as i64)
                        .unwrap_or(first),
                ),
                None => Some(first),
            }
        }
    }
}

impl Drop for SegmentTracker {
    fn drop(&mut self) {
        // No reload may run against a freed tracker.
        self.interrupt(true);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

fn live_edge_us(playlist: &Playlist) -> Option<i64> {
    let start = playlist.availability_start_time?;
    let edge = Utc::now().signed_duration_since(start).num_microseconds()?;
    (edge > 0).then_some(edge)
}

fn load_playlist(
    source: &dyn DataSource,
    parser: &dyn ManifestParser,
    url: &Url,
    interrupt: &InterruptFlag,
) -> DashResult<Playlist> {
    trace!(url = %url, "ocarina-dash: fetching manifest");
    let mut stream = source.open(url, None)?;
    let bytes = read_all(stream.as_mut(), interrupt)?;
    let playlist = parser.parse(url, &bytes)?;
    playlist.validate()?;
    Ok(playlist)
}

#[allow(clippy::too_many_arguments)]
fn reload_loop(
    shared: &Shared,
    source: &dyn DataSource,
    parser: &dyn ManifestParser,
    limiter: &ReloadRateLimiter,
    url: &Url,
    adaptation_id: u32,
    representation_id: &str,
    options: &TrackerOptions,
) {
    debug!(url = %url, "ocarina-dash: reload worker started");
    loop {
        let (period, min_period) = {
            let snapshot = shared.playlist.read().clone();
            match snapshot {
                Some(playlist) => {
                    let seg_us = playlist
                        .representation(adaptation_id, representation_id)
                        .map_or(0, |rep| match &rep.index {
                            SegmentIndex::Template(t) => t.segment_duration_us(),
                            SegmentIndex::List(l) => l
                                .entries
                                .first()
                                .map_or(0, |e| rescale_to_us(e.duration, l.timescale)),
                            SegmentIndex::Indexed(_) => {
                                shared.indexed.read().first().map_or(0, |s| s.duration)
                            }
                        });
                    let seg = Duration::from_micros(seg_us.max(0) as u64);
                    let interval = timing::reload_interval(&playlist, options, seg);
                    (
                        interval,
                        playlist.minimum_update_period.unwrap_or(interval),
                    )
                }
                None => (options.min_reload_interval, options.min_reload_interval),
            }
        };

        let forced = {
            let mut wake = shared.wake.lock();
            if !wake.stop && !wake.reload_pending {
                let _ = shared.cond.wait_for(&mut wake, period);
            }
            if wake.stop {
                break;
            }
            std::mem::take(&mut wake.reload_pending)
        };
        if shared.interrupt.is_set() {
            break;
        }

        if !forced && !limiter.try_claim(min_period) {
            trace!(url = %url, "ocarina-dash: peer refreshed recently, skipping reload");
            continue;
        }

        match load_playlist(source, parser, url, &shared.interrupt) {
            Ok(playlist) => {
                debug!(url = %url, "ocarina-dash: manifest refreshed");
                *shared.playlist.write() = Some(Arc::new(playlist));
                if forced {
                    limiter.publish();
                }
            }
            Err(e) if e.is_interrupted() => break,
            Err(e) => {
                // Stale segments surface a transport error downstream;
                // playback continues on the previous snapshot.
                warn!(url = %url, error = %e, "ocarina-dash: reload failed, keeping previous snapshot");
            }
        }
    }
    debug!(url = %url, "ocarina-dash: reload worker stopped");
}
