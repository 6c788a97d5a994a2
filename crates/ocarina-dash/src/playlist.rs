#![forbid(unsafe_code)]

//! Manifest-derived playlist snapshots.
//!
//! A [`Playlist`] is an immutable snapshot of everything a manifest refresh
//! learned: stream type, timing hints, and the adaptation-set/representation
//! tree. Snapshots are replaced wholesale on reload (`Arc` swap under lock),
//! so readers see either the previous or the next one, never a mix.

use std::time::Duration;

use chrono::{DateTime, Utc};
use ocarina_io::ByteRange;
use url::Url;

use crate::error::{DashError, DashResult};

/// Whether the presentation is a fixed recording or a growing live window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaylistType {
    #[default]
    Static,
    Live,
}

/// Content carried by an adaptation set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamType {
    #[default]
    Unknown,
    Video,
    Audio,
    Subtitle,
}

/// Immutable-per-refresh snapshot of a manifest.
#[derive(Clone, Debug, Default)]
pub struct Playlist {
    pub playlist_type: PlaylistType,
    pub minimum_update_period: Option<Duration>,
    pub availability_start_time: Option<DateTime<Utc>>,
    pub suggested_presentation_delay: Option<Duration>,
    pub min_buffer_time: Option<Duration>,
    pub max_buffer_time: Option<Duration>,
    pub time_shift_buffer_depth: Option<Duration>,
    pub low_latency: bool,
    pub media_presentation_duration: Option<Duration>,
    pub base_url: Option<Url>,
    pub adaptation_sets: Vec<AdaptationSet>,
}

impl Playlist {
    pub fn new(playlist_type: PlaylistType) -> Self {
        Self {
            playlist_type,
            ..Self::default()
        }
    }

    pub fn is_live(&self) -> bool {
        self.playlist_type == PlaylistType::Live
    }

    pub fn adaptation(&self, id: u32) -> Option<&AdaptationSet> {
        self.adaptation_sets.iter().find(|a| a.id == id)
    }

    pub fn representation(&self, adaptation_id: u32, representation_id: &str) -> Option<&Representation> {
        self.adaptation(adaptation_id)?
            .representations
            .iter()
            .find(|r| r.id == representation_id)
    }
}

/// Group of interchangeable representations of one track.
#[derive(Clone, Debug, Default)]
pub struct AdaptationSet {
    pub id: u32,
    pub content_type: StreamType,
    pub lang: Option<String>,
    pub representations: Vec<Representation>,
}

/// One encoded bitrate/quality variant of a track. Looked up for switching,
/// never mutated by the tracker.
#[derive(Clone, Debug)]
pub struct Representation {
    pub id: String,
    pub bandwidth: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codecs: Option<String>,
    pub index: SegmentIndex,
}

/// How a representation addresses its segments.
#[derive(Clone, Debug)]
pub enum SegmentIndex {
    /// Explicit per-segment manifest entries.
    List(SegmentList),
    /// Numbered segments synthesized from a URL template.
    Template(SegmentTemplate),
    /// One indexed media file; segments come from its `sidx` box.
    Indexed(SegmentBase),
}

#[derive(Clone, Debug, Default)]
pub struct SegmentList {
    pub initialization: Option<String>,
    /// Units per second for entry durations.
    pub timescale: u64,
    pub start_number: u64,
    pub entries: Vec<SegmentEntry>,
}

#[derive(Clone, Debug)]
pub struct SegmentEntry {
    pub uri: String,
    pub range: Option<ByteRange>,
    /// Duration in [`SegmentList::timescale`] units.
    pub duration: u64,
}

#[derive(Clone, Debug)]
pub struct SegmentTemplate {
    /// Media URL pattern (`$Number$` / `$Time$` / `$RepresentationID$`).
    pub media: String,
    pub initialization: Option<String>,
    pub timescale: u64,
    /// Nominal per-segment duration in timescale units.
    pub duration: u64,
    pub start_number: u64,
    pub presentation_time_offset: u64,
}

impl SegmentTemplate {
    /// Nominal segment duration in microseconds.
    pub fn segment_duration_us(&self) -> i64 {
        rescale_to_us(self.duration, self.timescale)
    }
}

#[derive(Clone, Debug)]
pub struct SegmentBase {
    pub uri: String,
    /// Byte range of the `sidx` index within the media file.
    pub index_range: ByteRange,
    pub init_range: Option<ByteRange>,
    pub timescale: u64,
}

/// Convert `value` ticks at `timescale` ticks/second to microseconds.
pub(crate) fn rescale_to_us(value: u64, timescale: u64) -> i64 {
    if timescale == 0 {
        return 0;
    }
    (value as u128 * 1_000_000 / timescale as u128) as i64
}

/// Manifest parser collaborator.
///
/// Manifest grammar is out of this crate's hands; the tracker only needs
/// bytes turned into a [`Playlist`] snapshot.
pub trait ManifestParser: Send + Sync {
    fn parse(&self, base_url: &Url, bytes: &[u8]) -> DashResult<Playlist>;
}

impl Playlist {
    /// Sanity check used after parsing: a playable snapshot has at least one
    /// representation somewhere.
    pub fn validate(&self) -> DashResult<()> {
        if self
            .adaptation_sets
            .iter()
            .all(|a| a.representations.is_empty())
        {
            return Err(DashError::Parse(
                "playlist has no representations".to_string(),
            ));
        }
        Ok(())
    }
}
