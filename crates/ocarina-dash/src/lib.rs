#![forbid(unsafe_code)]

//! Adaptive-streaming core.
//!
//! The playback controller asks a [`SegmentTracker`] which segment to fetch
//! next; the tracker consults its current [`Playlist`] snapshot (refreshed
//! in the background for live streams) and answers with [`DashSegment`]
//! references for the transport layer. Timing hints ([`SegmentTracker::live_delay`],
//! [`SegmentTracker::buffering_offset`], ...) let the controller pace
//! downloads; [`SegmentTracker::parse_index`] synthesizes segments for
//! single-file representations indexed by a `sidx` box.

pub mod error;
pub mod options;
pub mod playlist;
pub mod rate_limiter;
pub mod segment;
pub mod sidx;
mod timing;
pub mod tracker;

pub use error::{DashError, DashResult};
pub use options::TrackerOptions;
pub use playlist::{
    AdaptationSet, ManifestParser, Playlist, PlaylistType, Representation, SegmentBase,
    SegmentEntry, SegmentIndex, SegmentList, SegmentTemplate, StreamType,
};
pub use rate_limiter::ReloadRateLimiter;
pub use segment::{DashSegment, SegmentKind, SEGMENT_NUMBER_UNSET};
pub use sidx::{parse_sidx, SidxBox, SidxEntry};
pub use tracker::{SegmentTracker, StreamInfo, TrackerState};
