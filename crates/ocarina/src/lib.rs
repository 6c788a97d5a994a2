#![forbid(unsafe_code)]

//! Adaptive-streaming media core.
//!
//! Umbrella crate re-exporting the workspace layers:
//!
//! - [`io`]: transport capability traits plus ranged-HTTP and file sources,
//! - [`dash`]: playlist snapshots, segment tracking, live reload,
//! - [`buffer`]: the demuxed packet queue feeding playback.
//!
//! A playback controller typically wires them up like this: build a
//! [`dash::SegmentTracker`] per selected representation (sharing one
//! [`dash::ReloadRateLimiter`] per manifest), hand the returned
//! [`dash::DashSegment`] references to an [`io::DataSource`], push demuxed
//! packets into a [`buffer::MediaPacketQueue`] per elementary stream, and
//! pace downloads with the tracker's buffering hints.

pub use ocarina_buffer as buffer;
pub use ocarina_dash as dash;
pub use ocarina_io as io;

pub use ocarina_buffer::{MediaPacket, MediaPacketQueue, MediaType};
pub use ocarina_dash::{
    DashError, DashResult, DashSegment, ManifestParser, Playlist, PlaylistType,
    ReloadRateLimiter, SegmentTracker, TrackerOptions, TrackerState,
};
pub use ocarina_io::{ByteRange, DataSource, FileSource, HttpSource, SourceError, SourceOptions};
