#![forbid(unsafe_code)]

use bytes::Bytes;

/// Elementary stream type a queue belongs to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MediaType {
    #[default]
    Unknown,
    Video,
    Audio,
    Subtitle,
}

/// One demuxed packet.
///
/// Timestamps and durations are microseconds. `time_pos` is the packet's
/// position on the playback timeline, which stays monotonic across segment
/// boundaries even when `pts`/`dts` wrap or jump.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaPacket {
    pub dts: i64,
    pub pts: i64,
    /// Declared duration of this packet. Duration bookkeeping uses this
    /// value, never deltas between neighbor timestamps, so duplicate or
    /// out-of-order stamps at segment boundaries do not corrupt totals.
    pub duration: i64,
    pub time_pos: i64,
    pub key: bool,
    /// Codec configuration that must reach the decoder before `data`.
    pub extra_data: Option<Bytes>,
    pub data: Bytes,
}

impl MediaPacket {
    pub fn new(pts: i64, duration: i64, data: Bytes) -> Self {
        Self {
            dts: pts,
            pts,
            duration,
            time_pos: pts,
            key: false,
            extra_data: None,
            data,
        }
    }

    /// Mark this packet as a key frame.
    pub fn with_key(mut self, key: bool) -> Self {
        self.key = key;
        self
    }

    /// Set the playback-timeline position.
    pub fn with_time_pos(mut self, time_pos: i64) -> Self {
        self.time_pos = time_pos;
        self
    }

    /// Set the decode timestamp.
    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = dts;
        self
    }

    /// Attach codec extra data.
    pub fn with_extra_data(mut self, extra_data: Bytes) -> Self {
        self.extra_data = Some(extra_data);
        self
    }
}
