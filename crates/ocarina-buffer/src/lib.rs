#![forbid(unsafe_code)]

//! Packet buffering between demux and playback.
//!
//! [`MediaPacketQueue`] holds demuxed, timestamped packets for one elementary
//! stream. The queue keeps already-consumed packets around as backward
//! history (bounded by [`MediaPacketQueue::set_max_backward_duration`]) so
//! playback can rewind or re-present without re-downloading, and offers
//! key-frame-aware lookups for seeks and representation switches.

pub mod packet;
pub mod queue;

pub use packet::{MediaPacket, MediaType};
pub use queue::MediaPacketQueue;
