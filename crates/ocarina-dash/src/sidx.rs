#![forbid(unsafe_code)]

//! `sidx` (segment index) box parsing.
//!
//! An indexed media file carries one `sidx` box mapping byte ranges to
//! subsegment durations, replacing per-segment manifest entries. Only the
//! box itself is parsed here; turning entries into segment references is the
//! tracker's job.

use crate::error::{DashError, DashResult};

/// Parsed segment index of one media file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SidxBox {
    pub reference_id: u32,
    /// Ticks per second for entry durations and the earliest time.
    pub timescale: u32,
    pub earliest_presentation_time: u64,
    /// Distance from the first byte after the box to the first subsegment.
    pub first_offset: u64,
    pub entries: Vec<SidxEntry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SidxEntry {
    /// Size of the referenced subsegment in bytes.
    pub referenced_size: u32,
    /// Duration in [`SidxBox::timescale`] units.
    pub subsegment_duration: u32,
    pub starts_with_sap: bool,
}

fn read_u32_be(data: &[u8], offset: usize) -> DashResult<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_be_bytes(b.try_into().expect("4-byte slice")))
        .ok_or_else(|| DashError::Parse("sidx: truncated u32".to_string()))
}

fn read_u64_be(data: &[u8], offset: usize) -> DashResult<u64> {
    data.get(offset..offset + 8)
        .map(|b| u64::from_be_bytes(b.try_into().expect("8-byte slice")))
        .ok_or_else(|| DashError::Parse("sidx: truncated u64".to_string()))
}

/// Parse a `sidx` box from raw bytes (box header included).
///
/// Handles fullbox versions 0 (32-bit times) and 1 (64-bit times).
pub fn parse_sidx(data: &[u8]) -> DashResult<SidxBox> {
    if data.len() < 12 {
        return Err(DashError::Parse("sidx: box too short".to_string()));
    }

    let box_size = read_u32_be(data, 0)? as usize;
    if &data[4..8] != b"sidx" {
        return Err(DashError::Parse(format!(
            "sidx: unexpected box type {:?}",
            &data[4..8]
        )));
    }
    if box_size > data.len() || box_size < 12 {
        return Err(DashError::Parse(format!(
            "sidx: declared size {box_size} outside buffer of {}",
            data.len()
        )));
    }
    let data = &data[..box_size];

    let version = data[8];
    if version > 1 {
        return Err(DashError::Parse(format!("sidx: unknown version {version}")));
    }

    let reference_id = read_u32_be(data, 12)?;
    let timescale = read_u32_be(data, 16)?;
    if timescale == 0 {
        return Err(DashError::Parse("sidx: zero timescale".to_string()));
    }

    let (earliest_presentation_time, first_offset, mut offset) = if version == 0 {
        (
            u64::from(read_u32_be(data, 20)?),
            u64::from(read_u32_be(data, 24)?),
            28usize,
        )
    } else {
        (read_u64_be(data, 20)?, read_u64_be(data, 28)?, 36usize)
    };

    // 2 reserved bytes, then the reference count.
    let reference_count = read_u32_be(data, offset)? & 0xFFFF;
    offset += 4;

    let mut entries = Vec::with_capacity(reference_count as usize);
    for _ in 0..reference_count {
        let first = read_u32_be(data, offset)?;
        let reference_type = first >> 31;
        let referenced_size = first & 0x7FFF_FFFF;
        let subsegment_duration = read_u32_be(data, offset + 4)?;
        let sap = read_u32_be(data, offset + 8)?;
        offset += 12;

        if reference_type != 0 {
            // Reference to a nested sidx; media playback only follows leaf
            // entries.
            continue;
        }
        entries.push(SidxEntry {
            referenced_size,
            subsegment_duration,
            starts_with_sap: sap >> 31 == 1,
        });
    }

    Ok(SidxBox {
        reference_id,
        timescale,
        earliest_presentation_time,
        first_offset,
        entries,
    })
}

#[cfg(test)]
pub(crate) fn build_sidx(
    timescale: u32,
    earliest: u32,
    first_offset: u32,
    entries: &[(u32, u32)],
) -> Vec<u8> {
    let mut out = Vec::new();
    let box_size = 32 + entries.len() * 12;
    out.extend_from_slice(&(box_size as u32).to_be_bytes());
    out.extend_from_slice(b"sidx");
    out.extend_from_slice(&[0, 0, 0, 0]); // version 0, flags
    out.extend_from_slice(&1u32.to_be_bytes()); // reference_ID
    out.extend_from_slice(&timescale.to_be_bytes());
    out.extend_from_slice(&earliest.to_be_bytes());
    out.extend_from_slice(&first_offset.to_be_bytes());
    out.extend_from_slice(&(entries.len() as u32).to_be_bytes()); // reserved + count
    for &(size, duration) in entries {
        out.extend_from_slice(&size.to_be_bytes()); // reference_type 0
        out.extend_from_slice(&duration.to_be_bytes());
        out.extend_from_slice(&(1u32 << 31).to_be_bytes()); // starts_with_sap
    }
    out
}
