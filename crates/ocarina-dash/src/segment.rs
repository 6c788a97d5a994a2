#![forbid(unsafe_code)]

use ocarina_io::ByteRange;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Sentinel for "no segment selected yet" in the position cursor.
pub const SEGMENT_NUMBER_UNSET: u64 = u64::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    /// Initialization segment (codec config, no media time).
    Init,
    /// Regular media segment.
    Media,
    /// Segment-index (`sidx`) byte range of an indexed file.
    Index,
}

/// One fetchable media unit. Immutable once constructed.
#[derive(Clone, Debug, PartialEq)]
pub struct DashSegment {
    pub sequence: u64,
    /// Start on the presentation timeline, microseconds.
    pub start_time: i64,
    /// Duration in microseconds (0 for init/index segments).
    pub duration: i64,
    pub url: Url,
    pub range: Option<ByteRange>,
    pub kind: SegmentKind,
}

impl DashSegment {
    pub fn media(sequence: u64, start_time: i64, duration: i64, url: Url) -> Self {
        Self {
            sequence,
            start_time,
            duration,
            url,
            range: None,
            kind: SegmentKind::Media,
        }
    }

    pub fn with_range(mut self, range: ByteRange) -> Self {
        self.range = Some(range);
        self
    }

    /// End of this segment on the presentation timeline, microseconds.
    pub fn end_time(&self) -> i64 {
        self.start_time + self.duration
    }
}

static NUMBER_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$Number(?:%0(\d+)d)?\$").expect("valid template regex"));

/// Expand a segment-template URL pattern.
///
/// Supports `$RepresentationID$`, `$Time$` and `$Number$` with optional
/// `%0Nd` zero-padding.
pub(crate) fn fill_template(template: &str, representation_id: &str, number: u64, time: u64) -> String {
    let filled = template
        .replace("$RepresentationID$", representation_id)
        .replace("$Time$", &time.to_string());
    NUMBER_TOKEN
        .replace_all(&filled, |caps: &regex::Captures<'_>| {
            match caps.get(1).and_then(|w| w.as_str().parse::<usize>().ok()) {
                Some(width) => format!("{number:0width$}"),
                None => number.to_string(),
            }
        })
        .into_owned()
}
