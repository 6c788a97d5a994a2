#![forbid(unsafe_code)]

//! Transport capability layer.
//!
//! Everything above this crate consumes media bytes through the
//! [`DataSource`] capability trait: `open` a URL (optionally a byte range of
//! it), `read`/`seek` the returned stream, and `interrupt` any in-flight or
//! future operation cooperatively. Two implementations are provided:
//!
//! - [`HttpSource`]: blocking HTTP(S) with `Range` request support,
//! - [`FileSource`]: local files (also used heavily by tests).

pub mod error;
pub mod file;
pub mod http;
pub mod traits;
pub mod types;

pub use error::{SourceError, SourceResult};
pub use file::FileSource;
pub use http::HttpSource;
pub use traits::{read_all, DataSource, InterruptFlag, SourceStream};
pub use types::{ByteRange, Headers, SourceOptions};
