#![forbid(unsafe_code)]

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use bytes::Bytes;
use url::Url;

use crate::{error::SourceResult, types::ByteRange, SourceError};

/// Cooperative cancellation flag shared between a source and its caller.
///
/// Setting the flag does not abort a syscall already in progress; it is
/// observed between reads and before each new request, so cancellation
/// latency is bounded by the source's request timeout.
#[derive(Clone, Debug, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: bool) {
        self.0.store(value, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns `Err(Interrupted)` when the flag is set.
    pub fn check(&self) -> SourceResult<()> {
        if self.is_set() {
            Err(SourceError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Open media stream handed out by a [`DataSource`].
pub trait SourceStream: Send {
    /// Read into `buf`. Returns the number of bytes read, 0 at EOF.
    fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize>;

    /// Reposition the stream to an absolute offset within the opened range.
    ///
    /// Returns the new position. Sources backed by HTTP re-issue a ranged
    /// request.
    fn seek(&mut self, pos: u64) -> SourceResult<u64>;

    /// Total length of the opened range, when known up front.
    fn len_hint(&self) -> Option<u64> {
        None
    }
}

/// Capability interface for byte transports (ranged HTTP, local files, ...).
///
/// Implementations are cheap to share; one source instance serves many
/// `open` calls. The interrupt hook applies to all streams opened from the
/// same source.
pub trait DataSource: Send + Sync {
    /// Open a URL, optionally restricted to a byte range.
    fn open(&self, url: &Url, range: Option<ByteRange>) -> SourceResult<Box<dyn SourceStream>>;

    /// Set or clear the cooperative interrupt flag.
    fn interrupt(&self, flag: bool);
}

/// Drain a stream to memory, checking the interrupt flag between reads.
pub fn read_all(stream: &mut dyn SourceStream, interrupt: &InterruptFlag) -> SourceResult<Bytes> {
    let mut out = Vec::with_capacity(stream.len_hint().unwrap_or(16 * 1024) as usize);
    let mut buf = [0u8; 16 * 1024];
    loop {
        interrupt.check()?;
        let n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ChunkedStream {
        data: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl SourceStream for ChunkedStream {
        fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }

        fn seek(&mut self, pos: u64) -> SourceResult<u64> {
            self.pos = (pos as usize).min(self.data.len());
            Ok(self.pos as u64)
        }
    }

    #[test]
    fn read_all_drains_across_chunks() {
        let mut stream = ChunkedStream {
            data: (0..100u8).collect(),
            pos: 0,
            chunk: 7,
        };
        let bytes = read_all(&mut stream, &InterruptFlag::new()).unwrap();
        assert_eq!(bytes.len(), 100);
        assert_eq!(bytes[99], 99);
    }

    #[test]
    fn read_all_observes_interrupt() {
        let mut stream = ChunkedStream {
            data: vec![0; 64],
            pos: 0,
            chunk: 64,
        };
        let flag = InterruptFlag::new();
        flag.set(true);
        let err = read_all(&mut stream, &flag).unwrap_err();
        assert!(err.is_interrupted());
    }

    #[test]
    fn interrupt_flag_clears() {
        let flag = InterruptFlag::new();
        flag.set(true);
        assert!(flag.check().is_err());
        flag.set(false);
        assert!(flag.check().is_ok());
    }
}
