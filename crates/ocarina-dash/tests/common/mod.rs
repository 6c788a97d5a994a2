//! Shared test doubles: an in-memory transport and a programmable manifest
//! parser.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use ocarina_dash::{DashError, DashResult, ManifestParser, Playlist};
use ocarina_io::{ByteRange, DataSource, InterruptFlag, SourceError, SourceResult, SourceStream};
use parking_lot::Mutex;
use url::Url;

/// Opt-in log output for debugging: `OCARINA_TEST_LOG=debug cargo test`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("OCARINA_TEST_LOG"))
        .try_init();
}

/// Transport fake serving one swappable payload for every URL.
pub struct MemoryDataSource {
    payload: Mutex<Bytes>,
    /// Artificial per-open latency, interrupt-aware.
    delay: Duration,
    fail_timeout: AtomicBool,
    opens: AtomicUsize,
    interrupt: InterruptFlag,
}

impl MemoryDataSource {
    pub fn new(payload: impl Into<Bytes>) -> Arc<Self> {
        Arc::new(Self {
            payload: Mutex::new(payload.into()),
            delay: Duration::ZERO,
            fail_timeout: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
            interrupt: InterruptFlag::new(),
        })
    }

    pub fn with_delay(payload: impl Into<Bytes>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            payload: Mutex::new(payload.into()),
            delay,
            fail_timeout: AtomicBool::new(false),
            opens: AtomicUsize::new(0),
            interrupt: InterruptFlag::new(),
        })
    }

    /// Swap the payload served to subsequent opens.
    pub fn set_payload(&self, payload: impl Into<Bytes>) {
        *self.payload.lock() = payload.into();
    }

    /// Make every subsequent open fail with a timeout.
    pub fn set_fail_timeout(&self, fail: bool) {
        self.fail_timeout.store(fail, Ordering::Release);
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::Acquire)
    }
}

impl DataSource for MemoryDataSource {
    fn open(&self, _url: &Url, range: Option<ByteRange>) -> SourceResult<Box<dyn SourceStream>> {
        self.opens.fetch_add(1, Ordering::AcqRel);

        if self.fail_timeout.load(Ordering::Acquire) {
            return Err(SourceError::Timeout);
        }

        // Simulate a slow origin in small interrupt-aware steps.
        let mut waited = Duration::ZERO;
        while waited < self.delay {
            self.interrupt.check()?;
            let step = Duration::from_millis(5).min(self.delay - waited);
            std::thread::sleep(step);
            waited += step;
        }
        self.interrupt.check()?;

        let data = self.payload.lock().clone();
        let data = match range {
            Some(range) => {
                let start = (range.start as usize).min(data.len());
                let end = range
                    .end
                    .map_or(data.len(), |e| ((e + 1) as usize).min(data.len()));
                data.slice(start..end.max(start))
            }
            None => data,
        };
        Ok(Box::new(MemoryStream {
            data,
            pos: 0,
            interrupt: self.interrupt.clone(),
        }))
    }

    fn interrupt(&self, flag: bool) {
        self.interrupt.set(flag);
    }
}

struct MemoryStream {
    data: Bytes,
    pos: usize,
    interrupt: InterruptFlag,
}

impl SourceStream for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize> {
        self.interrupt.check()?;
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> SourceResult<u64> {
        self.pos = (pos as usize).min(self.data.len());
        Ok(self.pos as u64)
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }
}

/// Parser fake mapping manifest payloads to prebuilt snapshots.
#[derive(Default)]
pub struct StubParser {
    map: Mutex<HashMap<Vec<u8>, Playlist>>,
}

impl StubParser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, payload: impl AsRef<[u8]>, playlist: Playlist) {
        self.map
            .lock()
            .insert(payload.as_ref().to_vec(), playlist);
    }
}

impl ManifestParser for StubParser {
    fn parse(&self, _base_url: &Url, bytes: &[u8]) -> DashResult<Playlist> {
        self.map
            .lock()
            .get(bytes)
            .cloned()
            .ok_or_else(|| DashError::Parse("unknown manifest payload".to_string()))
    }
}
