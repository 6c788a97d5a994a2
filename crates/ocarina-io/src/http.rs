#![forbid(unsafe_code)]

use std::io::Read;

use reqwest::blocking::{Client, Response};
use tracing::{debug, trace};
use url::Url;

use crate::{
    error::{SourceError, SourceResult},
    traits::{DataSource, InterruptFlag, SourceStream},
    types::{ByteRange, Headers, SourceOptions},
};

/// Blocking HTTP(S) transport with `Range` request support.
#[derive(Clone, Debug)]
pub struct HttpSource {
    client: Client,
    options: SourceOptions,
    interrupt: InterruptFlag,
}

impl HttpSource {
    /// # Panics
    ///
    /// Panics if the `reqwest::blocking::Client` builder fails to build.
    #[must_use]
    pub fn new(options: SourceOptions) -> Self {
        let client = Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.request_timeout)
            .user_agent(options.user_agent.clone())
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            options,
            interrupt: InterruptFlag::new(),
        }
    }

    /// The interrupt flag shared with all streams opened from this source.
    pub fn interrupt_flag(&self) -> InterruptFlag {
        self.interrupt.clone()
    }

    fn send(&self, url: &Url, range: Option<ByteRange>) -> SourceResult<Response> {
        self.interrupt.check()?;

        let mut req = self.client.get(url.clone());
        for (k, v) in self.options.headers.iter() {
            req = req.header(k, v);
        }
        if let Some(range) = range {
            req = req.header("Range", range.to_header_value());
        }

        let resp = req.send().map_err(SourceError::from)?;
        let status = resp.status();

        if !(status.is_success() || status.as_u16() == 206) {
            return Err(SourceError::http_status(status.as_u16(), url.to_string()));
        }
        if range.is_some_and(|r| r.start > 0) && status.as_u16() != 206 {
            // A 200 here would silently hand us the whole resource from byte 0.
            return Err(SourceError::InvalidRange(format!(
                "server ignored range request for {url}"
            )));
        }

        Ok(resp)
    }
}

impl DataSource for HttpSource {
    fn open(&self, url: &Url, range: Option<ByteRange>) -> SourceResult<Box<dyn SourceStream>> {
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(SourceError::ProtocolNotSupported(other.to_string())),
        }

        let resp = self.send(url, range)?;
        let len = resp.content_length();
        debug!(url = %url, ?range, len, "ocarina-io: http stream opened");

        Ok(Box::new(HttpStream {
            source: self.clone(),
            url: url.clone(),
            range,
            resp,
            pos: 0,
            len,
        }))
    }

    fn interrupt(&self, flag: bool) {
        trace!(flag, "ocarina-io: http interrupt");
        self.interrupt.set(flag);
    }
}

struct HttpStream {
    source: HttpSource,
    url: Url,
    /// Range requested at `open` time; seeks are relative to its start.
    range: Option<ByteRange>,
    resp: Response,
    pos: u64,
    len: Option<u64>,
}

impl HttpStream {
    fn absolute_range_from(&self, pos: u64) -> ByteRange {
        match self.range {
            Some(range) => ByteRange::new(range.start + pos, range.end),
            None => ByteRange::from_start(pos),
        }
    }
}

impl SourceStream for HttpStream {
    fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize> {
        self.source.interrupt.check()?;
        let n = self.resp.read(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                SourceError::Timeout
            } else {
                SourceError::Io(e)
            }
        })?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> SourceResult<u64> {
        if pos == self.pos {
            return Ok(pos);
        }
        // No rewind on a live HTTP body: re-issue a ranged request.
        let range = self.absolute_range_from(pos);
        trace!(url = %self.url, pos, "ocarina-io: http seek reopens range");
        self.resp = self.source.send(&self.url, Some(range))?;
        self.pos = pos;
        Ok(pos)
    }

    fn len_hint(&self) -> Option<u64> {
        self.len
    }
}
