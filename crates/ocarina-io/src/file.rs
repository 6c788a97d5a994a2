#![forbid(unsafe_code)]

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
};

use tracing::debug;
use url::Url;

use crate::{
    error::{SourceError, SourceResult},
    traits::{DataSource, InterruptFlag, SourceStream},
    types::ByteRange,
};

/// Local-file transport with the same ranged-open contract as HTTP.
#[derive(Clone, Debug, Default)]
pub struct FileSource {
    interrupt: InterruptFlag,
}

impl FileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// The interrupt flag shared with all streams opened from this source.
    pub fn interrupt_flag(&self) -> InterruptFlag {
        self.interrupt.clone()
    }
}

impl DataSource for FileSource {
    fn open(&self, url: &Url, range: Option<ByteRange>) -> SourceResult<Box<dyn SourceStream>> {
        if url.scheme() != "file" {
            return Err(SourceError::ProtocolNotSupported(url.scheme().to_string()));
        }
        let path = url
            .to_file_path()
            .map_err(|()| SourceError::ProtocolNotSupported(format!("not a file path: {url}")))?;

        self.interrupt.check()?;

        let mut file = File::open(&path)?;
        let file_len = file.metadata()?.len();

        let start = range.map_or(0, |r| r.start);
        if start > file_len {
            return Err(SourceError::InvalidRange(format!(
                "range start {start} beyond file length {file_len}"
            )));
        }
        // Inclusive range end, clamped to the file.
        let end = range
            .and_then(|r| r.end)
            .map_or(file_len, |e| (e + 1).min(file_len));

        file.seek(SeekFrom::Start(start))?;
        debug!(path = %path.display(), start, end, "ocarina-io: file stream opened");

        Ok(Box::new(FileStream {
            file,
            interrupt: self.interrupt.clone(),
            base: start,
            end,
            pos: 0,
        }))
    }

    fn interrupt(&self, flag: bool) {
        self.interrupt.set(flag);
    }
}

struct FileStream {
    file: File,
    interrupt: InterruptFlag,
    /// Absolute offset of the opened range within the file.
    base: u64,
    /// Absolute exclusive end of the opened range.
    end: u64,
    /// Position relative to `base`.
    pos: u64,
}

impl SourceStream for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> SourceResult<usize> {
        self.interrupt.check()?;
        let remaining = self.end.saturating_sub(self.base + self.pos);
        if remaining == 0 {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(remaining) as usize;
        let n = self.file.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: u64) -> SourceResult<u64> {
        let max = self.end.saturating_sub(self.base);
        let pos = pos.min(max);
        self.file.seek(SeekFrom::Start(self.base + pos))?;
        self.pos = pos;
        Ok(pos)
    }

    fn len_hint(&self) -> Option<u64> {
        Some(self.end.saturating_sub(self.base))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::traits::read_all;

    fn temp_media(content: &[u8]) -> (tempfile::TempDir, Url) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("media.bin");
        let mut f = File::create(&path).unwrap();
        f.write_all(content).unwrap();
        let url = Url::from_file_path(&path).unwrap();
        (dir, url)
    }

    #[test]
    fn reads_whole_file() {
        let (_dir, url) = temp_media(&[1, 2, 3, 4, 5]);
        let source = FileSource::new();
        let mut stream = source.open(&url, None).unwrap();
        let bytes = read_all(stream.as_mut(), &source.interrupt_flag()).unwrap();
        assert_eq!(&bytes[..], &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn reads_inclusive_byte_range() {
        let data: Vec<u8> = (0..100).collect();
        let (_dir, url) = temp_media(&data);
        let source = FileSource::new();

        let mut stream = source.open(&url, Some(ByteRange::new(10, Some(19)))).unwrap();
        assert_eq!(stream.len_hint(), Some(10));
        let bytes = read_all(stream.as_mut(), &source.interrupt_flag()).unwrap();
        assert_eq!(&bytes[..], &data[10..20]);
    }

    #[test]
    fn seek_within_range() {
        let data: Vec<u8> = (0..50).collect();
        let (_dir, url) = temp_media(&data);
        let source = FileSource::new();

        let mut stream = source.open(&url, Some(ByteRange::new(20, Some(39)))).unwrap();
        stream.seek(5).unwrap();
        let mut buf = [0u8; 4];
        let n = stream.read(&mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf[..], &data[25..29]);
    }

    #[test]
    fn interrupt_aborts_read() {
        let (_dir, url) = temp_media(&[0u8; 32]);
        let source = FileSource::new();
        let mut stream = source.open(&url, None).unwrap();

        source.interrupt(true);
        let err = stream.read(&mut [0u8; 8]).unwrap_err();
        assert!(err.is_interrupted());

        source.interrupt(false);
        assert!(stream.read(&mut [0u8; 8]).is_ok());
    }

    #[test]
    fn rejects_non_file_scheme() {
        let source = FileSource::new();
        let url = Url::parse("http://example.com/a.bin").unwrap();
        let Err(err) = source.open(&url, None) else {
            panic!("expected open to fail");
        };
        assert!(matches!(err, SourceError::ProtocolNotSupported(_)));
    }

    #[test]
    fn range_start_beyond_eof_is_invalid() {
        let (_dir, url) = temp_media(&[0u8; 8]);
        let source = FileSource::new();
        let Err(err) = source.open(&url, Some(ByteRange::from_start(100))) else {
            panic!("expected open to fail");
        };
        assert!(matches!(err, SourceError::InvalidRange(_)));
    }
}
