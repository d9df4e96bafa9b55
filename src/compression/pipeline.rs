//! Size and CRC bookkeeping shared by every codec.

use std::io::{self, Read, Write};
use std::sync::Arc;

use super::{Decoder, Encoder};
use crate::error::{Result, ZipError};
use crate::progress::ProgressSink;

/// The packed bytes of one entry: reads are limited to the packed size and
/// counted.
pub struct PackedInput<'a> {
    inner: &'a mut (dyn Read + 'a),
    remaining: u64,
    consumed: u64,
}

impl<'a> PackedInput<'a> {
    pub fn new(inner: &'a mut (dyn Read + 'a), packed_size: u64) -> Self {
        Self {
            inner,
            remaining: packed_size,
            consumed: 0,
        }
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Packed bytes not read yet.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl Read for PackedInput<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = self.remaining.min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("packed data ends {} bytes early", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        self.consumed += n as u64;
        Ok(n)
    }
}

/// Map an error surfacing from a codec into the crate's taxonomy: errors
/// that originated in this crate pass through, malformed input becomes
/// [`ZipError::InvalidData`].
fn codec_error(err: io::Error) -> ZipError {
    match ZipError::from(err) {
        ZipError::Io(e)
            if matches!(e.kind(), io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput) =>
        {
            ZipError::InvalidData {
                detail: e.to_string(),
            }
        }
        other => other,
    }
}

/// Reads an entry's unpacked content and checks it against the declared
/// size and CRC.
///
/// A zero-length read from the codec is the only end-of-stream signal; at
/// that point the byte count and CRC are verified and the codec's
/// [`Decoder::on_end_of_stream`] hook runs.
pub struct DecodingStream<'a> {
    decoder: Box<dyn Decoder + 'a>,
    declared_size: u64,
    expected_crc: Option<u32>,
    unpacked: u64,
    hasher: crc32fast::Hasher,
    progress: Option<Arc<dyn ProgressSink>>,
    finished: bool,
}

impl<'a> DecodingStream<'a> {
    pub fn new(
        decoder: Box<dyn Decoder + 'a>,
        declared_size: u64,
        expected_crc: Option<u32>,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Self {
        Self {
            decoder,
            declared_size,
            expected_crc,
            unpacked: 0,
            hasher: crc32fast::Hasher::new(),
            progress,
            finished: false,
        }
    }

    pub fn unpacked_bytes(&self) -> u64 {
        self.unpacked
    }

    pub fn packed_bytes(&self) -> u64 {
        self.decoder.packed_bytes()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }
        let n = self.decoder.read(buf).map_err(codec_error)?;
        if n == 0 {
            self.end_of_stream()?;
            return Ok(0);
        }

        self.unpacked += n as u64;
        if self.unpacked > self.declared_size {
            return Err(ZipError::integrity(format!(
                "entry decodes to more than its declared {} bytes",
                self.declared_size
            )));
        }
        self.hasher.update(&buf[..n]);
        if let Some(progress) = &self.progress {
            progress.on_progress(self.unpacked, self.decoder.packed_bytes());
        }
        Ok(n)
    }

    fn end_of_stream(&mut self) -> Result<()> {
        self.finished = true;
        if self.unpacked != self.declared_size {
            return Err(ZipError::integrity(format!(
                "entry decoded to {} bytes, {} declared",
                self.unpacked, self.declared_size
            )));
        }
        if let Some(expected) = self.expected_crc {
            let actual = self.hasher.clone().finalize();
            if actual != expected {
                return Err(ZipError::integrity(format!(
                    "crc {actual:#010x} does not match {expected:#010x}"
                )));
            }
        }
        self.decoder.on_end_of_stream()
    }
}

impl Read for DecodingStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_chunk(buf).map_err(ZipError::into_io)
    }
}

/// CRC and sizes of a finished entry stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSummary {
    pub crc: u32,
    pub size: u64,
    pub packed_size: u64,
}

struct CountingWriter<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Feeds unpacked bytes through an [`Encoder`] into `W`.
///
/// When the declared size is known the codec is finalized as soon as that
/// many bytes have been written, and anything beyond it is refused.
pub struct EncodingStream<W: Write> {
    encoder: Box<dyn Encoder>,
    sink: CountingWriter<W>,
    declared_size: Option<u64>,
    unpacked: u64,
    hasher: crc32fast::Hasher,
    progress: Option<Arc<dyn ProgressSink>>,
    finished: bool,
}

impl<W: Write> EncodingStream<W> {
    pub fn new(
        encoder: Box<dyn Encoder>,
        sink: W,
        declared_size: Option<u64>,
        progress: Option<Arc<dyn ProgressSink>>,
    ) -> Result<Self> {
        let mut stream = Self {
            encoder,
            sink: CountingWriter {
                inner: sink,
                written: 0,
            },
            declared_size,
            unpacked: 0,
            hasher: crc32fast::Hasher::new(),
            progress,
            finished: false,
        };
        if declared_size == Some(0) {
            stream.finalize()?;
        }
        Ok(stream)
    }

    pub fn unpacked_bytes(&self) -> u64 {
        self.unpacked
    }

    pub fn packed_bytes(&self) -> u64 {
        self.sink.written
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        if let Some(declared) = self.declared_size {
            if self.unpacked + buf.len() as u64 > declared {
                return Err(ZipError::misuse(format!(
                    "write of {} bytes exceeds the declared size of {declared}",
                    buf.len()
                )));
            }
        }
        if self.finished {
            return Err(ZipError::misuse("write after the entry stream was finished"));
        }

        self.encoder.write(buf, &mut self.sink)?;
        self.unpacked += buf.len() as u64;
        self.hasher.update(buf);
        if let Some(progress) = &self.progress {
            progress.on_progress(self.unpacked, self.sink.written);
        }

        if self.declared_size == Some(self.unpacked) {
            self.finalize()?;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        self.finished = true;
        self.encoder.finish(&mut self.sink)?;
        self.sink.flush()?;
        if let Some(progress) = &self.progress {
            progress.on_progress(self.unpacked, self.sink.written);
        }
        Ok(())
    }

    /// Finalize the codec if that has not happened yet and hand back the sink.
    pub fn finish(mut self) -> Result<(W, EncodeSummary)> {
        if let Some(declared) = self.declared_size {
            if self.unpacked != declared {
                return Err(ZipError::integrity(format!(
                    "entry ended after {} bytes, {declared} declared",
                    self.unpacked
                )));
            }
        }
        if !self.finished {
            self.finalize()?;
        }
        let summary = EncodeSummary {
            crc: self.hasher.clone().finalize(),
            size: self.unpacked,
            packed_size: self.sink.written,
        };
        Ok((self.sink.inner, summary))
    }
}

impl<W: Write> Write for EncodingStream<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_all(buf).map_err(ZipError::into_io)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{CoderOption, Codec, Deflate, Stored};
    use crate::error::ErrorClass;
    use crate::progress::ProgressCounter;
    use std::io::Cursor;

    fn decode_with(
        codec: &dyn Codec,
        packed: &[u8],
        size: u64,
        crc: Option<u32>,
    ) -> Result<Vec<u8>> {
        let mut source = Cursor::new(packed.to_vec());
        let input = PackedInput::new(&mut source, packed.len() as u64);
        let decoder = codec.decoder(input, &CoderOption::None)?;
        let mut stream = DecodingStream::new(decoder, size, crc, None);
        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = stream.read_chunk(&mut buf)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }

    #[test]
    fn stored_stream_checks_size_and_crc() {
        let data = b"hello stored world";
        let crc = crc32fast::hash(data);
        assert_eq!(decode_with(&Stored, data, 18, Some(crc)).unwrap(), data);

        let err = decode_with(&Stored, data, 18, Some(crc ^ 1)).unwrap_err();
        assert_eq!(err.class(), ErrorClass::DataIntegrity);

        let err = decode_with(&Stored, data, 19, None).unwrap_err();
        assert!(matches!(err, ZipError::DataIntegrity { .. }));

        let err = decode_with(&Stored, data, 10, None).unwrap_err();
        assert!(matches!(err, ZipError::DataIntegrity { .. }));
    }

    #[test]
    fn malformed_deflate_is_invalid_data() {
        let err = decode_with(&Deflate, &[0xff; 32], 100, None).unwrap_err();
        assert!(matches!(err, ZipError::InvalidData { .. }), "{err:?}");
    }

    #[test]
    fn encoding_finalizes_at_declared_size() {
        let counter = ProgressCounter::new();
        let encoder = Deflate.encoder(&CoderOption::None).unwrap();
        let mut stream =
            EncodingStream::new(encoder, Vec::new(), Some(10), Some(counter.clone())).unwrap();
        stream.write_all(b"01234").unwrap();
        assert!(!stream.is_finished());
        stream.write_all(b"56789").unwrap();
        assert!(stream.is_finished());
        assert_eq!(counter.unpacked(), 10);

        let err = stream.write_all(b"x").unwrap_err();
        assert_eq!(err.class(), ErrorClass::Misuse);

        let (packed, summary) = stream.finish().unwrap();
        assert_eq!(summary.size, 10);
        assert_eq!(summary.crc, crc32fast::hash(b"0123456789"));
        assert_eq!(summary.packed_size, packed.len() as u64);
        assert_eq!(
            decode_with(&Deflate, &packed, 10, Some(summary.crc)).unwrap(),
            b"0123456789"
        );
    }

    #[test]
    fn short_declared_stream_is_an_integrity_error() {
        let encoder = Stored.encoder(&CoderOption::None).unwrap();
        let mut stream = EncodingStream::new(encoder, Vec::new(), Some(4), None).unwrap();
        stream.write_all(b"ab").unwrap();
        assert_eq!(stream.finish().unwrap_err().class(), ErrorClass::DataIntegrity);
    }

    #[test]
    fn empty_declared_entry_is_finished_immediately() {
        let encoder = Deflate.encoder(&CoderOption::None).unwrap();
        let stream = EncodingStream::new(encoder, Vec::new(), Some(0), None).unwrap();
        assert!(stream.is_finished());
        let (packed, summary) = stream.finish().unwrap();
        assert!(!packed.is_empty());
        assert_eq!(summary.size, 0);
        assert_eq!(decode_with(&Deflate, &packed, 0, Some(0)).unwrap(), b"");
    }
}
