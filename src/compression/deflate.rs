//! Deflate (method 8) through `flate2`.

use std::io::{self, BufRead, BufReader, Read, Write};

use flate2::Compression;
use flate2::bufread::DeflateDecoder;
use flate2::write::DeflateEncoder;

use super::{CoderOption, Codec, Decoder, Encoder, PackedInput, wrong_option};
use crate::error::Result;
use crate::zip::{CompressionMethod, GeneralPurposeFlags, VERSION_DEFLATE};

/// Compression level class, stored in general purpose bits 1 and 2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum DeflateLevel {
    #[default]
    Normal,
    Maximum,
    Fast,
    SuperFast,
}

impl DeflateLevel {
    pub fn from_flags(flags: GeneralPurposeFlags) -> Self {
        match flags.codec_options() >> 1 {
            1 => DeflateLevel::Maximum,
            2 => DeflateLevel::Fast,
            3 => DeflateLevel::SuperFast,
            _ => DeflateLevel::Normal,
        }
    }

    pub fn to_flags(self) -> u16 {
        let bits = match self {
            DeflateLevel::Normal => 0,
            DeflateLevel::Maximum => 1,
            DeflateLevel::Fast => 2,
            DeflateLevel::SuperFast => 3,
        };
        bits << 1
    }

    pub fn compression(self) -> Compression {
        match self {
            DeflateLevel::Normal => Compression::new(6),
            DeflateLevel::Maximum => Compression::best(),
            DeflateLevel::Fast => Compression::new(3),
            DeflateLevel::SuperFast => Compression::fast(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Deflate;

fn level_of(option: &CoderOption) -> Result<DeflateLevel> {
    match option {
        CoderOption::None => Ok(DeflateLevel::default()),
        CoderOption::Deflate(level) => Ok(*level),
        other => Err(wrong_option("deflate", other)),
    }
}

struct InflateDecoder<'a> {
    inner: DeflateDecoder<BufReader<PackedInput<'a>>>,
}

impl Read for InflateDecoder<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Decoder for InflateDecoder<'_> {
    fn packed_bytes(&self) -> u64 {
        self.inner.get_ref().get_ref().consumed()
    }

    fn on_end_of_stream(&mut self) -> Result<()> {
        let buffered = self.inner.get_mut().fill_buf()?.len() as u64;
        let unread = buffered + self.inner.get_ref().get_ref().remaining();
        if unread > 0 {
            log::warn!("{unread} packed bytes follow the end of the deflate stream");
        }
        Ok(())
    }
}

struct DeflateStreamEncoder {
    inner: DeflateEncoder<Vec<u8>>,
}

impl DeflateStreamEncoder {
    fn drain(&mut self, output: &mut dyn Write) -> Result<()> {
        let packed = std::mem::take(self.inner.get_mut());
        output.write_all(&packed)?;
        Ok(())
    }
}

impl Encoder for DeflateStreamEncoder {
    fn write(&mut self, input: &[u8], output: &mut dyn Write) -> Result<()> {
        self.inner.write_all(input)?;
        self.drain(output)
    }

    fn finish(&mut self, output: &mut dyn Write) -> Result<()> {
        self.inner.try_finish()?;
        self.drain(output)
    }
}

impl Codec for Deflate {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Deflate
    }

    fn default_option(&self) -> CoderOption {
        CoderOption::Deflate(DeflateLevel::Normal)
    }

    fn option_from_flags(&self, flags: GeneralPurposeFlags) -> CoderOption {
        CoderOption::Deflate(DeflateLevel::from_flags(flags))
    }

    fn flags_for_option(&self, option: &CoderOption) -> Result<u16> {
        Ok(level_of(option)?.to_flags())
    }

    fn version_needed(&self) -> u16 {
        VERSION_DEFLATE
    }

    fn decoder<'a>(
        &self,
        input: PackedInput<'a>,
        option: &CoderOption,
    ) -> Result<Box<dyn Decoder + 'a>> {
        level_of(option)?;
        Ok(Box::new(InflateDecoder {
            inner: DeflateDecoder::new(BufReader::new(input)),
        }))
    }

    fn encoder(&self, option: &CoderOption) -> Result<Box<dyn Encoder>> {
        let level = level_of(option)?;
        Ok(Box::new(DeflateStreamEncoder {
            inner: DeflateEncoder::new(Vec::new(), level.compression()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn option_bits() {
        for level in [
            DeflateLevel::Normal,
            DeflateLevel::Maximum,
            DeflateLevel::Fast,
            DeflateLevel::SuperFast,
        ] {
            let flags = GeneralPurposeFlags(level.to_flags() | GeneralPurposeFlags::UNICODE);
            assert_eq!(DeflateLevel::from_flags(flags), level);
        }
        assert_eq!(DeflateLevel::Maximum.to_flags(), 0b010);
        assert_eq!(DeflateLevel::SuperFast.to_flags(), 0b110);
    }

    #[test]
    fn encoder_output_inflates() {
        let input = b"abcabcabcabcabcabcabcabcabcabc".repeat(50);
        let mut encoder = Deflate.encoder(&CoderOption::None).unwrap();
        let mut packed = Vec::new();
        encoder.write(&input[..700], &mut packed).unwrap();
        encoder.write(&input[700..], &mut packed).unwrap();
        encoder.finish(&mut packed).unwrap();
        assert!(packed.len() < input.len());

        let mut source = Cursor::new(packed.clone());
        let mut decoder = Deflate
            .decoder(
                PackedInput::new(&mut source, packed.len() as u64),
                &CoderOption::Deflate(DeflateLevel::Fast),
            )
            .unwrap();
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        assert_eq!(out, input);
        assert_eq!(decoder.packed_bytes(), packed.len() as u64);
    }
}
