use std::io::{self, Read, Write};

use super::{CoderOption, Codec, Decoder, Encoder, PackedInput, wrong_option};
use crate::error::Result;
use crate::zip::{CompressionMethod, VERSION_STORED};

/// The identity codec (method 0).
#[derive(Debug, Clone, Copy, Default)]
pub struct Stored;

struct StoredDecoder<'a> {
    input: PackedInput<'a>,
}

impl Read for StoredDecoder<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.input.read(buf)
    }
}

impl Decoder for StoredDecoder<'_> {
    fn packed_bytes(&self) -> u64 {
        self.input.consumed()
    }
}

struct StoredEncoder;

impl Encoder for StoredEncoder {
    fn write(&mut self, input: &[u8], output: &mut dyn Write) -> Result<()> {
        output.write_all(input)?;
        Ok(())
    }

    fn finish(&mut self, _output: &mut dyn Write) -> Result<()> {
        Ok(())
    }
}

fn check_option(option: &CoderOption) -> Result<()> {
    match option {
        CoderOption::None => Ok(()),
        other => Err(wrong_option("stored", other)),
    }
}

impl Codec for Stored {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Stored
    }

    fn default_option(&self) -> CoderOption {
        CoderOption::None
    }

    fn flags_for_option(&self, option: &CoderOption) -> Result<u16> {
        check_option(option)?;
        Ok(0)
    }

    fn version_needed(&self) -> u16 {
        VERSION_STORED
    }

    fn decoder<'a>(
        &self,
        input: PackedInput<'a>,
        option: &CoderOption,
    ) -> Result<Box<dyn Decoder + 'a>> {
        check_option(option)?;
        Ok(Box::new(StoredDecoder { input }))
    }

    fn encoder(&self, option: &CoderOption) -> Result<Box<dyn Encoder>> {
        check_option(option)?;
        Ok(Box::new(StoredEncoder))
    }
}
