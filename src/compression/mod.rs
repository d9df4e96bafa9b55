//! Pluggable compression methods.
//!
//! Each method is a [`Codec`] registered by its method id in a
//! [`CodecRegistry`]. A codec turns packed entry bytes into a [`Decoder`] and
//! produces an [`Encoder`] for the write path; the surrounding
//! [`DecodingStream`] and [`EncodingStream`] enforce the declared size and
//! CRC, report progress and translate codec failures, identically for every
//! method.
//!
//! Only Stored and Deflate are built in. Other methods plug in through
//! [`CodecRegistry::register`].

mod deflate;
mod pipeline;
mod stored;

pub use deflate::{Deflate, DeflateLevel};
pub use pipeline::{DecodingStream, EncodeSummary, EncodingStream, PackedInput};
pub use stored::Stored;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use crate::error::{Result, UnsupportedFeature, ZipError};
use crate::zip::{CompressionMethod, GeneralPurposeFlags};

/// Codec specific configuration.
///
/// Each codec only accepts the variant it defines (or `None`, meaning its
/// default); anything else is caller misuse.
#[derive(Clone, Default)]
pub enum CoderOption {
    #[default]
    None,
    Deflate(DeflateLevel),
    /// Option of an externally registered codec.
    Custom(Arc<dyn Any + Send + Sync>),
}

impl fmt::Debug for CoderOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoderOption::None => f.write_str("None"),
            CoderOption::Deflate(level) => f.debug_tuple("Deflate").field(level).finish(),
            CoderOption::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Unpacked bytes of one entry, pulled from its packed bytes.
pub trait Decoder: Read {
    /// Packed bytes consumed from the volumes so far.
    fn packed_bytes(&self) -> u64;

    /// Called once when the codec has signalled the end of its output.
    fn on_end_of_stream(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Push-style compressor; packed output goes to the writer passed to each
/// call so the caller keeps ownership of the sink.
pub trait Encoder: Send {
    fn write(&mut self, input: &[u8], output: &mut dyn Write) -> Result<()>;

    /// Flush all remaining packed bytes. Called exactly once.
    fn finish(&mut self, output: &mut dyn Write) -> Result<()>;
}

/// A compression method.
pub trait Codec: Send + Sync {
    fn method(&self) -> CompressionMethod;

    fn default_option(&self) -> CoderOption;

    /// Decode the codec option some methods keep in general purpose bits 1-2.
    fn option_from_flags(&self, _flags: GeneralPurposeFlags) -> CoderOption {
        self.default_option()
    }

    /// General purpose bits 1-2 to record `option` in the headers.
    fn flags_for_option(&self, option: &CoderOption) -> Result<u16>;

    /// Minimum "version needed to extract" for entries using this codec.
    fn version_needed(&self) -> u16;

    fn decoder<'a>(
        &self,
        input: PackedInput<'a>,
        option: &CoderOption,
    ) -> Result<Box<dyn Decoder + 'a>>;

    fn encoder(&self, option: &CoderOption) -> Result<Box<dyn Encoder>>;
}

pub(crate) fn wrong_option(codec: &str, option: &CoderOption) -> ZipError {
    ZipError::misuse(format!("{codec} codec does not accept option {option:?}"))
}

/// Codecs by method id.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<u16, Arc<dyn Codec>>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(Stored));
        registry.register(Arc::new(Deflate));
        registry
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<_> = self.codecs.keys().collect();
        ids.sort();
        f.debug_struct("CodecRegistry").field("methods", &ids).finish()
    }
}

impl CodecRegistry {
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Add or replace the codec for its method id.
    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.insert(codec.method().as_u16(), codec);
    }

    pub fn get(&self, method: CompressionMethod) -> Result<Arc<dyn Codec>> {
        self.codecs.get(&method.as_u16()).cloned().ok_or_else(|| {
            ZipError::unsupported(UnsupportedFeature::CompressionMethod(method.as_u16()), None)
        })
    }

    pub fn supports(&self, method: CompressionMethod) -> bool {
        self.codecs.contains_key(&method.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorClass;

    #[test]
    fn default_registry_has_store_and_deflate() {
        let registry = CodecRegistry::default();
        assert!(registry.supports(CompressionMethod::Stored));
        assert!(registry.supports(CompressionMethod::Deflate));
        let err = registry.get(CompressionMethod::Lzma).err().unwrap();
        assert_eq!(err.class(), ErrorClass::Unsupported);
    }

    #[test]
    fn codecs_reject_foreign_options() {
        let registry = CodecRegistry::default();
        let stored = registry.get(CompressionMethod::Stored).unwrap();
        let err = stored
            .encoder(&CoderOption::Deflate(DeflateLevel::Maximum))
            .err()
            .unwrap();
        assert_eq!(err.class(), ErrorClass::Misuse);

        let deflate = registry.get(CompressionMethod::Deflate).unwrap();
        let custom = CoderOption::Custom(Arc::new(5u8));
        assert_eq!(deflate.encoder(&custom).err().unwrap().class(), ErrorClass::Misuse);
        assert!(deflate.flags_for_option(&custom).is_err());
    }

    struct Reversed;

    impl Codec for Reversed {
        fn method(&self) -> CompressionMethod {
            CompressionMethod::Unknown(0x7f00)
        }

        fn default_option(&self) -> CoderOption {
            CoderOption::None
        }

        fn flags_for_option(&self, _option: &CoderOption) -> Result<u16> {
            Ok(0)
        }

        fn version_needed(&self) -> u16 {
            20
        }

        fn decoder<'a>(
            &self,
            input: PackedInput<'a>,
            _option: &CoderOption,
        ) -> Result<Box<dyn Decoder + 'a>> {
            Stored.decoder(input, &CoderOption::None)
        }

        fn encoder(&self, _option: &CoderOption) -> Result<Box<dyn Encoder>> {
            Stored.encoder(&CoderOption::None)
        }
    }

    #[test]
    fn custom_codecs_register_by_method_id() {
        let mut registry = CodecRegistry::default();
        registry.register(Arc::new(Reversed));
        let codec = registry.get(CompressionMethod::Unknown(0x7f00)).unwrap();
        assert_eq!(codec.version_needed(), 20);
    }
}
