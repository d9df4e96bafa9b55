//! Entry name and comment text.
//!
//! Headers store names and comments as bytes. Bit 11 of the general purpose
//! flags marks them as UTF-8; otherwise the encoding is whatever the
//! producing tool used, traditionally IBM code page 437. The resolver picks
//! the codec for each entry and lets the caller choose that fallback.

use std::fmt;
use std::sync::Arc;

use super::structures::GeneralPurposeFlags;

/// A byte/text codec for names and comments.
pub trait TextEncoding: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Decode `bytes`; undecodable input is replaced, never rejected.
    fn decode(&self, bytes: &[u8]) -> String;

    /// Encode `text`, or `None` if it contains unrepresentable characters.
    fn encode(&self, text: &str) -> Option<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8;

impl TextEncoding for Utf8 {
    fn name(&self) -> &'static str {
        "UTF-8"
    }

    fn decode(&self, bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    fn encode(&self, text: &str) -> Option<Vec<u8>> {
        Some(text.as_bytes().to_vec())
    }
}

/// Upper half of IBM code page 437; the lower half is ASCII.
const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', //
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', //
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', //
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐', //
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧', //
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀', //
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', //
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

/// IBM PC code page 437, the historical default for ZIP names.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cp437;

impl TextEncoding for Cp437 {
    fn name(&self) -> &'static str {
        "CP437"
    }

    fn decode(&self, bytes: &[u8]) -> String {
        bytes
            .iter()
            .map(|&b| {
                if b < 0x80 {
                    b as char
                } else {
                    CP437_HIGH[(b - 0x80) as usize]
                }
            })
            .collect()
    }

    fn encode(&self, text: &str) -> Option<Vec<u8>> {
        text.chars()
            .map(|c| {
                if c.is_ascii() {
                    Some(c as u8)
                } else {
                    CP437_HIGH
                        .iter()
                        .position(|&h| h == c)
                        .map(|i| 0x80 + i as u8)
                }
            })
            .collect()
    }
}

/// Chooses the codec for each entry's name and comment.
#[derive(Debug, Clone)]
pub struct TextResolver {
    fallback: Arc<dyn TextEncoding>,
}

impl Default for TextResolver {
    fn default() -> Self {
        Self::new(Arc::new(Cp437))
    }
}

impl TextResolver {
    /// Use `fallback` for entries without the UTF-8 flag.
    pub fn new(fallback: Arc<dyn TextEncoding>) -> Self {
        Self { fallback }
    }

    pub fn fallback(&self) -> &dyn TextEncoding {
        self.fallback.as_ref()
    }

    pub fn encoding_for(&self, flags: GeneralPurposeFlags) -> &dyn TextEncoding {
        if flags.is_unicode() {
            &Utf8
        } else {
            self.fallback.as_ref()
        }
    }

    pub fn decode(&self, flags: GeneralPurposeFlags, bytes: &[u8]) -> String {
        self.encoding_for(flags).decode(bytes)
    }

    /// Encode `text` for a header. Returns the bytes and whether the UTF-8
    /// flag has to be set. ASCII text never needs the flag; other text uses
    /// the fallback when it can represent it, UTF-8 otherwise.
    pub fn encode(&self, text: &str, prefer_unicode: bool) -> (Vec<u8>, bool) {
        if text.is_ascii() {
            return (text.as_bytes().to_vec(), false);
        }
        if !prefer_unicode {
            if let Some(bytes) = self.fallback.encode(text) {
                return (bytes, false);
            }
        }
        (text.as_bytes().to_vec(), true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cp437_round_trip() {
        let bytes: Vec<u8> = (0u8..=255).collect();
        let text = Cp437.decode(&bytes);
        assert_eq!(text.chars().count(), 256);
        assert_eq!(Cp437.encode(&text).unwrap(), bytes);
        assert_eq!(Cp437.decode(&[0x81, b'b', 0xe1]), "übß");
        assert_eq!(Cp437.decode(&[0xe3, 0xf1]), "π±");
        assert!(Cp437.encode("日本").is_none());
    }

    #[test]
    fn resolver_follows_unicode_flag() {
        let resolver = TextResolver::default();
        let bytes = "ü".as_bytes();
        let mut flags = GeneralPurposeFlags::default();
        // C3 BC read as CP437 box drawing characters
        assert_eq!(resolver.decode(flags, bytes), "├╝");
        flags.set(GeneralPurposeFlags::UNICODE, true);
        assert_eq!(resolver.decode(flags, bytes), "ü");
    }

    #[test]
    fn encoding_choice() {
        let resolver = TextResolver::default();
        assert_eq!(resolver.encode("plain.txt", true), (b"plain.txt".to_vec(), false));
        assert_eq!(resolver.encode("ü", false), (vec![0x81], false));
        assert_eq!(resolver.encode("ü", true), ("ü".as_bytes().to_vec(), true));
        assert_eq!(resolver.encode("日本", false), ("日本".as_bytes().to_vec(), true));
    }
}
