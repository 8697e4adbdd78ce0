//! Text encodings attached to strings, regexps and symbols
//!
//! The codec only needs to know which encoding a byte string claims; it never
//! transcodes. `Binary` is the absence of a text encoding (ASCII-8BIT).

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// Raw bytes (ASCII-8BIT)
    #[default]
    Binary,
    UsAscii,
    Utf8,
    /// Any other named encoding, kept verbatim
    Other(String),
}

impl Encoding {
    /// Look up an encoding by name (case-insensitive, common aliases accepted)
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "ASCII-8BIT" | "BINARY" => Encoding::Binary,
            "US-ASCII" | "ASCII" | "ANSI_X3.4-1968" | "646" => Encoding::UsAscii,
            "UTF-8" | "CP65001" => Encoding::Utf8,
            _ => Encoding::Other(name.to_string()),
        }
    }

    /// Canonical name
    pub fn name(&self) -> &str {
        match self {
            Encoding::Binary => "ASCII-8BIT",
            Encoding::UsAscii => "US-ASCII",
            Encoding::Utf8 => "UTF-8",
            Encoding::Other(name) => name,
        }
    }

    /// Check that `bytes` are well formed for this encoding.
    ///
    /// Only the encodings this crate understands are checked; `Other`
    /// encodings are accepted as-is.
    pub fn is_valid(&self, bytes: &[u8]) -> bool {
        match self {
            Encoding::Binary | Encoding::Other(_) => true,
            Encoding::UsAscii => bytes.is_ascii(),
            Encoding::Utf8 => std::str::from_utf8(bytes).is_ok(),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
