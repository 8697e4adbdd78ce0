//! Attribute block helpers
//!
//! An attribute block is a count followed by (symbol, value) pairs. Three
//! names are metadata rather than attributes:
//!
//! - `E`: `true` for UTF-8, `false` for US-ASCII
//! - `encoding`: a string naming any other encoding
//! - `K`: marks a keyword-argument hash
//!
//! The dumper and loader drive the block; this module decides what goes in
//! it and what a pair read back means.

use crate::error::{MarshalError, Result};
use marshal_core::{Encoding, Symbol, Value};

pub const ENCODING_SHORT: &str = "E";
pub const ENCODING_NAME: &str = "encoding";
pub const KEYWORD_FLAG: &str = "K";

/// Encoding metadata attached to a string or regexp
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingMeta {
    /// `E`: true for UTF-8, false for US-ASCII
    Short(bool),
    /// `encoding`: any other encoding, by name
    Named(String),
}

/// Metadata for a value's encoding; binary strings carry none
pub fn encoding_meta(value: &Value) -> Option<EncodingMeta> {
    match value.encoding()? {
        Encoding::Binary => None,
        Encoding::UsAscii => Some(EncodingMeta::Short(false)),
        Encoding::Utf8 => Some(EncodingMeta::Short(true)),
        Encoding::Other(name) => Some(EncodingMeta::Named(name)),
    }
}

/// Attributes that will be written: code values are skipped
pub fn serializable_attributes(value: &Value) -> Vec<(Symbol, Value)> {
    value
        .attributes()
        .into_iter()
        .filter(|(_, v)| !matches!(v, Value::Proc(_)))
        .collect()
}

/// Number of pairs in a value's attribute block, zero when it needs none.
///
/// Plain objects carry their attributes inside the `o` payload and classes
/// carry none, so only metadata can count for them.
pub fn block_size(value: &Value, encoding: Option<&EncodingMeta>) -> usize {
    let mut n = usize::from(encoding.is_some());
    match value {
        Value::Object(_) | Value::Class(_) => return n,
        Value::Hash(h) if h.is_keyword() => n += 1,
        _ => {}
    }
    n + serializable_attributes(value).len()
}

/// Meaning of one (name, value) pair read from a block
#[derive(Debug)]
pub enum Attribute {
    Encoding(Encoding),
    Keyword,
    Plain(Symbol, Value),
}

pub fn classify(name: Symbol, value: Value) -> Result<Attribute> {
    match name.as_bytes() {
        b"E" => match value {
            Value::Bool(true) => Ok(Attribute::Encoding(Encoding::Utf8)),
            Value::Bool(false) => Ok(Attribute::Encoding(Encoding::UsAscii)),
            other => Ok(Attribute::Plain(name, other)),
        },
        b"encoding" => match value.string_bytes() {
            Some(bytes) => Ok(Attribute::Encoding(Encoding::from_name(
                &String::from_utf8_lossy(&bytes),
            ))),
            None => Err(MarshalError::Malformed(format!(
                "encoding name is a {}",
                value.type_name()
            ))),
        },
        b"K" => Ok(Attribute::Keyword),
        _ => Ok(Attribute::Plain(name, value)),
    }
}

/// Drop backslashes before letters that were escapes in the old regexp
/// engine but are literals now. Applies only to sources read without
/// encoding metadata.
pub fn unescape_legacy_regexp(source: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(source.len());
    let mut backslashes = 0usize;
    for &c in source {
        match c {
            b'\\' => backslashes += 1,
            b'g' | b'h' | b'i' | b'j' | b'k' | b'l' | b'm' | b'o' | b'p' | b'q' | b'u' | b'y'
            | b'E' | b'F' | b'H' | b'I' | b'J' | b'K' | b'L' | b'N' | b'O' | b'P' | b'Q'
            | b'R' | b'S' | b'T' | b'U' | b'V' | b'X' | b'Y' => {
                if backslashes % 2 == 1 {
                    out.pop();
                }
                backslashes = 0;
            }
            _ => backslashes = 0,
        }
        out.push(c);
    }
    out
}
