//! Wire tags
//!
//! One ASCII byte precedes every value's payload, except where the value is
//! written as a back-reference.

pub const MAJOR_VERSION: u8 = 4;
pub const MINOR_VERSION: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Nil,
    True,
    False,
    Fixnum,
    Bignum,
    Float,
    String,
    Regexp,
    Array,
    Hash,
    HashDefault,
    Struct,
    Class,
    Module,
    /// Legacy class-or-module reference (read only)
    ClassOrModule,
    Symbol,
    SymbolLink,
    Link,
    Extended,
    UserClass,
    Ivar,
    Object,
    Data,
    UserDef,
    UserMarshal,
}

impl Tag {
    pub fn from_byte(byte: u8) -> Option<Tag> {
        let tag = match byte {
            b'0' => Tag::Nil,
            b'T' => Tag::True,
            b'F' => Tag::False,
            b'i' => Tag::Fixnum,
            b'l' => Tag::Bignum,
            b'f' => Tag::Float,
            b'"' => Tag::String,
            b'/' => Tag::Regexp,
            b'[' => Tag::Array,
            b'{' => Tag::Hash,
            b'}' => Tag::HashDefault,
            b'S' => Tag::Struct,
            b'c' => Tag::Class,
            b'm' => Tag::Module,
            b'M' => Tag::ClassOrModule,
            b':' => Tag::Symbol,
            b';' => Tag::SymbolLink,
            b'@' => Tag::Link,
            b'e' => Tag::Extended,
            b'C' => Tag::UserClass,
            b'I' => Tag::Ivar,
            b'o' => Tag::Object,
            b'd' => Tag::Data,
            b'u' => Tag::UserDef,
            b'U' => Tag::UserMarshal,
            _ => return None,
        };
        Some(tag)
    }

    pub fn byte(self) -> u8 {
        match self {
            Tag::Nil => b'0',
            Tag::True => b'T',
            Tag::False => b'F',
            Tag::Fixnum => b'i',
            Tag::Bignum => b'l',
            Tag::Float => b'f',
            Tag::String => b'"',
            Tag::Regexp => b'/',
            Tag::Array => b'[',
            Tag::Hash => b'{',
            Tag::HashDefault => b'}',
            Tag::Struct => b'S',
            Tag::Class => b'c',
            Tag::Module => b'm',
            Tag::ClassOrModule => b'M',
            Tag::Symbol => b':',
            Tag::SymbolLink => b';',
            Tag::Link => b'@',
            Tag::Extended => b'e',
            Tag::UserClass => b'C',
            Tag::Ivar => b'I',
            Tag::Object => b'o',
            Tag::Data => b'd',
            Tag::UserDef => b'u',
            Tag::UserMarshal => b'U',
        }
    }
}
