//! Error types for dump and load
//!
//! Every failure unwinds the whole call; there is no partial result.
//! [`MarshalError::kind`] sorts variants into the four classes callers
//! usually branch on.

use marshal_core::{HookError, ModelError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MarshalError>;

/// Broad class of a [`MarshalError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed, truncated or incompatible stream
    Format,
    /// Value or class that cannot be marshaled as requested
    Type,
    /// Missing or misbehaving user hook
    Hook,
    /// Underlying sink or source failed
    Io,
}

#[derive(Debug, Error)]
pub enum MarshalError {
    // Format errors
    #[error("marshal data too short (offset {offset})")]
    UnexpectedEof { offset: u64 },

    #[error("dump format error(0x{byte:x}) at offset {offset}")]
    UnknownTag { byte: u8, offset: u64 },

    #[error("dump format error (unlinked) at offset {offset}")]
    BadLink { index: i64, offset: u64 },

    #[error("bad symbol at offset {offset}")]
    BadSymbol { index: i64, offset: u64 },

    #[error("long too big for this architecture (offset {offset})")]
    MalformedVarint { offset: u64 },

    #[error("incompatible marshal file format (can't be read)\n\tformat version 4.8 required; {major}.{minor} given")]
    VersionMismatch { major: u8, minor: u8 },

    #[error("dump format error (float {0:?})")]
    BadFloat(String),

    #[error("dump format error (user class)")]
    UserClass,

    #[error("dump format error ({0})")]
    Malformed(String),

    #[error("data objects are not supported")]
    DataUnsupported,

    // Type errors
    #[error("singleton can't be dumped")]
    Singleton,

    #[error("singleton class can't be dumped")]
    SingletonClass,

    #[error("singleton can't be loaded")]
    SingletonLoad,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("can't dump hash with default proc")]
    DefaultProc,

    #[error("{0}#marshal_dump returned same class instance")]
    SameClass(String),

    #[error("no _dump_data is defined for class {0}")]
    NoDumpData(String),

    #[error("long too big to dump")]
    TooLong,

    #[error("exceed depth limit")]
    DepthLimit,

    #[error("undefined class/module {0}")]
    UndefinedClass(String),

    #[error("{0} does not refer to class")]
    NotAClass(String),

    #[error("{0} does not refer to module")]
    NotAModule(String),

    #[error("class {0} not a struct")]
    NotAStruct(String),

    #[error("struct {0} not compatible (struct size differs)")]
    StructSize(String),

    #[error("struct {class} not compatible (:{got} for :{expected})")]
    StructMember {
        class: String,
        got: String,
        expected: String,
    },

    #[error("can't override instance variable of {kind} `{name}'")]
    ProhibitIvar { kind: &'static str, name: String },

    // Hook errors
    #[error(transparent)]
    Hook(#[from] HookError),

    #[error("class {0} needs to have method `_load'")]
    MissingLoad(String),

    #[error("instance of {0} needs to have method `marshal_load'")]
    MissingMarshalLoad(String),

    #[error("_dump() must return string")]
    DumpNotString,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl MarshalError {
    pub fn kind(&self) -> ErrorKind {
        use MarshalError::*;
        match self {
            UnexpectedEof { .. }
            | UnknownTag { .. }
            | BadLink { .. }
            | BadSymbol { .. }
            | MalformedVarint { .. }
            | VersionMismatch { .. }
            | BadFloat(_)
            | UserClass
            | Malformed(_)
            | DataUnsupported => ErrorKind::Format,
            Singleton
            | SingletonClass
            | SingletonLoad
            | Model(_)
            | DefaultProc
            | SameClass(_)
            | NoDumpData(_)
            | TooLong
            | DepthLimit
            | UndefinedClass(_)
            | NotAClass(_)
            | NotAModule(_)
            | NotAStruct(_)
            | StructSize(_)
            | StructMember { .. }
            | ProhibitIvar { .. } => ErrorKind::Type,
            Hook(_) | MissingLoad(_) | MissingMarshalLoad(_) | DumpNotString => ErrorKind::Hook,
            Io(_) => ErrorKind::Io,
        }
    }

    /// Stream offset the error was detected at, when known
    pub fn offset(&self) -> Option<u64> {
        match self {
            MarshalError::UnexpectedEof { offset }
            | MarshalError::UnknownTag { offset, .. }
            | MarshalError::BadLink { offset, .. }
            | MarshalError::BadSymbol { offset, .. }
            | MarshalError::MalformedVarint { offset } => Some(*offset),
            _ => None,
        }
    }
}
