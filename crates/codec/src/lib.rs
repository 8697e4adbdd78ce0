//! Marshal Codec: binary object-graph serialization
//!
//! Converts a graph of [`marshal_core::Value`]s into the 4.8 marshal wire
//! format and back. Shared references and cycles survive the round trip:
//! every object is written once and referenced by index afterwards.
//!
//! Key design principles:
//! - One session per call: link and symbol tables are never shared
//! - Depth is counted explicitly, so the ceiling fails the same way on any
//!   host stack
//! - Nothing reaches a sink unless the whole dump succeeded
//!
//! # Modules
//!
//! - `varint`: packed integer codec
//! - `tag`: wire tags and version constants
//! - `cache`: link and symbol tables for both directions
//! - `float`: float text form
//! - `ivar`: attribute block metadata
//! - `reader`: byte source with offsets
//! - `dump`: the writer
//! - `load`: the reader
//! - `config`: session options
//! - `error`: error types
//!
//! # Example
//!
//! ```rust,ignore
//! use marshal_codec::{MarshalConfig, dump, load};
//! use marshal_core::Registry;
//!
//! let reg = Registry::new();
//! let config = MarshalConfig::default();
//! let bytes = dump(&reg, &reg.str("hello"), &config)?;
//! let back = load(&reg, &bytes, &config)?;
//! ```

pub mod cache;
pub mod config;
pub mod dump;
pub mod error;
pub mod float;
pub mod ivar;
pub mod load;
pub mod reader;
pub mod tag;
pub mod varint;

pub use config::{DEFAULT_MAX_DEPTH, MarshalConfig};
pub use dump::Dumper;
pub use error::{ErrorKind, MarshalError, Result};
pub use load::{Loader, PostProc};

use marshal_core::{Registry, Value};
use std::io::{Read, Write};

/// Serialize `value` into a new byte vector
pub fn dump(registry: &Registry, value: &Value, config: &MarshalConfig) -> Result<Vec<u8>> {
    Dumper::new(registry, config).dump(value)
}

/// Serialize `value` into `sink`; on error nothing is written
pub fn dump_to<W: Write>(
    registry: &Registry,
    value: &Value,
    config: &MarshalConfig,
    mut sink: W,
) -> Result<()> {
    let bytes = dump(registry, value, config)?;
    sink.write_all(&bytes)?;
    Ok(())
}

/// Reconstruct a value from a complete stream
pub fn load(registry: &Registry, bytes: &[u8], config: &MarshalConfig) -> Result<Value> {
    load_from(registry, bytes, config)
}

/// Reconstruct a value from any byte source
pub fn load_from<R: Read>(registry: &Registry, source: R, config: &MarshalConfig) -> Result<Value> {
    Loader::new(registry, source, config).load()
}

/// Like [`load_from`], passing every completed value through `proc_`
///
/// The callback's result replaces the value it was given. Symbols are not
/// passed to it, nor are objects reached again through a back-reference
/// while they are still being built.
pub fn load_with<R: Read>(
    registry: &Registry,
    source: R,
    config: &MarshalConfig,
    proc_: PostProc<'_>,
) -> Result<Value> {
    Loader::new(registry, source, config)
        .with_proc(proc_)
        .load()
}
