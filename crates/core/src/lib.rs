//! Marshal Core: the object model behind the marshal codec
//!
//! This crate provides the dynamic object graph that the codec reads and
//! writes. It is deliberately small: just enough of a class hierarchy,
//! attribute storage and hook dispatch for a faithful round trip.
//!
//! Key design principles:
//! - Value: immediates are plain data, everything else is an `Rc` handle
//! - Two-phase construction: handles are created empty and populated later,
//!   so cyclic graphs can be rebuilt
//! - Registry: constant paths map to class definitions and back
//!
//! # Modules
//!
//! - `value`: Core Value enum and heap object types
//! - `class`: Class and module definitions
//! - `symbol`: Interned symbols
//! - `encoding`: Text encoding tags for strings and regexps
//! - `hooks`: User serialization hook traits
//! - `registry`: Constant table, allocation and constructors
//! - `inspect`: Ruby-like rendering of value graphs

pub mod class;
pub mod encoding;
pub mod hooks;
pub mod inspect;
pub mod registry;
pub mod symbol;
pub mod value;

// Re-export key types
pub use class::{ClassDef, ClassRef, DefinitionKind, NativeKind, inherits_from};
pub use encoding::Encoding;
pub use hooks::{HookError, MarshalHooks, UserDump, UserMarshal};
pub use inspect::{InspectConfig, inspect};
pub use registry::{ModelError, Registry};
pub use symbol::Symbol;
pub use value::{
    HashDefault, ObjHeader, ObjectId, RArray, RBignum, RData, RHash, RObject, RProc, RRegexp,
    RString, RStruct, Value,
};
