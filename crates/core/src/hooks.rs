//! User serialization hooks
//!
//! A class or module may opt into one of two custom protocols instead of the
//! default attribute walk:
//!
//! - **Opaque** (`_dump` / `_load`): the object turns itself into a byte
//!   string; the class rebuilds an instance from that string.
//! - **Structured** (`marshal_dump` / `marshal_load`): the object turns itself
//!   into a plain value that is marshaled normally; an allocated, empty
//!   instance is then populated from that value.
//!
//! `MarshalHooks` holds at most one of them per definition, so the two are
//! mutually exclusive per type.

use crate::class::ClassRef;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

/// Error raised from inside a user hook
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    pub fn new(msg: impl Into<String>) -> Self {
        HookError(msg.into())
    }
}

/// Opaque protocol: `_dump(depth_budget) -> String` and `_load(String)`
pub trait UserDump {
    /// Produce the byte string for `receiver`.
    ///
    /// `depth_budget` is the number of nesting levels the dump may still
    /// descend; hooks that marshal nested values themselves should honor it.
    fn dump(&self, receiver: &Value, depth_budget: usize) -> Result<Value, HookError>;

    /// Rebuild an instance of `class` from the string produced by `dump`
    fn load(&self, class: &ClassRef, data: &Value) -> Result<Value, HookError>;
}

/// Structured protocol: `marshal_dump -> Value` and `marshal_load(Value)`
pub trait UserMarshal {
    fn marshal_dump(&self, receiver: &Value) -> Result<Value, HookError>;

    /// Populate the freshly allocated `receiver` from `data`
    fn marshal_load(&self, receiver: &Value, data: Value) -> Result<(), HookError>;
}

/// The hook protocol a definition opts into
#[derive(Clone)]
pub enum MarshalHooks {
    Opaque(Rc<dyn UserDump>),
    Structured(Rc<dyn UserMarshal>),
}

impl MarshalHooks {
    pub fn opaque(hook: impl UserDump + 'static) -> Self {
        MarshalHooks::Opaque(Rc::new(hook))
    }

    pub fn structured(hook: impl UserMarshal + 'static) -> Self {
        MarshalHooks::Structured(Rc::new(hook))
    }

    pub fn as_opaque(&self) -> Option<&Rc<dyn UserDump>> {
        match self {
            MarshalHooks::Opaque(h) => Some(h),
            MarshalHooks::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Rc<dyn UserMarshal>> {
        match self {
            MarshalHooks::Structured(h) => Some(h),
            MarshalHooks::Opaque(_) => None,
        }
    }
}

impl fmt::Debug for MarshalHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarshalHooks::Opaque(_) => f.write_str("MarshalHooks::Opaque"),
            MarshalHooks::Structured(_) => f.write_str("MarshalHooks::Structured"),
        }
    }
}
