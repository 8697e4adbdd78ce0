//! Link and symbol tables
//!
//! Both sides number objects and symbols by first occurrence, in two
//! independent sequences. The writer maps identity to index; the reader keeps
//! the inverse, index to value.

use marshal_core::{ObjectId, Symbol, Value};
use std::collections::HashMap;

/// Identity under which the writer remembers a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LinkKey {
    Object(ObjectId),
    /// Floats have no heap identity; equal bit patterns share an entry
    Float(u64),
}

impl LinkKey {
    fn of(value: &Value) -> Option<LinkKey> {
        match value {
            Value::Float(f) => Some(LinkKey::Float(f.to_bits())),
            other => other.identity().map(LinkKey::Object),
        }
    }
}

/// Writer side: value identity to link index
#[derive(Default)]
pub struct LinkTable {
    index: HashMap<LinkKey, usize>,
    /// Registered values are kept alive so no address is reused mid-dump
    retained: Vec<Value>,
    next: usize,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, value: &Value) -> Option<usize> {
        LinkKey::of(value).and_then(|key| self.index.get(&key).copied())
    }

    /// Assign the next index. Values without an identity still consume one,
    /// mirroring the reader, but can never be referenced again.
    pub fn register(&mut self, value: &Value) -> usize {
        let n = self.next;
        self.next += 1;
        if let Some(key) = LinkKey::of(value) {
            self.index.entry(key).or_insert(n);
            self.retained.push(value.clone());
        }
        n
    }

    pub fn len(&self) -> usize {
        self.next
    }

    pub fn is_empty(&self) -> bool {
        self.next == 0
    }
}

/// Writer side: symbol to symbol index
#[derive(Default)]
pub struct SymbolTable {
    index: HashMap<Symbol, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, symbol: &Symbol) -> Option<usize> {
        self.index.get(symbol).copied()
    }

    pub fn register(&mut self, symbol: &Symbol) -> usize {
        let n = self.index.len();
        *self.index.entry(symbol.clone()).or_insert(n)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Reader side: link index to value
///
/// Slots may be reserved before their value exists (regexps and structs
/// claim an index before their payload is read); a reserved slot cannot be
/// referenced until it is filled.
#[derive(Default)]
pub struct LinkList {
    entries: Vec<Option<Value>>,
}

impl LinkList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: Value) -> usize {
        self.entries.push(Some(value));
        self.entries.len() - 1
    }

    pub fn reserve(&mut self) -> usize {
        self.entries.push(None);
        self.entries.len() - 1
    }

    /// Fill a reserved slot, or replace an existing entry
    pub fn set(&mut self, index: usize, value: Value) {
        if let Some(slot) = self.entries.get_mut(index) {
            *slot = Some(value);
        }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.entries.get(index).and_then(|slot| slot.as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reader side: symbol index to symbol
#[derive(Default)]
pub struct SymbolList {
    entries: Vec<Symbol>,
}

impl SymbolList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, symbol: Symbol) -> usize {
        self.entries.push(symbol);
        self.entries.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Symbol> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
