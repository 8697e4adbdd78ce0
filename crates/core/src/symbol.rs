//! Interned symbols
//!
//! A `Symbol` is an interned byte string. Interning happens in a thread-local
//! table, so two symbols with the same name always share one allocation and
//! `Symbol::ptr_eq` holds for them. Names are bytes rather than `str` because
//! streams may carry symbols in any encoding.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

thread_local! {
    static INTERNER: RefCell<HashSet<Rc<[u8]>>> = RefCell::new(HashSet::new());
}

/// Interned name value
#[derive(Clone)]
pub struct Symbol(Rc<[u8]>);

impl Symbol {
    /// Intern a name, returning the shared symbol for it
    pub fn intern(name: impl AsRef<[u8]>) -> Self {
        let name = name.as_ref();
        INTERNER.with(|table| {
            let mut table = table.borrow_mut();
            if let Some(existing) = table.get(name) {
                return Symbol(existing.clone());
            }
            let rc: Rc<[u8]> = Rc::from(name);
            table.insert(rc.clone());
            Symbol(rc)
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Name as text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_ascii(&self) -> bool {
        self.0.is_ascii()
    }

    /// True when both symbols are the same interned allocation
    pub fn ptr_eq(&self, other: &Symbol) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Attribute names start with a single `@`
    pub fn is_attribute_name(&self) -> bool {
        self.0.len() > 1 && self.0[0] == b'@' && self.0[1] != b'@'
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0 == other.0
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::intern(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_shares_allocation() {
        let a = Symbol::intern("name");
        let b = Symbol::intern(String::from("name"));
        assert!(a.ptr_eq(&b));
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_names() {
        let a = Symbol::intern("a");
        let b = Symbol::intern("b");
        assert!(!a.ptr_eq(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_attribute_name() {
        assert!(Symbol::intern("@x").is_attribute_name());
        assert!(!Symbol::intern("@@x").is_attribute_name());
        assert!(!Symbol::intern("x").is_attribute_name());
        assert!(!Symbol::intern("@").is_attribute_name());
    }

    #[test]
    fn test_non_utf8_name() {
        let s = Symbol::intern([0xff, 0xfe]);
        assert!(s.as_str().is_none());
        assert!(!s.is_ascii());
        assert_eq!(s.len(), 2);
    }
}
