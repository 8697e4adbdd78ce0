//! Writer
//!
//! `Dumper` walks a value graph depth first and emits the wire form into an
//! internal buffer. Each session owns its link and symbol tables, so a value
//! reached twice is written once and then referenced by index.
//!
//! Order of decisions for a value:
//!
//! 1. Immediates (`nil`, booleans, inline integers, symbols) are written in
//!    place and never linked
//! 2. Anything already written becomes an `@` back-reference
//! 3. Values whose class opts into a hook protocol defer to it
//! 4. Everything else gets its kind payload, wrapped in an attribute block
//!    when it has attributes or encoding metadata

use crate::cache::{LinkTable, SymbolTable};
use crate::config::MarshalConfig;
use crate::error::{MarshalError, Result};
use crate::float;
use crate::ivar::{self, EncodingMeta};
use crate::tag::{MAJOR_VERSION, MINOR_VERSION, Tag};
use crate::varint;
use marshal_core::{
    ClassRef, HashDefault, MarshalHooks, Registry, Symbol, UserDump, UserMarshal, Value,
};
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, trace};

/// Smallest integer written inline with `i`
pub const FIXNUM_MIN: i64 = -(1 << 30);
/// Largest integer written inline with `i`
pub const FIXNUM_MAX: i64 = (1 << 30) - 1;

/// Single-use dump session
pub struct Dumper<'a> {
    registry: &'a Registry,
    config: &'a MarshalConfig,
    out: Vec<u8>,
    links: LinkTable,
    symbols: SymbolTable,
    /// Encoding-name strings, shared by every value with that encoding
    encodings: HashMap<String, Value>,
    depth: usize,
}

impl<'a> Dumper<'a> {
    pub fn new(registry: &'a Registry, config: &'a MarshalConfig) -> Self {
        Dumper {
            registry,
            config,
            out: Vec::new(),
            links: LinkTable::new(),
            symbols: SymbolTable::new(),
            encodings: HashMap::new(),
            depth: 0,
        }
    }

    /// Write the stream header and `value`, returning the complete stream
    pub fn dump(mut self, value: &Value) -> Result<Vec<u8>> {
        debug!("dump start: max_depth {}", self.config.max_depth);
        self.out.push(MAJOR_VERSION);
        self.out.push(MINOR_VERSION);
        self.write_object(value)?;
        debug!(
            "dump done: {} bytes, {} links, {} symbols",
            self.out.len(),
            self.links.len(),
            self.symbols.len()
        );
        Ok(self.out)
    }

    fn write_tag(&mut self, tag: Tag) {
        trace!("write {:?} at {}", tag, self.out.len());
        self.out.push(tag.byte());
    }

    fn write_len(&mut self, n: usize) -> Result<()> {
        let n = i32::try_from(n).map_err(|_| MarshalError::TooLong)?;
        varint::encode(n, &mut self.out);
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_len(bytes.len())?;
        self.out.extend_from_slice(bytes);
        Ok(())
    }

    fn write_symbol(&mut self, symbol: &Symbol) -> Result<()> {
        if let Some(n) = self.symbols.lookup(symbol) {
            self.write_tag(Tag::SymbolLink);
            return self.write_len(n);
        }
        let non_ascii = !symbol.is_ascii();
        if non_ascii {
            self.write_tag(Tag::Ivar);
        }
        self.write_tag(Tag::Symbol);
        self.write_bytes(symbol.as_bytes())?;
        self.symbols.register(symbol);
        if non_ascii {
            varint::encode(1, &mut self.out);
            self.write_symbol(&Symbol::intern(ivar::ENCODING_SHORT))?;
            self.write_tag(Tag::True);
        }
        Ok(())
    }

    fn write_unique(&mut self, path: &str) -> Result<()> {
        self.write_symbol(&Symbol::intern(path))
    }

    fn class_path(&self, class: &ClassRef) -> Result<String> {
        Ok(self.registry.path_of(class)?)
    }

    fn class_of(value: &Value) -> Result<ClassRef> {
        value
            .class_of()
            .map(|c| c.real_class())
            .ok_or_else(|| MarshalError::NoDumpData(value.type_name()))
    }

    /// `e` records for each module extended into `value`, most recent first
    fn write_extended(&mut self, value: &Value, check: bool) -> Result<()> {
        let Some(header) = value.header() else {
            return Ok(());
        };
        if check && header.has_singleton_methods() {
            return Err(MarshalError::Singleton);
        }
        for module in header.extended() {
            let path = self.class_path(&module)?;
            self.write_tag(Tag::Extended);
            self.write_unique(&path)?;
        }
        Ok(())
    }

    fn write_class(&mut self, tag: Tag, value: &Value, check: bool) -> Result<()> {
        self.write_extended(value, check)?;
        let path = self.class_path(&Self::class_of(value)?)?;
        self.write_tag(tag);
        self.write_unique(&path)
    }

    /// `C` wrapper when `value` is an instance of a subclass of `base`
    fn write_uclass(&mut self, value: &Value, base: &ClassRef) -> Result<()> {
        self.write_extended(value, true)?;
        let class = Self::class_of(value)?;
        if !Rc::ptr_eq(&class, base) {
            let path = self.class_path(&class)?;
            self.write_tag(Tag::UserClass);
            self.write_unique(&path)?;
        }
        Ok(())
    }

    /// Write one value, counting it against the depth ceiling
    pub fn write_object(&mut self, value: &Value) -> Result<()> {
        self.depth += 1;
        let result = if self.depth > self.config.max_depth {
            Err(MarshalError::DepthLimit)
        } else {
            self.write_value(value)
        };
        self.depth -= 1;
        result
    }

    fn write_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Nil => self.write_tag(Tag::Nil),
            Value::Bool(true) => self.write_tag(Tag::True),
            Value::Bool(false) => self.write_tag(Tag::False),
            Value::Integer(n) if (FIXNUM_MIN..=FIXNUM_MAX).contains(n) => {
                self.write_tag(Tag::Fixnum);
                varint::encode(*n as i32, &mut self.out);
            }
            Value::Symbol(s) => self.write_symbol(s)?,
            _ => {
                if let Some(n) = self.links.lookup(value) {
                    self.write_tag(Tag::Link);
                    return self.write_len(n);
                }
                match value {
                    Value::Float(f) => {
                        self.links.register(value);
                        self.write_tag(Tag::Float);
                        self.write_bytes(float::format(*f).as_bytes())?;
                    }
                    Value::Integer(n) => {
                        self.links.register(value);
                        let bytes = n.unsigned_abs().to_le_bytes();
                        let used = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
                        self.write_bignum(*n < 0, &bytes[..used])?;
                    }
                    Value::Bignum(b) => {
                        self.links.register(value);
                        self.write_bignum(b.is_negative(), b.magnitude())?;
                    }
                    _ => self.write_heap(value)?,
                }
            }
        }
        Ok(())
    }

    fn write_bignum(&mut self, negative: bool, magnitude: &[u8]) -> Result<()> {
        self.write_tag(Tag::Bignum);
        self.out.push(if negative { b'-' } else { b'+' });
        self.write_len(magnitude.len().div_ceil(2))?;
        self.out.extend_from_slice(magnitude);
        if magnitude.len() % 2 == 1 {
            self.out.push(0);
        }
        Ok(())
    }

    fn write_heap(&mut self, value: &Value) -> Result<()> {
        match value.find_hooks() {
            Some(MarshalHooks::Structured(hook)) => {
                return self.write_user_marshal(value, hook.as_ref());
            }
            Some(MarshalHooks::Opaque(hook)) => return self.write_user_def(value, hook.as_ref()),
            None => {}
        }

        self.links.register(value);
        let encoding = ivar::encoding_meta(value);
        let ivars = ivar::block_size(value, encoding.as_ref());
        if ivars > 0 {
            self.write_tag(Tag::Ivar);
        }

        let registry = self.registry;
        match value {
            Value::Class(class) => {
                if class.is_singleton() {
                    return Err(MarshalError::SingletonClass);
                }
                let path = self.class_path(class)?;
                self.write_tag(if class.is_module() {
                    Tag::Module
                } else {
                    Tag::Class
                });
                self.write_bytes(path.as_bytes())?;
            }
            Value::String(s) => {
                self.write_uclass(value, &registry.string_class())?;
                self.write_tag(Tag::String);
                let bytes = s.bytes().clone();
                self.write_bytes(&bytes)?;
            }
            Value::Regexp(r) => {
                self.write_uclass(value, &registry.regexp_class())?;
                self.write_tag(Tag::Regexp);
                let source = r.source().clone();
                self.write_bytes(&source)?;
                self.out.push(r.options());
            }
            Value::Array(a) => {
                self.write_uclass(value, &registry.array_class())?;
                self.write_tag(Tag::Array);
                let items = a.items().clone();
                self.write_len(items.len())?;
                for item in &items {
                    self.write_object(item)?;
                }
            }
            Value::Hash(h) => {
                self.write_uclass(value, &registry.hash_class())?;
                if h.is_compare_by_identity() {
                    self.write_tag(Tag::UserClass);
                    self.write_unique("Hash")?;
                }
                let default = h.default();
                match default {
                    HashDefault::None => self.write_tag(Tag::Hash),
                    HashDefault::Value(_) => self.write_tag(Tag::HashDefault),
                    HashDefault::Proc(_) => return Err(MarshalError::DefaultProc),
                }
                let entries = h.entries().clone();
                self.write_len(entries.len())?;
                for (k, v) in &entries {
                    self.write_object(k)?;
                    self.write_object(v)?;
                }
                if let HashDefault::Value(d) = default {
                    self.write_object(&d)?;
                }
            }
            Value::Struct(s) => {
                self.write_class(Tag::Struct, value, true)?;
                let class = s.header.class();
                let values = s.values().clone();
                let members = class.members();
                self.write_len(members.len().min(values.len()))?;
                for (member, v) in members.iter().zip(&values) {
                    self.write_symbol(member)?;
                    self.write_object(v)?;
                }
            }
            Value::Object(_) => {
                self.write_class(Tag::Object, value, true)?;
                let attrs = ivar::serializable_attributes(value);
                self.write_attributes(&attrs)?;
            }
            _ => return Err(MarshalError::NoDumpData(value.type_name())),
        }

        if ivars > 0 {
            self.write_ivars(value, ivars, encoding)?;
        }
        Ok(())
    }

    /// Structured protocol: the object is registered before its hook runs
    fn write_user_marshal(&mut self, value: &Value, hook: &dyn UserMarshal) -> Result<()> {
        self.links.register(value);
        let data = hook.marshal_dump(value)?;
        let class = Self::class_of(value)?;
        if let Some(data_class) = data.class_of()
            && Rc::ptr_eq(&data_class.real_class(), &class)
        {
            return Err(MarshalError::SameClass(class.display_name()));
        }
        self.write_class(Tag::UserMarshal, value, false)?;
        self.write_object(&data)
    }

    /// Opaque protocol: the payload string is not linked, the object is
    /// registered only once its record is complete
    fn write_user_def(&mut self, value: &Value, hook: &dyn UserDump) -> Result<()> {
        let budget = self.config.max_depth.saturating_sub(self.depth);
        let data = hook.dump(value, budget)?;
        let Some(bytes) = data.string_bytes() else {
            return Err(MarshalError::DumpNotString);
        };
        let encoding = ivar::encoding_meta(&data);
        let ivars = ivar::block_size(&data, encoding.as_ref());
        if ivars > 0 {
            self.write_tag(Tag::Ivar);
        }
        self.write_class(Tag::UserDef, value, false)?;
        self.write_bytes(&bytes)?;
        if ivars > 0 {
            self.write_ivars(&data, ivars, encoding)?;
        }
        self.links.register(value);
        Ok(())
    }

    fn write_attributes(&mut self, attrs: &[(Symbol, Value)]) -> Result<()> {
        self.write_len(attrs.len())?;
        for (name, v) in attrs {
            self.write_symbol(name)?;
            self.write_object(v)?;
        }
        Ok(())
    }

    /// Attribute block trailing a payload: metadata pairs, then attributes
    fn write_ivars(
        &mut self,
        value: &Value,
        count: usize,
        encoding: Option<EncodingMeta>,
    ) -> Result<()> {
        self.write_len(count)?;
        match encoding {
            Some(EncodingMeta::Short(utf8)) => {
                self.write_symbol(&Symbol::intern(ivar::ENCODING_SHORT))?;
                self.write_object(&Value::Bool(utf8))?;
            }
            Some(EncodingMeta::Named(name)) => {
                self.write_symbol(&Symbol::intern(ivar::ENCODING_NAME))?;
                let registry = self.registry;
                let name_value = self
                    .encodings
                    .entry(name)
                    .or_insert_with_key(|name| registry.binary(name.as_bytes()))
                    .clone();
                self.write_object(&name_value)?;
            }
            None => {}
        }
        if let Value::Hash(h) = value
            && h.is_keyword()
        {
            self.write_symbol(&Symbol::intern(ivar::KEYWORD_FLAG))?;
            self.write_object(&Value::Bool(true))?;
        }
        let attrs = ivar::serializable_attributes(value);
        for (name, v) in &attrs {
            self.write_symbol(name)?;
            self.write_object(v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dump(reg: &Registry, value: &Value) -> Result<Vec<u8>> {
        Dumper::new(reg, &MarshalConfig::default()).dump(value)
    }

    #[test]
    fn test_header_and_nil() {
        let reg = Registry::new();
        assert_eq!(dump(&reg, &Value::Nil).unwrap(), [4, 8, b'0']);
    }

    #[test]
    fn test_inline_integer_bounds() {
        let reg = Registry::new();
        assert_eq!(dump(&reg, &Value::Integer(1)).unwrap(), [4, 8, b'i', 6]);
        let top = dump(&reg, &Value::Integer(FIXNUM_MAX)).unwrap();
        assert_eq!(top[2], b'i');
        let over = dump(&reg, &Value::Integer(FIXNUM_MAX + 1)).unwrap();
        assert_eq!(&over[2..], [b'l', b'+', 7, 0, 0, 0, 0x40]);
        let under = dump(&reg, &Value::Integer(FIXNUM_MIN - 1)).unwrap();
        assert_eq!(&under[2..], [b'l', b'-', 7, 1, 0, 0, 0x40]);
    }

    #[test]
    fn test_symbol_reuse() {
        let reg = Registry::new();
        let a = reg.symbol("a");
        let bytes = dump(&reg, &reg.array(vec![a.clone(), a])).unwrap();
        assert_eq!(&bytes[2..], [b'[', 7, b':', 6, b'a', b';', 0]);
    }

    #[test]
    fn test_non_ascii_symbol() {
        let reg = Registry::new();
        let bytes = dump(&reg, &reg.symbol("é")).unwrap();
        assert_eq!(
            &bytes[2..],
            [b'I', b':', 7, 0xc3, 0xa9, 6, b':', 6, b'E', b'T']
        );
    }

    #[test]
    fn test_float_linked_by_value() {
        let reg = Registry::new();
        let bytes = dump(&reg, &reg.array(vec![Value::Float(1.5), Value::Float(1.5)])).unwrap();
        assert_eq!(
            &bytes[2..],
            [b'[', 7, b'f', 8, b'1', b'.', b'5', b'@', 6]
        );
    }

    #[test]
    fn test_named_encoding_string_shared() {
        let reg = Registry::new();
        let sjis = marshal_core::Encoding::from_name("Shift_JIS");
        let a = reg.string_with(b"a".to_vec(), sjis.clone());
        let b = reg.string_with(b"b".to_vec(), sjis);
        let bytes = dump(&reg, &reg.array(vec![a, b])).unwrap();
        // second string refers back to the first name string (link 2)
        assert!(bytes.ends_with(&[b'I', b'"', 6, b'b', 6, b';', 0, b'@', 7]));
    }

    #[test]
    fn test_singleton_rejected() {
        let reg = Registry::new();
        let s = reg.str("x");
        reg.singleton_class(&s);
        assert!(matches!(dump(&reg, &s), Err(MarshalError::Singleton)));
    }

    #[test]
    fn test_singleton_class_rejected() {
        let reg = Registry::new();
        let o = reg.object(&reg.object_class());
        let meta = reg.singleton_class(&o).unwrap();
        assert!(matches!(
            dump(&reg, &Value::Class(meta)),
            Err(MarshalError::SingletonClass)
        ));
    }

    #[test]
    fn test_proc_and_data_rejected() {
        let reg = Registry::new();
        assert!(matches!(
            dump(&reg, &Value::Proc(reg.proc_value())),
            Err(MarshalError::NoDumpData(_))
        ));
        let data = reg.data(&reg.data_class(), b"raw");
        assert!(matches!(dump(&reg, &data), Err(MarshalError::NoDumpData(_))));
    }

    #[test]
    fn test_proc_attributes_skipped() {
        let reg = Registry::new();
        let o = reg.object(&reg.object_class());
        o.set_attribute(Symbol::intern("@cb"), Value::Proc(reg.proc_value()));
        let bytes = dump(&reg, &o).unwrap();
        assert_eq!(
            &bytes[2..],
            [b'o', b':', 11, b'O', b'b', b'j', b'e', b'c', b't', 0]
        );
    }
}
