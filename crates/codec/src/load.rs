//! Reader
//!
//! `Loader` mirrors the dumper: every tag selects a reader, objects are
//! registered in the link list as soon as they exist (before their contents
//! are read, so cycles resolve), and each completed value passes through
//! `leave` for freezing and the caller's callback.
//!
//! Two pieces of state travel down the recursion:
//!
//! - `ivp`: an `I` record is waiting for its attribute block. Readers that
//!   need the attributes before building their value (regexps, opaque hook
//!   payloads, symbols) consume it and clear the flag; otherwise the `I`
//!   reader applies the block once the inner value is done.
//! - `extmod`: modules from enclosing `e` records, applied once the value
//!   they wrap exists.

use crate::cache::{LinkList, SymbolList};
use crate::config::MarshalConfig;
use crate::error::{MarshalError, Result};
use crate::float;
use crate::ivar::{self, Attribute};
use crate::reader::ByteReader;
use crate::tag::{MAJOR_VERSION, MINOR_VERSION, Tag};
use crate::varint;
use marshal_core::{
    ClassRef, Encoding, HashDefault, HookError, MarshalHooks, NativeKind, ObjectId, RRegexp,
    Registry, Symbol, Value,
};
use std::collections::HashMap;
use std::io::Read;
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Callback applied to each completed value
pub type PostProc<'p> = &'p mut dyn FnMut(Value) -> std::result::Result<Value, HookError>;

/// What a path read from the stream must name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathKind {
    Class,
    Module,
    Either,
}

/// Single-use load session
pub struct Loader<'a, R> {
    registry: &'a Registry,
    config: &'a MarshalConfig,
    reader: ByteReader<R>,
    links: LinkList,
    symbols: SymbolList,
    /// Objects registered but not yet complete, with their link index
    partial: HashMap<ObjectId, usize>,
    /// Frozen strings by content, for deduplication under `freeze`
    fstrings: HashMap<(Vec<u8>, Encoding), Value>,
    proc_: Option<PostProc<'a>>,
    depth: usize,
}

impl<'a, R: Read> Loader<'a, R> {
    pub fn new(registry: &'a Registry, source: R, config: &'a MarshalConfig) -> Self {
        Loader {
            registry,
            config,
            reader: ByteReader::new(source),
            links: LinkList::new(),
            symbols: SymbolList::new(),
            partial: HashMap::new(),
            fstrings: HashMap::new(),
            proc_: None,
            depth: 0,
        }
    }

    /// Run `proc_` on every completed value; its result replaces the value
    pub fn with_proc(mut self, proc_: PostProc<'a>) -> Self {
        self.proc_ = Some(proc_);
        self
    }

    /// Check the header and read one value
    pub fn load(mut self) -> Result<Value> {
        let major = self.reader.read_byte()?;
        let minor = self.reader.read_byte()?;
        if major != MAJOR_VERSION || minor > MINOR_VERSION {
            return Err(MarshalError::VersionMismatch { major, minor });
        }
        if minor < MINOR_VERSION {
            warn!(
                "incompatible marshal file format (can be read): format version {}.{} required; {}.{} given",
                MAJOR_VERSION, MINOR_VERSION, major, minor
            );
        }
        debug!("load start: version {}.{}", major, minor);
        let value = self.read_object()?;
        debug!(
            "load done: {} bytes, {} links, {} symbols",
            self.reader.offset(),
            self.links.len(),
            self.symbols.len()
        );
        Ok(value)
    }

    fn read_object(&mut self) -> Result<Value> {
        let mut extmod = Vec::new();
        self.read_object0(false, None, &mut extmod)
    }

    fn read_object0(
        &mut self,
        partial: bool,
        ivp: Option<&mut bool>,
        extmod: &mut Vec<ClassRef>,
    ) -> Result<Value> {
        let offset = self.reader.offset();
        let byte = self.reader.read_byte()?;
        self.read_object_for(byte, offset, partial, ivp, extmod)
    }

    /// Read the value introduced by an already consumed tag byte
    fn read_object_for(
        &mut self,
        byte: u8,
        offset: u64,
        partial: bool,
        ivp: Option<&mut bool>,
        extmod: &mut Vec<ClassRef>,
    ) -> Result<Value> {
        self.depth += 1;
        let result = if self.depth > self.config.max_depth {
            Err(MarshalError::DepthLimit)
        } else {
            match Tag::from_byte(byte) {
                Some(tag) => {
                    trace!("read {:?} at {}", tag, offset);
                    self.read_tagged(tag, offset, partial, ivp, extmod)
                }
                None => Err(MarshalError::UnknownTag { byte, offset }),
            }
        };
        self.depth -= 1;
        result
    }

    fn read_tagged(
        &mut self,
        tag: Tag,
        offset: u64,
        partial: bool,
        ivp: Option<&mut bool>,
        extmod: &mut Vec<ClassRef>,
    ) -> Result<Value> {
        match tag {
            Tag::Link => {
                let index = self.read_long()?;
                let value = usize::try_from(index)
                    .ok()
                    .and_then(|i| self.links.get(i))
                    .cloned()
                    .ok_or(MarshalError::BadLink { index: index as i64, offset })?;
                let complete = value
                    .identity()
                    .is_none_or(|id| !self.partial.contains_key(&id));
                if complete {
                    self.post_proc(value)
                } else {
                    Ok(value)
                }
            }

            Tag::Ivar => {
                let mut pending = true;
                let value = self.read_object0(true, Some(&mut pending), extmod)?;
                if pending {
                    self.read_ivars(&value, None)?;
                }
                self.leave(value, partial)
            }

            Tag::Extended => {
                let path = self.read_unique()?;
                let module = self.resolve_path(&path, PathKind::Module)?;
                extmod.push(module);
                let value = self.read_object0(true, None, extmod)?;
                apply_extended(&value, extmod)?;
                self.leave(value, partial)
            }

            Tag::UserClass => self.read_user_class(partial, extmod),

            Tag::Nil => self.leave(Value::Nil, false),
            Tag::True => self.leave(Value::Bool(true), false),
            Tag::False => self.leave(Value::Bool(false), false),
            Tag::Fixnum => {
                let n = self.read_long()?;
                self.leave(Value::Integer(n as i64), false)
            }

            Tag::Float => {
                let bytes = self.read_bytes()?;
                let value = Value::Float(float::parse(&bytes)?);
                self.entry(&value);
                self.leave(value, false)
            }

            Tag::Bignum => {
                let sign = self.reader.read_byte()?;
                let words = self.read_long()?;
                let len = usize::try_from(words)
                    .map_err(|_| MarshalError::Malformed("negative bignum length".into()))?;
                let magnitude = self.reader.read_exact(len * 2)?;
                let value = self.registry.integer_from_magnitude(sign == b'-', magnitude);
                self.entry(&value);
                self.leave(value, false)
            }

            Tag::String => {
                let bytes = self.read_bytes()?;
                let value = self.registry.string_with(bytes, Encoding::Binary);
                self.entry(&value);
                self.leave(value, partial)
            }

            Tag::Regexp => self.read_regexp(partial, ivp),

            Tag::Array => {
                let len = self.read_len()?;
                let value = self.registry.array(Vec::new());
                self.entry(&value);
                if let Value::Array(array) = &value {
                    for _ in 0..len {
                        let item = self.read_object()?;
                        array.push(item);
                    }
                }
                self.leave(value, partial)
            }

            Tag::Hash | Tag::HashDefault => self.read_hash(tag, false, partial),

            Tag::Struct => self.read_struct(partial),

            Tag::UserDef => self.read_user_def(partial, ivp),

            Tag::UserMarshal => self.read_user_marshal(partial, extmod),

            Tag::Object => {
                let index = self.links.reserve();
                let path = self.read_unique()?;
                let class = self.resolve_path(&path, PathKind::Class)?;
                if class.instance_kind() != NativeKind::Object {
                    return Err(MarshalError::Malformed(format!(
                        "{} is not a plain object class",
                        path
                    )));
                }
                let value = self.registry.allocate(&class)?;
                self.entry_at(index, &value);
                self.read_ivars(&value, None)?;
                self.leave(value, partial)
            }

            Tag::Data => Err(MarshalError::DataUnsupported),

            Tag::ClassOrModule | Tag::Class | Tag::Module => {
                let bytes = self.read_bytes()?;
                let path = String::from_utf8_lossy(&bytes).into_owned();
                let (kind, label) = match tag {
                    Tag::Class => (PathKind::Class, "class"),
                    Tag::Module => (PathKind::Module, "module"),
                    _ => (PathKind::Either, "class/module"),
                };
                let class = self.resolve_path(&path, kind)?;
                if ivp.is_some_and(|pending| *pending) {
                    return Err(MarshalError::ProhibitIvar { kind: label, name: path });
                }
                let value = Value::Class(class);
                self.entry(&value);
                self.leave(value, partial)
            }

            Tag::Symbol => {
                let with_ivars = match ivp {
                    Some(pending) => std::mem::replace(pending, false),
                    None => false,
                };
                let symbol = self.read_symbol_body(with_ivars)?;
                self.leave(Value::Symbol(symbol), partial)
            }

            Tag::SymbolLink => {
                let symbol = self.read_symbol_link()?;
                self.leave(Value::Symbol(symbol), partial)
            }
        }
    }

    fn read_long(&mut self) -> Result<i32> {
        varint::decode(&mut self.reader)
    }

    /// A length or count; negative values are malformed
    fn read_len(&mut self) -> Result<usize> {
        let offset = self.reader.offset();
        let n = self.read_long()?;
        usize::try_from(n).map_err(|_| MarshalError::MalformedVarint { offset })
    }

    fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.read_len()?;
        self.reader.read_exact(len)
    }

    /// A symbol in a position that can only hold one (names, paths, keys of
    /// attribute blocks)
    fn read_symbol(&mut self) -> Result<Symbol> {
        let mut with_ivars = false;
        loop {
            let offset = self.reader.offset();
            let byte = self.reader.read_byte()?;
            match Tag::from_byte(byte) {
                Some(Tag::Ivar) => with_ivars = true,
                Some(Tag::Symbol) => return self.read_symbol_body(with_ivars),
                Some(Tag::SymbolLink) if !with_ivars => return self.read_symbol_link(),
                Some(Tag::SymbolLink) => {
                    return Err(MarshalError::Malformed("symlink with encoding".into()));
                }
                _ => {
                    return Err(MarshalError::Malformed(format!(
                        "symbol expected, got 0x{:x} at offset {}",
                        byte, offset
                    )));
                }
            }
        }
    }

    /// Symbol bytes, registered before any encoding pairs that follow
    fn read_symbol_body(&mut self, with_ivars: bool) -> Result<Symbol> {
        let bytes = self.read_bytes()?;
        let symbol = Symbol::intern(&bytes);
        self.symbols.push(symbol.clone());
        if with_ivars {
            let count = self.read_long()?;
            for _ in 0..count.max(0) {
                self.read_symbol()?;
                self.read_object()?;
            }
        }
        Ok(symbol)
    }

    fn read_symbol_link(&mut self) -> Result<Symbol> {
        let offset = self.reader.offset();
        let index = self.read_long()?;
        usize::try_from(index)
            .ok()
            .and_then(|i| self.symbols.get(i))
            .cloned()
            .ok_or(MarshalError::BadSymbol { index: index as i64, offset })
    }

    fn read_unique(&mut self) -> Result<String> {
        let symbol = self.read_symbol()?;
        Ok(String::from_utf8_lossy(symbol.as_bytes()).into_owned())
    }

    fn resolve_path(&self, path: &str, kind: PathKind) -> Result<ClassRef> {
        let class = match self.registry.resolve(path) {
            Some(class) => class,
            None if self.registry.autodefine() => match kind {
                PathKind::Module => self.registry.define_module(path),
                _ => self.registry.define_class(path, &self.registry.object_class()),
            },
            None => return Err(MarshalError::UndefinedClass(path.to_string())),
        };
        match kind {
            PathKind::Class if class.is_module() => {
                Err(MarshalError::NotAClass(path.to_string()))
            }
            PathKind::Module if !class.is_module() => {
                Err(MarshalError::NotAModule(path.to_string()))
            }
            _ => Ok(class),
        }
    }

    /// Register a new object under the next link index
    fn entry(&mut self, value: &Value) -> usize {
        let index = self.links.push(value.clone());
        if let Some(id) = value.identity() {
            self.partial.insert(id, index);
        }
        index
    }

    /// Fill a link index reserved before the object existed
    fn entry_at(&mut self, index: usize, value: &Value) {
        self.links.set(index, value.clone());
        if let Some(id) = value.identity() {
            self.partial.insert(id, index);
        }
    }

    /// Completion of a value: unmark, freeze, run the callback
    fn leave(&mut self, value: Value, partial: bool) -> Result<Value> {
        if partial {
            return Ok(value);
        }
        let index = value.identity().and_then(|id| self.partial.remove(&id));
        let value = if self.config.freeze {
            self.freeze(value, index)
        } else {
            value
        };
        if matches!(value, Value::Symbol(_)) {
            return Ok(value);
        }
        self.post_proc(value)
    }

    /// Freeze a completed value; plain strings are deduplicated by content
    fn freeze(&mut self, value: Value, index: Option<usize>) -> Value {
        if matches!(value, Value::Class(_)) {
            return value;
        }
        let key = match &value {
            Value::String(s)
                if Rc::ptr_eq(&s.header.class(), &self.registry.string_class())
                    && s.header.attribute_count() == 0 =>
            {
                Some((s.bytes().clone(), s.encoding()))
            }
            _ => None,
        };
        value.freeze();
        let Some(key) = key else {
            return value;
        };
        if let Some(existing) = self.fstrings.get(&key).cloned() {
            if let Some(index) = index {
                self.links.set(index, existing.clone());
            }
            return existing;
        }
        self.fstrings.insert(key, value.clone());
        value
    }

    fn post_proc(&mut self, value: Value) -> Result<Value> {
        match self.proc_.as_mut() {
            Some(proc_) => Ok(proc_(value)?),
            None => Ok(value),
        }
    }

    /// Attribute block applied to `target`; `has_encoding` records whether
    /// an encoding pair was seen
    fn read_ivars(&mut self, target: &Value, mut has_encoding: Option<&mut bool>) -> Result<()> {
        let count = self.read_long()?;
        for _ in 0..count.max(0) {
            let name = self.read_symbol()?;
            let value = self.read_object()?;
            match ivar::classify(name, value)? {
                Attribute::Encoding(encoding) => {
                    if !target.set_encoding(encoding) {
                        return Err(MarshalError::Malformed(format!(
                            "{} is not enc_capable",
                            target.type_name()
                        )));
                    }
                    if let Some(flag) = has_encoding.as_deref_mut() {
                        *flag = true;
                    }
                }
                Attribute::Keyword => match target {
                    Value::Hash(h) => h.set_keyword(true),
                    other => {
                        return Err(MarshalError::Malformed(format!(
                            "ruby2_keywords flag is given but {} is not a Hash",
                            other.type_name()
                        )));
                    }
                },
                Attribute::Plain(name, value) => {
                    if !target.set_attribute(name, value) {
                        return Err(MarshalError::Malformed(format!(
                            "can't set instance variable on {}",
                            target.type_name()
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn read_user_class(&mut self, partial: bool, extmod: &mut Vec<ClassRef>) -> Result<Value> {
        let path = self.read_unique()?;
        let known = match self.registry.resolve(&path) {
            Some(class) if class.is_module() => {
                return Err(MarshalError::NotAClass(path));
            }
            Some(class) => Some(class),
            None if self.registry.autodefine() => None,
            None => return Err(MarshalError::UndefinedClass(path)),
        };
        if known.as_ref().is_some_and(|c| c.is_singleton()) {
            return Err(MarshalError::SingletonLoad);
        }

        let offset = self.reader.offset();
        let byte = self.reader.read_byte()?;
        let is_hash_tag = matches!(Tag::from_byte(byte), Some(Tag::Hash | Tag::HashDefault));
        if is_hash_tag
            && let Some(class) = &known
            && Rc::ptr_eq(class, &self.registry.hash_class())
        {
            let tag = if byte == Tag::Hash.byte() {
                Tag::Hash
            } else {
                Tag::HashDefault
            };
            return self.read_hash(tag, true, partial);
        }

        // Completion waits until the value carries its final class
        let value = self.read_object_for(byte, offset, true, None, extmod)?;
        let kind = match &value {
            Value::Class(_) | Value::Object(_) => None,
            other if other.is_immediate() => None,
            other => other.native_kind(),
        };
        let Some(kind) = kind else {
            return Err(MarshalError::UserClass);
        };
        let Some(header) = value.header() else {
            return Err(MarshalError::UserClass);
        };
        // Unknown wrapper classes are defined as subclasses of what they wrap
        let class = match known {
            Some(class) => class,
            None => self.registry.define_class(&path, &header.class()),
        };
        if class.instance_kind() != kind {
            return Err(MarshalError::UserClass);
        }
        header.set_class(class);
        self.leave(value, partial)
    }

    fn read_hash(&mut self, tag: Tag, identity: bool, partial: bool) -> Result<Value> {
        let len = self.read_len()?;
        let value = self.registry.hash();
        self.entry(&value);
        if let Value::Hash(hash) = &value {
            hash.set_compare_by_identity(identity);
            for _ in 0..len {
                let key = self.read_object()?;
                let item = self.read_object()?;
                hash.insert(key, item);
            }
            if tag == Tag::HashDefault {
                let default = self.read_object()?;
                hash.set_default(HashDefault::Value(default));
            }
        }
        self.leave(value, partial)
    }

    fn read_regexp(&mut self, partial: bool, ivp: Option<&mut bool>) -> Result<Value> {
        let source = self.read_bytes()?;
        let options = self.reader.read_byte()?;
        let index = self.links.reserve();

        let holder = self.registry.string_with(source, Encoding::Binary);
        let mut has_encoding = false;
        if let Some(pending) = ivp {
            self.read_ivars(&holder, Some(&mut has_encoding))?;
            *pending = false;
        }
        let mut source = holder.string_bytes().unwrap_or_default();
        let encoding = match holder.encoding() {
            Some(encoding) if has_encoding => encoding,
            _ => {
                source = ivar::unescape_legacy_regexp(&source);
                if source.is_ascii() {
                    Encoding::UsAscii
                } else {
                    Encoding::Binary
                }
            }
        };

        let value = Value::Regexp(Rc::new(RRegexp::new(
            self.registry.regexp_class(),
            source,
            options,
            encoding,
        )));
        for (name, attr) in holder.attributes() {
            value.set_attribute(name, attr);
        }
        self.entry_at(index, &value);
        self.leave(value, partial)
    }

    fn read_struct(&mut self, partial: bool) -> Result<Value> {
        let index = self.links.reserve();
        let path = self.read_unique()?;
        let class = self.resolve_path(&path, PathKind::Class)?;
        let len = self.read_len()?;
        if class.instance_kind() != NativeKind::Struct {
            return Err(MarshalError::NotAStruct(class.display_name()));
        }
        let members = class.members().to_vec();
        if members.len() != len {
            return Err(MarshalError::StructSize(class.display_name()));
        }
        let value = self.registry.allocate(&class)?;
        self.entry_at(index, &value);

        let mut values = Vec::with_capacity(len);
        for expected in &members {
            let got = self.read_symbol()?;
            if got != *expected {
                return Err(MarshalError::StructMember {
                    class: class.display_name(),
                    got: got.to_string(),
                    expected: expected.to_string(),
                });
            }
            values.push(self.read_object()?);
        }
        if let Value::Struct(s) = &value {
            s.set_values(values);
        }
        self.leave(value, partial)
    }

    /// Opaque protocol: payload string, its attributes, then the class's
    /// loader builds the instance
    fn read_user_def(&mut self, partial: bool, ivp: Option<&mut bool>) -> Result<Value> {
        let path = self.read_unique()?;
        let class = self.resolve_path(&path, PathKind::Class)?;
        let hook = class
            .find_hooks()
            .and_then(|h| h.as_opaque().cloned())
            .ok_or_else(|| MarshalError::MissingLoad(path.clone()))?;

        let bytes = self.read_bytes()?;
        let data = self.registry.string_with(bytes, Encoding::Binary);
        if let Some(pending) = ivp {
            self.read_ivars(&data, None)?;
            *pending = false;
        }

        let value = match class.singleton_instance() {
            Some(instance) => instance,
            None => hook.load(&class, &data)?,
        };
        self.entry(&value);
        self.leave(value, partial)
    }

    /// Structured protocol: allocate, register, read the data value, then
    /// hand it to the instance
    fn read_user_marshal(&mut self, partial: bool, extmod: &mut Vec<ClassRef>) -> Result<Value> {
        let path = self.read_unique()?;
        let class = self.resolve_path(&path, PathKind::Class)?;
        let value = self.registry.allocate(&class)?;
        apply_extended(&value, extmod)?;
        let hook = match value.find_hooks() {
            Some(MarshalHooks::Structured(hook)) => hook,
            _ => return Err(MarshalError::MissingMarshalLoad(path)),
        };
        self.entry(&value);
        let data = self.read_object()?;
        hook.marshal_load(&value, data)?;
        self.leave(value, partial)
    }
}

/// Extend `value` with the pending `e` modules, innermost first
fn apply_extended(value: &Value, extmod: &mut Vec<ClassRef>) -> Result<()> {
    while let Some(module) = extmod.pop() {
        if !value.extend(module) {
            return Err(MarshalError::Malformed(format!(
                "can't extend {}",
                value.type_name()
            )));
        }
    }
    Ok(())
}
