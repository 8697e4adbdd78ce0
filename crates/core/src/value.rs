use crate::class::{ClassRef, NativeKind};
use crate::encoding::Encoding;
use crate::hooks::MarshalHooks;
use crate::symbol::Symbol;
use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

/// Pointer identity of a heap value, usable as a map key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

impl ObjectId {
    fn of<T>(rc: &Rc<T>) -> Self {
        ObjectId(Rc::as_ptr(rc) as *const () as usize)
    }
}

/// State shared by every heap object
///
/// All fields use interior mutability so a handle can be registered (and
/// referenced by cycles) before its contents are filled in.
pub struct ObjHeader {
    class: RefCell<ClassRef>,
    /// Modules extended into this object, most recent first
    extended: RefCell<Vec<ClassRef>>,
    /// Object has per-instance methods (a non-trivial singleton class)
    singleton: Cell<bool>,
    frozen: Cell<bool>,
    attributes: RefCell<Vec<(Symbol, Value)>>,
}

impl ObjHeader {
    pub fn new(class: ClassRef) -> Self {
        ObjHeader {
            class: RefCell::new(class),
            extended: RefCell::new(Vec::new()),
            singleton: Cell::new(false),
            frozen: Cell::new(false),
            attributes: RefCell::new(Vec::new()),
        }
    }

    pub fn class(&self) -> ClassRef {
        self.class.borrow().clone()
    }

    pub fn set_class(&self, class: ClassRef) {
        *self.class.borrow_mut() = class;
    }

    pub fn extended(&self) -> Vec<ClassRef> {
        self.extended.borrow().clone()
    }

    /// Extend with a module; it becomes the first entry of the chain
    pub fn extend(&self, module: ClassRef) {
        let mut chain = self.extended.borrow_mut();
        if chain.iter().any(|m| Rc::ptr_eq(m, &module)) {
            return;
        }
        chain.insert(0, module);
    }

    pub fn has_singleton_methods(&self) -> bool {
        self.singleton.get()
    }

    pub fn mark_singleton(&self) {
        self.singleton.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    pub fn freeze(&self) {
        self.frozen.set(true);
    }

    pub fn attributes(&self) -> Vec<(Symbol, Value)> {
        self.attributes.borrow().clone()
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.borrow().len()
    }

    pub fn attribute(&self, name: &Symbol) -> Option<Value> {
        self.attributes
            .borrow()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    /// Set an attribute, keeping the original position when it already exists
    pub fn set_attribute(&self, name: Symbol, value: Value) {
        let mut attrs = self.attributes.borrow_mut();
        if let Some(slot) = attrs.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            attrs.push((name, value));
        }
    }
}

/// Byte string with an encoding tag
pub struct RString {
    pub header: ObjHeader,
    bytes: RefCell<Vec<u8>>,
    encoding: RefCell<Encoding>,
}

impl RString {
    pub fn new(class: ClassRef, bytes: Vec<u8>, encoding: Encoding) -> Self {
        RString {
            header: ObjHeader::new(class),
            bytes: RefCell::new(bytes),
            encoding: RefCell::new(encoding),
        }
    }

    pub fn bytes(&self) -> Ref<'_, Vec<u8>> {
        self.bytes.borrow()
    }

    pub fn set_bytes(&self, bytes: Vec<u8>) {
        *self.bytes.borrow_mut() = bytes;
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding.borrow().clone()
    }

    pub fn set_encoding(&self, encoding: Encoding) {
        *self.encoding.borrow_mut() = encoding;
    }

    /// Contents as text (lossy for invalid UTF-8)
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes.borrow()).into_owned()
    }
}

pub const REGEXP_IGNORECASE: u8 = 1;
pub const REGEXP_EXTENDED: u8 = 2;
pub const REGEXP_MULTILINE: u8 = 4;

/// Regular expression: source bytes plus option bits
pub struct RRegexp {
    pub header: ObjHeader,
    source: RefCell<Vec<u8>>,
    options: Cell<u8>,
    encoding: RefCell<Encoding>,
}

impl RRegexp {
    pub fn new(class: ClassRef, source: Vec<u8>, options: u8, encoding: Encoding) -> Self {
        RRegexp {
            header: ObjHeader::new(class),
            source: RefCell::new(source),
            options: Cell::new(options),
            encoding: RefCell::new(encoding),
        }
    }

    pub fn source(&self) -> Ref<'_, Vec<u8>> {
        self.source.borrow()
    }

    pub fn set_source(&self, source: Vec<u8>) {
        *self.source.borrow_mut() = source;
    }

    pub fn options(&self) -> u8 {
        self.options.get()
    }

    pub fn set_options(&self, options: u8) {
        self.options.set(options);
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding.borrow().clone()
    }

    pub fn set_encoding(&self, encoding: Encoding) {
        *self.encoding.borrow_mut() = encoding;
    }
}

pub struct RArray {
    pub header: ObjHeader,
    items: RefCell<Vec<Value>>,
}

impl RArray {
    pub fn new(class: ClassRef, items: Vec<Value>) -> Self {
        RArray {
            header: ObjHeader::new(class),
            items: RefCell::new(items),
        }
    }

    pub fn items(&self) -> Ref<'_, Vec<Value>> {
        self.items.borrow()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.items.borrow().get(index).cloned()
    }

    pub fn push(&self, value: Value) {
        self.items.borrow_mut().push(value);
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

/// What a hash returns for a missing key
#[derive(Clone, Default)]
pub enum HashDefault {
    #[default]
    None,
    Value(Value),
    /// Computed by code; a hash carrying one cannot be dumped
    Proc(Rc<RProc>),
}

/// Insertion-ordered hash
pub struct RHash {
    pub header: ObjHeader,
    entries: RefCell<Vec<(Value, Value)>>,
    default: RefCell<HashDefault>,
    compare_by_identity: Cell<bool>,
    /// Keyword-argument hash flag (`ruby2_keywords`)
    keyword: Cell<bool>,
}

impl RHash {
    pub fn new(class: ClassRef) -> Self {
        RHash {
            header: ObjHeader::new(class),
            entries: RefCell::new(Vec::new()),
            default: RefCell::new(HashDefault::None),
            compare_by_identity: Cell::new(false),
            keyword: Cell::new(false),
        }
    }

    fn key_matches(&self, a: &Value, b: &Value) -> bool {
        if self.compare_by_identity.get() {
            a.ptr_eq(b)
        } else {
            a.eql(b)
        }
    }

    pub fn entries(&self) -> Ref<'_, Vec<(Value, Value)>> {
        self.entries.borrow()
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.entries
            .borrow()
            .iter()
            .find(|(k, _)| self.key_matches(k, key))
            .map(|(_, v)| v.clone())
    }

    /// Insert or replace; replacing keeps the original position
    pub fn insert(&self, key: Value, value: Value) {
        let mut entries = self.entries.borrow_mut();
        if let Some(slot) = entries.iter_mut().find(|(k, _)| self.key_matches(k, &key)) {
            slot.1 = value;
        } else {
            entries.push((key, value));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn default(&self) -> HashDefault {
        self.default.borrow().clone()
    }

    pub fn set_default(&self, default: HashDefault) {
        *self.default.borrow_mut() = default;
    }

    pub fn is_compare_by_identity(&self) -> bool {
        self.compare_by_identity.get()
    }

    pub fn set_compare_by_identity(&self, on: bool) {
        self.compare_by_identity.set(on);
    }

    pub fn is_keyword(&self) -> bool {
        self.keyword.get()
    }

    pub fn set_keyword(&self, on: bool) {
        self.keyword.set(on);
    }
}

/// Struct instance; member names live on the class
pub struct RStruct {
    pub header: ObjHeader,
    values: RefCell<Vec<Value>>,
}

impl RStruct {
    pub fn new(class: ClassRef, values: Vec<Value>) -> Self {
        RStruct {
            header: ObjHeader::new(class),
            values: RefCell::new(values),
        }
    }

    pub fn values(&self) -> Ref<'_, Vec<Value>> {
        self.values.borrow()
    }

    pub fn set_values(&self, values: Vec<Value>) {
        *self.values.borrow_mut() = values;
    }

    /// Member value by name
    pub fn get(&self, member: &Symbol) -> Option<Value> {
        let class = self.header.class();
        let index = class.members().iter().position(|m| m == member)?;
        self.values.borrow().get(index).cloned()
    }
}

/// Plain object: all state lives in its attributes
pub struct RObject {
    pub header: ObjHeader,
}

/// Native object with an opaque payload
pub struct RData {
    pub header: ObjHeader,
    payload: RefCell<Vec<u8>>,
}

impl RData {
    pub fn new(class: ClassRef, payload: Vec<u8>) -> Self {
        RData {
            header: ObjHeader::new(class),
            payload: RefCell::new(payload),
        }
    }

    pub fn payload(&self) -> Ref<'_, Vec<u8>> {
        self.payload.borrow()
    }

    pub fn set_payload(&self, payload: Vec<u8>) {
        *self.payload.borrow_mut() = payload;
    }
}

/// Code value (lambda/proc). Carries no data the codec can write.
pub struct RProc {
    pub header: ObjHeader,
}

/// Integer too large for `i64`, stored as sign plus little-endian magnitude
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RBignum {
    negative: bool,
    magnitude: Vec<u8>,
}

impl RBignum {
    /// Build from sign and little-endian magnitude (trailing zeros trimmed)
    pub fn new(negative: bool, mut magnitude: Vec<u8>) -> Self {
        while magnitude.last() == Some(&0) {
            magnitude.pop();
        }
        RBignum {
            negative,
            magnitude,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn magnitude(&self) -> &[u8] {
        &self.magnitude
    }

    /// Value as `i64`, if it fits
    pub fn to_i64(&self) -> Option<i64> {
        if self.magnitude.len() > 8 {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[..self.magnitude.len()].copy_from_slice(&self.magnitude);
        let mag = u64::from_le_bytes(buf);
        if self.negative {
            if mag <= i64::MAX as u64 + 1 {
                Some((mag as i64).wrapping_neg())
            } else {
                None
            }
        } else if mag <= i64::MAX as u64 {
            Some(mag as i64)
        } else {
            None
        }
    }
}

/// Value: a node in a marshalable object graph
///
/// Immediates (`Nil`, `Bool`, `Integer`, `Float`, `Symbol`) are plain data.
/// Every other variant is an `Rc` handle; cloning shares identity, and graphs
/// may contain cycles through attributes, arrays and hashes.
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Bignum(Rc<RBignum>),
    Symbol(Symbol),
    String(Rc<RString>),
    Regexp(Rc<RRegexp>),
    Array(Rc<RArray>),
    Hash(Rc<RHash>),
    Struct(Rc<RStruct>),
    Object(Rc<RObject>),
    Data(Rc<RData>),
    Proc(Rc<RProc>),
    /// Class or module reference
    Class(ClassRef),
}

impl Value {
    /// True for values with no heap identity
    pub fn is_immediate(&self) -> bool {
        matches!(
            self,
            Value::Nil | Value::Bool(_) | Value::Integer(_) | Value::Float(_) | Value::Symbol(_)
        )
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Identity of a heap value; `None` for immediates
    pub fn identity(&self) -> Option<ObjectId> {
        match self {
            Value::Nil
            | Value::Bool(_)
            | Value::Integer(_)
            | Value::Float(_)
            | Value::Symbol(_) => None,
            Value::Bignum(rc) => Some(ObjectId::of(rc)),
            Value::String(rc) => Some(ObjectId::of(rc)),
            Value::Regexp(rc) => Some(ObjectId::of(rc)),
            Value::Array(rc) => Some(ObjectId::of(rc)),
            Value::Hash(rc) => Some(ObjectId::of(rc)),
            Value::Struct(rc) => Some(ObjectId::of(rc)),
            Value::Object(rc) => Some(ObjectId::of(rc)),
            Value::Data(rc) => Some(ObjectId::of(rc)),
            Value::Proc(rc) => Some(ObjectId::of(rc)),
            Value::Class(rc) => Some(ObjectId::of(rc)),
        }
    }

    /// Identity comparison (`equal?`); immediates compare by value
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Symbol(a), Value::Symbol(b)) => a.ptr_eq(b),
            _ => match (self.identity(), other.identity()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Hash-key equality (`eql?`)
    ///
    /// Numbers, symbols and strings compare by content (no cross-type numeric
    /// equality); arrays compare element-wise; everything else by identity.
    pub fn eql(&self, other: &Value) -> bool {
        self.eql_bounded(other, 32)
    }

    fn eql_bounded(&self, other: &Value, budget: usize) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        match (self, other) {
            (Value::Bignum(a), Value::Bignum(b)) => a == b,
            (Value::String(a), Value::String(b)) => *a.bytes() == *b.bytes(),
            (Value::Array(a), Value::Array(b)) if budget > 0 => {
                let (a, b) = (a.items(), b.items());
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| x.eql_bounded(y, budget - 1))
            }
            _ => false,
        }
    }

    /// Header of a heap object (everything but immediates, bignums and classes)
    pub fn header(&self) -> Option<&ObjHeader> {
        match self {
            Value::String(s) => Some(&s.header),
            Value::Regexp(r) => Some(&r.header),
            Value::Array(a) => Some(&a.header),
            Value::Hash(h) => Some(&h.header),
            Value::Struct(s) => Some(&s.header),
            Value::Object(o) => Some(&o.header),
            Value::Data(d) => Some(&d.header),
            Value::Proc(p) => Some(&p.header),
            _ => None,
        }
    }

    /// Class of a heap object
    pub fn class_of(&self) -> Option<ClassRef> {
        self.header().map(|h| h.class())
    }

    /// Native representation kind of a heap value
    pub fn native_kind(&self) -> Option<NativeKind> {
        match self {
            Value::String(_) => Some(NativeKind::String),
            Value::Regexp(_) => Some(NativeKind::Regexp),
            Value::Array(_) => Some(NativeKind::Array),
            Value::Hash(_) => Some(NativeKind::Hash),
            Value::Struct(_) => Some(NativeKind::Struct),
            Value::Object(_) => Some(NativeKind::Object),
            Value::Data(_) => Some(NativeKind::Data),
            Value::Proc(_) => Some(NativeKind::Proc),
            Value::Class(c) if c.is_module() => Some(NativeKind::Module),
            Value::Class(_) => Some(NativeKind::Class),
            _ => None,
        }
    }

    /// Name of the value's class, for diagnostics
    pub fn type_name(&self) -> String {
        match self {
            Value::Nil => "NilClass".to_string(),
            Value::Bool(true) => "TrueClass".to_string(),
            Value::Bool(false) => "FalseClass".to_string(),
            Value::Integer(_) | Value::Bignum(_) => "Integer".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Symbol(_) => "Symbol".to_string(),
            Value::Class(c) if c.is_module() => "Module".to_string(),
            Value::Class(_) => "Class".to_string(),
            other => other
                .class_of()
                .map(|c| c.display_name())
                .unwrap_or_else(|| "Object".to_string()),
        }
    }

    /// Immediates and bignums are always frozen; classes never are
    pub fn is_frozen(&self) -> bool {
        match self {
            Value::Class(_) => false,
            other => other.header().is_none_or(|h| h.is_frozen()),
        }
    }

    pub fn freeze(&self) {
        if let Some(h) = self.header() {
            h.freeze();
        }
    }

    /// Ordered attributes; empty for values without a header
    pub fn attributes(&self) -> Vec<(Symbol, Value)> {
        self.header().map(|h| h.attributes()).unwrap_or_default()
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.header()?.attribute(&Symbol::intern(name))
    }

    /// Set a named attribute; returns false when the value cannot hold one
    pub fn set_attribute(&self, name: Symbol, value: Value) -> bool {
        match self.header() {
            Some(h) => {
                h.set_attribute(name, value);
                true
            }
            None => false,
        }
    }

    /// Extend with a module; returns false when the value cannot be extended
    pub fn extend(&self, module: ClassRef) -> bool {
        match self.header() {
            Some(h) => {
                h.extend(module);
                true
            }
            None => false,
        }
    }

    /// Text encoding for encoding-capable values (strings and regexps)
    pub fn encoding(&self) -> Option<Encoding> {
        match self {
            Value::String(s) => Some(s.encoding()),
            Value::Regexp(r) => Some(r.encoding()),
            _ => None,
        }
    }

    /// Set the encoding; returns false when the value is not encoding-capable
    pub fn set_encoding(&self, encoding: Encoding) -> bool {
        match self {
            Value::String(s) => {
                s.set_encoding(encoding);
                true
            }
            Value::Regexp(r) => {
                r.set_encoding(encoding);
                true
            }
            _ => false,
        }
    }

    /// Hooks from the extended modules first, then the class chain
    pub fn find_hooks(&self) -> Option<MarshalHooks> {
        let header = self.header()?;
        header
            .extended()
            .iter()
            .find_map(|m| m.own_hooks())
            .or_else(|| header.class().find_hooks())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// String contents as owned bytes
    pub fn string_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Value::String(s) => Some(s.bytes().clone()),
            _ => None,
        }
    }
}

// Shallow on purpose: graphs may be cyclic. Use `inspect` for full output.
impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Bignum(b) => write!(
                f,
                "#<Integer {}{} bytes>",
                if b.is_negative() { "-" } else { "" },
                b.magnitude().len()
            ),
            Value::Symbol(s) => write!(f, "{:?}", s),
            Value::String(s) => write!(f, "{:?}", s.to_string_lossy()),
            Value::Class(c) => write!(f, "{}", c.display_name()),
            Value::Array(a) => write!(f, "#<Array len={}>", a.len()),
            Value::Hash(h) => write!(f, "#<Hash len={}>", h.len()),
            other => write!(f, "#<{}>", other.type_name()),
        }
    }
}
