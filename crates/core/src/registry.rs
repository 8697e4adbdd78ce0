//! Class registry
//!
//! Maps constant paths to definitions and back, allocates empty instances,
//! and offers constructors for the built-in value kinds. The codec consumes
//! only this narrow surface:
//!
//! - `resolve(path)` / `path_of(class)` (which must round-trip)
//! - `allocate(class)`
//! - constructors for strings, arrays, hashes, regexps and friends

use crate::class::{ClassDef, ClassRef, DefinitionKind, NativeKind};
use crate::encoding::Encoding;
use crate::hooks::{HookError, MarshalHooks, UserDump};
use crate::symbol::Symbol;
use crate::value::{
    RArray, RBignum, RData, RHash, RObject, RProc, RRegexp, RString, RStruct, Value,
};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// Errors from path resolution and allocation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("can't dump anonymous {kind} {name}")]
    Anonymous { kind: &'static str, name: String },

    #[error("{0} can't be referred to")]
    Unreferable(String),

    #[error("allocator undefined for {0}")]
    NoAllocator(String),
}

struct Builtins {
    object: ClassRef,
    string: ClassRef,
    array: ClassRef,
    hash: ClassRef,
    regexp: ClassRef,
    structure: ClassRef,
    proc_: ClassRef,
    data: ClassRef,
    class: ClassRef,
    module: ClassRef,
}

pub struct Registry {
    constants: RefCell<HashMap<String, ClassRef>>,
    builtins: Builtins,
    /// Define unknown paths on first lookup instead of failing
    autodefine: Cell<bool>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Registry preloaded with the built-in classes and modules
    pub fn new() -> Self {
        let builtin = |name: &str, superclass: Option<&ClassRef>, kind: NativeKind| -> ClassRef {
            Rc::new(ClassDef::new(
                Some(name.to_string()),
                DefinitionKind::Class,
                superclass.cloned(),
                kind,
                Vec::new(),
            ))
        };

        let object = builtin("Object", None, NativeKind::Object);
        let module = builtin("Module", Some(&object), NativeKind::Module);
        let builtins = Builtins {
            string: builtin("String", Some(&object), NativeKind::String),
            array: builtin("Array", Some(&object), NativeKind::Array),
            hash: builtin("Hash", Some(&object), NativeKind::Hash),
            regexp: builtin("Regexp", Some(&object), NativeKind::Regexp),
            structure: builtin("Struct", Some(&object), NativeKind::Struct),
            proc_: builtin("Proc", Some(&object), NativeKind::Proc),
            data: builtin("Data", Some(&object), NativeKind::Data),
            class: builtin("Class", Some(&module), NativeKind::Class),
            module,
            object,
        };

        let mut constants = HashMap::new();
        for class in [
            &builtins.object,
            &builtins.string,
            &builtins.array,
            &builtins.hash,
            &builtins.regexp,
            &builtins.structure,
            &builtins.proc_,
            &builtins.data,
            &builtins.class,
            &builtins.module,
        ] {
            constants.insert(class.display_name(), class.clone());
        }

        // Classes of immediates exist for reference but cannot be allocated
        for name in ["Symbol", "Integer", "Float", "NilClass", "TrueClass", "FalseClass"] {
            let class = builtin(name, Some(&builtins.object), NativeKind::Object);
            class.set_allocatable(false);
            constants.insert(name.to_string(), class);
        }
        builtins.structure.set_allocatable(false);

        for name in ["Kernel", "Comparable", "Enumerable"] {
            let module = Rc::new(ClassDef::new(
                Some(name.to_string()),
                DefinitionKind::Module,
                None,
                NativeKind::Module,
                Vec::new(),
            ));
            constants.insert(name.to_string(), module);
        }

        Registry {
            constants: RefCell::new(constants),
            builtins,
            autodefine: Cell::new(false),
        }
    }

    pub fn object_class(&self) -> ClassRef {
        self.builtins.object.clone()
    }

    pub fn string_class(&self) -> ClassRef {
        self.builtins.string.clone()
    }

    pub fn array_class(&self) -> ClassRef {
        self.builtins.array.clone()
    }

    pub fn hash_class(&self) -> ClassRef {
        self.builtins.hash.clone()
    }

    pub fn regexp_class(&self) -> ClassRef {
        self.builtins.regexp.clone()
    }

    pub fn struct_class(&self) -> ClassRef {
        self.builtins.structure.clone()
    }

    pub fn proc_class(&self) -> ClassRef {
        self.builtins.proc_.clone()
    }

    pub fn data_class(&self) -> ClassRef {
        self.builtins.data.clone()
    }

    pub fn class_class(&self) -> ClassRef {
        self.builtins.class.clone()
    }

    pub fn module_class(&self) -> ClassRef {
        self.builtins.module.clone()
    }

    pub fn set_autodefine(&self, on: bool) {
        self.autodefine.set(on);
    }

    pub fn autodefine(&self) -> bool {
        self.autodefine.get()
    }

    fn install(&self, path: &str, def: ClassDef) -> ClassRef {
        let class = Rc::new(def);
        self.constants
            .borrow_mut()
            .insert(path.to_string(), class.clone());
        class
    }

    /// Define (or reopen) a class under `path`
    pub fn define_class(&self, path: &str, superclass: &ClassRef) -> ClassRef {
        if let Some(existing) = self.resolve(path) {
            return existing;
        }
        self.install(
            path,
            ClassDef::new(
                Some(path.to_string()),
                DefinitionKind::Class,
                Some(superclass.clone()),
                superclass.instance_kind(),
                superclass.members().to_vec(),
            ),
        )
    }

    /// Define (or reopen) a module under `path`
    pub fn define_module(&self, path: &str) -> ClassRef {
        if let Some(existing) = self.resolve(path) {
            return existing;
        }
        self.install(
            path,
            ClassDef::new(
                Some(path.to_string()),
                DefinitionKind::Module,
                None,
                NativeKind::Module,
                Vec::new(),
            ),
        )
    }

    /// Define a struct class with the given member names
    pub fn define_struct(&self, path: &str, members: &[&str]) -> ClassRef {
        if let Some(existing) = self.resolve(path) {
            return existing;
        }
        self.install(
            path,
            ClassDef::new(
                Some(path.to_string()),
                DefinitionKind::Class,
                Some(self.struct_class()),
                NativeKind::Struct,
                members.iter().map(Symbol::intern).collect(),
            ),
        )
    }

    /// Define a class whose only instance is shared process-wide.
    ///
    /// The class dumps through the opaque protocol with an empty payload and
    /// loads by identity lookup of that instance.
    pub fn define_singleton_class(&self, path: &str) -> (ClassRef, Value) {
        let class = self.define_class(path, &self.object_class());
        if let Some(instance) = class.singleton_instance() {
            return (class, instance);
        }
        let instance = self.object(&class);
        class.set_singleton_instance(instance.clone());
        class.set_hooks(MarshalHooks::opaque(SingletonInstanceHook {
            string_class: self.string_class(),
        }));
        (class, instance)
    }

    /// Create an unnamed class; it cannot be dumped until named
    pub fn anonymous_class(&self, superclass: &ClassRef) -> ClassRef {
        Rc::new(ClassDef::new(
            None,
            DefinitionKind::Class,
            Some(superclass.clone()),
            superclass.instance_kind(),
            superclass.members().to_vec(),
        ))
    }

    pub fn anonymous_module(&self) -> ClassRef {
        Rc::new(ClassDef::new(
            None,
            DefinitionKind::Module,
            None,
            NativeKind::Module,
            Vec::new(),
        ))
    }

    /// Open the singleton class of a heap value, giving it per-instance state
    pub fn singleton_class(&self, value: &Value) -> Option<ClassRef> {
        let header = value.header()?;
        header.mark_singleton();
        let class = header.class();
        Some(Rc::new(ClassDef::new(
            None,
            DefinitionKind::Singleton,
            Some(class.clone()),
            class.instance_kind(),
            class.members().to_vec(),
        )))
    }

    /// Name an anonymous definition by binding it to `path`
    pub fn assign_constant(&self, path: &str, class: &ClassRef) {
        if class.name().is_none() {
            class.set_name(path.to_string());
        }
        self.constants
            .borrow_mut()
            .insert(path.to_string(), class.clone());
    }

    /// Drop a constant binding (the definition keeps its name)
    pub fn remove_constant(&self, path: &str) -> Option<ClassRef> {
        self.constants.borrow_mut().remove(path)
    }

    /// Look up a definition by constant path
    pub fn resolve(&self, path: &str) -> Option<ClassRef> {
        self.constants.borrow().get(path).cloned()
    }

    /// Canonical path of a definition; it must resolve back to the same one
    pub fn path_of(&self, class: &ClassRef) -> Result<String, ModelError> {
        let kind = if class.is_module() { "module" } else { "class" };
        let name = match class.name() {
            Some(name) if !name.starts_with('#') => name,
            _ => {
                return Err(ModelError::Anonymous {
                    kind,
                    name: class.display_name(),
                });
            }
        };
        match self.resolve(&name) {
            Some(found) if Rc::ptr_eq(&found, class) => Ok(name),
            _ => Err(ModelError::Unreferable(name)),
        }
    }

    /// Allocate an empty instance of `class`
    pub fn allocate(&self, class: &ClassRef) -> Result<Value, ModelError> {
        if !class.is_allocatable() {
            return Err(ModelError::NoAllocator(class.display_name()));
        }
        let class = class.clone();
        let value = match class.instance_kind() {
            NativeKind::Object => Value::Object(Rc::new(RObject {
                header: crate::value::ObjHeader::new(class),
            })),
            NativeKind::String => {
                Value::String(Rc::new(RString::new(class, Vec::new(), Encoding::Binary)))
            }
            NativeKind::Regexp => {
                Value::Regexp(Rc::new(RRegexp::new(class, Vec::new(), 0, Encoding::UsAscii)))
            }
            NativeKind::Array => Value::Array(Rc::new(RArray::new(class, Vec::new()))),
            NativeKind::Hash => Value::Hash(Rc::new(RHash::new(class))),
            NativeKind::Struct => {
                let values = vec![Value::Nil; class.members().len()];
                Value::Struct(Rc::new(RStruct::new(class, values)))
            }
            NativeKind::Data => Value::Data(Rc::new(RData::new(class, Vec::new()))),
            NativeKind::Proc | NativeKind::Class | NativeKind::Module => {
                return Err(ModelError::NoAllocator(class.display_name()));
            }
        };
        Ok(value)
    }

    /// UTF-8 string
    pub fn str(&self, text: &str) -> Value {
        self.string_with(text.as_bytes().to_vec(), Encoding::Utf8)
    }

    /// Binary (ASCII-8BIT) string
    pub fn binary(&self, bytes: &[u8]) -> Value {
        self.string_with(bytes.to_vec(), Encoding::Binary)
    }

    pub fn string_with(&self, bytes: Vec<u8>, encoding: Encoding) -> Value {
        Value::String(Rc::new(RString::new(self.string_class(), bytes, encoding)))
    }

    pub fn symbol(&self, name: &str) -> Value {
        Value::Symbol(Symbol::intern(name))
    }

    pub fn array(&self, items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RArray::new(self.array_class(), items)))
    }

    pub fn hash(&self) -> Value {
        Value::Hash(Rc::new(RHash::new(self.hash_class())))
    }

    pub fn hash_from(&self, entries: Vec<(Value, Value)>) -> Value {
        let hash = RHash::new(self.hash_class());
        for (k, v) in entries {
            hash.insert(k, v);
        }
        Value::Hash(Rc::new(hash))
    }

    /// Regexp; ASCII sources are US-ASCII, anything else UTF-8
    pub fn regexp(&self, source: &str, options: u8) -> Value {
        let encoding = if source.is_ascii() {
            Encoding::UsAscii
        } else {
            Encoding::Utf8
        };
        Value::Regexp(Rc::new(RRegexp::new(
            self.regexp_class(),
            source.as_bytes().to_vec(),
            options,
            encoding,
        )))
    }

    /// Plain object of `class` with no attributes
    pub fn object(&self, class: &ClassRef) -> Value {
        Value::Object(Rc::new(RObject {
            header: crate::value::ObjHeader::new(class.clone()),
        }))
    }

    pub fn struct_new(&self, class: &ClassRef, values: Vec<Value>) -> Value {
        Value::Struct(Rc::new(RStruct::new(class.clone(), values)))
    }

    pub fn data(&self, class: &ClassRef, payload: &[u8]) -> Value {
        Value::Data(Rc::new(RData::new(class.clone(), payload.to_vec())))
    }

    pub fn proc_value(&self) -> Rc<RProc> {
        Rc::new(RProc {
            header: crate::value::ObjHeader::new(self.proc_class()),
        })
    }

    /// Integer from sign and little-endian magnitude; normalized to
    /// `Value::Integer` when it fits
    pub fn integer_from_magnitude(&self, negative: bool, magnitude: Vec<u8>) -> Value {
        let big = RBignum::new(negative, magnitude);
        match big.to_i64() {
            Some(n) => Value::Integer(n),
            None => Value::Bignum(Rc::new(big)),
        }
    }
}

/// Opaque hook installed by `define_singleton_class`: empty payload out,
/// the shared instance back in
struct SingletonInstanceHook {
    string_class: ClassRef,
}

impl UserDump for SingletonInstanceHook {
    fn dump(&self, _receiver: &Value, _depth_budget: usize) -> Result<Value, HookError> {
        Ok(Value::String(Rc::new(RString::new(
            self.string_class.clone(),
            Vec::new(),
            Encoding::Binary,
        ))))
    }

    fn load(&self, class: &ClassRef, _data: &Value) -> Result<Value, HookError> {
        class
            .singleton_instance()
            .ok_or_else(|| HookError::new(format!("{} has no instance", class.display_name())))
    }
}
