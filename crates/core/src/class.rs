//! Class and module definitions
//!
//! A definition is shared through `ClassRef` (`Rc<ClassDef>`); pointer
//! identity is definition identity. Definitions are created by the
//! [`Registry`](crate::registry::Registry), which also owns the path table
//! that names them.

use crate::hooks::MarshalHooks;
use crate::symbol::Symbol;
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

pub type ClassRef = Rc<ClassDef>;

/// The built-in representation an instance of a class is allocated as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeKind {
    Object,
    String,
    Regexp,
    Array,
    Hash,
    Struct,
    /// Opaque native payload
    Data,
    /// Code; never serializable
    Proc,
    Class,
    Module,
}

impl NativeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NativeKind::Object => "Object",
            NativeKind::String => "String",
            NativeKind::Regexp => "Regexp",
            NativeKind::Array => "Array",
            NativeKind::Hash => "Hash",
            NativeKind::Struct => "Struct",
            NativeKind::Data => "Data",
            NativeKind::Proc => "Proc",
            NativeKind::Class => "Class",
            NativeKind::Module => "Module",
        }
    }
}

/// Whether a definition is a class, a module, or a per-object singleton class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionKind {
    Class,
    Module,
    Singleton,
}

pub struct ClassDef {
    /// Full constant path (`Outer::Inner`); `None` while anonymous
    name: RefCell<Option<String>>,
    kind: DefinitionKind,
    superclass: Option<ClassRef>,
    instance_kind: NativeKind,
    /// Struct member names, in declaration order
    members: Vec<Symbol>,
    hooks: RefCell<Option<MarshalHooks>>,
    /// Shared instance for classes that only ever have one
    singleton_instance: RefCell<Option<Value>>,
    allocatable: Cell<bool>,
}

impl ClassDef {
    pub(crate) fn new(
        name: Option<String>,
        kind: DefinitionKind,
        superclass: Option<ClassRef>,
        instance_kind: NativeKind,
        members: Vec<Symbol>,
    ) -> Self {
        ClassDef {
            name: RefCell::new(name),
            kind,
            superclass,
            instance_kind,
            members,
            hooks: RefCell::new(None),
            singleton_instance: RefCell::new(None),
            allocatable: Cell::new(true),
        }
    }

    /// Constant path, if the definition has been named
    pub fn name(&self) -> Option<String> {
        self.name.borrow().clone()
    }

    pub(crate) fn set_name(&self, name: String) {
        *self.name.borrow_mut() = Some(name);
    }

    /// Name for diagnostics; anonymous definitions render as `#<Class>`
    pub fn display_name(&self) -> String {
        match self.name() {
            Some(name) => name,
            None => match self.kind {
                DefinitionKind::Module => "#<Module>".to_string(),
                DefinitionKind::Class => "#<Class>".to_string(),
                DefinitionKind::Singleton => "#<Class:singleton>".to_string(),
            },
        }
    }

    pub fn kind(&self) -> DefinitionKind {
        self.kind
    }

    pub fn is_module(&self) -> bool {
        self.kind == DefinitionKind::Module
    }

    pub fn is_singleton(&self) -> bool {
        self.kind == DefinitionKind::Singleton
    }

    pub fn superclass(&self) -> Option<&ClassRef> {
        self.superclass.as_ref()
    }

    pub fn instance_kind(&self) -> NativeKind {
        self.instance_kind
    }

    pub fn members(&self) -> &[Symbol] {
        &self.members
    }

    pub fn set_hooks(&self, hooks: MarshalHooks) {
        *self.hooks.borrow_mut() = Some(hooks);
    }

    pub fn clear_hooks(&self) {
        *self.hooks.borrow_mut() = None;
    }

    /// Hooks defined directly on this definition
    pub fn own_hooks(&self) -> Option<MarshalHooks> {
        self.hooks.borrow().clone()
    }

    /// Hooks defined here or inherited from a superclass
    pub fn find_hooks(&self) -> Option<MarshalHooks> {
        if let Some(hooks) = self.own_hooks() {
            return Some(hooks);
        }
        let mut current = self.superclass.clone();
        while let Some(class) = current {
            if let Some(hooks) = class.own_hooks() {
                return Some(hooks);
            }
            current = class.superclass.clone();
        }
        None
    }

    /// False for classes whose instances cannot be created empty
    pub fn is_allocatable(&self) -> bool {
        self.allocatable.get() && !self.is_module()
    }

    pub(crate) fn set_allocatable(&self, on: bool) {
        self.allocatable.set(on);
    }

    pub fn singleton_instance(&self) -> Option<Value> {
        self.singleton_instance.borrow().clone()
    }

    pub(crate) fn set_singleton_instance(&self, instance: Value) {
        *self.singleton_instance.borrow_mut() = Some(instance);
    }

    /// Nearest ancestor (or self) that is not a singleton class
    pub fn real_class(self: &Rc<Self>) -> ClassRef {
        let mut current = self.clone();
        while current.is_singleton() {
            match current.superclass.clone() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }
}

/// True when `class` is `ancestor` or inherits from it
pub fn inherits_from(class: &ClassRef, ancestor: &ClassRef) -> bool {
    let mut current = Some(class.clone());
    while let Some(c) = current {
        if Rc::ptr_eq(&c, ancestor) {
            return true;
        }
        current = c.superclass.clone();
    }
    false
}

impl fmt::Debug for ClassDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DefinitionKind::Module => write!(f, "module {}", self.display_name()),
            _ => write!(f, "class {}", self.display_name()),
        }
    }
}
