//! Heap object kinds and runtime values.
//!
//! Every reloadable entity (module, class, function, bound method, property,
//! instance) lives in the [`Heap`](super::Heap) and is addressed through an
//! [`ObjRef`]. Values that hold no heap reference are stored inline.

use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use super::heap::ObjRef;
use crate::loader::Code;

/// Ordered name → value bindings (module globals, class attributes, fields).
pub type Namespace = IndexMap<String, Value>;

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ref(ObjRef),
}

impl Value {
    /// Heap reference held by this value, if any.
    #[inline]
    pub fn as_obj(&self) -> Option<ObjRef> {
        match self {
            Self::Ref(r) => Some(*r),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Ref(r) => write!(f, "<object {r}>"),
        }
    }
}

/// Discriminant of an [`Object`], used in diagnostics and update rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Module,
    Class,
    Function,
    Method,
    Property,
    Instance,
}

impl ObjectKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Class => "class",
            Self::Function => "function",
            Self::Method => "method",
            Self::Property => "property",
            Self::Instance => "instance",
        }
    }

    /// Kinds the in-place patcher knows how to update.
    pub const fn is_patchable(self) -> bool {
        matches!(
            self,
            Self::Class | Self::Function | Self::Method | Self::Property
        )
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug)]
pub enum Object {
    Module(ModuleObject),
    Class(ClassObject),
    Function(FunctionObject),
    Method(MethodObject),
    Property(PropertyObject),
    Instance(InstanceObject),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Module(_) => ObjectKind::Module,
            Self::Class(_) => ObjectKind::Class,
            Self::Function(_) => ObjectKind::Function,
            Self::Method(_) => ObjectKind::Method,
            Self::Property(_) => ObjectKind::Property,
            Self::Instance(_) => ObjectKind::Instance,
        }
    }

    /// Name of the module this object was defined in.
    ///
    /// Bound methods report their function's module, which needs a heap
    /// lookup, so they are resolved by [`Heap::owner_module`](super::Heap::owner_module).
    pub fn defining_module(&self) -> Option<&str> {
        match self {
            Self::Class(c) => Some(&c.module),
            Self::Function(f) => Some(&f.module),
            Self::Property(p) => Some(&p.module),
            Self::Module(_) | Self::Method(_) | Self::Instance(_) => None,
        }
    }

    /// Push every heap reference held by this object (GC traversal).
    pub(crate) fn collect_refs(&self, out: &mut Vec<ObjRef>) {
        fn values<'a>(ns: impl IntoIterator<Item = &'a Value>, out: &mut Vec<ObjRef>) {
            out.extend(ns.into_iter().filter_map(Value::as_obj));
        }

        match self {
            Self::Module(m) => values(m.namespace.values(), out),
            Self::Class(c) => {
                values(c.attrs.values(), out);
                values(c.fields.values(), out);
            }
            Self::Function(f) => {
                out.push(f.globals);
                values(&f.defaults, out);
                values(f.closure.values(), out);
                values(f.dict.values(), out);
            }
            Self::Method(m) => {
                out.push(m.receiver);
                out.push(m.function);
            }
            Self::Property(p) => {
                out.extend([p.getter, p.setter, p.deleter].into_iter().flatten());
            }
            Self::Instance(i) => {
                out.push(i.class);
                values(i.fields.values(), out);
            }
        }
    }
}

/// A loaded module: its name, backing file and global namespace.
#[derive(Debug)]
pub struct ModuleObject {
    pub name: String,
    /// Source file; `None` for the session module and synthetic modules.
    pub path: Option<PathBuf>,
    pub namespace: Namespace,
    pub doc: Option<String>,
    /// Set when the module was cleared with `ReloadMode::Invalidate`.
    pub invalidated: bool,
}

impl ModuleObject {
    pub fn new(name: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path,
            namespace: Namespace::new(),
            doc: None,
            invalidated: false,
        }
    }
}

#[derive(Debug)]
pub struct ClassObject {
    pub name: String,
    pub module: String,
    pub doc: Option<String>,
    /// Class attributes: constants, methods, properties, nested classes.
    pub attrs: Namespace,
    /// Default instance fields copied into every new instance.
    pub fields: Namespace,
    /// Attributes that cannot be rebound or deleted.
    pub readonly: FxHashSet<String>,
}

#[derive(Debug)]
pub struct FunctionObject {
    pub name: String,
    pub module: String,
    pub params: Vec<String>,
    /// Defaults for the trailing parameters.
    pub defaults: Vec<Value>,
    pub doc: Option<String>,
    pub code: Rc<Code>,
    /// Captured free variables.
    pub closure: Namespace,
    /// Module whose namespace `global` lookups go through.
    pub globals: ObjRef,
    /// Arbitrary function attributes.
    pub dict: Namespace,
}

/// A function bound to a receiver instance.
#[derive(Debug)]
pub struct MethodObject {
    pub receiver: ObjRef,
    pub function: ObjRef,
}

#[derive(Debug)]
pub struct PropertyObject {
    pub module: String,
    pub getter: Option<ObjRef>,
    pub setter: Option<ObjRef>,
    pub deleter: Option<ObjRef>,
}

/// An instance: a class pointer plus its own fields.
///
/// The class pointer is a plain handle, so repointing it retypes the
/// instance without reconstructing it.
#[derive(Debug)]
pub struct InstanceObject {
    pub class: ObjRef,
    pub fields: Namespace,
}
