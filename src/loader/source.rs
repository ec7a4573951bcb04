//! Module source schema.
//!
//! A reloadable module is a TOML file declaring its imports, constants,
//! functions, classes, instances and bound methods. Every top-level name a
//! module exposes is declared here, which is what lets the reloader walk
//! and patch module contents without runtime reflection.
//!
//! # Example
//!
//! ```toml
//! doc = "Shapes."
//!
//! [imports]
//! util = "app.util"           # module binding
//! Unit = "app.util:Unit"      # symbol re-export
//!
//! [values]
//! VERSION = 2
//!
//! [functions.area]
//! params = ["w", "h"]
//! defaults = [1]
//! body = { call = "util.mul", args = [{ arg = "w" }, { arg = "h" }] }
//!
//! [classes.Square]
//! fields = { side = 3 }
//! attrs = { KIND = "square" }
//! methods.describe = { body = { concat = ["square of ", { attr = "side" }] } }
//! properties.double = { get = { add = [{ attr = "side" }, { attr = "side" }] } }
//!
//! [instances.unit_square]
//! class = "Square"
//! fields = { side = 1 }
//!
//! [bound]
//! describe_unit = "unit_square.describe"
//! ```

use indexmap::IndexMap;
use serde::Deserialize;

use crate::runtime::Value;

/// Parsed contents of one module file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleSource {
    pub doc: Option<String>,
    /// alias → `"pkg.mod"` (module) or `"pkg.mod:Name"` (symbol)
    pub imports: IndexMap<String, String>,
    pub values: IndexMap<String, Literal>,
    pub functions: IndexMap<String, FunctionSource>,
    pub classes: IndexMap<String, ClassSource>,
    pub instances: IndexMap<String, InstanceSource>,
    /// alias → `"instance.method"`
    pub bound: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionSource {
    #[serde(default)]
    pub params: Vec<String>,
    /// Defaults for the trailing parameters.
    #[serde(default)]
    pub defaults: Vec<Literal>,
    #[serde(default)]
    pub doc: Option<String>,
    #[serde(default)]
    pub closure: IndexMap<String, Literal>,
    #[serde(default)]
    pub attrs: IndexMap<String, Literal>,
    pub body: Code,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassSource {
    pub doc: Option<String>,
    pub attrs: IndexMap<String, Literal>,
    pub fields: IndexMap<String, Literal>,
    pub methods: IndexMap<String, FunctionSource>,
    pub properties: IndexMap<String, PropertySource>,
    pub classes: IndexMap<String, ClassSource>,
    pub readonly: Vec<String>,
}

/// Accessor bodies; each runs with `self` bound (setters also get `value`).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PropertySource {
    pub get: Option<Code>,
    pub set: Option<Code>,
    pub delete: Option<Code>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceSource {
    pub class: String,
    #[serde(default)]
    pub fields: IndexMap<String, Literal>,
}

/// A TOML scalar.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&Literal> for Value {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::Int(*i),
            Literal::Float(x) => Value::Float(*x),
            Literal::Str(s) => Value::Str(s.clone()),
        }
    }
}

/// Function body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Code {
    Literal(Literal),
    /// Value of a parameter.
    Arg { arg: String },
    /// Attribute of `self`.
    Attr { attr: String },
    /// Dotted lookup through the function's globals module.
    Global { global: String },
    /// Captured closure variable.
    Free { free: String },
    /// Call a dotted global path.
    Call {
        call: String,
        #[serde(default)]
        args: Vec<Code>,
    },
    /// Call a method on `self`.
    CallMethod {
        call_method: String,
        #[serde(default)]
        args: Vec<Code>,
    },
    /// Numeric sum.
    Add { add: Vec<Code> },
    /// String concatenation of the displayed parts.
    Concat { concat: Vec<Code> },
    /// Store into a field of `self`, yielding the stored value.
    Store { store: String, value: Box<Code> },
    /// Remove a field of `self`.
    Discard { discard: String },
}
