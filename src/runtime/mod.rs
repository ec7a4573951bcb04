//! Object runtime hosting reloadable modules.
//!
//! # Architecture
//!
//! ```text
//! Runtime
//! ├── Heap            generational slots: modules, classes, functions, ...
//! ├── ModuleRegistry  name → current module handle (GC roots)
//! └── SourceLoader    name → file → ModuleSource
//! ```
//!
//! The session module `__main__` is registered at construction, has no
//! backing file, and holds the interactive namespace.

mod error;
mod eval;
mod heap;
mod object;
mod registry;

pub use error::RuntimeError;
pub use heap::{Heap, ObjRef};
pub use object::{
    ClassObject, FunctionObject, InstanceObject, MethodObject, ModuleObject, Namespace, Object,
    ObjectKind, PropertyObject, Value,
};
pub use registry::ModuleRegistry;

use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::debug;
use crate::loader::{ClassSource, Code, FunctionSource, ModuleSource, SourceLoader};

/// Name of the interactive session module.
pub const MAIN_MODULE: &str = "__main__";

/// Maximum nesting of calls before evaluation is aborted.
pub const MAX_CALL_DEPTH: usize = 200;

pub type RunResult<T> = Result<T, RuntimeError>;

pub struct Runtime {
    heap: Heap,
    registry: ModuleRegistry,
    loader: Box<dyn SourceLoader>,
    main: ObjRef,
    depth: usize,
}

impl Runtime {
    pub fn new(loader: impl SourceLoader + 'static) -> Self {
        let mut heap = Heap::new();
        let mut registry = ModuleRegistry::new();
        let main = heap.alloc(Object::Module(ModuleObject::new(MAIN_MODULE, None)));
        registry.insert(MAIN_MODULE, main);

        Self {
            heap,
            registry,
            loader: Box::new(loader),
            main,
            depth: 0,
        }
    }

    #[inline]
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    #[inline]
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    #[inline]
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    #[inline]
    pub fn registry_mut(&mut self) -> &mut ModuleRegistry {
        &mut self.registry
    }

    #[inline]
    pub fn loader(&self) -> &dyn SourceLoader {
        self.loader.as_ref()
    }

    /// Handle of the session module.
    #[inline]
    pub fn main_module(&self) -> ObjRef {
        self.main
    }

    /// Currently registered module named `name`.
    #[inline]
    pub fn module(&self, name: &str) -> Option<ObjRef> {
        self.registry.get(name)
    }

    // =========================================================================
    // Session namespace
    // =========================================================================

    /// Session variable lookup.
    pub fn session_get(&self, name: &str) -> Option<Value> {
        self.heap
            .module(self.main)
            .ok()
            .and_then(|m| m.namespace.get(name).cloned())
    }

    /// Bind a session variable.
    pub fn session_set(&mut self, name: impl Into<String>, value: Value) -> RunResult<()> {
        self.heap
            .module_mut(self.main)?
            .namespace
            .insert(name.into(), value);
        Ok(())
    }

    /// Snapshot of the session bindings.
    pub fn session_bindings(&self) -> Vec<(String, Value)> {
        self.heap
            .module(self.main)
            .map(|m| {
                m.namespace
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Free everything unreachable from the registered modules.
    pub fn collect_garbage(&mut self) -> usize {
        let roots: Vec<ObjRef> = self.registry.handles().collect();
        self.heap.collect(roots)
    }

    // =========================================================================
    // Import
    // =========================================================================

    /// Import `name`, returning the cached module when already loaded.
    ///
    /// The parent package is imported first when it has a source. The module
    /// is registered before its body runs, so mutually importing modules see
    /// each other (possibly half-initialized) instead of recursing forever.
    /// A module whose body fails is unregistered again.
    pub fn import_module(&mut self, name: &str) -> RunResult<ObjRef> {
        if let Some(existing) = self.registry.get(name) {
            return Ok(existing);
        }

        if let Some((parent, _)) = name.rsplit_once('.')
            && self.loader.locate(parent).is_some()
        {
            self.import_module(parent)?;
            if let Some(existing) = self.registry.get(name) {
                return Ok(existing);
            }
        }

        let path = self
            .loader
            .locate(name)
            .ok_or_else(|| RuntimeError::ModuleNotFound(name.to_string()))?;
        let source = self
            .loader
            .load(&path)
            .map_err(|source| RuntimeError::Load {
                module: name.to_string(),
                source,
            })?;

        let module = self
            .heap
            .alloc(Object::Module(ModuleObject::new(name, Some(path))));
        self.registry.insert(name, module);
        debug!("import"; "executing {}", name);

        if let Err(err) = self.exec_module(module, name, &source) {
            self.registry.remove(name);
            return Err(err);
        }

        if let Some((parent, leaf)) = name.rsplit_once('.')
            && let Some(parent) = self.registry.get(parent)
        {
            self.bind(parent, leaf, Value::Ref(module))?;
        }

        Ok(module)
    }

    fn bind(&mut self, module: ObjRef, name: &str, value: Value) -> RunResult<()> {
        self.heap
            .module_mut(module)?
            .namespace
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Run a module body: imports, values, functions, classes, instances,
    /// bound methods, in that order.
    fn exec_module(&mut self, module: ObjRef, name: &str, source: &ModuleSource) -> RunResult<()> {
        self.heap.module_mut(module)?.doc = source.doc.clone();

        for (alias, target) in &source.imports {
            let value = match target.split_once(':') {
                Some((target_module, symbol)) => {
                    let imported = self.import_module(target_module)?;
                    self.get_attr(&Value::Ref(imported), symbol)?
                }
                None => Value::Ref(self.import_module(target)?),
            };
            self.bind(module, alias, value)?;
        }

        for (key, literal) in &source.values {
            self.bind(module, key, literal.into())?;
        }

        for (fn_name, function) in &source.functions {
            let f = self.define_function(module, name, fn_name, function, false);
            self.bind(module, fn_name, Value::Ref(f))?;
        }

        for (class_name, class) in &source.classes {
            let c = self.define_class(module, name, class_name, class);
            self.bind(module, class_name, Value::Ref(c))?;
        }

        for (inst_name, instance) in &source.instances {
            let class = self.get_path(&Value::Ref(module), &instance.class)?;
            let Some(class) = class
                .as_obj()
                .filter(|r| self.heap.kind(*r) == Some(ObjectKind::Class))
            else {
                return Err(RuntimeError::Exec {
                    module: name.to_string(),
                    message: format!("`{}` is not a class", instance.class),
                });
            };
            let obj = self.instantiate(class, Vec::new())?;
            let fields = &mut self.heap.instance_mut(obj)?.fields;
            for (field, literal) in &instance.fields {
                fields.insert(field.clone(), literal.into());
            }
            self.bind(module, inst_name, Value::Ref(obj))?;
        }

        for (alias, target) in &source.bound {
            let method = self.get_path(&Value::Ref(module), target)?;
            if method.as_obj().and_then(|r| self.heap.kind(r)) != Some(ObjectKind::Method) {
                return Err(RuntimeError::Exec {
                    module: name.to_string(),
                    message: format!("`{target}` is not a bound method"),
                });
            }
            self.bind(module, alias, method)?;
        }

        Ok(())
    }

    fn define_function(
        &mut self,
        globals: ObjRef,
        module: &str,
        name: &str,
        source: &FunctionSource,
        is_method: bool,
    ) -> ObjRef {
        let mut params = source.params.clone();
        if is_method && params.first().map(String::as_str) != Some("self") {
            params.insert(0, "self".to_string());
        }

        self.heap.alloc(Object::Function(FunctionObject {
            name: name.to_string(),
            module: module.to_string(),
            params,
            defaults: source.defaults.iter().map(Value::from).collect(),
            doc: source.doc.clone(),
            code: Rc::new(source.body.clone()),
            closure: collect_literals(&source.closure),
            globals,
            dict: collect_literals(&source.attrs),
        }))
    }

    fn define_accessor(
        &mut self,
        globals: ObjRef,
        module: &str,
        name: String,
        params: &[&str],
        body: &Code,
    ) -> ObjRef {
        self.heap.alloc(Object::Function(FunctionObject {
            name,
            module: module.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            defaults: Vec::new(),
            doc: None,
            code: Rc::new(body.clone()),
            closure: Namespace::new(),
            globals,
            dict: Namespace::new(),
        }))
    }

    fn define_class(
        &mut self,
        globals: ObjRef,
        module: &str,
        name: &str,
        source: &ClassSource,
    ) -> ObjRef {
        let mut attrs = collect_literals(&source.attrs);

        for (method_name, method) in &source.methods {
            let f = self.define_function(globals, module, method_name, method, true);
            attrs.insert(method_name.clone(), Value::Ref(f));
        }

        for (prop_name, prop) in &source.properties {
            let mut accessor = |suffix: &str, params: &[&str], body: &Option<Code>| {
                body.as_ref().map(|code| {
                    self.define_accessor(
                        globals,
                        module,
                        format!("{prop_name}.{suffix}"),
                        params,
                        code,
                    )
                })
            };
            let property = PropertyObject {
                module: module.to_string(),
                getter: accessor("getter", &["self"], &prop.get),
                setter: accessor("setter", &["self", "value"], &prop.set),
                deleter: accessor("deleter", &["self"], &prop.delete),
            };
            let p = self.heap.alloc(Object::Property(property));
            attrs.insert(prop_name.clone(), Value::Ref(p));
        }

        for (inner_name, inner) in &source.classes {
            let qualified = format!("{name}.{inner_name}");
            let c = self.define_class(globals, module, &qualified, inner);
            attrs.insert(inner_name.clone(), Value::Ref(c));
        }

        self.heap.alloc(Object::Class(ClassObject {
            name: name.to_string(),
            module: module.to_string(),
            doc: source.doc.clone(),
            attrs,
            fields: collect_literals(&source.fields),
            readonly: source.readonly.iter().cloned().collect::<FxHashSet<_>>(),
        }))
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Attribute lookup.
    ///
    /// Instances resolve properties on the class first, then their own
    /// fields, then class attributes; functions found on the class are
    /// returned bound to the instance.
    pub fn get_attr(&mut self, target: &Value, name: &str) -> RunResult<Value> {
        let Some(r) = target.as_obj() else {
            return Err(RuntimeError::attribute(type_name(target), name));
        };

        match self.heap.get(r).ok_or(RuntimeError::DeadReference(r))? {
            Object::Module(m) => {
                if m.invalidated {
                    return Err(RuntimeError::Invalidated(m.name.clone()));
                }
                match m.namespace.get(name) {
                    Some(value) => Ok(value.clone()),
                    None if name == "__doc__" => {
                        Ok(m.doc.clone().map_or(Value::None, Value::Str))
                    }
                    None => Err(RuntimeError::attribute(format!("module `{}`", m.name), name)),
                }
            }
            Object::Class(c) => c
                .attrs
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::attribute(format!("class `{}`", c.name), name)),
            Object::Function(f) => f
                .dict
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::attribute(format!("function `{}`", f.name), name)),
            Object::Method(m) => match name {
                "__func__" => Ok(Value::Ref(m.function)),
                "__self__" => Ok(Value::Ref(m.receiver)),
                _ => Err(RuntimeError::attribute("bound method", name)),
            },
            Object::Property(_) => Err(RuntimeError::attribute("property", name)),
            Object::Instance(inst) => {
                let class = inst.class;
                let own = inst.fields.get(name).cloned();
                self.instance_attr(r, class, own, name)
            }
        }
    }

    fn instance_attr(
        &mut self,
        instance: ObjRef,
        class: ObjRef,
        own: Option<Value>,
        name: &str,
    ) -> RunResult<Value> {
        let class_obj = self.heap.class(class)?;
        let class_attr = class_obj.attrs.get(name).cloned();
        let class_kind = class_attr
            .as_ref()
            .and_then(Value::as_obj)
            .and_then(|a| self.heap.kind(a));

        if class_kind == Some(ObjectKind::Property)
            && let Some(Value::Ref(p)) = &class_attr
        {
            let getter = self.heap.property(*p)?.getter;
            let getter = getter.ok_or_else(|| RuntimeError::attribute("property", name))?;
            return self.call(&Value::Ref(getter), vec![Value::Ref(instance)]);
        }

        if let Some(value) = own {
            return Ok(value);
        }

        match class_attr {
            Some(Value::Ref(function)) if class_kind == Some(ObjectKind::Function) => {
                let method = self.heap.alloc(Object::Method(MethodObject {
                    receiver: instance,
                    function,
                }));
                Ok(Value::Ref(method))
            }
            Some(value) => Ok(value),
            None => {
                let class_name = self.heap.class(class)?.name.clone();
                Err(RuntimeError::attribute(
                    format!("`{class_name}` object"),
                    name,
                ))
            }
        }
    }

    /// Follow a dotted attribute path from `base`.
    pub fn get_path(&mut self, base: &Value, path: &str) -> RunResult<Value> {
        let mut current = base.clone();
        for part in path.split('.') {
            current = self.get_attr(&current, part)?;
        }
        Ok(current)
    }

    /// Attribute assignment.
    pub fn set_attr(&mut self, target: &Value, name: &str, value: Value) -> RunResult<()> {
        let Some(r) = target.as_obj() else {
            return Err(RuntimeError::attribute(type_name(target), name));
        };

        match self.heap.get_mut(r).ok_or(RuntimeError::DeadReference(r))? {
            Object::Module(m) => {
                if m.invalidated {
                    return Err(RuntimeError::Invalidated(m.name.clone()));
                }
                m.namespace.insert(name.to_string(), value);
                Ok(())
            }
            Object::Class(c) => c.set_attr(name, value),
            Object::Function(f) => {
                f.dict.insert(name.to_string(), value);
                Ok(())
            }
            Object::Instance(inst) => {
                let class = inst.class;
                let setter = self.class_property(class, name)?.map(|p| p.setter);
                match setter {
                    Some(Some(setter)) => {
                        self.call(&Value::Ref(setter), vec![Value::Ref(r), value])?;
                        Ok(())
                    }
                    Some(None) => Err(RuntimeError::ReadOnly {
                        owner: "property".to_string(),
                        name: name.to_string(),
                    }),
                    None => {
                        self.heap
                            .instance_mut(r)?
                            .fields
                            .insert(name.to_string(), value);
                        Ok(())
                    }
                }
            }
            other => Err(RuntimeError::Type(format!(
                "cannot set attribute `{name}` on a {}",
                other.kind()
            ))),
        }
    }

    fn class_property(&self, class: ObjRef, name: &str) -> RunResult<Option<&PropertyObject>> {
        match self.heap.class(class)?.attrs.get(name) {
            Some(Value::Ref(p)) if self.heap.kind(*p) == Some(ObjectKind::Property) => {
                Ok(Some(self.heap.property(*p)?))
            }
            _ => Ok(None),
        }
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Call a function, bound method or class.
    pub fn call(&mut self, callee: &Value, args: Vec<Value>) -> RunResult<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::RecursionLimit);
        }
        self.depth += 1;
        let result = self.call_inner(callee, args);
        self.depth -= 1;
        result
    }

    fn call_inner(&mut self, callee: &Value, args: Vec<Value>) -> RunResult<Value> {
        let Some(r) = callee.as_obj() else {
            return Err(RuntimeError::NotCallable(callee.to_string()));
        };

        match self.heap.kind(r).ok_or(RuntimeError::DeadReference(r))? {
            ObjectKind::Function => self.call_function(r, args),
            ObjectKind::Method => {
                let method = self.heap.method(r)?;
                let function = method.function;
                let mut full = Vec::with_capacity(args.len() + 1);
                full.push(Value::Ref(method.receiver));
                full.extend(args);
                self.call_function(function, full)
            }
            ObjectKind::Class => self.instantiate(r, args).map(Value::Ref),
            _ => Err(RuntimeError::NotCallable(self.describe(callee))),
        }
    }

    fn call_function(&mut self, function: ObjRef, args: Vec<Value>) -> RunResult<Value> {
        let f = self.heap.function(function)?;
        let given = args.len();
        let expected = f.params.len();
        let missing = expected.saturating_sub(given);
        if given > expected || missing > f.defaults.len() {
            return Err(RuntimeError::Arity {
                function: f.name.clone(),
                expected,
                given,
            });
        }

        let defaults = &f.defaults[f.defaults.len() - missing..];
        let locals: Namespace = f
            .params
            .iter()
            .cloned()
            .zip(args.into_iter().chain(defaults.iter().cloned()))
            .collect();
        let code = Rc::clone(&f.code);

        let frame = eval::Frame {
            function,
            globals: f.globals,
            locals,
        };
        self.eval(&code, &frame)
    }

    /// Create an instance; positional arguments fill the declared fields
    /// in order.
    pub fn instantiate(&mut self, class: ObjRef, args: Vec<Value>) -> RunResult<ObjRef> {
        let c = self.heap.class(class)?;
        if args.len() > c.fields.len() {
            return Err(RuntimeError::Arity {
                function: c.name.clone(),
                expected: c.fields.len(),
                given: args.len(),
            });
        }

        let mut fields = c.fields.clone();
        for ((_, slot), arg) in fields.iter_mut().zip(args) {
            *slot = arg;
        }

        Ok(self
            .heap
            .alloc(Object::Instance(InstanceObject { class, fields })))
    }

    // =========================================================================
    // Display
    // =========================================================================

    /// Human-readable representation of a value.
    pub fn describe(&self, value: &Value) -> String {
        let Some(r) = value.as_obj() else {
            return value.to_string();
        };
        let Some(object) = self.heap.get(r) else {
            return format!("<dead object {r}>");
        };

        match object {
            Object::Module(m) if m.invalidated => format!("<invalidated module '{}'>", m.name),
            Object::Module(m) => format!("<module '{}'>", m.name),
            Object::Class(c) => format!("<class '{}.{}'>", c.module, c.name),
            Object::Function(f) => format!("<function {}.{}>", f.module, f.name),
            Object::Method(m) => {
                let name = self
                    .heap
                    .function(m.function)
                    .map(|f| f.name.clone())
                    .unwrap_or_default();
                format!(
                    "<bound method {} of {}>",
                    name,
                    self.describe(&Value::Ref(m.receiver))
                )
            }
            Object::Property(_) => "<property>".to_string(),
            Object::Instance(i) => match self.heap.class(i.class) {
                Ok(c) => format!("<{}.{} object {r}>", c.module, c.name),
                Err(_) => format!("<object {r}>"),
            },
        }
    }
}

impl ClassObject {
    /// Rebind a class attribute unless it is read-only.
    pub fn set_attr(&mut self, name: &str, value: Value) -> RunResult<()> {
        if self.readonly.contains(name) {
            return Err(RuntimeError::ReadOnly {
                owner: format!("class `{}`", self.name),
                name: name.to_string(),
            });
        }
        self.attrs.insert(name.to_string(), value);
        Ok(())
    }

    /// Delete a class attribute unless it is read-only.
    pub fn del_attr(&mut self, name: &str) -> RunResult<()> {
        if self.readonly.contains(name) {
            return Err(RuntimeError::ReadOnly {
                owner: format!("class `{}`", self.name),
                name: name.to_string(),
            });
        }
        self.attrs
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| RuntimeError::attribute(format!("class `{}`", self.name), name))
    }
}

fn collect_literals(literals: &indexmap::IndexMap<String, crate::loader::Literal>) -> Namespace {
    literals
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v)))
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::None => "None",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::Str(_) => "str",
        Value::Ref(_) => "object",
    }
}

#[cfg(test)]
mod tests;
