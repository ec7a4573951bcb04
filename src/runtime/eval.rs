//! Function body evaluation.
//!
//! Bodies never capture handles at definition time: globals, closures and
//! attributes are read through the function object and its globals module
//! on every call, so patching either one changes what the next call sees.

use super::object::{Namespace, Value};
use super::{ObjRef, RunResult, Runtime, RuntimeError};
use crate::loader::Code;

/// Activation record of one call.
pub(super) struct Frame {
    pub function: ObjRef,
    pub globals: ObjRef,
    pub locals: Namespace,
}

impl Frame {
    fn this(&self) -> RunResult<Value> {
        self.locals
            .get("self")
            .cloned()
            .ok_or_else(|| RuntimeError::Undefined("self".to_string()))
    }
}

impl Runtime {
    pub(super) fn eval(&mut self, code: &Code, frame: &Frame) -> RunResult<Value> {
        match code {
            Code::Literal(lit) => Ok(lit.into()),
            Code::Arg { arg } => frame
                .locals
                .get(arg)
                .cloned()
                .ok_or_else(|| RuntimeError::Undefined(arg.clone())),
            Code::Attr { attr } => {
                let this = frame.this()?;
                self.get_attr(&this, attr)
            }
            Code::Global { global } => self.resolve_name(frame, global),
            Code::Free { free } => self
                .heap
                .function(frame.function)?
                .closure
                .get(free)
                .cloned()
                .ok_or_else(|| RuntimeError::Undefined(free.clone())),
            Code::Call { call, args } => {
                let callee = self.resolve_name(frame, call)?;
                let args = self.eval_all(args, frame)?;
                self.call(&callee, args)
            }
            Code::CallMethod { call_method, args } => {
                let this = frame.this()?;
                let method = self.get_attr(&this, call_method)?;
                let args = self.eval_all(args, frame)?;
                self.call(&method, args)
            }
            Code::Add { add } => {
                let values = self.eval_all(add, frame)?;
                sum(&values)
            }
            Code::Concat { concat } => {
                let values = self.eval_all(concat, frame)?;
                Ok(Value::Str(
                    values.iter().map(|v| self.display_plain(v)).collect(),
                ))
            }
            Code::Store { store, value } => {
                let this = frame.this()?;
                let value = self.eval(value, frame)?;
                self.set_attr(&this, store, value.clone())?;
                Ok(value)
            }
            Code::Discard { discard } => {
                let this = frame.this()?;
                let Some(obj) = this.as_obj() else {
                    return Err(RuntimeError::Type("`self` is not an object".to_string()));
                };
                self.heap
                    .instance_mut(obj)?
                    .fields
                    .shift_remove(discard)
                    .ok_or_else(|| RuntimeError::attribute("instance", discard.as_str()))?;
                Ok(Value::None)
            }
        }
    }

    fn eval_all(&mut self, codes: &[Code], frame: &Frame) -> RunResult<Vec<Value>> {
        codes.iter().map(|code| self.eval(code, frame)).collect()
    }

    /// Resolve a dotted name: the head is a local, else a global of the
    /// function's module; the rest are attribute lookups.
    fn resolve_name(&mut self, frame: &Frame, dotted: &str) -> RunResult<Value> {
        let (head, rest) = match dotted.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (dotted, None),
        };

        let base = match frame.locals.get(head) {
            Some(local) => local.clone(),
            None => {
                let globals = self.heap.module(frame.globals)?;
                if globals.invalidated {
                    return Err(RuntimeError::Invalidated(globals.name.clone()));
                }
                globals
                    .namespace
                    .get(head)
                    .cloned()
                    .ok_or_else(|| RuntimeError::Undefined(head.to_string()))?
            }
        };

        match rest {
            Some(rest) => self.get_path(&base, rest),
            None => Ok(base),
        }
    }

    /// Strings without quotes, everything else as described.
    fn display_plain(&self, value: &Value) -> String {
        match value {
            Value::Str(s) => s.clone(),
            other => self.describe(other),
        }
    }
}

fn sum(values: &[Value]) -> RunResult<Value> {
    let mut int_total: i64 = 0;
    let mut float_total: Option<f64> = None;

    for value in values {
        match value {
            Value::Int(i) => {
                int_total = int_total
                    .checked_add(*i)
                    .ok_or_else(|| RuntimeError::Type("integer overflow".to_string()))?;
            }
            Value::Float(x) => *float_total.get_or_insert(0.0) += x,
            other => {
                return Err(RuntimeError::Type(format!(
                    "unsupported operand for add: {other}"
                )));
            }
        }
    }

    Ok(match float_total {
        Some(x) => Value::Float(x + int_total as f64),
        None => Value::Int(int_total),
    })
}
