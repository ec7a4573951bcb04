//! Runtime error types.

use thiserror::Error;

use super::heap::ObjRef;
use super::object::ObjectKind;
use crate::loader::LoadError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no module named `{0}`")]
    ModuleNotFound(String),

    #[error("failed to load module `{module}`")]
    Load {
        module: String,
        #[source]
        source: LoadError,
    },

    #[error("error while executing module `{module}`: {message}")]
    Exec { module: String, message: String },

    #[error("object {0} was already collected")]
    DeadReference(ObjRef),

    #[error("expected {expected}, found {found}")]
    WrongKind {
        expected: ObjectKind,
        found: ObjectKind,
    },

    #[error("{owner} has no attribute `{name}`")]
    Attribute { owner: String, name: String },

    #[error("attribute `{name}` of {owner} is read-only")]
    ReadOnly { owner: String, name: String },

    #[error("module `{0}` was invalidated by a reload, use the reloaded module instead")]
    Invalidated(String),

    #[error("`{0}` is not callable")]
    NotCallable(String),

    #[error("{function}() takes {expected} argument(s) but {given} were given")]
    Arity {
        function: String,
        expected: usize,
        given: usize,
    },

    #[error("name `{0}` is not defined")]
    Undefined(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("maximum call depth exceeded")]
    RecursionLimit,
}

impl RuntimeError {
    pub(crate) fn attribute(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Attribute {
            owner: owner.into(),
            name: name.into(),
        }
    }
}
