//! Reload error types.

use thiserror::Error;

use crate::runtime::RuntimeError;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("autoreload requires at least one watched module prefix")]
    NothingToWatch,

    /// Re-importing a module failed. Modules imported before the failure
    /// stay reloaded and were already patched.
    #[error("failed to reload module `{module}`")]
    Import {
        module: String,
        #[source]
        source: RuntimeError,
    },

    #[error("failed to update old references of module `{module}`")]
    Patch {
        module: String,
        #[source]
        source: RuntimeError,
    },
}
