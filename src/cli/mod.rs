//! Command-line interface module.

mod args;
pub mod common;
pub mod graph;
pub mod repl;
pub mod watch;

pub use args::{Cli, Commands};
