//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

use crate::reload::ReloadMode;

/// In-place module hot reloading for TOML module trees
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (default: autoreload.toml)
    #[arg(short = 'C', long, global = true, default_value = "autoreload.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Module source root (repeatable, relative to project root)
    #[arg(short, long, global = true, value_hint = clap::ValueHint::DirPath)]
    pub root: Vec<PathBuf>,

    /// Module prefix to watch (repeatable), e.g. `app` or `app.models`
    #[arg(short, long, global = true, value_name = "PREFIX")]
    pub watch: Vec<String>,

    /// How old module objects are treated on reload
    #[arg(short, long, global = true)]
    pub mode: Option<ReloadMode>,

    /// Log every patched module
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Watch only the prefixes themselves, not their submodules
    #[arg(long, global = true)]
    pub no_recursive: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Interactive session that reloads changed modules before each line
    #[command(visible_alias = "r")]
    Repl {
        /// Modules to import before the first prompt
        #[arg(short, long, value_name = "MODULE")]
        import: Vec<String>,
    },

    /// Watch source roots and reload modules as files change
    #[command(visible_alias = "w")]
    Watch {
        /// Debounce interval in milliseconds
        #[arg(short, long)]
        debounce: Option<u64>,
    },

    /// Print the dependency graph of the watched modules
    #[command(visible_alias = "g")]
    Graph {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub const fn is_repl(&self) -> bool {
        matches!(self.command, Commands::Repl { .. })
    }
    pub const fn is_watch(&self) -> bool {
        matches!(self.command, Commands::Watch { .. })
    }
    pub const fn is_graph(&self) -> bool {
        matches!(self.command, Commands::Graph { .. })
    }
}
