//! Terminal output: prefixed log lines and the watch-mode status block.
//!
//! - `log!("reload"; ...)` always prints, `debug!` only with `--verbose`
//! - `debug_do! { ... }` skips building diagnostics when not verbose
//! - `status_*` rewrite one block in place, one per reload cycle
//!
//! ```ignore
//! log!("reload"; "{} reloaded", plural_count(3, "module"));
//! debug!("patch"; "skipping read-only attribute {}", name);
//! ```

use std::io::{Write, stdout};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use crossterm::{
    cursor, execute,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use parking_lot::Mutex;

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Set by `--verbose` or `[watch] verbose = true`.
pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

// ============================================================================
// Macros
// ============================================================================

/// Print `[module] message`.
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// [`log!`] when verbose.
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

/// Run a block only when verbose.
#[macro_export]
macro_rules! debug_do {
    ($($body:tt)*) => {{
        if $crate::logger::is_verbose() {
            $($body)*
        }
    }};
}

pub fn log(module: &str, message: &str) {
    let mut out = stdout().lock();
    writeln!(out, "{} {message}", prefix(module)).ok();
    out.flush().ok();
}

fn prefix(module: &str) -> String {
    let tag = format!("[{module}]");
    match module {
        "reload" | "patch" => tag.bright_blue().bold().to_string(),
        "watch" => tag.bright_green().bold().to_string(),
        "import" | "load" => tag.cyan().bold().to_string(),
        "error" => tag.bright_red().bold().to_string(),
        "warning" => tag.yellow().bold().to_string(),
        _ => tag.bright_yellow().bold().to_string(),
    }
}

#[inline]
pub fn plural_s(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

/// `plural_count(1, "module")` is `"1 module"`, `plural_count(5, "module")`
/// is `"5 modules"`.
#[inline]
pub fn plural_count(count: usize, noun: &str) -> String {
    format!("{} {}{}", count, noun, plural_s(count))
}

// ============================================================================
// Watch status
// ============================================================================

/// How a reload cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Reloaded,
    Unchanged,
    Failed,
}

/// Status block for `watch`: each cycle replaces the previous block,
/// numbered so repeated identical outcomes are still visibly new.
pub struct WatchStatus {
    /// Lines printed by the previous block, 0 when detached.
    last_lines: usize,
    cycle: usize,
}

static WATCH_STATUS: LazyLock<Mutex<WatchStatus>> =
    LazyLock::new(|| Mutex::new(WatchStatus::new()));

impl WatchStatus {
    pub const fn new() -> Self {
        Self {
            last_lines: 0,
            cycle: 0,
        }
    }

    fn show(&mut self, outcome: Outcome, message: &str) {
        self.cycle += 1;
        let mut out = stdout().lock();

        if self.last_lines > 0 {
            #[allow(clippy::cast_possible_truncation)]
            let up = self.last_lines as u16;
            execute!(out, cursor::MoveUp(up), Clear(ClearType::FromCursorDown)).ok();
        }

        let counter = format!("#{}", self.cycle).dimmed().to_string();
        let line = match outcome {
            Outcome::Reloaded => format!("{counter} {} {message}", "✓".green()),
            Outcome::Unchanged => format!("{counter} {}", message.dimmed()),
            Outcome::Failed => format!("{counter} {} {message}", "✗".red()),
        };
        writeln!(out, "{line}").ok();
        out.flush().ok();

        self.last_lines = line.lines().count().max(1);
    }

    /// Keep the current block; the next one starts below it.
    pub fn detach(&mut self) {
        self.last_lines = 0;
    }
}

impl Default for WatchStatus {
    fn default() -> Self {
        Self::new()
    }
}

pub fn status_success(message: &str) {
    WATCH_STATUS.lock().show(Outcome::Reloaded, message);
}

pub fn status_unchanged(message: &str) {
    WATCH_STATUS.lock().show(Outcome::Unchanged, message);
}

/// `detail` goes on the lines below `summary`, if not empty.
pub fn status_error(summary: &str, detail: &str) {
    let message = if detail.is_empty() {
        summary.to_string()
    } else {
        format!("{summary}\n{detail}")
    };
    WATCH_STATUS.lock().show(Outcome::Failed, &message);
}

/// Call after regular log output so it is not overwritten.
pub fn status_clear() {
    WATCH_STATUS.lock().detach();
}
