//! Interactive session with autoreload.
//!
//! Every submitted line first runs the reload hook, then executes, then lets
//! the reloader record new session bindings and freshly imported modules.

mod parse;

pub use parse::{Expr, Line, ParseError, parse_line};

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use thiserror::Error;

use crate::config::ReloadConfig;
use crate::log;
use crate::logger::plural_count;
use crate::reload::{AutoReloader, ReloadError};
use crate::runtime::{RunResult, Runtime, RuntimeError, Value};

const PROMPT: &str = ">>> ";

const HELP: &str = "\
import a.b [as x]   import module a.b, bound as `b` (or `x`)
name = <expr>       bind a session variable
<expr>              evaluate, e.g. `obj.area()` or `s.Shape(2, \"red\")`
:modules            list loaded modules (* = watched)
:gc                 collect unreachable objects
:quit               leave the session";

#[derive(Debug, Error)]
enum ReplError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// What a submitted line asks the driver to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

enum Output {
    Nothing,
    Text(String),
    Quit,
}

pub struct Session {
    runtime: Runtime,
    reloader: Option<AutoReloader>,
}

impl Session {
    /// A session without autoreload has no reloader.
    pub fn new(runtime: Runtime, reloader: Option<AutoReloader>) -> Self {
        Self { runtime, reloader }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn reloader(&self) -> Option<&AutoReloader> {
        self.reloader.as_ref()
    }

    /// Read piped lines until EOF or `:quit`. Terminals go through
    /// [`Session::run_editor`] instead.
    pub fn run(&mut self, mut input: impl BufRead, out: &mut impl Write) -> io::Result<()> {
        let mut line = String::new();
        loop {
            line.clear();
            if input.read_line(&mut line)? == 0 {
                break;
            }
            if self.submit(&line, out)? == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    /// Interactive loop with line editing and history. Ctrl-C drops the
    /// current line, Ctrl-D ends the session.
    pub fn run_editor(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().context("failed to initialize line editor")?;
        let mut out = io::stdout();

        loop {
            let line = match editor.readline(PROMPT) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err.into()),
            };
            if !line.trim().is_empty() {
                editor.add_history_entry(line.as_str()).ok();
            }
            if self.submit(&line, &mut out)? == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    /// Run one unit of work: reload hook, execute, track.
    pub fn submit(&mut self, line: &str, out: &mut impl Write) -> io::Result<Flow> {
        if let Some(reloader) = &mut self.reloader {
            match reloader.pre_run(&mut self.runtime) {
                Ok(report) if !report.is_idle() => {
                    writeln!(out, "[autoreload] {}", report.reloaded.join(", "))?;
                }
                Ok(_) => {}
                Err(err) => writeln!(out, "[autoreload] error: {:#}", anyhow::Error::new(err))?,
            }
        }

        let result = parse_line(line)
            .map_err(ReplError::from)
            .and_then(|line| self.execute(line));

        if let Some(reloader) = &mut self.reloader {
            reloader.prime_new_modules(&self.runtime);
            reloader.track_globals(&self.runtime);
        }

        match result {
            Ok(Output::Nothing) => Ok(Flow::Continue),
            Ok(Output::Text(text)) => {
                writeln!(out, "{text}")?;
                Ok(Flow::Continue)
            }
            Ok(Output::Quit) => Ok(Flow::Quit),
            Err(err) => {
                writeln!(out, "error: {err}")?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Import `module` and bind it in the session.
    pub fn import(&mut self, module: &str, alias: Option<&str>) -> RunResult<()> {
        let handle = self.runtime.import_module(module)?;
        let binding = alias.unwrap_or_else(|| module.rsplit('.').next().unwrap_or(module));
        self.runtime.session_set(binding, Value::Ref(handle))
    }

    fn execute(&mut self, line: Line) -> Result<Output, ReplError> {
        let output = match line {
            Line::Empty => Output::Nothing,
            Line::Quit => Output::Quit,
            Line::Help => Output::Text(HELP.to_string()),
            Line::Modules => Output::Text(self.list_modules()),
            Line::Gc => {
                let freed = self.runtime.collect_garbage();
                Output::Text(format!("freed {}", plural_count(freed, "object")))
            }
            Line::Import { module, alias } => {
                self.import(&module, alias.as_deref())?;
                Output::Nothing
            }
            Line::Assign { name, expr } => {
                let value = self.eval(&expr)?;
                self.runtime.session_set(name, value)?;
                Output::Nothing
            }
            Line::Eval(expr) => {
                let value = self.eval(&expr)?;
                if value == Value::None {
                    Output::Nothing
                } else {
                    let text = self.runtime.describe(&value);
                    self.runtime.session_set("_", value)?;
                    Output::Text(text)
                }
            }
        };
        Ok(output)
    }

    fn eval(&mut self, expr: &Expr) -> RunResult<Value> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self
                .runtime
                .session_get(name)
                .ok_or_else(|| RuntimeError::Undefined(name.clone())),
            Expr::Attr(base, name) => {
                let base = self.eval(base)?;
                self.runtime.get_attr(&base, name)
            }
            Expr::Call(callee, args) => {
                let callee = self.eval(callee)?;
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<RunResult<Vec<_>>>()?;
                self.runtime.call(&callee, args)
            }
        }
    }

    fn list_modules(&self) -> String {
        self.runtime
            .registry()
            .names()
            .map(|name| {
                let watched = self
                    .reloader
                    .as_ref()
                    .is_some_and(|r| r.config().watches(name));
                if watched {
                    format!("* {name}")
                } else {
                    format!("  {name}")
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Start an interactive session on stdin/stdout.
pub fn run(config: &ReloadConfig, imports: &[String]) -> Result<()> {
    let mut session = Session::new(Runtime::new(config.loader()), None);
    for module in imports {
        session
            .import(module, None)
            .with_context(|| format!("failed to import `{module}`"))?;
    }

    let mut reloader = AutoReloader::new(config.watch_config());
    match reloader.register(session.runtime()) {
        Ok(()) => {
            reloader.track_globals(session.runtime());
            session.reloader = Some(reloader);
        }
        Err(ReloadError::NothingToWatch) => {
            log!("repl"; "no watched prefixes, autoreload disabled (use --watch)");
        }
        Err(err) => return Err(err.into()),
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        session.run_editor()
    } else {
        session.run(stdin.lock(), &mut io::stdout())?;
        Ok(())
    }
}
