//! HTML template engine with an embedded scripting language.
//!
//! Templates interleave literal HTML with `{? … ?}` code regions holding
//! expressions, conditionals, loops, variable bindings and the composition
//! primitives `extends`/`section`/`define` (single-level inheritance) and
//! `include` (partials with an explicit argument map).
//!
//! The host wires the engine up in three steps:
//!
//! 1. [`init`] with the template directory and optional render cache.
//! 2. [`register_builtins`] for the native functions templates may call.
//! 3. [`render`] per request, with a variable map and an output writer.

pub mod ast;
pub mod builtins;
pub mod config;
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod loader;
pub mod parser;

use std::collections::HashMap;
use std::io::Write;

use thiserror::Error;

pub use builtins::{register_builtins, Builtin};
pub use config::{init, CacheConfig, Config};
pub use environment::Environment;
pub use evaluator::{EvalError, HostObject, MapKey, Value};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("lamb: {0}")]
    Config(String),
    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to write rendered output: {0}")]
    Write(std::io::Error),
    #[error("{file}: {message}")]
    Parse { file: String, message: String },
    #[error("{file}: {source}")]
    Eval { file: String, source: EvalError },
}

/// Renders the template named `file` with the given variables into `out`.
/// Nothing is written when the render fails.
pub fn render(
    file: &str,
    vars: HashMap<String, Value>,
    out: &mut dyn Write,
) -> Result<(), EngineError> {
    loader::load_file(file, &vars, out, Environment::new())
}
