use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;

use crate::config;
use crate::environment::Environment;
use crate::evaluator::{self, EvalError, Value};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::EngineError;

const TEMPLATE_EXTENSION: &str = "lamb.html";

/// Resolves `name`, runs the full pipeline and writes the rendered bytes to
/// `out`. Re-entered by `include` and by the parent render of `extends`.
pub fn load_file(
    name: &str,
    vars: &HashMap<String, Value>,
    out: &mut dyn Write,
    mut env: Environment,
) -> Result<(), EngineError> {
    validate_template_name(name)?;

    let path = resolve_template_path(name);

    for (key, value) in vars {
        env.set(key.clone(), value.clone());
    }

    let cache_enabled = matches!(vars.get("__cache"), Some(Value::Str(mode)) if mode == "all");
    let cache_file = cache_path(name);

    if cache_enabled {
        if let Some(content) = read_cache(&cache_file)? {
            out.write_all(&content).map_err(EngineError::Write)?;
            return Ok(());
        }
    }

    env.file_name = path.display().to_string();

    let source = fs::read(&path).map_err(|source| EngineError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let source = String::from_utf8_lossy(&source);

    let program = Parser::new(Lexer::new(&source))
        .parse_program()
        .map_err(|errors| EngineError::Parse {
            file: env.file_name.clone(),
            message: errors[0].to_string(),
        })?;

    let rendered =
        evaluator::eval_program(&program, &mut env).map_err(|source| EngineError::Eval {
            file: env.file_name.clone(),
            source,
        })?;

    // A child that executed `extends` contributes nothing itself: its
    // captured sections are carried into a derived environment and the
    // parent's rendering replaces the child's.
    let rendered = if env.in_extends {
        let parent = env.extends_from.from.clone();
        let mut parent_env = env.copy();
        parent_env.is_extends = true;

        let mut buf = Vec::new();
        load_file(&parent, &HashMap::new(), &mut buf, parent_env)?;

        let leftover = env.extends_from.sections.borrow();
        if let Some(section) = leftover.values().next() {
            return Err(EngineError::Eval {
                file: env.file_name.clone(),
                source: EvalError {
                    message: format!("section {} does not exist", section.name),
                    line: section.line,
                    column: section.column,
                },
            });
        }

        String::from_utf8_lossy(&buf).into_owned()
    } else {
        rendered
    };

    out.write_all(rendered.as_bytes())
        .map_err(EngineError::Write)?;

    if cache_enabled {
        write_cache_in_background(cache_file, rendered);
    }

    Ok(())
}

/// Renders a sub-template into a string under the given environment.
pub(crate) fn render_to_string(name: &str, env: Environment) -> Result<String, EngineError> {
    let mut buf = Vec::new();
    load_file(name, &HashMap::new(), &mut buf, env)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Logical name `a.b.c` maps to `<base>/a/b/c.lamb.html`.
fn resolve_template_path(name: &str) -> PathBuf {
    let base_dir = env::var(config::BASE_DIR_VAR).unwrap_or_default();

    let mut path = PathBuf::from(base_dir);
    for part in name.split('.') {
        path.push(part);
    }
    path.set_extension(TEMPLATE_EXTENSION);
    path
}

// Template names are dot-separated components. Rejecting separators and
// empty components keeps both the template path and the cache file inside
// their configured directories.
fn validate_template_name(name: &str) -> Result<(), EngineError> {
    let valid = !name.is_empty()
        && name
            .split('.')
            .all(|part| !part.is_empty() && !part.contains(['/', '\\', '\0']));

    if valid {
        Ok(())
    } else {
        Err(EngineError::Config(format!(
            "invalid template name '{name}'"
        )))
    }
}

fn cache_path(name: &str) -> PathBuf {
    let cache_dir = env::var(config::CACHE_DIR_VAR).unwrap_or_else(|_| ".cache".to_string());
    Path::new(&cache_dir).join(name)
}

// A fresh cache entry short-circuits the render; a stale one is unlinked and
// the render re-runs.
fn read_cache(cache_file: &Path) -> Result<Option<Vec<u8>>, EngineError> {
    let Ok(metadata) = fs::metadata(cache_file) else {
        return Ok(None);
    };

    let raw_ttl = env::var(config::CACHE_TIME_VAR).unwrap_or_default();
    let ttl = config::parse_duration(&raw_ttl)
        .map_err(|_| EngineError::Config("cache: time must be a valid duration".to_string()))?;

    let fresh = metadata
        .modified()
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age <= ttl);

    if !fresh {
        let _ = fs::remove_file(cache_file);
        return Ok(None);
    }

    let content = fs::read(cache_file).map_err(|source| EngineError::Read {
        path: cache_file.display().to_string(),
        source,
    })?;

    Ok(Some(content))
}

// Write-back happens off the render path, after the output is flushed. The
// last writer of an entry wins; a failed write is fatal to this task only.
fn write_cache_in_background(cache_file: PathBuf, rendered: String) {
    thread::spawn(move || {
        if let Some(parent) = cache_file.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                panic!(
                    "lamb: failed to create cache directory '{}': {err}",
                    parent.display()
                );
            }
        }

        if let Err(err) = fs::write(&cache_file, rendered.as_bytes()) {
            panic!(
                "lamb: failed to write cache file '{}': {err}",
                cache_file.display()
            );
        }
    });
}
