use std::collections::HashMap;
use std::env;
use std::fs;
use std::io;

use lamb::{config, render, Value};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut args = env::args().skip(1);
    let Some(name) = args.next() else {
        return Err("usage: lamb <template-name> [vars.json]".to_string());
    };

    let vars = match args.next() {
        Some(path) => load_vars(&path)?,
        None => HashMap::new(),
    };

    if env::var(config::BASE_DIR_VAR).is_err() {
        env::set_var(config::BASE_DIR_VAR, ".");
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();

    render(&name, vars, &mut out).map_err(|err| err.to_string())
}

fn load_vars(path: &str) -> Result<HashMap<String, Value>, String> {
    let raw =
        fs::read_to_string(path).map_err(|err| format!("failed to read '{path}': {err}"))?;

    let parsed: serde_json::Value =
        serde_json::from_str(&raw).map_err(|err| format!("invalid JSON in '{path}': {err}"))?;

    let serde_json::Value::Object(entries) = parsed else {
        return Err(format!("'{path}' must hold a JSON object"));
    };

    Ok(entries
        .into_iter()
        .map(|(key, value)| (key, Value::from(value)))
        .collect())
}
