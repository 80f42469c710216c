use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use lazy_static::lazy_static;

use crate::evaluator::{MapKey, Value};

/// A native function callable from templates. Builtins take a variadic
/// argument list and report their own arity and type errors; the evaluator
/// attaches the call site's position.
pub type BuiltinFn = dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync;

#[derive(Clone)]
pub struct Builtin {
    func: Arc<BuiltinFn>,
}

impl Builtin {
    pub fn new(func: impl Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static) -> Self {
        Self {
            func: Arc::new(func),
        }
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, String> {
        (self.func)(args)
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Builtin(..)")
    }
}

impl PartialEq for Builtin {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

lazy_static! {
    // Process-wide registry: populated at startup, read-only while rendering.
    static ref REGISTRY: RwLock<HashMap<String, Builtin>> = RwLock::new(defaults());
}

/// Merges host-defined builtins into the global registry.
///
/// # Panics
///
/// Panics when a name collides with an already registered builtin.
pub fn register_builtins(funcs: HashMap<String, Builtin>) {
    let mut registry = REGISTRY.write().expect("builtin registry poisoned");

    for (name, func) in funcs {
        if registry.contains_key(&name) {
            panic!("lamb: function {name} already exists");
        }
        registry.insert(name, func);
    }
}

pub fn lookup(name: &str) -> Option<Builtin> {
    REGISTRY
        .read()
        .expect("builtin registry poisoned")
        .get(name)
        .cloned()
}

fn defaults() -> HashMap<String, Builtin> {
    let mut registry = HashMap::new();
    registry.insert("len".to_string(), Builtin::new(len_builtin));
    registry.insert("type".to_string(), Builtin::new(type_builtin));
    registry.insert(
        "map_key_exists".to_string(),
        Builtin::new(map_key_exists_builtin),
    );
    registry.insert("range".to_string(), Builtin::new(range_builtin));
    registry
}

fn len_builtin(args: &[Value]) -> Result<Value, String> {
    if args.len() != 1 {
        return Err(format!(
            "wrong number of arguments in len. got={}, want=1",
            args.len()
        ));
    }

    match &args[0] {
        Value::Array(items) => Ok(Value::Int(items.len() as i64)),
        Value::Str(text) => Ok(Value::Int(text.len() as i64)),
        other => Err(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
    }
}

fn type_builtin(args: &[Value]) -> Result<Value, String> {
    if args.len() != 1 {
        return Err(format!(
            "wrong number of arguments in type. got={}, want=1",
            args.len()
        ));
    }

    Ok(Value::Str(args[0].type_name().to_string()))
}

fn map_key_exists_builtin(args: &[Value]) -> Result<Value, String> {
    if args.len() != 2 {
        return Err(format!(
            "wrong number of arguments in map_key_exists. got={}, want=2",
            args.len()
        ));
    }

    match (&args[0], &args[1]) {
        (Value::Nil, _) => Ok(Value::Bool(false)),
        (Value::Map(pairs), key) => {
            let exists = match key {
                Value::Int(value) => pairs.contains_key(&MapKey::Int(*value)),
                Value::Str(value) => pairs.contains_key(&MapKey::Str(value.clone())),
                _ => false,
            };
            Ok(Value::Bool(exists))
        }
        (other, _) => Err(format!(
            "argument to `map_key_exists` not supported, got {}, want=map",
            other.type_name()
        )),
    }
}

// range(start, end) is inclusive on both ends; an empty range is fine.
fn range_builtin(args: &[Value]) -> Result<Value, String> {
    if args.len() != 2 {
        return Err(format!(
            "wrong number of arguments in range. got={}, want=2",
            args.len()
        ));
    }

    let (Value::Int(start), Value::Int(end)) = (&args[0], &args[1]) else {
        return Err(format!(
            "argument to `range` not supported, got {}, want=int",
            args[0].type_name()
        ));
    };

    let values = (*start..=*end).map(Value::Int).collect();
    Ok(Value::Array(values))
}
