use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{BlockStatement, Expr, InfixOp, PrefixOp, Program, Stmt};
use crate::builtins::{self, Builtin};
use crate::environment::{Environment, Section};
use crate::lexer::Token;
use crate::loader;

/// A host value reachable through dot access. Implementations expose their
/// public fields by name, so the engine needs no reflection.
pub trait HostObject: fmt::Debug {
    fn field_names(&self) -> Vec<String>;
    fn get_field(&self, name: &str) -> Option<Value>;
}

/// Map keys are restricted to integers and strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Int(i64),
    Str(String),
}

impl MapKey {
    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Int(value) => Value::Int(*value),
            MapKey::Str(value) => Value::Str(value.clone()),
        }
    }

    fn of(value: &Value) -> Option<MapKey> {
        match value {
            Value::Int(value) => Some(MapKey::Int(*value)),
            Value::Str(value) => Some(MapKey::Str(value.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Int(value) => write!(f, "{value}"),
            MapKey::Str(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Bool(bool),
    Str(String),
    Array(Vec<Value>),
    Map(HashMap<MapKey, Value>),
    Object(Rc<dyn HostObject>),
    Builtin(Builtin),
    Nil,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Object(_) => "struct",
            Value::Builtin(_) => "builtin",
            Value::Nil => "nil",
        }
    }

    /// Only `nil` and `false` are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(value) => write!(f, "{value}"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Str(value) => f.write_str(value),
            Value::Array(items) => {
                let rendered = items
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{rendered}]")
            }
            Value::Map(pairs) => {
                let rendered = pairs
                    .iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{rendered}}}")
            }
            Value::Object(_) => f.write_str("<struct>"),
            Value::Builtin(_) => f.write_str("<builtin function>"),
            Value::Nil => f.write_str("nil"),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Nil,
            serde_json::Value::Bool(value) => Value::Bool(value),
            // JSON numbers without an i64 representation keep their textual
            // form; the template language has no float type.
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(value) => Value::Int(value),
                None => Value::Str(number.to_string()),
            },
            serde_json::Value::String(value) => Value::Str(value),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (MapKey::Str(key), Value::from(value)))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{line}:{column}: {message}")]
pub struct EvalError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl EvalError {
    pub fn new(token: &Token, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: token.line,
            column: token.column,
        }
    }
}

/// Renders a parsed template. Statement results are stringified into the
/// output in source order; errors short-circuit and abort the render.
pub fn eval_program(program: &Program, env: &mut Environment) -> Result<String, EvalError> {
    let mut out = String::new();

    for stmt in &program.statements {
        let result = eval_stmt(stmt, env)?;
        if !matches!(result, Value::Nil) {
            out.push_str(&result.to_string());
        }
    }

    Ok(out)
}

fn eval_block(block: &BlockStatement, env: &mut Environment) -> Result<String, EvalError> {
    let mut out = String::new();

    for stmt in &block.statements {
        let result = eval_stmt(stmt, env)?;
        if !matches!(result, Value::Nil) {
            out.push_str(&result.to_string());
        }
    }

    Ok(out)
}

fn eval_stmt(stmt: &Stmt, env: &mut Environment) -> Result<Value, EvalError> {
    match stmt {
        Stmt::Var { name, value, .. } => {
            let value = eval_expr(value, env)?;
            env.set(name.clone(), value);
            Ok(Value::Nil)
        }
        Stmt::Expr(expr) => eval_expr(expr, env),
        Stmt::Extends { token, from } => eval_extends(token, from, env),
        Stmt::Section { token, name, block } => eval_section(token, name, block, env),
        Stmt::Define { token, name, body } => eval_define(token, name, body, env),
        Stmt::Include { token, file, vars } => eval_include(token, file, vars.as_ref(), env),
    }
}

fn eval_expr(expr: &Expr, env: &mut Environment) -> Result<Value, EvalError> {
    match expr {
        Expr::Ident { token, name } => eval_identifier(token, name, env),
        Expr::Int { value, .. } => Ok(Value::Int(*value)),
        Expr::Bool { value, .. } => Ok(Value::Bool(*value)),
        Expr::Str {
            token,
            value,
            closed,
        } => {
            if !closed {
                return Err(EvalError::new(token, "unclosed string literal"));
            }
            Ok(Value::Str(value.clone()))
        }
        Expr::Html { value, .. } => Ok(Value::Str(value.clone())),
        Expr::Prefix {
            token,
            operator,
            right,
        } => {
            let right = eval_expr(right, env)?;
            eval_prefix_expression(token, *operator, right)
        }
        Expr::Infix {
            token,
            left,
            operator,
            right,
        } => {
            if matches!(operator, InfixOp::And) {
                let left = eval_expr(left, env)?;
                if !left.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                let right = eval_expr(right, env)?;
                return Ok(Value::Bool(right.is_truthy()));
            }

            let left = eval_expr(left, env)?;
            let right = eval_expr(right, env)?;
            eval_infix_expression(token, *operator, left, right)
        }
        Expr::If {
            condition,
            consequence,
            alternative,
            ..
        } => {
            let condition = eval_expr(condition, env)?;
            if condition.is_truthy() {
                Ok(Value::Str(eval_block(consequence, env)?))
            } else if let Some(alternative) = alternative {
                Ok(Value::Str(eval_block(alternative, env)?))
            } else {
                Ok(Value::Nil)
            }
        }
        Expr::For {
            token,
            key,
            value,
            iterable,
            block,
        } => eval_for_expression(token, key.as_deref(), value, iterable, block, env),
        Expr::Array { elements, .. } => {
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                values.push(eval_expr(element, env)?);
            }
            Ok(Value::Array(values))
        }
        Expr::Map { pairs, .. } => eval_map_literal(pairs, env),
        Expr::Index { token, left, index } => {
            let left = eval_expr(left, env)?;
            let index = eval_expr(index, env)?;
            eval_index_expression(token, left, index)
        }
        Expr::Call {
            token,
            function,
            arguments,
        } => {
            let function = eval_expr(function, env)?;
            let mut args = Vec::with_capacity(arguments.len());
            for argument in arguments {
                args.push(eval_expr(argument, env)?);
            }
            apply_function(token, function, &args)
        }
        Expr::Dot {
            token,
            object,
            field,
        } => eval_dot_expression(token, object, field, env),
    }
}

fn eval_identifier(token: &Token, name: &str, env: &Environment) -> Result<Value, EvalError> {
    if let Some(value) = env.get(name) {
        return Ok(value);
    }

    if let Some(builtin) = builtins::lookup(name) {
        return Ok(Value::Builtin(builtin));
    }

    Err(EvalError::new(
        token,
        format!("identifier not found: {name}"),
    ))
}

fn eval_prefix_expression(
    token: &Token,
    operator: PrefixOp,
    right: Value,
) -> Result<Value, EvalError> {
    match operator {
        PrefixOp::Bang => Ok(match right {
            Value::Bool(value) => Value::Bool(!value),
            Value::Nil => Value::Bool(true),
            _ => Value::Bool(false),
        }),
        PrefixOp::Minus => match right {
            Value::Int(value) => Ok(Value::Int(value.wrapping_neg())),
            other => Err(EvalError::new(
                token,
                format!("unknown operator: -{}", other.type_name()),
            )),
        },
    }
}

fn eval_infix_expression(
    token: &Token,
    operator: InfixOp,
    left: Value,
    right: Value,
) -> Result<Value, EvalError> {
    if let (Value::Int(l), Value::Int(r)) = (&left, &right) {
        return eval_integer_infix_expression(token, operator, *l, *r);
    }

    match operator {
        InfixOp::Eq => Ok(Value::Bool(left == right)),
        InfixOp::NotEq => Ok(Value::Bool(left != right)),
        InfixOp::Plus => match (&left, &right) {
            (Value::Str(l), Value::Str(r)) => Ok(Value::Str(format!("{l}{r}"))),
            _ => Err(mismatch_error(token, operator, &left, &right)),
        },
        _ => Err(mismatch_error(token, operator, &left, &right)),
    }
}

fn mismatch_error(token: &Token, operator: InfixOp, left: &Value, right: &Value) -> EvalError {
    let (lt, rt) = (left.type_name(), right.type_name());
    if lt != rt {
        EvalError::new(token, format!("type mismatch: {lt} {operator} {rt}"))
    } else {
        EvalError::new(token, format!("unknown operator: {lt} {operator} {rt}"))
    }
}

fn eval_integer_infix_expression(
    token: &Token,
    operator: InfixOp,
    left: i64,
    right: i64,
) -> Result<Value, EvalError> {
    match operator {
        InfixOp::Plus => Ok(Value::Int(left.wrapping_add(right))),
        InfixOp::Minus => Ok(Value::Int(left.wrapping_sub(right))),
        InfixOp::Asterisk => Ok(Value::Int(left.wrapping_mul(right))),
        InfixOp::Slash => {
            if right == 0 {
                return Err(EvalError::new(token, "division by zero"));
            }
            Ok(Value::Int(left.wrapping_div(right)))
        }
        InfixOp::Lt => Ok(Value::Bool(left < right)),
        InfixOp::Gt => Ok(Value::Bool(left > right)),
        InfixOp::Eq => Ok(Value::Bool(left == right)),
        InfixOp::NotEq => Ok(Value::Bool(left != right)),
        InfixOp::And => Err(EvalError::new(
            token,
            format!("unknown operator: int {operator} int"),
        )),
    }
}

fn eval_map_literal(pairs: &[(Expr, Expr)], env: &mut Environment) -> Result<Value, EvalError> {
    let mut map = HashMap::with_capacity(pairs.len());

    for (key_expr, value_expr) in pairs {
        let key = eval_expr(key_expr, env)?;
        let Some(key) = MapKey::of(&key) else {
            return Err(EvalError::new(
                key_expr.token(),
                format!("unusable as map key: {}", key.type_name()),
            ));
        };
        let value = eval_expr(value_expr, env)?;
        map.insert(key, value);
    }

    Ok(Value::Map(map))
}

fn eval_index_expression(token: &Token, left: Value, index: Value) -> Result<Value, EvalError> {
    match (left, index) {
        // Out-of-range and negative indexes yield nil rather than an error.
        (Value::Array(items), Value::Int(i)) => {
            if i < 0 || i as usize >= items.len() {
                Ok(Value::Nil)
            } else {
                Ok(items[i as usize].clone())
            }
        }
        (Value::Map(pairs), key) => Ok(MapKey::of(&key)
            .and_then(|key| pairs.get(&key).cloned())
            .unwrap_or(Value::Nil)),
        (left, _) => Err(EvalError::new(
            token,
            format!("index operator not supported: {}", left.type_name()),
        )),
    }
}

fn apply_function(token: &Token, function: Value, args: &[Value]) -> Result<Value, EvalError> {
    match function {
        Value::Builtin(builtin) => builtin
            .call(args)
            .map_err(|message| EvalError::new(token, message)),
        other => Err(EvalError::new(
            token,
            format!("not a function: {}", other.type_name()),
        )),
    }
}

fn eval_for_expression(
    token: &Token,
    key: Option<&str>,
    value: &str,
    iterable: &Expr,
    block: &BlockStatement,
    env: &mut Environment,
) -> Result<Value, EvalError> {
    let iterand = eval_expr(iterable, env)?;

    let mut out = String::new();

    match iterand {
        Value::Array(items) => {
            for (i, element) in items.into_iter().enumerate() {
                env.set(value.to_string(), element);
                if let Some(key) = key {
                    env.set(key.to_string(), Value::Int(i as i64));
                }
                out.push_str(&eval_block(block, env)?);
            }
        }
        // Map iteration binds the key to the value name; a distinct key name
        // is bound to the same key. Iteration order is the map's native
        // order and not stable across renders.
        Value::Map(pairs) => {
            for map_key in pairs.keys() {
                env.set(value.to_string(), map_key.to_value());
                if let Some(key) = key {
                    env.set(key.to_string(), map_key.to_value());
                }
                out.push_str(&eval_block(block, env)?);
            }
        }
        other => {
            return Err(EvalError::new(
                token,
                format!("{} is not iterable", other.type_name()),
            ));
        }
    }

    env.delete(value);
    if let Some(key) = key {
        env.delete(key);
    }

    Ok(Value::Str(out))
}

fn eval_extends(token: &Token, from: &str, env: &mut Environment) -> Result<Value, EvalError> {
    if env.in_extends || env.is_extends {
        return Err(EvalError::new(token, "nested extends are not allowed"));
    }

    env.in_extends = true;
    env.extends_from.from = from.to_string();

    Ok(Value::Nil)
}

fn eval_section(
    token: &Token,
    name: &str,
    block: &BlockStatement,
    env: &mut Environment,
) -> Result<Value, EvalError> {
    if !env.in_extends {
        return Err(EvalError::new(
            token,
            "section statement is only allowed in extends",
        ));
    }
    if env.is_extends {
        return Err(EvalError::new(
            token,
            "section statement is only allowed with extends",
        ));
    }
    if env.in_section {
        return Err(EvalError::new(
            token,
            "section statement is not allowed in a section",
        ));
    }
    if env.extends_from.sections.borrow().contains_key(name) {
        return Err(EvalError::new(
            token,
            format!("section {name} is already defined"),
        ));
    }

    env.in_section = true;
    let content = eval_block(block, env);
    env.in_section = false;

    env.extends_from.sections.borrow_mut().insert(
        name.to_string(),
        Section {
            name: name.to_string(),
            content: content?,
            line: token.line,
            column: token.column,
        },
    );

    // The capture emits nothing at the child's position.
    Ok(Value::Nil)
}

fn eval_define(
    token: &Token,
    name: &str,
    body: &BlockStatement,
    env: &mut Environment,
) -> Result<Value, EvalError> {
    if env.in_define {
        return Err(EvalError::new(token, "nested defines are not allowed"));
    }

    // A captured section is consumed on first use; otherwise the define body
    // is the default content.
    let captured = env.extends_from.sections.borrow_mut().remove(name);
    if let Some(section) = captured {
        return Ok(Value::Str(section.content));
    }

    env.in_define = true;
    let content = eval_block(body, env);
    env.in_define = false;

    Ok(Value::Str(content?))
}

fn eval_dot_expression(
    token: &Token,
    object: &Expr,
    field: &str,
    env: &mut Environment,
) -> Result<Value, EvalError> {
    let left = eval_expr(object, env)?;

    let Value::Object(host) = &left else {
        return Err(EvalError::new(
            token,
            format!(
                "left side of dot expression must be a struct, got {}",
                left.type_name()
            ),
        ));
    };

    host.get_field(field).ok_or_else(|| {
        EvalError::new(
            token,
            format!("field {field} does not exist in struct {object}"),
        )
    })
}

fn eval_include(
    token: &Token,
    file: &str,
    vars: Option<&Expr>,
    env: &mut Environment,
) -> Result<Value, EvalError> {
    // The sub-template sees exactly the provided bindings and nothing else.
    let child = Environment::new();

    if let Some(vars) = vars {
        let Expr::Map { pairs, .. } = vars else {
            return Err(EvalError::new(token, "vars in include must be a map"));
        };

        for (key_expr, value_expr) in pairs {
            let key = eval_expr(key_expr, env)?;
            let value = eval_expr(value_expr, env)?;
            child.set(key.to_string(), value);
        }
    }

    let rendered = loader::render_to_string(file, child)
        .map_err(|err| EvalError::new(token, err.to_string()))?;

    Ok(Value::Str(rendered))
}
