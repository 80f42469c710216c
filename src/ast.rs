use std::fmt;

use crate::lexer::Token;

/// An ordered sequence of top-level statements, one render's worth of
/// template. Its `Display` form is the pretty-printed source of every
/// statement concatenated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        Self { statements }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Var {
        token: Token,
        name: String,
        value: Expr,
    },
    Expr(Expr),
    Extends {
        token: Token,
        from: String,
    },
    Section {
        token: Token,
        name: String,
        block: BlockStatement,
    },
    Define {
        token: Token,
        name: String,
        body: BlockStatement,
    },
    Include {
        token: Token,
        file: String,
        vars: Option<Expr>,
    },
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Var { name, value, .. } => write!(f, "var {name} = {value}"),
            Stmt::Expr(expr) => write!(f, "{expr}"),
            Stmt::Extends { from, .. } => write!(f, "extends(\"{from}\")"),
            Stmt::Section { name, .. } => write!(f, "section(\"{name}\")"),
            Stmt::Define { name, .. } => write!(f, "define(\"{name}\")"),
            Stmt::Include { file, vars, .. } => {
                write!(f, "include(\"{file}\"")?;
                if let Some(vars) = vars {
                    write!(f, ", {vars}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockStatement {
    pub token: Token,
    pub statements: Vec<Stmt>,
}

impl fmt::Display for BlockStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident {
        token: Token,
        name: String,
    },
    Int {
        token: Token,
        value: i64,
    },
    /// String literal. `value` is the unquoted content; the token literal
    /// keeps the surrounding quotes. `closed` is false when the source ran
    /// out before the closing quote.
    Str {
        token: Token,
        value: String,
        closed: bool,
    },
    /// A single character of HTML passthrough.
    Html {
        token: Token,
        value: String,
    },
    Bool {
        token: Token,
        value: bool,
    },
    Prefix {
        token: Token,
        operator: PrefixOp,
        right: Box<Expr>,
    },
    Infix {
        token: Token,
        left: Box<Expr>,
        operator: InfixOp,
        right: Box<Expr>,
    },
    If {
        token: Token,
        condition: Box<Expr>,
        consequence: BlockStatement,
        alternative: Option<BlockStatement>,
    },
    For {
        token: Token,
        key: Option<String>,
        value: String,
        iterable: Box<Expr>,
        block: BlockStatement,
    },
    Array {
        token: Token,
        elements: Vec<Expr>,
    },
    Map {
        token: Token,
        pairs: Vec<(Expr, Expr)>,
    },
    Index {
        token: Token,
        left: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        token: Token,
        function: Box<Expr>,
        arguments: Vec<Expr>,
    },
    Dot {
        token: Token,
        object: Box<Expr>,
        field: String,
    },
}

impl Expr {
    /// Anchor token used for error attribution.
    pub fn token(&self) -> &Token {
        match self {
            Expr::Ident { token, .. }
            | Expr::Int { token, .. }
            | Expr::Str { token, .. }
            | Expr::Html { token, .. }
            | Expr::Bool { token, .. }
            | Expr::Prefix { token, .. }
            | Expr::Infix { token, .. }
            | Expr::If { token, .. }
            | Expr::For { token, .. }
            | Expr::Array { token, .. }
            | Expr::Map { token, .. }
            | Expr::Index { token, .. }
            | Expr::Call { token, .. }
            | Expr::Dot { token, .. } => token,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident { name, .. } => f.write_str(name),
            Expr::Int { token, .. } => f.write_str(&token.literal),
            Expr::Str { token, .. } => f.write_str(&token.literal),
            Expr::Html { value, .. } => f.write_str(value),
            Expr::Bool { token, .. } => f.write_str(&token.literal),
            Expr::Prefix {
                operator, right, ..
            } => write!(f, "({operator}{right})"),
            Expr::Infix {
                left,
                operator,
                right,
                ..
            } => write!(f, "({left} {operator} {right})"),
            Expr::If {
                condition,
                alternative,
                ..
            } => {
                write!(f, "if({condition}) ")?;
                if let Some(alternative) = alternative {
                    write!(f, "else {alternative}")?;
                }
                Ok(())
            }
            Expr::For { iterable, .. } => write!(f, "for {iterable}"),
            Expr::Array { elements, .. } => {
                let rendered = elements
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{rendered}]")
            }
            Expr::Map { pairs, .. } => {
                let rendered = pairs
                    .iter()
                    .map(|(key, value)| format!("{key}:{value}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{rendered}}}")
            }
            Expr::Index { left, index, .. } => write!(f, "({left}[{index}])"),
            Expr::Call {
                function,
                arguments,
                ..
            } => {
                let args = arguments
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{function}({args})")
            }
            Expr::Dot { object, field, .. } => write!(f, "{object}.{field}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Bang,
    Minus,
}

impl fmt::Display for PrefixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefixOp::Bang => f.write_str("!"),
            PrefixOp::Minus => f.write_str("-"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    Plus,
    Minus,
    Asterisk,
    Slash,
    Lt,
    Gt,
    Eq,
    NotEq,
    And,
}

impl fmt::Display for InfixOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            InfixOp::Plus => "+",
            InfixOp::Minus => "-",
            InfixOp::Asterisk => "*",
            InfixOp::Slash => "/",
            InfixOp::Lt => "<",
            InfixOp::Gt => ">",
            InfixOp::Eq => "==",
            InfixOp::NotEq => "!=",
            InfixOp::And => "and",
        };
        f.write_str(op)
    }
}
