use crate::value::Value;

/// A parsed script: its top-level statements in source order.
///
/// Programs are immutable once built and hold no runtime state, so one
/// parse can be shared (e.g. behind an `Arc`) by any number of concurrent
/// executions.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Set {
        variable: String,
        expr: Expression,
        line: usize,
    },
    Conditional {
        condition: Expression,
        then_branch: Vec<Statement>,
        else_branch: Option<Vec<Statement>>,
        line: usize,
    },
    Send {
        expr: Expression,
        line: usize,
    },
}

impl Statement {
    pub fn line(&self) -> usize {
        match self {
            Statement::Set { line, .. }
            | Statement::Conditional { line, .. }
            | Statement::Send { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Value),
    /// A bare identifier; resolves only against `set` variables.
    VariableRef(String),
    /// The `$(name)` form; resolves against variables, builtins, then
    /// positional arguments.
    BuiltinRef(String),
    FunctionCall {
        name: String,
        args: Vec<Expression>,
    },
    /// A string literal with embedded references, in fragment order.
    Interpolated(Vec<Expression>),
    Binary {
        op: BinOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::LtEq => "<=",
            BinOp::Gt => ">",
            BinOp::GtEq => ">=",
        }
    }

    pub fn is_comparison(&self) -> bool {
        !matches!(self, BinOp::Add | BinOp::Sub)
    }
}
