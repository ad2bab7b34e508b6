//! Canonical script formatting.
//!
//! [`format_program`] prints a [`Program`] back as source: one statement per
//! line, two spaces of indentation per open `when`, and `then`/`else`/`end`
//! placed structurally. Parsing the output yields the same program. String
//! contents are escaped, never inspected for keywords.

use std::fmt::{self, Write};

use crate::ast::*;
use crate::value::Value;

const INDENT: &str = "  ";

pub fn format_program(program: &Program) -> String {
    let mut out = String::new();
    write_block(&mut out, &program.statements, 0);
    out
}

fn write_block(out: &mut String, statements: &[Statement], depth: usize) {
    for stmt in statements {
        write_statement(out, stmt, depth);
    }
}

fn write_statement(out: &mut String, stmt: &Statement, depth: usize) {
    let pad = INDENT.repeat(depth);
    match stmt {
        Statement::Set { variable, expr, .. } => {
            let _ = writeln!(out, "{}set {} {}", pad, variable, expr);
        }
        Statement::Send { expr, .. } => {
            let _ = writeln!(out, "{}send {}", pad, expr);
        }
        Statement::Conditional { condition, then_branch, else_branch, .. } => {
            let _ = writeln!(out, "{}when {} then", pad, condition);
            write_block(out, then_branch, depth + 1);
            if let Some(else_branch) = else_branch {
                let _ = writeln!(out, "{}else", pad);
                write_block(out, else_branch, depth + 1);
            }
            let _ = writeln!(out, "{}end", pad);
        }
    }
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '$' => escaped.push_str("\\$"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Precedence level of a binary operator; higher binds tighter.
fn precedence(op: BinOp) -> u8 {
    if op.is_comparison() {
        1
    } else {
        2
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, expr: &Expression, parenthesize: bool) -> fmt::Result {
    if parenthesize {
        write!(f, "({})", expr)
    } else {
        write!(f, "{}", expr)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(Value::String(s)) => write!(f, "\"{}\"", escape(s)),
            Expression::Literal(value) => write!(f, "{}", value),
            Expression::VariableRef(name) => f.write_str(name),
            Expression::BuiltinRef(name) => write!(f, "$({})", name),
            Expression::FunctionCall { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expression::Interpolated(parts) => {
                f.write_str("\"")?;
                for part in parts {
                    match part {
                        Expression::Literal(value) => f.write_str(&escape(&value.as_string()))?,
                        Expression::BuiltinRef(_) => write!(f, "{}", part)?,
                        other => write!(f, "$({})", other)?,
                    }
                }
                f.write_str("\"")
            }
            Expression::Binary { op, left, right } => {
                let level = precedence(*op);
                let left_parens = match **left {
                    Expression::Binary { op: l, .. } => {
                        precedence(l) < level || (op.is_comparison() && precedence(l) == level)
                    }
                    _ => false,
                };
                let right_parens = matches!(
                    **right,
                    Expression::Binary { op: r, .. } if precedence(r) <= level
                );
                write_operand(f, left, left_parens)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, right, right_parens)
            }
        }
    }
}
