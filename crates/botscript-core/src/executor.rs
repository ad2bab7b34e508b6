//! Script execution.
//!
//! [`execute`] walks a [`Program`] once, top to bottom, against the
//! [`ExecutionContext`] it is given. Every `send` appends one chat line to the
//! output. The first failing statement stops the run; lines sent before the
//! failure stay in the result.
//!
//! # Example
//!
//! ```
//! use botscript_core::{execute, parse, ExecutionContext};
//!
//! let program = parse("when $(1) == \"hi\" then\n  send \"Hello $(user)!\"\nend").unwrap();
//! let context = ExecutionContext::new("alice", "#lobby", "greet", vec!["hi".to_string()]);
//!
//! let result = execute(&program, context);
//! assert!(result.success);
//! assert_eq!(result.output_lines, vec!["Hello alice!"]);
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, trace};

use crate::ast::*;
use crate::context::ExecutionContext;
use crate::error::{ErrorDetail, ExecError};
use crate::value::Value;

/// Outcome of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether every statement ran without error.
    pub success: bool,
    /// Chat lines produced by `send`, in execution order.
    pub output_lines: Vec<String>,
    /// Why execution stopped, when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl ExecutionResult {
    /// Creates a successful result.
    pub fn completed(output_lines: Vec<String>) -> Self {
        Self {
            success: true,
            output_lines,
            error: None,
        }
    }

    /// Creates a failed result keeping the lines sent before the failure.
    pub fn failed(output_lines: Vec<String>, error: &ExecError) -> Self {
        Self {
            success: false,
            output_lines,
            error: Some(ErrorDetail::from(error)),
        }
    }
}

/// Runs `program` once against `context`.
pub fn execute(program: &Program, context: ExecutionContext) -> ExecutionResult {
    let span = debug_span!(
        "execute",
        command = %context.command(),
        channel = %context.channel(),
        user = %context.user(),
    );
    let _enter = span.enter();

    let mut executor = Executor {
        context,
        output: Vec::new(),
    };
    match executor.run_block(&program.statements) {
        Ok(()) => {
            debug!(lines = executor.output.len(), "script completed");
            ExecutionResult::completed(executor.output)
        }
        Err(e) => {
            debug!(error = %e, lines = executor.output.len(), "script failed");
            ExecutionResult::failed(executor.output, &e)
        }
    }
}

struct Executor {
    context: ExecutionContext,
    output: Vec<String>,
}

impl Executor {
    fn run_block(&mut self, statements: &[Statement]) -> Result<(), ExecError> {
        for stmt in statements {
            self.run_statement(stmt)?;
        }
        Ok(())
    }

    fn run_statement(&mut self, stmt: &Statement) -> Result<(), ExecError> {
        match stmt {
            Statement::Set { variable, expr, line } => {
                if self.context.is_reserved(variable) {
                    return Err(ExecError::NamingConflict {
                        name: variable.clone(),
                        line: *line,
                    });
                }
                let value = self.eval(expr, *line)?;
                trace!(line, variable = %variable, value = %value, "set");
                self.context.bind(variable.clone(), value);
                Ok(())
            }
            Statement::Conditional { condition, then_branch, else_branch, line } => {
                let taken = self.eval(condition, *line)?.is_truthy();
                trace!(line, taken, "when");
                if taken {
                    self.run_block(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.run_block(else_branch)
                } else {
                    Ok(())
                }
            }
            Statement::Send { expr, line } => {
                let text = self.eval(expr, *line)?.as_string();
                trace!(line, text = %text, "send");
                self.output.push(text);
                Ok(())
            }
        }
    }

    fn eval(&mut self, expr: &Expression, line: usize) -> Result<Value, ExecError> {
        match expr {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::VariableRef(name) => {
                self.context.variable(name).cloned().ok_or_else(|| ExecError::UndefinedVariable {
                    name: name.clone(),
                    line,
                })
            }
            Expression::BuiltinRef(name) => self.resolve_reference(name, line),
            Expression::FunctionCall { name, args } => self.call_function(name, args, line),
            Expression::Interpolated(parts) => {
                let mut text = String::new();
                for part in parts {
                    text.push_str(&self.eval(part, line)?.as_string());
                }
                Ok(Value::String(text))
            }
            Expression::Binary { op, left, right } => {
                let lhs = self.eval(left, line)?;
                let rhs = self.eval(right, line)?;
                binary(*op, lhs, rhs, line)
            }
        }
    }

    /// Resolves `$(name)`: a `set` variable, then a builtin, then a
    /// positional argument.
    fn resolve_reference(&self, name: &str, line: usize) -> Result<Value, ExecError> {
        if let Some(value) = self.context.variable(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.context.builtin(name) {
            return Ok(Value::String(value));
        }
        name.parse::<usize>()
            .ok()
            .and_then(|position| self.context.argument(position))
            .map(|arg| Value::String(arg.to_string()))
            .ok_or_else(|| ExecError::UndefinedReference {
                name: name.to_string(),
                line,
            })
    }

    fn call_function(
        &mut self,
        name: &str,
        args: &[Expression],
        line: usize,
    ) -> Result<Value, ExecError> {
        if !matches!(name, "roll" | "pick" | "count") {
            return Err(ExecError::UndefinedReference {
                name: name.to_string(),
                line,
            });
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, line)?);
        }

        match name {
            "roll" => {
                if values.len() != 2 {
                    let message = format!("expects 2 arguments, got {}", values.len());
                    return Err(arity(name, message, line));
                }
                let low = numeric_arg(name, &values[0], line)?;
                let high = numeric_arg(name, &values[1], line)?;
                if low > high {
                    return Err(ExecError::Type {
                        message: format!(
                            "roll() lower bound {} is greater than upper bound {}",
                            low, high
                        ),
                        line,
                    });
                }
                Ok(Value::Number(self.context.rng().gen_range(low..=high)))
            }
            "pick" => {
                if values.is_empty() {
                    return Err(arity(name, "expects at least 1 argument".to_string(), line));
                }
                let index = self.context.rng().gen_range(0..values.len());
                Ok(values.swap_remove(index))
            }
            _ => {
                if !values.is_empty() {
                    let message = format!("expects no arguments, got {}", values.len());
                    return Err(arity(name, message, line));
                }
                self.context
                    .increment_counter()
                    .map(Value::Number)
                    .ok_or_else(|| ExecError::UndefinedReference {
                        name: name.to_string(),
                        line,
                    })
            }
        }
    }
}

fn arity(function: &str, message: String, line: usize) -> ExecError {
    ExecError::Arity {
        function: function.to_string(),
        message,
        line,
    }
}

fn numeric_arg(function: &str, value: &Value, line: usize) -> Result<i64, ExecError> {
    value.as_number().ok_or_else(|| ExecError::Type {
        message: format!("{}() expects numbers, got {} '{}'", function, value.type_name(), value),
        line,
    })
}

fn numeric_operand(op: BinOp, value: &Value, line: usize) -> Result<i64, ExecError> {
    value.as_number().ok_or_else(|| ExecError::Type {
        message: format!(
            "'{}' needs numbers, got {} '{}'",
            op.symbol(),
            value.type_name(),
            value
        ),
        line,
    })
}

fn binary(op: BinOp, lhs: Value, rhs: Value, line: usize) -> Result<Value, ExecError> {
    let overflow = || ExecError::Type {
        message: format!("'{}' overflowed", op.symbol()),
        line,
    };
    match op {
        BinOp::Add => match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => a.checked_add(b).map(Value::Number).ok_or_else(overflow),
            _ => Ok(Value::String(format!("{}{}", lhs.as_string(), rhs.as_string()))),
        },
        BinOp::Sub => {
            let a = numeric_operand(op, &lhs, line)?;
            let b = numeric_operand(op, &rhs, line)?;
            a.checked_sub(b).map(Value::Number).ok_or_else(overflow)
        }
        BinOp::Eq => Ok(Value::Boolean(lhs == rhs)),
        BinOp::NotEq => Ok(Value::Boolean(lhs != rhs)),
        BinOp::Lt | BinOp::LtEq | BinOp::Gt | BinOp::GtEq => {
            let a = numeric_operand(op, &lhs, line)?;
            let b = numeric_operand(op, &rhs, line)?;
            Ok(Value::Boolean(match op {
                BinOp::Lt => a < b,
                BinOp::LtEq => a <= b,
                BinOp::Gt => a > b,
                _ => a >= b,
            }))
        }
    }
}
