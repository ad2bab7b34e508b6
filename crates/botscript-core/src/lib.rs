//! # botscript-core
//!
//! Parser and interpreter for custom chat-bot commands.
//!
//! Channel operators write commands either as plain templates
//! (`Now playing $(game)`) or as small scripts:
//!
//! ```text
//! set n roll(1, 6)
//! when n == 6 then
//!     send "$(user) rolled a six!"
//! else
//!     send "$(user) rolled $(n)"
//! end
//! ```
//!
//! Scripts are parsed once into an immutable [`Program`] and executed per
//! invocation against a fresh [`ExecutionContext`]. Execution never panics or
//! prints; it returns an [`ExecutionResult`] with the chat lines to send and,
//! on failure, where and why it stopped.
//!
//! ## Modules
//!
//! - [`lexer`] - Tokenizer; never fails, unknown input becomes `Unknown` tokens
//! - [`parser`] - Keyword-delimited grammar producing a [`Program`]
//! - [`executor`] - Single-pass interpreter
//! - [`context`] - Per-invocation bindings, builtins and the `count()` provider
//! - [`template`] - Plain-text templates compiled onto the same evaluator
//! - [`format`] - Canonical pretty-printer
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use botscript_core::{execute, parse, ExecutionContext, MemoryCounter};
//!
//! let program = parse("send \"$(user) has hugged $(count()) times\"").unwrap();
//! let counter = Arc::new(MemoryCounter::new());
//!
//! let context = ExecutionContext::new("alice", "#lobby", "hug", vec![])
//!     .with_counter(counter.clone());
//! let result = execute(&program, context);
//!
//! assert_eq!(result.output_lines, vec!["alice has hugged 1 times"]);
//! ```

pub mod ast;
pub mod context;
pub mod error;
pub mod executor;
pub mod format;
pub mod lexer;
pub mod parser;
pub mod template;
pub mod value;

pub use ast::{BinOp, Expression, Program, Statement};
pub use context::{BuiltinFn, CounterProvider, ExecutionContext, MemoryCounter, STANDARD_BUILTINS};
pub use error::{ErrorDetail, ExecError, ParseError};
pub use executor::{execute, ExecutionResult};
pub use format::format_program;
pub use parser::{parse, Parser, DEFAULT_MAX_DEPTH, MAX_EXPRESSION_SIZE};
pub use template::compile_template;
pub use value::Value;
