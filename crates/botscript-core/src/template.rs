//! Plain-text command templates.
//!
//! A template is chat text with `$(...)` references and no statements, such
//! as `Now playing $(game) for $(uptime)`. [`compile_template`] turns it into
//! a one-statement [`Program`] so templates and scripts share the same
//! evaluator and reference resolution.

use crate::ast::{Expression, Program, Statement};
use crate::lexer::{scan_template, Fragment};
use crate::parser::parse_reference;
use crate::value::Value;

/// Compiles template text into a program that sends it as one line.
///
/// Never fails: a `$(...)` run that is not a valid reference is kept as
/// literal text. Line breaks and surrounding whitespace of each line are
/// collapsed so the result is a single chat message.
pub fn compile_template(text: &str) -> Program {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let mut parts: Vec<Expression> = scan_template(&joined)
        .into_iter()
        .map(|fragment| match fragment {
            Fragment::Text(text) => Expression::Literal(Value::String(text)),
            Fragment::Reference(body) => parse_reference(&joined, &body, 1)
                .unwrap_or_else(|_| Expression::Literal(Value::String(format!("$({})", body)))),
        })
        .collect();

    let expr = match parts.len() {
        0 => Expression::Literal(Value::String(String::new())),
        1 => parts.remove(0),
        _ => Expression::Interpolated(parts),
    };
    Program {
        statements: vec![Statement::Send { expr, line: 1 }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::executor::execute;

    fn render(template: &str) -> Vec<String> {
        let context = ExecutionContext::new("alice", "#lobby", "so", vec!["@bob".to_string()])
            .with_builtin_value("game", "Celeste");
        execute(&compile_template(template), context).output_lines
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(render("Welcome to the stream!"), vec!["Welcome to the stream!"]);
    }

    #[test]
    fn test_builtin_substitution() {
        assert_eq!(
            render("$(user) says hi to $(1) while playing $(game)"),
            vec!["alice says hi to @bob while playing Celeste"]
        );
    }

    #[test]
    fn test_function_call_in_template() {
        assert_eq!(render("You rolled $(roll(3, 3))"), vec!["You rolled 3"]);
    }

    #[test]
    fn test_malformed_reference_kept_literal() {
        assert_eq!(render("costs $(1 + 2) or $(oops"), vec!["costs $(1 + 2) or $(oops"]);
    }

    #[test]
    fn test_keywords_are_plain_text() {
        assert_eq!(render("send help when ready"), vec!["send help when ready"]);
    }

    #[test]
    fn test_lines_joined() {
        assert_eq!(render("  first line \n\n second line  "), vec!["first line second line"]);
    }

    #[test]
    fn test_empty_template() {
        assert_eq!(render(""), vec![""]);
    }

    #[test]
    fn test_unknown_builtin_fails() {
        let context = ExecutionContext::new("alice", "#lobby", "so", vec![]);
        let result = execute(&compile_template("Playing $(game)"), context);
        assert!(!result.success);
        assert_eq!(result.error.unwrap().variable_name.as_deref(), Some("game"));
    }
}
