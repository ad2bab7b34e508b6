//! End-to-end properties of parse + execute.
//!
//! These tests drive the public API only: source text in, `ExecutionResult`
//! out, with contexts built the way a chat bot would build them.

use std::collections::HashSet;
use std::sync::Arc;

use botscript_core::{
    compile_template, execute, format_program, parse, ExecutionContext, MemoryCounter, Program,
    Statement, MAX_EXPRESSION_SIZE,
};

fn context(args: &[&str]) -> ExecutionContext {
    ExecutionContext::new(
        "viewer42",
        "#speedruns",
        "cmd",
        args.iter().map(|a| a.to_string()).collect(),
    )
    .with_builtin_value("game", "Celeste")
    .with_builtin_value("uptime", "2h 14m")
}

fn run(source: &str) -> botscript_core::ExecutionResult {
    execute(&parse(source).unwrap(), context(&[]))
}

// ---------------------------------------------------------------------------
// Determinism
// ---------------------------------------------------------------------------

#[test]
fn test_execution_is_deterministic_without_random_functions() {
    let source = r#"
set greeting "Welcome"
when $(1) == "vip" then
    send "$(greeting), VIP $(user)!"
else
    send "$(greeting), $(user). Now playing $(game) for $(uptime)."
end
"#;
    let program = parse(source).unwrap();
    let first = execute(&program, context(&["vip"]));
    for _ in 0..20 {
        assert_eq!(execute(&program, context(&["vip"])), first);
    }
    assert_eq!(first.output_lines, vec!["Welcome, VIP viewer42!"]);

    let other = execute(&program, context(&[]));
    assert!(!other.success, "$(1) is undefined without arguments");
}

// ---------------------------------------------------------------------------
// Balanced blocks
// ---------------------------------------------------------------------------

fn assert_balanced(statements: &[Statement]) {
    for stmt in statements {
        if let Statement::Conditional { then_branch, else_branch, .. } = stmt {
            assert_balanced(then_branch);
            if let Some(else_branch) = else_branch {
                assert_balanced(else_branch);
            }
        }
    }
}

#[test]
fn test_unbalanced_sources_never_parse() {
    let unbalanced = [
        "when 1 then",
        "when 1 then send 1",
        "end",
        "send 1\nend",
        "when 1 then\nwhen 2 then\nend",
        "when 1 then\nend\nend",
        "else\nsend 1",
        "when 1 then else else end",
    ];
    for source in unbalanced {
        assert!(parse(source).is_err(), "should not parse: {:?}", source);
    }

    let balanced = [
        "when 1 then end",
        "when 1 then\nwhen 2 then\nend\nelse\nend",
        "when 1 then send 1 else when 2 then send 2 end end",
    ];
    for source in balanced {
        let program = parse(source).unwrap();
        assert_balanced(&program.statements);
    }
}

// ---------------------------------------------------------------------------
// Fail-fast
// ---------------------------------------------------------------------------

#[test]
fn test_failure_preserves_reached_output_only() {
    let source = r#"
send "one"
when 0 then
    send "skipped"
end
send "two"
send roll(5, 1)
send "never"
"#;
    let result = run(source);
    assert!(!result.success);
    assert_eq!(result.output_lines, vec!["one", "two"]);
    assert_eq!(result.error.unwrap().line, Some(7));
}

// ---------------------------------------------------------------------------
// Truthiness
// ---------------------------------------------------------------------------

#[test]
fn test_truthiness_boundary() {
    assert_eq!(run(r#"when 0 then send "a" else send "b" end"#).output_lines, vec!["b"]);
    assert_eq!(run(r#"when "" then send "a" else send "b" end"#).output_lines, vec!["b"]);
    assert_eq!(run(r#"when 1 then send "a" end"#).output_lines, vec!["a"]);
}

// ---------------------------------------------------------------------------
// Undefined variable
// ---------------------------------------------------------------------------

#[test]
fn test_undefined_variable_reports_name_and_line() {
    let result = run("send $(nope)");
    assert!(!result.success);
    assert!(result.output_lines.is_empty());
    let error = result.error.unwrap();
    assert_eq!(error.variable_name.as_deref(), Some("nope"));
    assert_eq!(error.line, Some(1));
}

// ---------------------------------------------------------------------------
// roll() bounds
// ---------------------------------------------------------------------------

#[test]
fn test_roll_stays_in_bounds_and_covers_range() {
    let program = parse("set n roll(1, 6)\nsend $(n)").unwrap();
    let mut seen = HashSet::new();
    for _ in 0..10_000 {
        let result = execute(&program, context(&[]));
        assert!(result.success);
        assert_eq!(result.output_lines.len(), 1);
        let n: i64 = result.output_lines[0].parse().unwrap();
        assert!((1..=6).contains(&n), "rolled {}", n);
        seen.insert(n);
    }
    assert_eq!(seen.len(), 6);
}

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

#[test]
fn test_missing_end_reports_when_line() {
    let err = parse("when 1 then send \"x\"").unwrap_err();
    assert_eq!(err.line, 1);
    assert_eq!(err.source_line, "when 1 then send \"x\"");

    let err = parse("send \"a\"\n\n  when 1 then\n    send \"x\"").unwrap_err();
    assert_eq!(err.line, 3);
    assert_eq!(err.source_line, "  when 1 then");
}

#[test]
fn test_empty_script_is_an_error() {
    for source in ["", " ", "\n\n", "\t \n  "] {
        assert!(parse(source).is_err(), "{:?} should not parse", source);
    }
}

// ---------------------------------------------------------------------------
// Expression size
// ---------------------------------------------------------------------------

#[test]
fn test_largest_accepted_expression_evaluates() {
    let chain = format!("send 1{}", " + 1".repeat(MAX_EXPRESSION_SIZE));
    assert_eq!(run(&chain).output_lines, vec![(MAX_EXPRESSION_SIZE + 1).to_string()]);

    let nested = format!(
        "send {}1{}",
        "(".repeat(MAX_EXPRESSION_SIZE),
        ")".repeat(MAX_EXPRESSION_SIZE)
    );
    assert_eq!(run(&nested).output_lines, vec!["1"]);
}

#[test]
fn test_oversized_expressions_are_parse_errors() {
    let chain = format!("send 1{}", " + 1".repeat(200_000));
    let nested = format!("send {}1{}", "(".repeat(20_000), ")".repeat(20_000));
    let calls = format!("send {}\"x\"{}", "pick(".repeat(20_000), ")".repeat(20_000));
    for source in [chain, nested, calls] {
        let err = parse(&source).unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("too large"), "{}", err.message);
    }
}

// ---------------------------------------------------------------------------
// Shared programs
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_program_shared_across_concurrent_invocations() {
    let program: Arc<Program> = Arc::new(
        parse("send \"$(user) is visitor #$(count())\"").unwrap(),
    );
    let counter = Arc::new(MemoryCounter::new());

    let mut handles = Vec::new();
    for i in 0..64 {
        let program = program.clone();
        let counter = counter.clone();
        handles.push(tokio::spawn(async move {
            let context = ExecutionContext::new(format!("user{}", i), "#speedruns", "visit", vec![])
                .with_counter(counter);
            execute(&program, context)
        }));
    }

    let mut numbers = Vec::new();
    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.await.unwrap();
        assert!(result.success);
        let line = &result.output_lines[0];
        assert!(line.starts_with(&format!("user{} is visitor #", i)));
        numbers.push(line.rsplit('#').next().unwrap().parse::<i64>().unwrap());
    }

    numbers.sort_unstable();
    assert_eq!(numbers, (1..=64).collect::<Vec<_>>());
    assert_eq!(counter.get("#speedruns", "visit"), 64);
}

// ---------------------------------------------------------------------------
// Templates and formatting
// ---------------------------------------------------------------------------

#[test]
fn test_template_and_script_resolve_references_alike() {
    let template = compile_template("$(user) is watching $(game)");
    let script = parse("send \"$(user) is watching $(game)\"").unwrap();
    assert_eq!(
        execute(&template, context(&[])).output_lines,
        execute(&script, context(&[])).output_lines
    );
}

#[test]
fn test_formatted_script_behaves_identically() {
    let source = "set n 4\nwhen n > 3 then send \"big $(n)\" else send \"small\" end\nsend n + 1";
    let formatted = format_program(&parse(source).unwrap());
    assert_eq!(run(source), run(&formatted));
    assert_eq!(run(&formatted).output_lines, vec!["big 4", "5"]);
}
