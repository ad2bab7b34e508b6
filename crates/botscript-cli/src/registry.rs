//! Named chat commands, compiled once and shared by every invocation.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use botscript_core::{compile_template, ParseError, Parser, Program};

use crate::error::CliError;

/// How a command body was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Script,
    Template,
}

/// Decides whether a command body is script source or a plain template.
///
/// A body counts as a script when any line, ignoring indentation, starts
/// with a statement keyword or is a lone `end`. Templates that happen to
/// start a line with "send " are misclassified; authors can reword them.
pub fn looks_like_script(body: &str) -> bool {
    body.lines().map(str::trim).any(|line| {
        line == "end"
            || ["set ", "send ", "when "]
                .iter()
                .any(|keyword| line.starts_with(keyword))
    })
}

#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub kind: CommandKind,
    pub program: Arc<Program>,
}

#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Command>,
}

/// Lowercases a command name and drops a leading prefix character.
fn normalize(name: &str, prefix: &str) -> String {
    let name = name.trim();
    name.strip_prefix(prefix).unwrap_or(name).to_lowercase()
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON object mapping command names to bodies.
    ///
    /// Scripts that fail to parse are left out and returned alongside the
    /// registry so the caller can report them.
    pub fn load(
        path: &Path,
        prefix: &str,
        max_depth: usize,
    ) -> Result<(Self, Vec<(String, ParseError)>), CliError> {
        let contents = std::fs::read_to_string(path)?;
        let bodies: BTreeMap<String, String> = serde_json::from_str(&contents)?;

        let mut registry = Self::new();
        let mut rejected = Vec::new();
        for (name, body) in bodies {
            if let Err(e) = registry.insert(&name, &body, prefix, max_depth) {
                warn!(command = %name, error = %e, "rejecting command");
                rejected.push((name, e));
            }
        }
        Ok((registry, rejected))
    }

    /// Compiles `body` and registers it under `name`, replacing any
    /// previous definition.
    pub fn insert(
        &mut self,
        name: &str,
        body: &str,
        prefix: &str,
        max_depth: usize,
    ) -> Result<CommandKind, ParseError> {
        let name = normalize(name, prefix);
        let (kind, program) = if looks_like_script(body) {
            let program = Parser::new(body).with_max_depth(max_depth).parse()?;
            (CommandKind::Script, program)
        } else {
            (CommandKind::Template, compile_template(body))
        };
        debug!(command = %name, ?kind, "registered command");
        self.commands.insert(
            name.clone(),
            Command {
                name,
                kind,
                program: Arc::new(program),
            },
        );
        Ok(kind)
    }

    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.get(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Registered names in alphabetical order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
