//! Line-oriented chat simulation.
//!
//! Each input line is `user: message`. Messages starting with the command
//! prefix are looked up in the [`CommandRegistry`] and executed; replies are
//! written as `[channel] text`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use botscript_core::{execute, CounterProvider, ExecutionContext};

use crate::error::CliError;
use crate::registry::CommandRegistry;

/// How many distinct recent chatters `ruser` chooses from.
pub const MAX_SEEN_USERS: usize = 500;

/// Splits `user: message`. Lines without a user are ignored.
pub fn parse_line(line: &str) -> Option<(&str, &str)> {
    let (user, text) = line.split_once(':')?;
    let user = user.trim();
    if user.is_empty() || user.contains(char::is_whitespace) {
        return None;
    }
    Some((user, text.trim()))
}

/// Splits `!name arg1 arg2` into the command name and its arguments.
pub fn parse_invocation(text: &str, prefix: &str) -> Option<(String, Vec<String>)> {
    let rest = text.strip_prefix(prefix)?;
    let mut words = rest.split_whitespace();
    let name = words.next()?.to_lowercase();
    Some((name, words.map(str::to_string).collect()))
}

/// Renders elapsed seconds the way chat bots usually show uptime.
pub fn format_uptime(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (hours, minutes, secs) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

pub struct ChatSession {
    channel: String,
    prefix: String,
    registry: CommandRegistry,
    counter: Arc<dyn CounterProvider>,
    statics: BTreeMap<String, String>,
    started: DateTime<Utc>,
    /// Recent chatters, least recently active first.
    seen: Arc<Mutex<VecDeque<String>>>,
}

impl ChatSession {
    pub fn new(
        channel: impl Into<String>,
        prefix: impl Into<String>,
        registry: CommandRegistry,
        counter: Arc<dyn CounterProvider>,
    ) -> Self {
        Self {
            channel: channel.into(),
            prefix: prefix.into(),
            registry,
            counter,
            statics: BTreeMap::new(),
            started: Utc::now(),
            seen: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Fixed builtin values. These take precedence over the computed
    /// `uptime`, `ruser` and `touser` builtins.
    pub fn with_statics(mut self, statics: BTreeMap<String, String>) -> Self {
        self.statics = statics;
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    fn remember(&self, user: &str) {
        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(index) = seen.iter().position(|u| u == user) {
            seen.remove(index);
        } else if seen.len() == MAX_SEEN_USERS {
            seen.pop_front();
        }
        seen.push_back(user.to_string());
    }

    /// Users `ruser` can currently pick, least recently active first.
    #[cfg(test)]
    fn seen_users(&self) -> Vec<String> {
        let seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        seen.iter().cloned().collect()
    }

    fn context(&self, user: &str, command: &str, args: Vec<String>) -> ExecutionContext {
        let started = self.started;
        let seen = self.seen.clone();
        let target = args
            .first()
            .map(|a| a.trim_start_matches('@').to_string())
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| user.to_string());

        let mut context = ExecutionContext::new(user, self.channel.as_str(), command, args)
            .with_counter(self.counter.clone())
            .with_builtin("uptime", move || {
                format_uptime((Utc::now() - started).num_seconds())
            })
            .with_builtin("ruser", move || {
                let seen = seen.lock().unwrap_or_else(|e| e.into_inner());
                if seen.is_empty() {
                    return String::new();
                }
                seen[rand::thread_rng().gen_range(0..seen.len())].clone()
            })
            .with_builtin_value("touser", target);

        for (name, value) in &self.statics {
            context = context.with_builtin_value(name.as_str(), value.as_str());
        }
        context
    }

    /// Handles one chat line and returns the replies to post.
    pub fn handle(&self, line: &str) -> Vec<String> {
        let Some((user, text)) = parse_line(line) else {
            debug!(line, "skipping line without a user");
            return Vec::new();
        };
        self.remember(user);

        let Some((name, args)) = parse_invocation(text, &self.prefix) else {
            return Vec::new();
        };
        let Some(command) = self.registry.get(&name) else {
            debug!(command = %name, "unknown command");
            return Vec::new();
        };

        let context = self.context(user, &command.name, args);
        let result = execute(&command.program, context);
        let mut replies = result.output_lines;
        if let Some(error) = result.error {
            warn!(
                command = %name,
                user,
                line = ?error.line,
                error = %error.message,
                "command failed"
            );
            replies.push(format!("{}, that command failed: {}", user, error.message));
        }
        replies
    }
}

/// Feeds every line of `input` through `session`, writing replies to
/// `output`. Returns the number of replies written.
pub async fn run_chat<R, W>(
    session: &ChatSession,
    input: R,
    mut output: W,
) -> Result<usize, CliError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut replies = 0;
    while let Some(line) = lines.next_line().await? {
        for reply in session.handle(&line) {
            output
                .write_all(format!("[{}] {}\n", session.channel(), reply).as_bytes())
                .await?;
            replies += 1;
        }
    }
    output.flush().await?;
    info!(replies, "chat input finished");
    Ok(replies)
}
