//! Per-invocation state handed to the executor.
//!
//! An [`ExecutionContext`] is built fresh by the caller for every command
//! invocation: who ran the command, where, with which arguments, and which
//! builtin values are available. The executor consumes it, so nothing leaks
//! from one invocation into the next. The only shared state is the
//! [`CounterProvider`] behind `count()`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::value::Value;

/// Builtin names that scripts can never `set`, whether or not the caller
/// supplied a value for them.
pub const STANDARD_BUILTINS: [&str; 8] = [
    "user", "channel", "command", "args", "game", "uptime", "ruser", "touser",
];

/// Lazily evaluated builtin value.
pub type BuiltinFn = Arc<dyn Fn() -> String + Send + Sync>;

/// Backing store for `count()`.
///
/// Implementations must make the increment-and-read atomic: the same
/// command can run in many invocations at once.
pub trait CounterProvider: Send + Sync {
    /// Increments the counter for `command` in `channel` and returns the new
    /// value.
    fn increment(&self, channel: &str, command: &str) -> i64;
}

/// In-process counter store keyed by channel and command.
#[derive(Debug, Default)]
pub struct MemoryCounter {
    counts: Mutex<HashMap<(String, String), i64>>,
}

impl MemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value without incrementing; 0 if never counted.
    pub fn get(&self, channel: &str, command: &str) -> i64 {
        let counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        counts
            .get(&(channel.to_string(), command.to_string()))
            .copied()
            .unwrap_or(0)
    }
}

impl CounterProvider for MemoryCounter {
    fn increment(&self, channel: &str, command: &str) -> i64 {
        let mut counts = self.counts.lock().unwrap_or_else(|e| e.into_inner());
        let count = counts
            .entry((channel.to_string(), command.to_string()))
            .or_insert(0);
        *count += 1;
        *count
    }
}

pub struct ExecutionContext {
    user: String,
    channel: String,
    command: String,
    args: Vec<String>,
    builtins: HashMap<String, BuiltinFn>,
    variables: HashMap<String, Value>,
    counter: Option<Arc<dyn CounterProvider>>,
    rng: StdRng,
}

impl ExecutionContext {
    /// Creates a context with the `user`, `channel`, `command` and `args`
    /// builtins registered.
    pub fn new(
        user: impl Into<String>,
        channel: impl Into<String>,
        command: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        let (user, channel, command): (String, String, String) =
            (user.into(), channel.into(), command.into());
        let joined = args.join(" ");
        Self {
            user: user.clone(),
            channel: channel.clone(),
            command: command.clone(),
            args,
            builtins: HashMap::new(),
            variables: HashMap::new(),
            counter: None,
            rng: StdRng::from_entropy(),
        }
        .with_builtin_value("user", user)
        .with_builtin_value("channel", channel)
        .with_builtin_value("command", command)
        .with_builtin_value("args", joined)
    }

    /// Registers a builtin computed each time a script references it.
    pub fn with_builtin<F>(mut self, name: impl Into<String>, supplier: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.builtins.insert(name.into(), Arc::new(supplier));
        self
    }

    /// Registers a builtin with a fixed value.
    pub fn with_builtin_value(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let value = value.into();
        self.with_builtin(name, move || value.clone())
    }

    pub fn with_counter(mut self, counter: Arc<dyn CounterProvider>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Replaces the random source used by `roll()` and `pick()`.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// True if `set` may not bind `name`.
    pub fn is_reserved(&self, name: &str) -> bool {
        STANDARD_BUILTINS.contains(&name) || self.builtins.contains_key(name)
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub(crate) fn bind(&mut self, name: String, value: Value) {
        self.variables.insert(name, value);
    }

    /// Evaluates the builtin called `name`, if registered.
    pub fn builtin(&self, name: &str) -> Option<String> {
        self.builtins.get(name).map(|supplier| supplier())
    }

    /// 1-based positional argument.
    pub fn argument(&self, position: usize) -> Option<&str> {
        position
            .checked_sub(1)
            .and_then(|i| self.args.get(i))
            .map(String::as_str)
    }

    pub(crate) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Bumps this command's counter; `None` when no provider is injected.
    pub(crate) fn increment_counter(&self) -> Option<i64> {
        self.counter
            .as_ref()
            .map(|counter| counter.increment(&self.channel, &self.command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context() -> ExecutionContext {
        ExecutionContext::new("alice", "#chan", "greet", vec!["@bob".to_string(), "42".to_string()])
    }

    #[test]
    fn test_standard_builtins_registered() {
        let ctx = context();
        assert_eq!(ctx.builtin("user").as_deref(), Some("alice"));
        assert_eq!(ctx.builtin("channel").as_deref(), Some("#chan"));
        assert_eq!(ctx.builtin("command").as_deref(), Some("greet"));
        assert_eq!(ctx.builtin("args").as_deref(), Some("@bob 42"));
        assert_eq!(ctx.builtin("game"), None);
    }

    #[test]
    fn test_builtin_supplier_called_per_lookup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let ctx = context().with_builtin("uptime", move || {
            seen.fetch_add(1, Ordering::SeqCst);
            "3h".to_string()
        });
        assert_eq!(ctx.builtin("uptime").as_deref(), Some("3h"));
        assert_eq!(ctx.builtin("uptime").as_deref(), Some("3h"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reserved_names() {
        let ctx = context().with_builtin_value("emote", "Kappa");
        assert!(ctx.is_reserved("user"));
        assert!(ctx.is_reserved("game"));
        assert!(ctx.is_reserved("emote"));
        assert!(!ctx.is_reserved("score"));
    }

    #[test]
    fn test_positional_arguments() {
        let ctx = context();
        assert_eq!(ctx.argument(1), Some("@bob"));
        assert_eq!(ctx.argument(2), Some("42"));
        assert_eq!(ctx.argument(3), None);
        assert_eq!(ctx.argument(0), None);
    }

    #[test]
    fn test_memory_counter_per_key() {
        let counter = MemoryCounter::new();
        assert_eq!(counter.increment("#a", "hug"), 1);
        assert_eq!(counter.increment("#a", "hug"), 2);
        assert_eq!(counter.increment("#b", "hug"), 1);
        assert_eq!(counter.get("#a", "hug"), 2);
        assert_eq!(counter.get("#a", "other"), 0);
    }

    #[test]
    fn test_counter_injection() {
        let counter = Arc::new(MemoryCounter::new());
        let ctx = context().with_counter(counter.clone());
        assert_eq!(ctx.increment_counter(), Some(1));
        assert_eq!(counter.get("#chan", "greet"), 1);
        assert_eq!(context().increment_counter(), None);
    }
}
