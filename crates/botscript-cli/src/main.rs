//! Command-line front end for botscript.
//!
//! # Usage
//!
//! ```bash
//! # Validate a script
//! botscript check greet.bs
//!
//! # Print the canonical formatting
//! botscript fmt messy.bs
//!
//! # Run once as a given user, with positional arguments
//! botscript run greet.bs --user alice --builtin game=Celeste -- vip
//!
//! # Render a plain template
//! echo 'Now playing $(game)' | botscript run --template --builtin game=Celeste
//!
//! # Simulate a channel: stdin lines look like `alice: !hug bob`
//! botscript chat --commands commands.json < chat.txt
//! ```

mod chat;
mod config;
mod counter;
mod error;
mod registry;

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use botscript_core::{
    compile_template, execute, format_program, CounterProvider, ExecutionContext, MemoryCounter,
    Parser as ScriptParser, Program,
};

use crate::chat::ChatSession;
use crate::config::BotConfig;
use crate::counter::FileCounter;
use crate::error::CliError;
use crate::registry::CommandRegistry;

#[derive(Parser)]
#[command(name = "botscript", about = "Run and check custom chat-bot command scripts")]
#[command(version)]
struct Cli {
    /// Config file to use instead of ~/.botscript/config.json
    #[arg(short, long, global = true, env = "BOTSCRIPT_CONFIG")]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a script and report the first error
    Check {
        /// Path to the script file (reads stdin if omitted)
        script: Option<PathBuf>,
    },
    /// Print a script in canonical form
    Fmt {
        /// Path to the script file (reads stdin if omitted)
        script: Option<PathBuf>,
    },
    /// Execute a script once
    Run {
        /// Path to the script file (reads stdin if omitted)
        script: Option<PathBuf>,
        /// Invoking user
        #[arg(short, long, default_value = "viewer")]
        user: String,
        /// Channel the command runs in
        #[arg(long, default_value = "#botscript")]
        channel: String,
        /// Command name, used as the `command` builtin and the counter key
        #[arg(long = "command", default_value = "run")]
        command_name: String,
        /// Extra builtin value (repeatable)
        #[arg(short, long = "builtin", value_name = "NAME=VALUE", value_parser = parse_key_val)]
        builtins: Vec<(String, String)>,
        /// Treat the input as a plain template
        #[arg(short, long)]
        template: bool,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
        /// Persist count() values in this JSON file
        #[arg(long, value_name = "PATH")]
        counters: Option<PathBuf>,
        /// Positional arguments, available as $(1), $(2), ...
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Simulate a chat channel over stdin
    Chat {
        /// JSON object mapping command names to bodies
        #[arg(long)]
        commands: PathBuf,
        /// Channel name used for replies and counters
        #[arg(long, default_value = "#botscript")]
        channel: String,
    },
    /// Show the effective configuration
    Config {
        /// Write the effective configuration to ~/.botscript/config.json
        #[arg(long)]
        init: bool,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", s))?;
    if key.is_empty() {
        return Err(format!("missing builtin name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.log_file.as_deref()) {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }

    let result = match load_config(cli.config.as_deref()) {
        Ok(config) => dispatch(cli.command, config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn init_logging(log_file: Option<&Path>) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    match log_file {
        Some(path) => {
            let file_name = path
                .file_name()
                .ok_or_else(|| CliError::Config(format!("invalid log file {}", path.display())))?;
            let dir = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir,
                _ => Path::new("."),
            };
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::never(dir, file_name);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file_appender)
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<BotConfig, CliError> {
    match path {
        Some(path) => BotConfig::load_from(path),
        None => Ok(BotConfig::load()),
    }
}

async fn dispatch(command: Command, config: BotConfig) -> Result<(), CliError> {
    match command {
        Command::Check { script } => check(script, &config),
        Command::Fmt { script } => fmt(script, &config),
        Command::Run {
            script,
            user,
            channel,
            command_name,
            builtins,
            template,
            json,
            counters,
            args,
        } => {
            let invocation = Invocation {
                user,
                channel,
                command_name,
                builtins,
                args,
            };
            run(script, invocation, template, json, counters, &config)
        }
        Command::Chat { commands, channel } => chat(&commands, channel, &config).await,
        Command::Config { init } => show_config(&config, init),
    }
}

fn read_source(path: Option<PathBuf>) -> Result<String, CliError> {
    match path {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => {
            let mut source = String::new();
            std::io::stdin().read_to_string(&mut source)?;
            Ok(source)
        }
    }
}

fn parse_script(source: &str, config: &BotConfig) -> Result<Program, CliError> {
    Ok(ScriptParser::new(source)
        .with_max_depth(config.max_depth())
        .parse()?)
}

fn check(path: Option<PathBuf>, config: &BotConfig) -> Result<(), CliError> {
    let source = read_source(path)?;
    let program = parse_script(&source, config)?;
    debug!(statements = program.statements.len(), "script parsed");
    println!("ok");
    Ok(())
}

fn fmt(path: Option<PathBuf>, config: &BotConfig) -> Result<(), CliError> {
    let source = read_source(path)?;
    let program = parse_script(&source, config)?;
    print!("{}", format_program(&program));
    Ok(())
}

struct Invocation {
    user: String,
    channel: String,
    command_name: String,
    builtins: Vec<(String, String)>,
    args: Vec<String>,
}

fn run(
    path: Option<PathBuf>,
    invocation: Invocation,
    template: bool,
    json: bool,
    counters: Option<PathBuf>,
    config: &BotConfig,
) -> Result<(), CliError> {
    let source = read_source(path)?;
    let program = if template {
        compile_template(&source)
    } else {
        parse_script(&source, config)?
    };

    let file_counter = counters.map(FileCounter::open).transpose()?.map(Arc::new);
    let counter: Arc<dyn CounterProvider> = match &file_counter {
        Some(counter) => {
            debug!(path = %counter.path().display(), "using counter file");
            counter.clone()
        }
        None => Arc::new(MemoryCounter::new()),
    };

    let mut context = ExecutionContext::new(
        invocation.user,
        invocation.channel,
        invocation.command_name,
        invocation.args,
    )
    .with_counter(counter);
    let overrides: BTreeMap<String, String> = invocation.builtins.into_iter().collect();
    for (name, value) in config.builtins.iter().chain(overrides.iter()) {
        context = context.with_builtin_value(name.as_str(), value.as_str());
    }

    let result = execute(&program, context);
    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for line in &result.output_lines {
            println!("{}", line);
        }
    }

    if let Some(counter) = &file_counter {
        if !counter.is_saved() {
            counter.flush()?;
        }
    }

    match result.error {
        Some(detail) => Err(CliError::Execution(detail)),
        None => Ok(()),
    }
}

async fn chat(commands: &Path, channel: String, config: &BotConfig) -> Result<(), CliError> {
    let (registry, rejected) =
        CommandRegistry::load(commands, &config.command_prefix, config.max_depth())?;
    for (name, e) in &rejected {
        eprintln!("Skipping command '{}': {}", name, e);
    }
    info!(commands = registry.len(), rejected = rejected.len(), "registry loaded");
    if registry.is_empty() {
        eprintln!("Warning: no usable commands in {}", commands.display());
    } else {
        debug!(names = ?registry.names(), "available commands");
    }

    let counter = Arc::new(FileCounter::open(config.counters_path())?);
    let prefix = config.command_prefix.as_str();
    let session = ChatSession::new(channel, prefix, registry, counter.clone())
        .with_statics(config.builtins.clone());

    chat::run_chat(
        &session,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;

    if !counter.is_saved() {
        counter.flush()?;
    }
    Ok(())
}

fn show_config(config: &BotConfig, init: bool) -> Result<(), CliError> {
    if init {
        config.save()?;
        eprintln!("Wrote {}", config::config_path().display());
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("game=Celeste"),
            Ok(("game".to_string(), "Celeste".to_string()))
        );
        assert_eq!(
            parse_key_val("title=a=b"),
            Ok(("title".to_string(), "a=b".to_string()))
        );
        assert_eq!(parse_key_val("empty="), Ok(("empty".to_string(), String::new())));
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
