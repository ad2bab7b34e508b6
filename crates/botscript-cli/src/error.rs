use std::fmt;

use botscript_core::{ErrorDetail, ParseError};

#[derive(Debug)]
pub enum CliError {
    Parse(ParseError),
    Execution(ErrorDetail),
    Config(String),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Parse(_) => 2,
            CliError::Execution(_) => 3,
            CliError::Io(_) => 4,
            CliError::Config(_) | CliError::Json(_) => 5,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Parse(e) => write!(f, "{}\n  {} | {}", e, e.line, e.source_line),
            CliError::Execution(detail) => write!(f, "Execution failed: {}", detail.message),
            CliError::Config(message) => write!(f, "Config error: {}", message),
            CliError::Io(e) => write!(f, "IO error: {}", e),
            CliError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<ParseError> for CliError {
    fn from(e: ParseError) -> Self {
        CliError::Parse(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Json(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let parse = CliError::Parse(ParseError::at("send", 1, "'send' is missing a value"));
        assert_eq!(parse.exit_code(), 2);
        let exec = CliError::Execution(ErrorDetail {
            line: Some(4),
            variable_name: None,
            message: "boom".to_string(),
        });
        assert_eq!(exec.exit_code(), 3);
        assert_eq!(CliError::Config("bad".to_string()).exit_code(), 5);
    }

    #[test]
    fn test_parse_error_display_shows_source() {
        let err = CliError::Parse(ParseError::at(
            "send 1\nwhen 1 then",
            2,
            "'when' has no matching 'end'",
        ));
        assert_eq!(
            err.to_string(),
            "Parse error at line 2: 'when' has no matching 'end'\n  2 | when 1 then"
        );
    }

    #[test]
    fn test_execution_display_uses_detail_message() {
        let err = CliError::Execution(ErrorDetail {
            line: Some(3),
            variable_name: Some("nope".to_string()),
            message: "Undefined reference 'nope' at line 3".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Execution failed: Undefined reference 'nope' at line 3"
        );
    }
}
