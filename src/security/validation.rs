//! Query validation for the configured security mode.
//!
//! The validator only accepts or rejects a statement. It never rewrites SQL.

use crate::error::ServerError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Query validation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Only a single read statement (SELECT or WITH ... SELECT) is allowed.
    #[default]
    ReadOnly,

    /// All statements are passed through to the server.
    /// Use only with a login whose permissions are already restricted.
    Unrestricted,
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "readonly" | "read_only" | "read-only" => Ok(ValidationMode::ReadOnly),
            "unrestricted" => Ok(ValidationMode::Unrestricted),
            other => Err(format!(
                "unknown validation mode '{}' (expected readonly or unrestricted)",
                other
            )),
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationMode::ReadOnly => write!(f, "readonly"),
            ValidationMode::Unrestricted => write!(f, "unrestricted"),
        }
    }
}

/// Keywords rejected anywhere in code position in read-only mode.
static FORBIDDEN_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "INSERT",
        "UPDATE",
        "DELETE",
        "DROP",
        "ALTER",
        "CREATE",
        "TRUNCATE",
        "MERGE",
        "EXEC",
        "EXECUTE",
        "GRANT",
        "REVOKE",
        "DENY",
        "INTO",
        "BULK",
        "OPENROWSET",
        "OPENDATASOURCE",
        "OPENQUERY",
        "BACKUP",
        "RESTORE",
        "SHUTDOWN",
        // Session state outlives the call on a reused connection.
        "SET",
        "USE",
        "BEGIN",
        "COMMIT",
        "ROLLBACK",
        "SAVE",
        "CURSOR",
    ]
    .into_iter()
    .collect()
});

/// Bare words of T-SQL code: keywords, identifiers, variables, numbers.
static WORD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9_@#$]+")
        .unwrap_or_else(|e| panic!("Internal error: invalid word pattern: {}", e))
});

/// Query validator.
#[derive(Debug, Clone)]
pub struct QueryValidator {
    mode: ValidationMode,
}

impl QueryValidator {
    /// Create a new query validator.
    pub fn new(mode: ValidationMode) -> Self {
        Self { mode }
    }

    /// Get the current validation mode.
    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Validate a statement against the current mode.
    pub fn validate(&self, query: &str) -> Result<(), ServerError> {
        match self.mode {
            ValidationMode::Unrestricted => Ok(()),
            ValidationMode::ReadOnly => validate_read_only(query),
        }
    }
}

fn validate_read_only(query: &str) -> Result<(), ServerError> {
    let code = mask_non_code(query);
    let mut words = WORD_PATTERN.find_iter(&code).map(|m| m.as_str());

    match words.next().map(str::to_uppercase).as_deref() {
        Some("SELECT") | Some("WITH") => {}
        Some(first) => {
            return Err(ServerError::validation(format!(
                "Only SELECT statements are allowed in read-only mode (found {})",
                first
            )))
        }
        None => return Err(ServerError::validation("Query contains no statement")),
    }

    for word in words {
        let upper = word.to_uppercase();
        if FORBIDDEN_KEYWORDS.contains(upper.as_str()) {
            return Err(ServerError::validation(format!(
                "Keyword '{}' is not allowed in read-only mode",
                upper
            )));
        }
        if upper.starts_with("XP_") {
            return Err(ServerError::validation(format!(
                "Extended stored procedure '{}' is not allowed in read-only mode",
                word
            )));
        }
    }

    Ok(())
}

/// Blank out string literals, comments and delimited identifiers.
///
/// Masked regions become spaces so that neighbouring words stay separated.
fn mask_non_code(query: &str) -> String {
    #[derive(Clone, Copy, PartialEq)]
    enum State {
        Code,
        String,
        Bracket,
        Quoted,
        LineComment,
        BlockComment(u32),
    }

    let chars: Vec<char> = query.chars().collect();
    let mut out = String::with_capacity(query.len());
    let mut state = State::Code;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match state {
            State::Code => match (c, next) {
                ('\'', _) => {
                    state = State::String;
                    out.push(' ');
                }
                ('[', _) => {
                    state = State::Bracket;
                    out.push(' ');
                }
                ('"', _) => {
                    state = State::Quoted;
                    out.push(' ');
                }
                ('-', Some('-')) => {
                    state = State::LineComment;
                    out.push_str("  ");
                    i += 1;
                }
                ('/', Some('*')) => {
                    state = State::BlockComment(1);
                    out.push_str("  ");
                    i += 1;
                }
                _ => out.push(c),
            },
            State::String | State::Bracket | State::Quoted => {
                let close = match state {
                    State::String => '\'',
                    State::Bracket => ']',
                    _ => '"',
                };
                if c == close {
                    if next == Some(close) {
                        // Doubled delimiter is an escape.
                        out.push_str("  ");
                        i += 1;
                    } else {
                        state = State::Code;
                        out.push(' ');
                    }
                } else {
                    out.push(if c == '\n' { '\n' } else { ' ' });
                }
            }
            State::LineComment => {
                if c == '\n' {
                    state = State::Code;
                    out.push('\n');
                } else {
                    out.push(' ');
                }
            }
            State::BlockComment(depth) => match (c, next) {
                ('*', Some('/')) => {
                    state = if depth == 1 {
                        State::Code
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    out.push_str("  ");
                    i += 1;
                }
                ('/', Some('*')) => {
                    state = State::BlockComment(depth + 1);
                    out.push_str("  ");
                    i += 1;
                }
                _ => out.push(' '),
            },
        }

        i += 1;
    }

    out
}
