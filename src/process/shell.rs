//! POSIX shell quoting and splitting

use crate::error::{PolytheneError, Result};

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c)
}

/// Quote a single token for `/bin/sh`.
///
/// Tokens made only of safe characters are returned untouched, everything
/// else is wrapped in single quotes.
pub fn quote(token: &str) -> String {
    if token.is_empty() {
        return "''".to_string();
    }
    if token.chars().all(is_safe) {
        return token.to_string();
    }
    format!("'{}'", token.replace('\'', "'\"'\"'"))
}

/// Join tokens into one shell command line.
pub fn join<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(|t| quote(t.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split a command line into tokens the way Python's `shlex.split` does.
///
/// Inside double quotes a backslash only escapes `"` and `\`; outside quotes
/// it escapes any character, newline included. Tokens are separated by ASCII
/// spaces, tabs and line breaks. Comments and expansions are not interpreted.
pub fn split(line: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => {
                            return Err(PolytheneError::MalformedCommand(
                                "unterminated single quote".to_string(),
                            ))
                        }
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch @ ('"' | '\\')) => current.push(ch),
                            Some(ch) => {
                                current.push('\\');
                                current.push(ch);
                            }
                            None => {
                                return Err(PolytheneError::MalformedCommand(
                                    "unterminated double quote".to_string(),
                                ))
                            }
                        },
                        Some(ch) => current.push(ch),
                        None => {
                            return Err(PolytheneError::MalformedCommand(
                                "unterminated double quote".to_string(),
                            ))
                        }
                    }
                }
            }
            '\\' => match chars.next() {
                Some(ch) => {
                    in_token = true;
                    current.push(ch);
                }
                None => {
                    return Err(PolytheneError::MalformedCommand(
                        "trailing backslash".to_string(),
                    ))
                }
            },
            ' ' | '\t' | '\r' | '\n' => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
