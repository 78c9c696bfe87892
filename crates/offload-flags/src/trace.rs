//! Parsing the driver's trace output.
//!
//! Asking the driver to print its plan instead of running it yields a
//! header of informational lines followed by one indented line per
//! sub-command, each a sequence of double-quoted tokens:
//!
//! ```text
//! clang version 3.4 (...) (...)
//! Target: x86_64-unknown-linux-gnu
//! Thread model: posix
//!  "/usr/bin/clang" "-cc1" ... "/tmp/test.cc"
//! ```
//!
//! The first non-quoted line is the driver's version string.

use thiserror::Error;

/// The driver's expansion of one user invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverTrace {
    /// The driver's identifying string.
    pub version: String,
    /// One tokenised argv per sub-command, in execution order. Token 0 of
    /// each argv is an empty reserved slot; the program path follows it.
    pub commands: Vec<Vec<String>>,
}

/// Reasons a trace cannot be parsed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TraceError {
    /// No informational header line preceded the commands.
    #[error("driver trace names no version line")]
    NoVersion,
    /// The trace contains no command lines at all.
    #[error("driver trace contains no command lines")]
    NoCommands,
    /// A command line ended inside a quoted token.
    #[error("unterminated quote in driver trace line '{0}'")]
    UnterminatedQuote(String),
    /// A command line carried text outside any quoted token.
    #[error("unexpected text outside quotes in driver trace line '{0}'")]
    StrayText(String),
}

/// Parses a complete driver trace.
pub fn parse_trace(output: &str) -> Result<DriverTrace, TraceError> {
    let mut version: Option<String> = None;
    let mut commands = Vec::new();

    for line in output.lines() {
        if line.is_empty() {
            continue;
        }
        if line.starts_with(char::is_whitespace) && line.contains('"') {
            commands.push(parse_command_line(line)?);
        } else if version.is_none() {
            version = Some(line.to_owned());
        }
        // Later header lines (target, thread model) are informational only.
    }

    let version = version.ok_or(TraceError::NoVersion)?;
    if commands.is_empty() {
        return Err(TraceError::NoCommands);
    }
    Ok(DriverTrace { version, commands })
}

fn parse_command_line(line: &str) -> Result<Vec<String>, TraceError> {
    // The leading empty token mirrors the argv slot the caller's frame
    // reserves for the program name.
    let mut tokens = vec![String::new()];
    let mut chars = line.chars();

    loop {
        let mut opened = false;
        for ch in chars.by_ref() {
            if ch == '"' {
                opened = true;
                break;
            }
            if !ch.is_whitespace() {
                return Err(TraceError::StrayText(line.to_owned()));
            }
        }
        if !opened {
            break;
        }

        let mut token = String::new();
        let mut closed = false;
        while let Some(ch) = chars.next() {
            match ch {
                '"' => {
                    closed = true;
                    break;
                }
                '\\' => match chars.next() {
                    Some(escaped) => token.push(escaped),
                    None => break,
                },
                other => token.push(other),
            }
        }
        if !closed {
            return Err(TraceError::UnterminatedQuote(line.to_owned()));
        }
        tokens.push(token);
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_only_traces_are_rejected() {
        let trace = "clang version 3.4\nTarget: x86_64-unknown-linux-gnu\n";
        assert_eq!(parse_trace(trace), Err(TraceError::NoCommands));
    }

    #[test]
    fn command_only_traces_are_rejected() {
        let trace = " \"/usr/bin/clang\" \"-cc1\"\n";
        assert_eq!(parse_trace(trace), Err(TraceError::NoVersion));
    }

    #[test]
    fn unterminated_quotes_are_rejected() {
        let trace = "clang version 3.4\n \"/usr/bin/clang\" \"-cc1\n";
        assert!(matches!(
            parse_trace(trace),
            Err(TraceError::UnterminatedQuote(_))
        ));
    }

    #[test]
    fn text_between_tokens_is_rejected() {
        let trace = "clang version 3.4\n \"/usr/bin/clang\" oops \"-cc1\"\n";
        assert!(matches!(parse_trace(trace), Err(TraceError::StrayText(_))));
    }

    #[test]
    fn escaped_quotes_stay_inside_tokens() {
        let trace = "clang version 3.4\n \"/usr/bin/clang\" \"-DNAME=\\\"x\\\"\"\n";
        let parsed = parse_trace(trace).expect("parse trace");
        assert_eq!(parsed.commands[0][2], "-DNAME=\"x\"");
    }
}
