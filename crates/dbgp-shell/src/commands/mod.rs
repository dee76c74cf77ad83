//! Operator commands, one closed enum per scope.
//!
//! Lines are tokenized and handed to clap in multicall mode, so the first
//! word picks the command and the rest are its flags.

pub mod server;
pub mod session;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use smol_str::SmolStr;

use crate::error::{ShellError, ShellResult};

/// What the command loop does after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// Enter the session scope of an application.
    Enter(SmolStr),
    /// Return to the top-level scope.
    Leave,
    Quit,
}

/// A parsed line: a command, or help text requested with `--help`.
#[derive(Debug)]
pub enum Parsed<P> {
    Command(P),
    Help(String),
}

pub fn parse<P: Parser>(words: &[String]) -> ShellResult<Parsed<P>> {
    match P::try_parse_from(words) {
        Ok(line) => Ok(Parsed::Command(line)),
        Err(err) if err.kind() == ErrorKind::DisplayHelp => {
            Ok(Parsed::Help(err.render().to_string().trim_end().to_string()))
        }
        Err(err) => Err(usage_error(&err, words)),
    }
}

fn usage_error(err: &clap::Error, words: &[String]) -> ShellError {
    let name = words.first().map_or("", String::as_str);
    let message = match err.kind() {
        ErrorKind::InvalidSubcommand => {
            format!("unknown command '{name}' (try `help`)")
        }
        _ => {
            let rendered = err.render().to_string();
            let first = rendered.lines().next().unwrap_or_default();
            let first = first.strip_prefix("error: ").unwrap_or(first);
            format!("{name}: {first}")
        }
    };
    ShellError::Usage(message)
}

/// Name and summary of every command of `P`, aliases included.
#[must_use]
pub fn help_table<P: Parser>() -> Vec<String> {
    let command = P::command();
    let entries: Vec<(String, String)> = command
        .get_subcommands()
        .map(|sub| {
            let mut name = sub.get_name().to_string();
            let aliases: Vec<_> = sub.get_visible_aliases().collect();
            if !aliases.is_empty() {
                name = format!("{name} ({})", aliases.join(", "));
            }
            let about = sub.get_about().map(ToString::to_string).unwrap_or_default();
            (name, about)
        })
        .collect();
    let width = entries.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    entries
        .into_iter()
        .map(|(name, about)| format!("  {name:<width$}  {about}").trim_end().to_string())
        .collect()
}
