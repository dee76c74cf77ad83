//! Errors surfaced by shell commands.

use dbgp_core::DbgpError;
use thiserror::Error;

use crate::tokenize::TokenizeError;

#[derive(Debug, Error)]
pub enum ShellError {
    /// The line did not parse as a command of the active scope.
    #[error("{0}")]
    Usage(String),
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    /// A control-plane operation failed.
    #[error(transparent)]
    Dbgp(#[from] DbgpError),
    /// No application is attached.
    #[error("no application attached")]
    NoApplication,
    /// Log filter could not be changed.
    #[error("log level: {0}")]
    Log(String),
    /// Writing to the operator failed; ends the shell.
    #[error("output failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type ShellResult<T> = Result<T, ShellError>;
