//! Front-end errors.

use std::fmt;

use smol_str::SmolStr;
use thiserror::Error;

use crate::protocol::{SessionStatus, TransactionId};

/// Kind of entity a lookup failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Breakpoint,
    Spawnpoint,
    Session,
    Application,
    Transaction,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Breakpoint => "breakpoint",
            Self::Spawnpoint => "spawnpoint",
            Self::Session => "session",
            Self::Application => "application",
            Self::Transaction => "transaction",
        };
        f.write_str(name)
    }
}

/// Errors raised by store, session and application operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbgpError {
    /// Malformed or incomplete input (missing required field, bad value).
    #[error("invalid argument: {0}")]
    Validation(SmolStr),

    /// Lookup by id found nothing.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: SmolStr },

    /// Operation not permitted in the session's current execution state.
    #[error("cannot {operation} while session is {status}")]
    InvalidState {
        operation: &'static str,
        status: SessionStatus,
    },

    /// The transport failed to deliver a request or was closed.
    #[error("transport error: {0}")]
    Transport(SmolStr),

    /// No reply arrived for a transaction within the response timeout.
    #[error("timed out waiting for reply to transaction {0}")]
    Timeout(TransactionId),

    /// The debuggee sent something that does not fit the conversation.
    #[error("protocol error: {0}")]
    Protocol(SmolStr),

    /// The debuggee answered with an error reply.
    #[error("debugger engine error {code}: {message}")]
    Engine { code: u32, message: SmolStr },
}

impl DbgpError {
    #[must_use]
    pub fn validation(message: impl Into<SmolStr>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn not_found(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: SmolStr::new(id.to_string()),
        }
    }

    #[must_use]
    pub fn transport(message: impl Into<SmolStr>) -> Self {
        Self::Transport(message.into())
    }

    /// Errors after which the session can no longer be trusted and is forced
    /// to `Stopped`.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::Protocol(_)
        )
    }
}

pub type DbgpResult<T> = Result<T, DbgpError>;
