//! Interactive command shell for the DBGP control plane.
//!
//! Two command scopes share one loop: the top level manages connections and
//! picks an application, the session scope drives the threads of that
//! application. Commands are closed enums parsed by clap.

pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod input;
pub mod logging;
pub mod render;
pub mod shell;
pub mod style;
pub mod tokenize;

pub use cli::Cli;
pub use config::{Endpoint, Language, ShellConfig};
pub use context::ShellContext;
pub use error::{ShellError, ShellResult};
pub use logging::{LogControl, LogLevel};
pub use shell::Shell;
pub use tokenize::tokenize;
