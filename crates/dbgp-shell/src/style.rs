//! Shared styling helpers for shell output.

use std::io::IsTerminal;

use owo_colors::OwoColorize;

#[must_use]
pub fn should_color() -> bool {
    std::io::stdout().is_terminal()
}

/// Colouring switch carried by the shell, so output written to buffers in
/// tests stays plain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Style {
    color: bool,
}

impl Style {
    /// Colour when stdout is a terminal.
    #[must_use]
    pub fn detect() -> Self {
        Self {
            color: should_color(),
        }
    }

    #[must_use]
    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn success(self, text: impl AsRef<str>) -> String {
        let text = text.as_ref();
        if self.color {
            format!("{}", text.green())
        } else {
            text.to_string()
        }
    }

    pub fn warning(self, text: impl AsRef<str>) -> String {
        let text = text.as_ref();
        if self.color {
            format!("{}", text.yellow())
        } else {
            text.to_string()
        }
    }

    pub fn error(self, text: impl AsRef<str>) -> String {
        let text = text.as_ref();
        if self.color {
            format!("{}", text.red())
        } else {
            text.to_string()
        }
    }

    pub fn accent(self, text: impl AsRef<str>) -> String {
        let text = text.as_ref();
        if self.color {
            format!("{}", text.cyan())
        } else {
            text.to_string()
        }
    }
}

pub fn error(text: impl AsRef<str>) -> String {
    Style::detect().error(text)
}

pub fn accent(text: impl AsRef<str>) -> String {
    Style::detect().accent(text)
}
