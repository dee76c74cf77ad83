//! Operator input from the terminal.

use std::io::{self, BufRead, IsTerminal, Write};

use dbgp_core::LineSource;
use dialoguer::{theme::ColorfulTheme, Input};
use tracing::{debug, warn};

fn use_dialoguer() -> bool {
    io::stdin().is_terminal() && io::stdout().is_terminal()
}

/// Prompt text as dialoguer shows it; the theme draws its own marker.
fn prompt_label(prompt: &str) -> &str {
    prompt.trim_end().trim_end_matches('>').trim_end()
}

/// Reads operator lines: a themed line editor on a terminal, plain stdin
/// otherwise.
#[derive(Debug, Default)]
pub struct StdinLines;

impl StdinLines {
    fn edit(prompt: &str) -> Option<String> {
        let theme = ColorfulTheme::default();
        match Input::<String>::with_theme(&theme)
            .with_prompt(prompt_label(prompt))
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => Some(line),
            Err(err) => {
                debug!(%err, "terminal input closed");
                None
            }
        }
    }

    fn read(prompt: &str) -> Option<String> {
        let mut stdout = io::stdout();
        if write!(stdout, "{prompt}").and_then(|()| stdout.flush()).is_err() {
            return None;
        }
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => {
                let _ = writeln!(stdout);
                None
            }
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
            Err(err) => {
                warn!(%err, "failed to read input");
                None
            }
        }
    }
}

impl LineSource for StdinLines {
    fn next_line(&mut self, prompt: &str) -> Option<String> {
        if use_dialoguer() {
            Self::edit(prompt)
        } else {
            Self::read(prompt)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::prompt_label;

    #[test]
    fn prompt_markers_are_left_to_the_theme() {
        assert_eq!(prompt_label("dbg> "), "dbg");
        assert_eq!(prompt_label("[dbgp-sample:t1] "), "[dbgp-sample:t1]");
        assert_eq!(prompt_label(">>> "), "");
        assert_eq!(prompt_label("... "), "...");
    }
}
