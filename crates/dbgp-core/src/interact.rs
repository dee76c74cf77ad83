//! Interactive evaluation dialogue with a paused debuggee.

use std::collections::VecDeque;

use crate::error::DbgpResult;
use crate::session::Session;

/// Where dialogue lines come from.
pub trait LineSource {
    /// Show `prompt` and read one line. `None` means end of input.
    fn next_line(&mut self, prompt: &str) -> Option<String>;
}

/// Fixed list of lines, recording every prompt it was shown.
#[derive(Debug, Clone, Default)]
pub struct ScriptedLines {
    lines: VecDeque<String>,
    prompts: Vec<String>,
}

impl ScriptedLines {
    #[must_use]
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
        }
    }

    #[must_use]
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl LineSource for ScriptedLines {
    fn next_line(&mut self, prompt: &str) -> Option<String> {
        self.prompts.push(prompt.to_string());
        self.lines.pop_front()
    }
}

/// Run an interactive dialogue until `input` is exhausted.
///
/// Opens with an empty line, then alternates between reading a line and
/// waiting for the reply that carries the next prompt. At end of input the
/// stop signal is sent and not waited for. Returns the number of lines sent.
pub fn run_dialogue(session: &mut Session, input: &mut dyn LineSource) -> DbgpResult<usize> {
    let timeout = session.response_timeout();
    let opening = session.interact(Some(""))?;
    let mut prompt = session.wait_response(opening, timeout)?;
    let mut sent = 0;
    while let Some(line) = input.next_line(&prompt.prompt) {
        let id = session.interact(Some(&line))?;
        sent += 1;
        prompt = session.wait_response(id, timeout)?;
    }
    session.interact(None)?;
    Ok(sent)
}
