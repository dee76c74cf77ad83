#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Duration;

use dbgp_core::harness::{DebuggeeHandle, DebuggeeScript, LoopbackManager};
use dbgp_core::{LineSource, Registry, SessionInfo, SessionSettings};
use dbgp_shell::style::Style;
use dbgp_shell::{LogControl, LogLevel, Shell, ShellConfig, ShellContext};

pub const WAIT: Duration = Duration::from_secs(2);

/// Typed input marker that reads as end of input once.
pub const EOF: &str = "^D";

/// Everything typed and printed, in order.
#[derive(Clone, Default)]
pub struct Transcript(Rc<RefCell<String>>);

impl Transcript {
    pub fn text(&self) -> String {
        self.0.borrow().clone()
    }
}

impl Write for Transcript {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .borrow_mut()
            .push_str(&String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Operator input that echoes each prompt and line into the transcript.
pub struct Typed {
    lines: VecDeque<String>,
    transcript: Transcript,
}

impl Typed {
    pub fn new(lines: &[&str], transcript: Transcript) -> Self {
        Self {
            lines: lines.iter().map(|line| (*line).to_string()).collect(),
            transcript,
        }
    }
}

impl LineSource for Typed {
    fn next_line(&mut self, prompt: &str) -> Option<String> {
        let line = self.lines.pop_front().filter(|line| line != EOF);
        let mut text = self.transcript.0.borrow_mut();
        text.push_str(prompt);
        text.push_str(line.as_deref().unwrap_or(EOF));
        text.push('\n');
        line
    }
}

/// A shell whose connection queue already holds one simulated thread per
/// script, named `t1`, `t2`, ... under `app`.
pub fn shell(app: &str, scripts: Vec<DebuggeeScript>) -> (Shell, Vec<DebuggeeHandle>) {
    let (mut manager, incoming) = LoopbackManager::simulated();
    let handles = scripts
        .into_iter()
        .enumerate()
        .map(|(index, script)| {
            let thread = format!("t{}", index + 1);
            manager
                .connect(SessionInfo::new(app, &thread, "python"), script)
                .unwrap()
        })
        .collect();
    let registry = Registry::new(
        incoming,
        SessionSettings {
            response_timeout: Some(WAIT),
        },
    );
    let ctx = ShellContext::new(
        registry,
        Box::new(manager),
        LogControl::detached(LogLevel::Info),
        ShellConfig::default(),
    );
    (Shell::new(ctx, Style::plain()), handles)
}

/// Feed `lines` to `shell` and return the transcript.
pub fn session(shell: &mut Shell, lines: &[&str]) -> String {
    let transcript = Transcript::default();
    let mut input = Typed::new(lines, transcript.clone());
    let mut out = transcript.clone();
    shell.run(&mut input, &mut out).unwrap();
    transcript.text()
}
