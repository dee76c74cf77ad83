//! Text rendering of control-plane data for the operator.

use std::io::{self, Write};

use dbgp_core::protocol::{ContextName, Feature, Property, StackFrame, TypeMapEntry};
use dbgp_core::{Application, Session, SessionStatus, StatusReason, StreamKind, StreamOutput};

use crate::style::Style;

/// Line-oriented writer applying the shell's style.
pub struct Printer<'a> {
    out: &'a mut dyn Write,
    style: Style,
}

impl<'a> Printer<'a> {
    pub fn new(out: &'a mut dyn Write, style: Style) -> Self {
        Self { out, style }
    }

    #[must_use]
    pub fn style(&self) -> Style {
        self.style
    }

    pub fn line(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        writeln!(self.out, "{}", text.as_ref())
    }

    pub fn lines<I, S>(&mut self, lines: I) -> io::Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.line(line)?;
        }
        Ok(())
    }

    pub fn success(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        let text = self.style.success(text);
        self.line(text)
    }

    pub fn warning(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        let text = self.style.warning(text);
        self.line(text)
    }

    pub fn error(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        let text = self.style.error(text);
        self.line(text)
    }

    pub fn accent(&mut self, text: impl AsRef<str>) -> io::Result<()> {
        let text = self.style.accent(text);
        self.line(text)
    }

    /// Debuggee output, passed through as received. Stderr is highlighted.
    pub fn stream(&mut self, chunk: &StreamOutput) -> io::Result<()> {
        let text = match chunk.kind {
            StreamKind::Stdout => chunk.data.clone(),
            StreamKind::Stderr => self.style.warning(&chunk.data),
        };
        write!(self.out, "{text}")?;
        if !chunk.data.ends_with('\n') {
            writeln!(self.out)?;
        }
        Ok(())
    }

    /// Prompt text without a newline.
    pub fn prompt(&mut self, text: &str) -> io::Result<()> {
        write!(self.out, "{text}")?;
        self.out.flush()
    }
}

fn marker(current: bool) -> char {
    if current {
        '*'
    } else {
        ' '
    }
}

#[must_use]
pub fn application_line(app: &Application, current: bool) -> String {
    let live = app.session_count();
    let noun = if live == 1 { "session" } else { "sessions" };
    format!(
        "{} {} [{}] {live} {noun}",
        marker(current),
        app.id(),
        app.language()
    )
}

#[must_use]
pub fn session_line(session: &Session, current: bool) -> String {
    format!(
        "{} {} {}",
        marker(current),
        session.thread_id(),
        status_text(session.status(), session.reason())
    )
}

#[must_use]
pub fn status_text(status: SessionStatus, reason: StatusReason) -> String {
    if reason == StatusReason::Ok {
        format!("[{status}]")
    } else {
        format!("[{status}: {reason}]")
    }
}

#[must_use]
pub fn frame(frame: &StackFrame) -> String {
    match &frame.location {
        Some(location) => format!(
            "#{} {location} at {}:{}",
            frame.level, frame.filename, frame.lineno
        ),
        None => format!("#{} {}:{}", frame.level, frame.filename, frame.lineno),
    }
}

#[must_use]
pub fn context_name(context: &ContextName) -> String {
    format!("{}: {}", context.id, context.name)
}

/// A property and its children, one line each, indented by depth.
#[must_use]
pub fn property(property: &Property) -> Vec<String> {
    let mut lines = Vec::new();
    push_property(&mut lines, property, 0);
    lines
}

fn push_property(lines: &mut Vec<String>, property: &Property, depth: usize) {
    let indent = "  ".repeat(depth);
    match &property.value {
        Some(value) => lines.push(format!(
            "{indent}{} ({}) = {value}",
            property.fullname, property.data_type
        )),
        None => lines.push(format!("{indent}{} ({})", property.fullname, property.data_type)),
    }
    for child in &property.children {
        push_property(lines, child, depth + 1);
    }
}

#[must_use]
pub fn feature(feature: &Feature) -> String {
    match (&feature.value, feature.supported) {
        (Some(value), true) => format!("{} = {value}", feature.name),
        (None, true) => format!("{}: supported", feature.name),
        (_, false) => format!("{}: not supported", feature.name),
    }
}

#[must_use]
pub fn type_map_entry(entry: &TypeMapEntry) -> String {
    format!("{} -> {}", entry.name, entry.data_type)
}

/// Source text with line numbers starting at `first`.
#[must_use]
pub fn source(text: &str, first: u32) -> Vec<String> {
    text.lines()
        .zip(first..)
        .map(|(line, number)| format!("{number:>4}  {line}"))
        .collect()
}
