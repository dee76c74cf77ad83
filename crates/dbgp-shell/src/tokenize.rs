//! Splitting operator lines into argument vectors.
//!
//! Words are separated by whitespace. Single quotes keep their content
//! verbatim, double quotes allow `\"` and `\\` escapes, and a backslash
//! outside quotes escapes the next character. A standalone unquoted `--`
//! ends option parsing: it is kept as a token and the rest of the line
//! after one separating space becomes a single verbatim argument, so code
//! passed to `interact` keeps its indentation and quoting.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenizeError {
    #[error("unterminated {0} quote")]
    UnterminatedQuote(char),
    #[error("trailing backslash")]
    TrailingBackslash,
}

pub fn tokenize(line: &str) -> Result<Vec<String>, TokenizeError> {
    let mut tokens = Vec::new();
    let mut chars = line.char_indices().peekable();
    loop {
        while chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
        let Some(&(start, _)) = chars.peek() else {
            break;
        };
        if is_data_marker(line, start) {
            tokens.push("--".to_string());
            let rest = &line[start + 2..];
            if !rest.is_empty() {
                let mut data = rest.chars();
                data.next();
                tokens.push(data.as_str().to_string());
            }
            break;
        }
        let mut word = String::new();
        while let Some(&(_, c)) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            chars.next();
            match c {
                '\'' => loop {
                    match chars.next() {
                        Some((_, '\'')) => break,
                        Some((_, inner)) => word.push(inner),
                        None => return Err(TokenizeError::UnterminatedQuote('\'')),
                    }
                },
                '"' => loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match chars.next_if(|(_, n)| matches!(n, '"' | '\\')) {
                            Some((_, escaped)) => word.push(escaped),
                            None => word.push('\\'),
                        },
                        Some((_, inner)) => word.push(inner),
                        None => return Err(TokenizeError::UnterminatedQuote('"')),
                    }
                },
                '\\' => match chars.next() {
                    Some((_, escaped)) => word.push(escaped),
                    None => return Err(TokenizeError::TrailingBackslash),
                },
                other => word.push(other),
            }
        }
        tokens.push(word);
    }
    Ok(tokens)
}

/// `--` at `start`, followed by whitespace or the end of the line.
fn is_data_marker(line: &str, start: usize) -> bool {
    let rest = &line[start..];
    rest.starts_with("--")
        && rest[2..]
            .chars()
            .next()
            .is_none_or(char::is_whitespace)
}
