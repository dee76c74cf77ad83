#![no_main]

use dbgp_shell::commands::server::ServerLine;
use dbgp_shell::commands::session::SessionLine;
use dbgp_shell::commands::{help_table, parse};
use dbgp_shell::tokenize;
use libfuzzer_sys::fuzz_target;

const MAX_LINE_BYTES: usize = 1024;

fuzz_target!(|data: &[u8]| {
    let capped = &data[..data.len().min(MAX_LINE_BYTES)];
    let line = String::from_utf8_lossy(capped);
    let Ok(words) = tokenize(&line) else {
        return;
    };
    if words.is_empty() {
        return;
    }
    let _ = parse::<ServerLine>(&words);
    let _ = parse::<SessionLine>(&words);
    if words[0] == "help" {
        let _ = help_table::<SessionLine>();
    }
});
