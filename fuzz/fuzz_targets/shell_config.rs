#![no_main]

use dbgp_shell::ShellConfig;
use libfuzzer_sys::fuzz_target;

const MAX_CONFIG_BYTES: usize = 4096;

fuzz_target!(|data: &[u8]| {
    let capped = &data[..data.len().min(MAX_CONFIG_BYTES)];
    if let Ok(text) = std::str::from_utf8(capped) {
        if let Ok(config) = ShellConfig::parse(text) {
            let _ = config.session_settings();
        }
    }
});
