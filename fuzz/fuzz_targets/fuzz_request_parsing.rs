#![no_main]

use libfuzzer_sys::fuzz_target;

use gdrb::protocol::{parse_line, LineSplitter};

fuzz_target!(|data: &[u8]| {
    // The splitter and the parser face raw bytes from untrusted clients;
    // neither may panic, whatever arrives.
    let mut splitter = LineSplitter::new();
    if let Ok(lines) = splitter.push(data) {
        for line in lines {
            let _ = parse_line(&line);
        }
    }

    if let Ok(text) = std::str::from_utf8(data) {
        let _ = parse_line(text);
    }
});
