#![no_main]

use libfuzzer_sys::fuzz_target;
use tuflow_syntax::{parse, Command};

const MAX_SOURCE_BYTES: usize = 4096;

fuzz_target!(|data: &[u8]| {
    let capped = &data[..data.len().min(MAX_SOURCE_BYTES)];
    let source = String::from_utf8_lossy(capped);
    let parsed = parse(&source);
    for (line, raw) in parsed.lines.iter().zip(source.lines()) {
        assert_eq!(line.command.raw(), raw);
        let _ = line.command.rhs_parts();
        let _ = line.scope.to_string();
        if line.command.is_setting() {
            let mut edited: Command = line.command.clone();
            edited.set_comment(Some("fuzz"));
            let _ = edited.uncommented();
        }
    }
});
