#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_vfs::{split_glob_base, Glob};

mod utils;

fuzz_target!(|data: &[u8]| {
    let Some(text) = utils::truncate_utf8(data) else {
        return;
    };
    // First line is the pattern, the rest are candidates.
    let mut lines = text.split('\n');
    let pattern = lines.next().unwrap_or_default();

    if let Some((base, rest)) = split_glob_base(pattern) {
        assert!(pattern.len() >= base.len() + rest.len());
    }

    let Ok(glob) = Glob::new(pattern) else {
        return;
    };
    for candidate in lines {
        let _ = glob.is_match(candidate);
    }
});
