#![no_main]

use libfuzzer_sys::fuzz_target;
use tessera_dap::{DebugSourceBackend, PagedMemoryBackend};
use tessera_vfs::{ReadOnlyBackend, SubfileBackend, Uri};

mod utils;

fuzz_target!(|data: &[u8]| {
    let Some(text) = utils::truncate_utf8(data) else {
        return;
    };
    let Ok(uri) = Uri::parse(text) else {
        return;
    };
    let _ = uri.to_string();
    let _ = uri.to_file_path();

    if let Ok((_, range)) = SubfileBackend::parse_uri(&uri) {
        assert!(range.from_offset() <= range.to_offset());
    }
    let _ = ReadOnlyBackend::parse_uri(&uri);
    let _ = DebugSourceBackend::parse_uri(&uri);

    if let Ok(location) = PagedMemoryBackend::parse_uri(&uri) {
        let rebuilt = PagedMemoryBackend::make_uri(
            &location.session_id,
            &location.memory_reference,
            location.range,
            "view",
        );
        let reparsed = PagedMemoryBackend::parse_uri(&rebuilt).expect("rebuilt uri parses");
        assert_eq!(reparsed.memory_reference, location.memory_reference);
        assert_eq!(reparsed.range, location.range);
    }
});
