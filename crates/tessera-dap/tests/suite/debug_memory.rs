use serde_json::json;
use tessera_dap::{MemoryConfig, PagedMemoryBackend};
use tessera_vfs::{ByteRange, Error, File as _, FileChangeType, FileType, Uri, WatchOptions};

use crate::harness::{event, fixture, initialize, Events};

fn window(from: u64, to: u64) -> Uri {
    PagedMemoryBackend::make_uri("s1", "0x1000", Some(ByteRange::new(from, to).unwrap()), "buf")
}

#[test]
fn reads_and_writes_the_ranged_window() {
    let fx = fixture();
    fx.adapter.set_memory("0x1000", b"0123456789");

    assert_eq!(fx.registry.read_file(&window(2, 6)).unwrap(), b"2345");

    fx.registry.write_file(&window(4, 6), b"ab").unwrap();
    assert_eq!(fx.adapter.memory("0x1000"), b"0123ab6789");

    let requests = fx.adapter.requests();
    assert_eq!(
        requests[0],
        (
            "readMemory".to_string(),
            json!({ "memoryReference": "0x1000", "offset": 2, "count": 4 })
        )
    );
    assert_eq!(
        requests[1],
        (
            "writeMemory".to_string(),
            json!({ "memoryReference": "0x1000", "offset": 4, "data": "YWI=" })
        )
    );
}

#[test]
fn unreadable_memory_reads_as_empty() {
    let fx = fixture();
    fx.adapter.set_memory("0x1000", b"abc");
    assert!(fx.registry.read_file(&window(8, 16)).unwrap().is_empty());
}

#[test]
fn handles_address_memory_relative_to_the_reference() {
    let fx = fixture();
    fx.adapter.set_memory("0x1000", b"hello world");

    let uri = PagedMemoryBackend::make_uri("s1", "0x1000", None, "all");
    let mut file = fx.registry.open_file(&uri).unwrap();
    assert_eq!(file.read(6, 5).unwrap(), b"world");
    assert_eq!(file.write(0, b"HELLO").unwrap(), 5);
    assert_eq!(fx.adapter.memory("0x1000"), b"HELLO world");

    *fx.adapter.partial_writes.lock() = Some(2);
    assert_eq!(file.write(6, b"WORLD").unwrap(), 2);
    assert_eq!(fx.adapter.memory("0x1000"), b"HELLO WOrld");
}

#[test]
fn whole_file_access_requires_a_range() {
    let fx = fixture();
    let uri = PagedMemoryBackend::make_uri("s1", "0x1000", None, "all");

    let err = fx.registry.read_file(&uri).unwrap_err();
    assert!(matches!(err, Error::MissingRange(_)), "{err:?}");
    let err = fx.registry.write_file(&uri, b"x").unwrap_err();
    assert!(matches!(err, Error::MissingRange(_)), "{err:?}");
    assert!(fx.adapter.requests().is_empty());
}

#[test]
fn unknown_sessions_are_not_found() {
    let fx = fixture();
    let uri = PagedMemoryBackend::make_uri("gone", "0x1000", None, "all");
    let err = fx.registry.stat(&uri).unwrap_err();
    assert!(err.is_not_found(), "{err:?}");

    fx.sessions.remove("s1");
    let err = fx.registry.read_file(&window(0, 4)).unwrap_err();
    assert!(matches!(err, Error::NotFound { what: "debug session", .. }), "{err:?}");
}

#[test]
fn stat_reports_window_size_and_write_support() {
    let fx = fixture();
    let stat = fx.registry.stat(&window(16, 48)).unwrap();
    assert_eq!(stat.file_type, FileType::File);
    assert_eq!(stat.size, 32);
    assert!(stat.readonly, "no capabilities seen yet");

    initialize(&fx.session, true);
    assert!(!fx.registry.stat(&window(16, 48)).unwrap().readonly);

    let unranged = PagedMemoryBackend::make_uri("s1", "0x1000", None, "all");
    assert_eq!(
        fx.registry.stat(&unranged).unwrap().size,
        MemoryConfig::default().default_size
    );
}

#[test]
fn configured_default_size_applies_to_unranged_uris() {
    let fx = fixture();
    fx.registry.register(
        PagedMemoryBackend::SCHEME,
        std::sync::Arc::new(PagedMemoryBackend::with_config(
            fx.sessions.clone(),
            MemoryConfig { default_size: 256 },
        )),
    );
    let unranged = PagedMemoryBackend::make_uri("s1", "0x1000", None, "all");
    assert_eq!(fx.registry.stat(&unranged).unwrap().size, 256);
}

#[test]
fn watch_reports_intersecting_invalidations() {
    let fx = fixture();
    let events = Events::default();
    let uri = window(16, 32);
    let _watch = fx
        .registry
        .watch(&uri, &WatchOptions::default(), events.sink())
        .unwrap();

    event(&fx.session, "memory", json!({ "memoryReference": "0x1000", "offset": 0, "count": 16 }));
    event(&fx.session, "memory", json!({ "memoryReference": "0x2000", "offset": 16, "count": 4 }));
    assert!(events.take().is_empty());

    event(&fx.session, "memory", json!({ "memoryReference": "0x1000", "offset": 30, "count": 8 }));
    assert_eq!(events.take(), vec![(FileChangeType::Changed, uri)]);
}

#[test]
fn unranged_watch_reports_every_invalidation_of_its_reference() {
    let fx = fixture();
    let events = Events::default();
    let uri = PagedMemoryBackend::make_uri("s1", "0x1000", None, "all");
    let _watch = fx
        .registry
        .watch(&uri, &WatchOptions::default(), events.sink())
        .unwrap();

    event(&fx.session, "memory", json!({ "memoryReference": "0x1000", "offset": 4096, "count": 1 }));
    assert_eq!(events.take(), vec![(FileChangeType::Changed, uri)]);
}

#[test]
fn resuming_or_ending_the_session_deletes_the_view() {
    let fx = fixture();
    let events = Events::default();
    let uri = window(0, 8);
    let watch = fx
        .registry
        .watch(&uri, &WatchOptions::default(), events.sink())
        .unwrap();

    event(&fx.session, "stopped", json!({ "reason": "step", "threadId": 1 }));
    assert!(events.take().is_empty());

    event(&fx.session, "continued", json!({ "threadId": 1 }));
    fx.session.will_stop();
    assert_eq!(
        events.take(),
        vec![
            (FileChangeType::Deleted, uri.clone()),
            (FileChangeType::Deleted, uri)
        ]
    );

    drop(watch);
    event(&fx.session, "continued", json!({ "threadId": 1 }));
    event(&fx.session, "memory", json!({ "memoryReference": "0x1000", "offset": 0, "count": 8 }));
    assert!(events.take().is_empty());
}

#[test]
fn recursive_watches_are_inert() {
    let fx = fixture();
    let events = Events::default();
    let _watch = fx
        .registry
        .watch(&window(0, 8), &WatchOptions::recursive(), events.sink())
        .unwrap();

    event(&fx.session, "memory", json!({ "memoryReference": "0x1000", "offset": 0, "count": 8 }));
    fx.session.will_stop();
    assert!(events.take().is_empty());
}
