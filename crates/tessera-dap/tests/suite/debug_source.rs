use tessera_dap::DebugSourceBackend;
use tessera_vfs::Error;

use crate::harness::fixture;

#[test]
fn reads_adapter_provided_sources() {
    let fx = fixture();
    fx.adapter.set_source(7, "class Main {}\n");

    let uri = DebugSourceBackend::make_uri("s1", 7, "Main.java");
    assert_eq!(fx.registry.read_file(&uri).unwrap(), b"class Main {}\n");

    let stat = fx.registry.stat(&uri).unwrap();
    assert_eq!(stat.size, 14);
    assert!(stat.readonly);

    let (command, arguments) = fx.adapter.requests().remove(0);
    assert_eq!(command, "source");
    assert_eq!(arguments, serde_json::json!({ "sourceReference": 7 }));
}

#[test]
fn adapter_failures_and_unknown_sessions_surface() {
    let fx = fixture();
    let err = fx
        .registry
        .read_file(&DebugSourceBackend::make_uri("s1", 99, "Gone.java"))
        .unwrap_err();
    assert!(matches!(err, Error::Backend(_)), "{err:?}");
    assert!(err.to_string().contains("unknown source reference 99"), "{err}");

    let err = fx
        .registry
        .read_file(&DebugSourceBackend::make_uri("other", 7, "Main.java"))
        .unwrap_err();
    assert!(err.is_not_found(), "{err:?}");
}

#[test]
fn sources_are_not_writable() {
    let fx = fixture();
    let err = fx
        .registry
        .write_file(&DebugSourceBackend::make_uri("s1", 7, "Main.java"), b"x")
        .unwrap_err();
    assert!(err.is_unsupported(), "{err:?}");
}
