use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use parking_lot::Mutex;
use tessera_vfs::{
    with_offset, Backend, ByteRange, ChangeSink, Error, FileChangeEvent, FileChangeType, FileStat,
    ReadOnlyBackend, Result, SchemeRegistry, SubfileBackend, Subscription, Uri, WatchOptions,
};

/// Whole-file store that cannot open handles, forcing composed backends onto their fallbacks.
#[derive(Default)]
struct BlobBackend {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    sinks: Mutex<Vec<ChangeSink>>,
}

impl BlobBackend {
    fn notify(&self, uri: &Uri) {
        let sinks: Vec<ChangeSink> = self.sinks.lock().clone();
        let event = FileChangeEvent {
            kind: FileChangeType::Changed,
            uri: uri.clone(),
        };
        for sink in sinks {
            sink(std::slice::from_ref(&event));
        }
    }
}

impl Backend for BlobBackend {
    fn read_file(&self, _registry: &SchemeRegistry, uri: &Uri) -> Result<Vec<u8>> {
        self.blobs
            .lock()
            .get(uri.path())
            .cloned()
            .ok_or_else(|| Error::NotFound {
                what: "blob",
                uri: uri.to_string(),
            })
    }

    fn write_file(&self, _registry: &SchemeRegistry, uri: &Uri, content: &[u8]) -> Result<()> {
        self.blobs
            .lock()
            .insert(uri.path().to_string(), content.to_vec());
        Ok(())
    }

    fn stat(&self, registry: &SchemeRegistry, uri: &Uri) -> Result<FileStat> {
        Ok(FileStat::file(self.read_file(registry, uri)?.len() as u64))
    }

    fn watch(
        &self,
        _registry: &SchemeRegistry,
        _uri: &Uri,
        _options: &WatchOptions,
        sink: ChangeSink,
    ) -> Result<Subscription> {
        self.sinks.lock().push(sink);
        Ok(Subscription::noop())
    }
}

fn registry_with_blobs() -> (SchemeRegistry, Arc<BlobBackend>) {
    let registry = SchemeRegistry::with_local();
    registry.register(SubfileBackend::SCHEME, Arc::new(SubfileBackend::new()));
    registry.register(ReadOnlyBackend::SCHEME, Arc::new(ReadOnlyBackend::new()));
    let blobs = Arc::new(BlobBackend::default());
    registry.register("blob", blobs.clone());
    (registry, blobs)
}

#[test]
fn subfile_io_matches_absolute_offsets_of_a_local_file() {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("data.bin");
    fs::write(&path, b"0123456789abcdef").unwrap();

    let (registry, _) = registry_with_blobs();
    let inner = Uri::file(&path);
    let window = with_offset(&inner, ByteRange::new(4, 8).unwrap());

    assert_eq!(registry.read_file(&window).unwrap(), b"4567");

    // Writes never cross the end of the window.
    registry.write_file(&window, b"WXYZ-overflow").unwrap();
    assert_eq!(fs::read(&path).unwrap(), b"0123WXYZ89abcdef");
    assert_eq!(registry.read_file(&window).unwrap(), b"WXYZ");

    let mut handle = registry.open_file(&window).unwrap();
    assert_eq!(handle.read(2, 10).unwrap(), b"YZ");
    assert_eq!(handle.write(3, b"!!").unwrap(), 1);
    drop(handle);
    assert_eq!(fs::read(&path).unwrap(), b"0123WXY!89abcdef");
}

#[test]
fn subfile_falls_back_to_whole_file_io() {
    let (registry, _) = registry_with_blobs();
    let inner = Uri::new("blob", "", "/b");
    registry.write_file(&inner, b"hello world").unwrap();

    let window = with_offset(&inner, ByteRange::new(6, 11).unwrap());
    assert_eq!(registry.read_file(&window).unwrap(), b"world");
    assert_eq!(registry.stat(&window).unwrap().size, 5);

    registry.write_file(&window, b"there").unwrap();
    assert_eq!(registry.read_file(&inner).unwrap(), b"hello there");

    let past_end = with_offset(&inner, ByteRange::new(20, 30).unwrap());
    assert!(registry.read_file(&past_end).unwrap().is_empty());
}

#[test]
fn composed_watches_report_the_outer_uri() {
    let (registry, blobs) = registry_with_blobs();
    let inner = Uri::new("blob", "", "/b");
    registry.write_file(&inner, b"xyz").unwrap();

    let seen: Arc<Mutex<Vec<FileChangeEvent>>> = Arc::default();
    let sink: ChangeSink = {
        let seen = Arc::clone(&seen);
        Arc::new(move |events: &[FileChangeEvent]| seen.lock().extend_from_slice(events))
    };

    let window = with_offset(&inner, ByteRange::new(0, 1).unwrap());
    let overlay = ReadOnlyBackend::make_uri(&inner);
    let _window_watch = registry
        .watch(&window, &WatchOptions::default(), sink.clone())
        .unwrap();
    let _overlay_watch = registry
        .watch(&overlay, &WatchOptions::default(), sink)
        .unwrap();

    blobs.notify(&inner);
    let uris: Vec<Uri> = seen.lock().iter().map(|event| event.uri.clone()).collect();
    assert_eq!(uris, vec![window, overlay]);
}

#[test]
fn readonly_overlay_blocks_writes_but_tracks_the_inner_file() {
    let (registry, _) = registry_with_blobs();
    let inner = Uri::new("blob", "", "/b");
    registry.write_file(&inner, b"v1").unwrap();

    let overlay = ReadOnlyBackend::make_uri(&inner);
    assert!(registry.stat(&overlay).unwrap().readonly);
    assert!(matches!(
        registry.write_file(&overlay, b"v2"),
        Err(Error::ReadOnly(_))
    ));

    registry.write_file(&inner, b"v2").unwrap();
    assert_eq!(registry.read_file(&overlay).unwrap(), b"v2");
}

#[test]
fn unknown_schemes_and_missing_ranges_are_not_found() {
    let (registry, _) = registry_with_blobs();
    let err = registry
        .read_file(&Uri::parse("nowhere:///x").unwrap())
        .unwrap_err();
    assert!(err.is_not_found(), "{err:?}");

    let err = registry
        .read_file(&Uri::parse("subfile://blob/b").unwrap())
        .unwrap_err();
    assert!(matches!(err, Error::MissingRange(_)), "{err:?}");
}
