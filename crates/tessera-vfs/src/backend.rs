use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{Error, Result};
use crate::event::Subscription;
use crate::file::File;
use crate::registry::SchemeRegistry;
use crate::uri::Uri;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Unknown,
    File,
    Directory,
    SymbolicLink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub file_type: FileType,
    pub size: u64,
    pub mtime: Option<SystemTime>,
    pub ctime: Option<SystemTime>,
    pub readonly: bool,
}

impl FileStat {
    pub fn file(size: u64) -> Self {
        Self {
            file_type: FileType::File,
            size,
            mtime: None,
            ctime: None,
            readonly: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOptions {
    pub recursive: bool,
    pub excludes: Vec<String>,
}

impl WatchOptions {
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            excludes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeType {
    Changed,
    Created,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChangeEvent {
    pub kind: FileChangeType,
    pub uri: Uri,
}

/// Receives change batches from [`Backend::watch`].
pub type ChangeSink = Arc<dyn Fn(&[FileChangeEvent]) + Send + Sync>;

/// The capability set implemented by every URI scheme.
///
/// Methods receive the registry so composed backends can resolve the URIs they wrap. Operations a
/// backend does not provide fail with [`Error::Unsupported`].
pub trait Backend: Send + Sync {
    fn open_file(&self, _registry: &SchemeRegistry, uri: &Uri) -> Result<Box<dyn File>> {
        Err(Error::Unsupported {
            op: "open",
            uri: uri.to_string(),
        })
    }

    fn read_file(&self, registry: &SchemeRegistry, uri: &Uri) -> Result<Vec<u8>>;

    fn write_file(&self, _registry: &SchemeRegistry, uri: &Uri, _content: &[u8]) -> Result<()> {
        Err(Error::Unsupported {
            op: "write",
            uri: uri.to_string(),
        })
    }

    fn stat(&self, registry: &SchemeRegistry, uri: &Uri) -> Result<FileStat>;

    fn watch(
        &self,
        _registry: &SchemeRegistry,
        uri: &Uri,
        _options: &WatchOptions,
        _sink: ChangeSink,
    ) -> Result<Subscription> {
        Err(Error::Unsupported {
            op: "watch",
            uri: uri.to_string(),
        })
    }
}

/// Wraps `sink` so events from an inner URI are re-addressed to `outer`.
pub(crate) fn readdress(outer: Uri, sink: ChangeSink) -> ChangeSink {
    Arc::new(move |events: &[FileChangeEvent]| {
        let mapped: Vec<FileChangeEvent> = events
            .iter()
            .map(|event| FileChangeEvent {
                kind: event.kind,
                uri: outer.clone(),
            })
            .collect();
        sink(&mapped);
    })
}
