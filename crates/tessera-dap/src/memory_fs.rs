use std::io;
use std::sync::Arc;
use std::time::SystemTime;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tessera_vfs::{
    Backend, ByteRange, ChangeSink, Error, File, FileChangeEvent, FileChangeType, FileStat,
    FileType, Result, SchemeRegistry, Subscription, Uri, WatchOptions,
};

use crate::config::MemoryConfig;
use crate::session::{Session, SessionState, Sessions};

/// Characters left intact when a memory reference or display name is put into a path segment.
pub(crate) const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// The decoded parts of a `debug-memory` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLocation {
    pub session_id: String,
    pub memory_reference: String,
    pub range: Option<ByteRange>,
}

/// Exposes the memory of a live debuggee:
/// `debug-memory://<session id>/<memory reference>/<display name>?range=<from>:<to>`.
///
/// Offsets passed to handles are relative to the memory reference. Ranged URIs are required for
/// whole-file reads and writes; without a range the size of the region is unknown.
#[derive(Debug)]
pub struct PagedMemoryBackend {
    sessions: Arc<Sessions>,
    config: MemoryConfig,
}

impl PagedMemoryBackend {
    pub const SCHEME: &'static str = "debug-memory";

    pub fn new(sessions: Arc<Sessions>) -> Self {
        Self::with_config(sessions, MemoryConfig::default())
    }

    pub fn with_config(sessions: Arc<Sessions>, config: MemoryConfig) -> Self {
        Self { sessions, config }
    }

    pub fn make_uri(
        session_id: &str,
        memory_reference: &str,
        range: Option<ByteRange>,
        display_name: &str,
    ) -> Uri {
        let path = format!(
            "/{}/{}",
            utf8_percent_encode(memory_reference, SEGMENT),
            utf8_percent_encode(display_name, SEGMENT)
        );
        let query = range
            .map(|range| format!("range={}:{}", range.from_offset(), range.to_offset()))
            .unwrap_or_default();
        Uri::new(Self::SCHEME, session_id, path).with_query(query)
    }

    /// Decodes a memory URI. A malformed range is treated as absent.
    pub fn parse_uri(uri: &Uri) -> Result<MemoryLocation> {
        let malformed = |reason| Error::MalformedUri {
            uri: uri.to_string(),
            reason,
        };

        let segment = uri
            .path()
            .trim_start_matches('/')
            .split('/')
            .next()
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| malformed("missing memory reference"))?;
        let memory_reference = percent_decode_str(segment)
            .decode_utf8()
            .map_err(|_| malformed("memory reference is not utf-8"))?
            .into_owned();

        let range = uri
            .query()
            .split('&')
            .find_map(|param| param.strip_prefix("range="))
            .and_then(|value| ByteRange::parse_with(value, ':'));

        Ok(MemoryLocation {
            session_id: uri.authority().to_string(),
            memory_reference,
            range,
        })
    }

    fn resolve(&self, uri: &Uri) -> Result<(Arc<Session>, MemoryLocation)> {
        let location = Self::parse_uri(uri)?;
        let session = self.sessions.require(&location.session_id)?;
        Ok((session, location))
    }

    fn require_range(uri: &Uri, location: &MemoryLocation) -> Result<ByteRange> {
        location
            .range
            .ok_or_else(|| Error::MissingRange(uri.to_string()))
    }
}

/// A handle on debuggee memory. Every call is one `readMemory` / `writeMemory` round trip.
#[derive(Debug)]
pub struct MemoryFile {
    session: Arc<Session>,
    memory_reference: String,
}

impl MemoryFile {
    pub fn new(session: Arc<Session>, memory_reference: impl Into<String>) -> Self {
        Self {
            session,
            memory_reference: memory_reference.into(),
        }
    }

    pub fn memory_reference(&self) -> &str {
        &self.memory_reference
    }
}

impl File for MemoryFile {
    fn read(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        Ok(self
            .session
            .read_memory(&self.memory_reference, offset, len)?)
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> io::Result<usize> {
        Ok(self
            .session
            .write_memory(&self.memory_reference, offset, data)?)
    }
}

impl Backend for PagedMemoryBackend {
    fn open_file(&self, _registry: &SchemeRegistry, uri: &Uri) -> Result<Box<dyn File>> {
        let (session, location) = self.resolve(uri)?;
        Ok(Box::new(MemoryFile::new(session, location.memory_reference)))
    }

    fn read_file(&self, _registry: &SchemeRegistry, uri: &Uri) -> Result<Vec<u8>> {
        let (session, location) = self.resolve(uri)?;
        let range = Self::require_range(uri, &location)?;
        Ok(session.read_memory(
            &location.memory_reference,
            range.from_offset(),
            range.len() as usize,
        )?)
    }

    fn write_file(&self, _registry: &SchemeRegistry, uri: &Uri, content: &[u8]) -> Result<()> {
        let (session, location) = self.resolve(uri)?;
        let range = Self::require_range(uri, &location)?;
        let written = session.write_memory(&location.memory_reference, range.from_offset(), content)?;
        if written < content.len() {
            tracing::debug!(
                target = "tessera.dap",
                uri = %uri,
                written,
                requested = content.len(),
                "partial memory write"
            );
        }
        Ok(())
    }

    fn stat(&self, _registry: &SchemeRegistry, uri: &Uri) -> Result<FileStat> {
        let (session, location) = self.resolve(uri)?;
        Ok(FileStat {
            file_type: FileType::File,
            size: location
                .range
                .map_or(self.config.default_size, |range| range.len()),
            mtime: Some(SystemTime::UNIX_EPOCH),
            ctime: Some(SystemTime::UNIX_EPOCH),
            readonly: !session.supports_write_memory(),
        })
    }

    fn watch(
        &self,
        _registry: &SchemeRegistry,
        uri: &Uri,
        options: &WatchOptions,
        sink: ChangeSink,
    ) -> Result<Subscription> {
        if options.recursive {
            return Ok(Subscription::noop());
        }
        let (session, location) = self.resolve(uri)?;

        let on_state = {
            let uri = uri.clone();
            let sink = sink.clone();
            session.on_state_changed(move |state| {
                if matches!(state, SessionState::Running | SessionState::Inactive) {
                    sink(&[FileChangeEvent {
                        kind: FileChangeType::Deleted,
                        uri: uri.clone(),
                    }]);
                }
            })
        };

        let on_memory = {
            let uri = uri.clone();
            let MemoryLocation {
                memory_reference,
                range,
                ..
            } = location;
            session.on_memory_invalidated(move |body| {
                if body.memory_reference != memory_reference {
                    return;
                }
                if range.map_or(true, |range| span_intersects(range, body.offset, body.count)) {
                    sink(&[FileChangeEvent {
                        kind: FileChangeType::Changed,
                        uri: uri.clone(),
                    }]);
                }
            })
        };

        Ok(Subscription::from_all(vec![on_state, on_memory]))
    }
}

/// Whether `count` bytes at the reference-relative `offset` overlap `range`.
fn span_intersects(range: ByteRange, offset: i64, count: u64) -> bool {
    match u64::try_from(offset) {
        Ok(offset) => range.intersects(offset, count),
        // Bytes before the reference cannot be addressed by a range; clip them.
        Err(_) => {
            let before = offset.unsigned_abs();
            count > before && range.intersects(0, count - before)
        }
    }
}
