use std::sync::Arc;

use percent_encoding::utf8_percent_encode;
use tessera_vfs::{Backend, Error, FileStat, Result, SchemeRegistry, Uri};

use crate::memory_fs::SEGMENT;
use crate::session::Sessions;

/// Sources that only exist inside the debug adapter, fetched with the `source` request:
/// `debug-source://<session id>/<source reference>/<name>`.
#[derive(Debug)]
pub struct DebugSourceBackend {
    sessions: Arc<Sessions>,
}

impl DebugSourceBackend {
    pub const SCHEME: &'static str = "debug-source";

    pub fn new(sessions: Arc<Sessions>) -> Self {
        Self { sessions }
    }

    pub fn make_uri(session_id: &str, source_reference: i64, name: &str) -> Uri {
        let path = format!(
            "/{source_reference}/{}",
            utf8_percent_encode(name, SEGMENT)
        );
        Uri::new(Self::SCHEME, session_id, path)
    }

    /// Returns the session id and source reference addressed by `uri`.
    pub fn parse_uri(uri: &Uri) -> Result<(String, i64)> {
        let source_reference = uri
            .path()
            .trim_start_matches('/')
            .split('/')
            .next()
            .and_then(|segment| segment.parse().ok())
            .ok_or_else(|| Error::MalformedUri {
                uri: uri.to_string(),
                reason: "expected `/<source reference>/<name>`",
            })?;
        Ok((uri.authority().to_string(), source_reference))
    }

    fn fetch(&self, uri: &Uri) -> Result<String> {
        let (session_id, source_reference) = Self::parse_uri(uri)?;
        let session = self.sessions.require(&session_id)?;
        Ok(session.source(source_reference)?)
    }
}

impl Backend for DebugSourceBackend {
    fn read_file(&self, _registry: &SchemeRegistry, uri: &Uri) -> Result<Vec<u8>> {
        Ok(self.fetch(uri)?.into_bytes())
    }

    fn stat(&self, _registry: &SchemeRegistry, uri: &Uri) -> Result<FileStat> {
        let size = self.fetch(uri)?.len() as u64;
        Ok(FileStat {
            readonly: true,
            ..FileStat::file(size)
        })
    }
}
