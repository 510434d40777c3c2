use std::io;

use crate::backend::{readdress, Backend, ChangeSink, FileStat, WatchOptions};
use crate::error::{Error, Result};
use crate::event::Subscription;
use crate::file::File;
use crate::registry::SchemeRegistry;
use crate::uri::Uri;

/// A read-only projection of another URI: `readonly://<inner scheme><inner path>`.
///
/// Changes made to the inner file are visible through the overlay; only the overlay's own write
/// path is blocked.
#[derive(Debug, Clone, Default)]
pub struct ReadOnlyBackend;

impl ReadOnlyBackend {
    pub const SCHEME: &'static str = "readonly";

    pub fn new() -> Self {
        Self
    }

    pub fn make_uri(inner: &Uri) -> Uri {
        Uri::encapsulate(inner, Self::SCHEME)
    }

    pub fn parse_uri(uri: &Uri) -> Result<Uri> {
        uri.encapsulated()
    }
}

struct ReadOnlyFile(Box<dyn File>);

impl File for ReadOnlyFile {
    fn read(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        self.0.read(offset, len)
    }

    fn write(&mut self, _offset: u64, _data: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "file is opened through a read-only view",
        ))
    }

    fn len(&self) -> Option<u64> {
        self.0.len()
    }
}

impl Backend for ReadOnlyBackend {
    fn open_file(&self, registry: &SchemeRegistry, uri: &Uri) -> Result<Box<dyn File>> {
        let inner = registry.open_file(&Self::parse_uri(uri)?)?;
        Ok(Box::new(ReadOnlyFile(inner)))
    }

    fn read_file(&self, registry: &SchemeRegistry, uri: &Uri) -> Result<Vec<u8>> {
        registry.read_file(&Self::parse_uri(uri)?)
    }

    fn write_file(&self, _registry: &SchemeRegistry, uri: &Uri, _content: &[u8]) -> Result<()> {
        Err(Error::ReadOnly(uri.to_string()))
    }

    fn stat(&self, registry: &SchemeRegistry, uri: &Uri) -> Result<FileStat> {
        let stat = registry.stat(&Self::parse_uri(uri)?)?;
        Ok(FileStat {
            readonly: true,
            ..stat
        })
    }

    fn watch(
        &self,
        registry: &SchemeRegistry,
        uri: &Uri,
        options: &WatchOptions,
        sink: ChangeSink,
    ) -> Result<Subscription> {
        let inner = Self::parse_uri(uri)?;
        registry.watch(&inner, options, readdress(uri.clone(), sink))
    }
}
