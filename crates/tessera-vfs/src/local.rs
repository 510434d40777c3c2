use std::fs;
use std::io;
use std::path::PathBuf;

use crate::backend::{Backend, FileStat, FileType};
use crate::error::{Error, Result};
use crate::file::{File, LocalFile};
use crate::registry::SchemeRegistry;
use crate::uri::Uri;

/// Local OS file system, served under the `file` scheme.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend;

impl LocalBackend {
    pub const SCHEME: &'static str = "file";

    pub fn new() -> Self {
        Self
    }

    fn path(uri: &Uri) -> Result<PathBuf> {
        uri.to_file_path().ok_or_else(|| Error::MalformedUri {
            uri: uri.to_string(),
            reason: "not a file uri",
        })
    }
}

pub(crate) fn stat_from_metadata(meta: &fs::Metadata) -> FileStat {
    let file_type = if meta.file_type().is_symlink() {
        FileType::SymbolicLink
    } else if meta.is_dir() {
        FileType::Directory
    } else if meta.is_file() {
        FileType::File
    } else {
        FileType::Unknown
    };
    FileStat {
        file_type,
        size: meta.len(),
        mtime: meta.modified().ok(),
        ctime: meta.created().ok(),
        readonly: meta.permissions().readonly(),
    }
}

impl Backend for LocalBackend {
    fn open_file(&self, _registry: &SchemeRegistry, uri: &Uri) -> Result<Box<dyn File>> {
        let path = Self::path(uri)?;
        Ok(Box::new(LocalFile::open(&path)?))
    }

    fn read_file(&self, _registry: &SchemeRegistry, uri: &Uri) -> Result<Vec<u8>> {
        Ok(fs::read(Self::path(uri)?)?)
    }

    fn write_file(&self, _registry: &SchemeRegistry, uri: &Uri, content: &[u8]) -> Result<()> {
        Ok(fs::write(Self::path(uri)?, content)?)
    }

    fn stat(&self, _registry: &SchemeRegistry, uri: &Uri) -> Result<FileStat> {
        let meta = fs::metadata(Self::path(uri)?).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound {
                what: "file",
                uri: uri.to_string(),
            },
            _ => Error::Io(err),
        })?;
        Ok(stat_from_metadata(&meta))
    }
}
