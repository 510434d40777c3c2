use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// A randomly addressable open file.
///
/// Handles are exclusively owned; dropping one releases the underlying resource.
pub trait File: Send {
    /// Reads up to `len` bytes starting at `offset`. Short reads are allowed at end of file.
    fn read(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>>;

    /// Writes `data` at `offset` and returns the number of bytes accepted.
    fn write(&mut self, offset: u64, data: &[u8]) -> io::Result<usize>;

    /// Apparent length of the file, if known without I/O.
    fn len(&self) -> Option<u64> {
        None
    }
}

impl<F: ?Sized + File> File for Box<F> {
    fn read(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        self.as_mut().read(offset, len)
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> io::Result<usize> {
        self.as_mut().write(offset, data)
    }

    fn len(&self) -> Option<u64> {
        self.as_ref().len()
    }
}

/// A file on the local OS file system.
#[derive(Debug)]
pub struct LocalFile {
    file: fs::File,
    writable: bool,
}

impl LocalFile {
    /// Opens `path` for reading and writing, falling back to read-only when write access is
    /// denied.
    pub fn open(path: &Path) -> io::Result<Self> {
        match fs::OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => Ok(Self {
                file,
                writable: true,
            }),
            Err(err) if err.kind() == io::ErrorKind::PermissionDenied => Ok(Self {
                file: fs::File::open(path)?,
                writable: false,
            }),
            Err(err) => Err(err),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }
}

impl File for LocalFile {
    fn read(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = Vec::with_capacity(len.min(64 * 1024));
        (&mut self.file).take(len as u64).read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file was opened read-only",
            ));
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        Ok(data.len())
    }
}

/// An in-memory file, mostly useful for composing and testing backends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BytesFile {
    bytes: Vec<u8>,
}

impl BytesFile {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl File for BytesFile {
    fn read(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        let start = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(self.bytes.len());
        let end = start.saturating_add(len).min(self.bytes.len());
        Ok(self.bytes[start..end].to_vec())
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> io::Result<usize> {
        let start = usize::try_from(offset).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "offset exceeds address space")
        })?;
        let end = start.checked_add(data.len()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "write exceeds address space")
        })?;
        if self.bytes.len() < end {
            self.bytes.resize(end, 0);
        }
        self.bytes[start..end].copy_from_slice(data);
        Ok(data.len())
    }

    fn len(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }
}
