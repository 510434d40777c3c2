use crate::backend::{readdress, Backend, ChangeSink, FileStat, WatchOptions};
use crate::error::{Error, Result};
use crate::event::Subscription;
use crate::file::File;
use crate::range::{ByteRange, RangedFile};
use crate::registry::SchemeRegistry;
use crate::uri::Uri;

/// Exposes a byte range of another URI as a file of its own.
///
/// URI form: `subfile://<inner scheme><inner path>#<from>;<to>`.
#[derive(Debug, Clone, Default)]
pub struct SubfileBackend;

impl SubfileBackend {
    pub const SCHEME: &'static str = "subfile";

    pub fn new() -> Self {
        Self
    }

    pub fn make_uri(inner: &Uri, range: ByteRange) -> Uri {
        Uri::encapsulate(inner, Self::SCHEME).with_fragment(range.to_string())
    }

    /// Splits a subfile URI into the wrapped URI and its range.
    pub fn parse_uri(uri: &Uri) -> Result<(Uri, ByteRange)> {
        let range = uri
            .fragment()
            .parse::<ByteRange>()
            .map_err(|_| Error::MissingRange(uri.to_string()))?;
        let inner = uri.encapsulated()?.with_fragment("");
        Ok((inner, range))
    }
}

/// Returns the URI addressing `range` of `uri`.
pub fn with_offset(uri: &Uri, range: ByteRange) -> Uri {
    SubfileBackend::make_uri(uri, range)
}

fn window_len(range: ByteRange) -> usize {
    usize::try_from(range.len()).unwrap_or(usize::MAX)
}

fn clamp_index(offset: u64, len: usize) -> usize {
    usize::try_from(offset).unwrap_or(usize::MAX).min(len)
}

impl Backend for SubfileBackend {
    fn open_file(&self, registry: &SchemeRegistry, uri: &Uri) -> Result<Box<dyn File>> {
        let (inner, range) = Self::parse_uri(uri)?;
        let file = registry.open_file(&inner)?;
        Ok(Box::new(RangedFile::new(file, range)))
    }

    fn read_file(&self, registry: &SchemeRegistry, uri: &Uri) -> Result<Vec<u8>> {
        let (inner, range) = Self::parse_uri(uri)?;
        match registry.open_file(&inner) {
            Ok(mut file) => Ok(file.read(range.from_offset(), window_len(range))?),
            Err(err) if err.is_unsupported() => {
                let data = registry.read_file(&inner)?;
                let start = clamp_index(range.from_offset(), data.len());
                let end = clamp_index(range.to_offset(), data.len());
                Ok(data[start..end].to_vec())
            }
            Err(err) => Err(err),
        }
    }

    fn write_file(&self, registry: &SchemeRegistry, uri: &Uri, content: &[u8]) -> Result<()> {
        let (inner, range) = Self::parse_uri(uri)?;
        let content = &content[..content.len().min(window_len(range))];
        match registry.open_file(&inner) {
            Ok(file) => {
                RangedFile::new(file, range).write(0, content)?;
                Ok(())
            }
            Err(err) if err.is_unsupported() => {
                let mut data = registry.read_file(&inner)?;
                let start = usize::try_from(range.from_offset()).map_err(|_| Error::InvalidRange {
                    from: range.from_offset(),
                    to: range.to_offset(),
                })?;
                let end = start + content.len();
                if data.len() < end {
                    data.resize(end, 0);
                }
                data[start..end].copy_from_slice(content);
                registry.write_file(&inner, &data)
            }
            Err(err) => Err(err),
        }
    }

    fn stat(&self, registry: &SchemeRegistry, uri: &Uri) -> Result<FileStat> {
        let (inner, range) = Self::parse_uri(uri)?;
        let stat = registry.stat(&inner)?;
        Ok(FileStat {
            size: range.len(),
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
        let (inner, _) = Self::parse_uri(uri)?;
        registry.watch(&inner, options, readdress(uri.clone(), sink))
    }
}
