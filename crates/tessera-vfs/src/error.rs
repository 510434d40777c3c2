use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("no file system registered for scheme `{0}`")]
    SchemeNotFound(String),
    #[error("{what} not found: {uri}")]
    NotFound { what: &'static str, uri: String },
    #[error("range must be present on `{0}`")]
    MissingRange(String),
    #[error("invalid byte range {from}..{to}")]
    InvalidRange { from: u64, to: u64 },
    #[error("malformed uri `{uri}`: {reason}")]
    MalformedUri { uri: String, reason: &'static str },
    #[error("{op} is not supported for `{uri}`")]
    Unsupported { op: &'static str, uri: String },
    #[error("`{0}` is read-only")]
    ReadOnly(String),
    #[error("invalid glob `{pattern}`: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Backend(Box::new(err))
    }

    /// Returns `true` for the NotFound class: unknown schemes, unknown resources, missing ranges
    /// and I/O errors of kind `NotFound`.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::SchemeNotFound(_) | Error::NotFound { .. } | Error::MissingRange(_) => true,
            Error::Io(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        match self {
            Error::Unsupported { .. } => true,
            Error::Io(err) => err.kind() == io::ErrorKind::Unsupported,
            _ => false,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(err) => err,
            Error::SchemeNotFound(_) | Error::NotFound { .. } => {
                io::Error::new(io::ErrorKind::NotFound, err)
            }
            Error::Unsupported { .. } => io::Error::new(io::ErrorKind::Unsupported, err),
            Error::ReadOnly(_) => io::Error::new(io::ErrorKind::PermissionDenied, err),
            Error::MissingRange(_)
            | Error::InvalidRange { .. }
            | Error::MalformedUri { .. }
            | Error::InvalidGlob { .. } => io::Error::new(io::ErrorKind::InvalidInput, err),
            Error::Backend(_) => io::Error::other(err),
        }
    }
}
