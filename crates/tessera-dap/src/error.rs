use std::io;

use thiserror::Error;

pub type DapResult<T> = Result<T, DapError>;

#[derive(Error, Debug)]
pub enum DapError {
    #[error("unknown debug session `{0}`")]
    UnknownSession(String),
    #[error("`{command}` request failed: {message}")]
    RequestFailed { command: String, message: String },
    #[error("malformed `{command}` payload: {source}")]
    Payload {
        command: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid base64 memory contents: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("offset {0} does not fit a protocol offset")]
    OffsetOutOfRange(u64),
    #[error("transport: {0}")]
    Transport(#[from] io::Error),
}

impl From<DapError> for io::Error {
    fn from(err: DapError) -> Self {
        match err {
            DapError::Transport(err) => err,
            DapError::UnknownSession(_) => io::Error::new(io::ErrorKind::NotFound, err),
            DapError::OffsetOutOfRange(_) => io::Error::new(io::ErrorKind::InvalidInput, err),
            DapError::RequestFailed { .. } | DapError::Payload { .. } | DapError::Base64(_) => {
                io::Error::other(err)
            }
        }
    }
}

impl From<DapError> for tessera_vfs::Error {
    fn from(err: DapError) -> Self {
        match err {
            DapError::UnknownSession(id) => tessera_vfs::Error::NotFound {
                what: "debug session",
                uri: id,
            },
            DapError::Transport(err) => tessera_vfs::Error::Io(err),
            err => tessera_vfs::Error::backend(err),
        }
    }
}
