//! Scheme-dispatched virtual files and a correlating file watcher.
//!
//! The crate is responsible for:
//! - Dispatching file operations on [`Uri`]s to the [`Backend`] registered for their scheme.
//! - Composing files: byte-range windows ([`SubfileBackend`], [`RangedFile`]) and read-only
//!   projections ([`ReadOnlyBackend`]) of other URIs.
//! - Turning a handful of native directory watches into per-file, per-pattern and per-subtree
//!   change notifications, including rename detection ([`WatchEngine`]).

mod backend;
mod change;
pub mod config;
mod engine;
mod error;
mod event;
mod file;
mod glob;
mod local;
mod range;
mod readonly;
mod registry;
mod search;
mod subfile;
mod uri;
mod watch;

pub use backend::{Backend, ChangeSink, FileChangeEvent, FileChangeType, FileStat, FileType, WatchOptions};
pub use change::{Change, FileChange};
pub use config::WatchConfig;
pub use engine::{ChangeCallback, LocalModifiedTimes, ModifiedTimes, SubscriptionId, WatchEngine};
pub use error::{Error, Result};
pub use event::{Emitter, Subscription};
pub use file::{BytesFile, File, LocalFile};
pub use glob::{contains_glob, split_glob_base, Glob};
pub use local::LocalBackend;
pub use range::{ByteRange, RangedFile};
pub use readonly::ReadOnlyBackend;
pub use registry::SchemeRegistry;
pub use search::search;
pub use subfile::{with_offset, SubfileBackend};
pub use uri::Uri;
pub use watch::{
    FileWatcher, ManualFileWatcher, ManualFileWatcherHandle, WatchEvent, WatchMessage, WatchMode,
};

#[cfg(feature = "watch-notify")]
pub use watch::NotifyFileWatcher;
