use std::path::{Path, PathBuf};

/// A normalized change reported by a native [`crate::FileWatcher`].
///
/// Native backends never report renames directly; a rename surfaces as `Deleted` for the old path
/// and `Created` for the new one, and [`crate::WatchEngine`] correlates the pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileChange {
    Created { path: PathBuf },
    Modified { path: PathBuf },
    Deleted { path: PathBuf },
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Created { path }
            | FileChange::Modified { path }
            | FileChange::Deleted { path } => path,
        }
    }
}

/// What a [`crate::WatchEngine`] callback is told about a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Change {
    Changed,
    Created,
    Deleted,
    /// The callback's file was renamed to the reported path.
    Renamed,
}
