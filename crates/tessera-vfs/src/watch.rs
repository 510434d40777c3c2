//! Native watch primitives consumed by [`crate::WatchEngine`].
//!
//! A watcher only ever sees directories: the engine folds file, pattern and subtree
//! subscriptions onto them. Normalized [`FileChange`] batches and asynchronous errors arrive in
//! order on a `crossbeam_channel` stream. Renames show up as a delete plus a create; pairing them
//! is left to the engine. A watcher that loses events sends [`WatchEvent::Rescan`] instead.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use crossbeam_channel::{self as channel, Receiver, Sender, TrySendError};

use crate::change::FileChange;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Changes(Vec<FileChange>),
    /// Events were lost; every watched file has to be re-checked.
    Rescan,
}

impl WatchEvent {
    pub fn changes(&self) -> &[FileChange] {
        if let WatchEvent::Changes(batch) = self {
            batch
        } else {
            &[]
        }
    }
}

/// Whether a native watch covers a directory's entries or its whole subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchMode {
    NonRecursive,
    Recursive,
}

pub type WatchMessage = io::Result<WatchEvent>;

/// A source of native change notifications.
pub trait FileWatcher: Send {
    fn watch_path(&mut self, dir: &Path, mode: WatchMode) -> io::Result<()>;

    fn unwatch_path(&mut self, dir: &Path) -> io::Result<()>;

    fn receiver(&self) -> &Receiver<WatchMessage>;
}

const MANUAL_QUEUE_BOUND: usize = 1024;

/// Feeds a [`ManualFileWatcher`], possibly from another thread.
#[derive(Debug, Clone)]
pub struct ManualFileWatcherHandle(Sender<WatchMessage>);

impl ManualFileWatcherHandle {
    pub fn push(&self, event: WatchEvent) -> io::Result<()> {
        self.send(Ok(event))
    }

    pub fn push_changes(&self, changes: Vec<FileChange>) -> io::Result<()> {
        self.push(WatchEvent::Changes(changes))
    }

    pub fn push_error(&self, error: io::Error) -> io::Result<()> {
        self.send(Err(error))
    }

    fn send(&self, message: WatchMessage) -> io::Result<()> {
        self.0.try_send(message).map_err(|err| match err {
            TrySendError::Full(_) => {
                io::Error::new(io::ErrorKind::WouldBlock, "manual watcher queue is full")
            }
            TrySendError::Disconnected(_) => {
                io::Error::new(io::ErrorKind::BrokenPipe, "manual watcher was dropped")
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NativeCall {
    Watch(PathBuf, WatchMode),
    Unwatch(PathBuf),
}

/// In-memory [`FileWatcher`] for tests.
///
/// Events only come from a [`ManualFileWatcherHandle`]; injection fails with `WouldBlock` once
/// 1024 messages are pending. Every watch call is recorded, and chosen directories can be made
/// to refuse watches.
#[derive(Debug)]
pub struct ManualFileWatcher {
    handle: ManualFileWatcherHandle,
    events: Receiver<WatchMessage>,
    calls: Vec<NativeCall>,
    active: BTreeMap<PathBuf, WatchMode>,
    refused: BTreeSet<PathBuf>,
}

impl Default for ManualFileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualFileWatcher {
    pub fn new() -> Self {
        let (tx, events) = channel::bounded(MANUAL_QUEUE_BOUND);
        Self {
            handle: ManualFileWatcherHandle(tx),
            events,
            calls: Vec::new(),
            active: BTreeMap::new(),
            refused: BTreeSet::new(),
        }
    }

    pub fn handle(&self) -> ManualFileWatcherHandle {
        self.handle.clone()
    }

    pub fn push(&self, event: WatchEvent) -> io::Result<()> {
        self.handle.push(event)
    }

    pub fn push_error(&self, error: io::Error) -> io::Result<()> {
        self.handle.push_error(error)
    }

    /// `watch_path(dir, _)` fails with `PermissionDenied` until [`Self::clear_failures`].
    pub fn fail_watch(&mut self, dir: impl Into<PathBuf>) {
        self.refused.insert(dir.into());
    }

    pub fn clear_failures(&mut self) {
        self.refused.clear();
    }

    /// Every `watch_path` call so far, refused ones included.
    pub fn watch_calls(&self) -> Vec<(PathBuf, WatchMode)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                NativeCall::Watch(dir, mode) => Some((dir.clone(), *mode)),
                NativeCall::Unwatch(_) => None,
            })
            .collect()
    }

    pub fn unwatch_calls(&self) -> Vec<PathBuf> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                NativeCall::Unwatch(dir) => Some(dir.clone()),
                NativeCall::Watch(..) => None,
            })
            .collect()
    }

    /// Live watches ordered by directory.
    pub fn watched_paths(&self) -> Vec<(PathBuf, WatchMode)> {
        self.active
            .iter()
            .map(|(dir, mode)| (dir.clone(), *mode))
            .collect()
    }
}

impl FileWatcher for ManualFileWatcher {
    fn watch_path(&mut self, dir: &Path, mode: WatchMode) -> io::Result<()> {
        self.calls.push(NativeCall::Watch(dir.to_path_buf(), mode));
        if self.refused.contains(dir) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("watch on {} refused", dir.display()),
            ));
        }
        self.active.insert(dir.to_path_buf(), mode);
        Ok(())
    }

    fn unwatch_path(&mut self, dir: &Path) -> io::Result<()> {
        self.calls.push(NativeCall::Unwatch(dir.to_path_buf()));
        self.active.remove(dir);
        Ok(())
    }

    fn receiver(&self) -> &Receiver<WatchMessage> {
        &self.events
    }
}

#[cfg(feature = "watch-notify")]
pub use notify_impl::NotifyFileWatcher;

#[cfg(any(test, feature = "watch-notify"))]
mod notify_impl {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use notify::event::{Flag, ModifyKind, RenameMode};
    use notify::EventKind;

    use super::*;

    #[cfg(feature = "watch-notify")]
    use std::collections::HashMap;

    #[cfg(feature = "watch-notify")]
    use crate::config::WatchConfig;
    #[cfg(feature = "watch-notify")]
    use notify::{RecursiveMode, Watcher};

    /// How often a pending `Rescan` is retried while the consumer queue is full.
    const RESCAN_RETRY: Duration = Duration::from_millis(50);

    pub(super) type RawMessage = notify::Result<notify::Event>;

    fn created(path: PathBuf) -> FileChange {
        FileChange::Created { path }
    }

    fn deleted(path: PathBuf) -> FileChange {
        FileChange::Deleted { path }
    }

    fn modified(path: PathBuf) -> FileChange {
        FileChange::Modified { path }
    }

    fn each(paths: Vec<PathBuf>, make: fn(PathBuf) -> FileChange) -> Vec<FileChange> {
        paths.into_iter().map(make).collect()
    }

    /// `[from, to, from, to, ..]`; an unpaired trailing path counts as modified.
    fn rename_pairs(paths: Vec<PathBuf>) -> Vec<FileChange> {
        let mut out = Vec::with_capacity(paths.len());
        for pair in paths.chunks(2) {
            match pair {
                [from, to] => {
                    out.push(deleted(from.clone()));
                    out.push(created(to.clone()));
                }
                [lone] => out.push(modified(lone.clone())),
                _ => {}
            }
        }
        out
    }

    pub(super) fn to_changes(event: notify::Event) -> Vec<FileChange> {
        let paths = event.paths;
        match event.kind {
            EventKind::Access(_) => Vec::new(),
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                each(paths, created)
            }
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                each(paths, deleted)
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => rename_pairs(paths),
            // The backend did not say which side of the rename this path is on.
            EventKind::Modify(ModifyKind::Name(_)) => paths
                .into_iter()
                .map(|path| if path.exists() { created(path) } else { deleted(path) })
                .collect(),
            _ => each(paths, modified),
        }
    }

    fn signals_loss(event: &notify::Event) -> bool {
        matches!(event.attrs.flag(), Some(Flag::Rescan))
            || (matches!(event.kind, EventKind::Other) && event.paths.is_empty())
    }

    fn to_io(err: notify::Error) -> io::Error {
        io::Error::other(err)
    }

    /// Queues `message`, or marks the stream lossy when the queue is full.
    pub(super) fn offer<T>(tx: &Sender<T>, lost: &AtomicBool, message: T) {
        if let Err(TrySendError::Full(_)) = tx.try_send(message) {
            lost.store(true, Ordering::Release);
        }
    }

    /// Moves raw notify output onto the consumer queue. Any loss is reported as one `Rescan`.
    pub(super) struct Drain {
        pub(super) raw: Receiver<RawMessage>,
        pub(super) out: Sender<WatchMessage>,
        pub(super) stop: Receiver<()>,
        pub(super) lost: Arc<AtomicBool>,
    }

    impl Drain {
        pub(super) fn run(self) {
            loop {
                if self.lost.load(Ordering::Acquire) && !self.announce_loss() {
                    return;
                }
                let retry = if self.lost.load(Ordering::Acquire) {
                    channel::after(RESCAN_RETRY)
                } else {
                    channel::never()
                };

                channel::select! {
                    recv(self.stop) -> _ => return,
                    recv(self.raw) -> raw => {
                        let Ok(raw) = raw else { return };
                        if !self.forward(raw) {
                            return;
                        }
                    }
                    recv(retry) -> _ => {}
                }
            }
        }

        /// Discards queued raw events, since a rescan covers them. `false` once the consumer is gone.
        fn announce_loss(&self) -> bool {
            self.raw.try_iter().for_each(drop);
            match self.out.try_send(Ok(WatchEvent::Rescan)) {
                Ok(()) => {
                    self.lost.store(false, Ordering::Release);
                    true
                }
                Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            }
        }

        fn forward(&self, raw: RawMessage) -> bool {
            let message = match raw {
                Ok(event) if signals_loss(&event) => {
                    self.lost.store(true, Ordering::Release);
                    return true;
                }
                Ok(event) => {
                    let changes = to_changes(event);
                    if changes.is_empty() {
                        return true;
                    }
                    Ok(WatchEvent::Changes(changes))
                }
                // Backends usually report dropped events as errors.
                Err(err) => {
                    self.lost.store(true, Ordering::Release);
                    Err(to_io(err))
                }
            };
            match self.out.try_send(message) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    self.lost.store(true, Ordering::Release);
                    true
                }
                Err(TrySendError::Disconnected(_)) => false,
            }
        }
    }

    /// [`FileWatcher`] over the platform's recommended `notify` backend.
    ///
    /// A drain thread sits between the notify callback and [`FileWatcher::receiver`]. Both queues
    /// are bounded by [`WatchConfig`].
    #[cfg(feature = "watch-notify")]
    pub struct NotifyFileWatcher {
        inner: notify::RecommendedWatcher,
        events: Receiver<WatchMessage>,
        active: HashMap<PathBuf, WatchMode>,
        stop: Sender<()>,
        drain: Option<std::thread::JoinHandle<()>>,
    }

    #[cfg(feature = "watch-notify")]
    impl NotifyFileWatcher {
        /// Queue capacities come from [`WatchConfig::from_env`].
        pub fn new() -> io::Result<Self> {
            Self::with_config(WatchConfig::from_env()?)
        }

        pub fn with_config(config: WatchConfig) -> io::Result<Self> {
            let WatchConfig {
                raw_queue_capacity,
                events_queue_capacity,
            } = config.clamped();
            let (raw_tx, raw) = channel::bounded::<RawMessage>(raw_queue_capacity);
            let (out, events) = channel::bounded::<WatchMessage>(events_queue_capacity);
            let (stop, stop_rx) = channel::bounded::<()>(0);
            let lost = Arc::new(AtomicBool::new(false));

            let inner = {
                let lost = Arc::clone(&lost);
                notify::recommended_watcher(move |raw: RawMessage| offer(&raw_tx, &lost, raw))
                    .map_err(to_io)?
            };
            let drain = Drain {
                raw,
                out,
                stop: stop_rx,
                lost,
            };
            let drain = std::thread::Builder::new()
                .name("tessera-watch-drain".to_string())
                .spawn(move || drain.run())?;

            Ok(Self {
                inner,
                events,
                active: HashMap::new(),
                stop,
                drain: Some(drain),
            })
        }
    }

    #[cfg(feature = "watch-notify")]
    impl Drop for NotifyFileWatcher {
        fn drop(&mut self) {
            let _ = self.stop.send(());
            if let Some(Err(_)) = self.drain.take().map(|thread| thread.join()) {
                tracing::debug!(target = "tessera.vfs", "watch drain thread panicked");
            }
        }
    }

    #[cfg(feature = "watch-notify")]
    impl FileWatcher for NotifyFileWatcher {
        fn watch_path(&mut self, dir: &Path, mode: WatchMode) -> io::Result<()> {
            if let Some(current) = self.active.get(dir).copied() {
                if current == mode {
                    return Ok(());
                }
                // notify cannot switch the mode of a live watch.
                self.inner.unwatch(dir).map_err(to_io)?;
                self.active.remove(dir);
            }
            let recursive = match mode {
                WatchMode::Recursive => RecursiveMode::Recursive,
                WatchMode::NonRecursive => RecursiveMode::NonRecursive,
            };
            self.inner.watch(dir, recursive).map_err(to_io)?;
            self.active.insert(dir.to_path_buf(), mode);
            Ok(())
        }

        fn unwatch_path(&mut self, dir: &Path) -> io::Result<()> {
            match self.active.remove(dir) {
                Some(_) => self.inner.unwatch(dir).map_err(to_io),
                None => Ok(()),
            }
        }

        fn receiver(&self) -> &Receiver<WatchMessage> {
            &self.events
        }
    }

}
