//! Multiplexes per-file, per-pattern and per-subtree subscriptions onto native watches.
//!
//! A pattern is classified when it is registered:
//!
//! - **recursive**: contains `**`, or its directory part holds a wildcard. One recursive native
//!   watch is kept on the literal directory prefix.
//! - **directory glob**: only the file name holds wildcards. The directory is watched
//!   non-recursively and the file name is matched against changes in it.
//! - **single file**: a literal path. Its parent directory is watched non-recursively.
//!
//! Native watches are recomputed from the subscription tables after every mutation. Recursive
//! roots never overlap and no directory watch exists beneath a recursive root.
//!
//! Renames are detected heuristically: native watchers report a rename as a delete plus a create,
//! so within one burst creations are correlated with earlier paths through their modification
//! time before deletions are delivered.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crossbeam_channel as channel;

use crate::change::{Change, FileChange};
use crate::error::Result;
use crate::glob::{contains_glob, split_glob_base, Glob};
use crate::watch::{FileWatcher, WatchEvent, WatchMessage, WatchMode};

/// Source of file modification times used for rename correlation.
pub trait ModifiedTimes: Send + Sync {
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;
}

/// Reads modification times from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalModifiedTimes;

impl ModifiedTimes for LocalModifiedTimes {
    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        std::fs::metadata(path)?.modified()
    }
}

pub type ChangeCallback = Arc<dyn Fn(&Path, Change) + Send + Sync>;

/// Identifies one callback registered through [`WatchEngine::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Clone)]
struct Entry {
    id: SubscriptionId,
    matcher: Option<Glob>,
    callback: ChangeCallback,
}

impl Entry {
    fn matches(&self, candidate: &Path) -> bool {
        self.matcher
            .as_ref()
            .map_or(true, |matcher| matcher.is_match_path(candidate))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    Recursive { root: PathBuf },
    DirectoryGlob { dir: PathBuf, basename: String },
    SingleFile { path: PathBuf },
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

/// `""` means the pattern had no directory part.
fn literal_dir(dir: &str, pattern: &str) -> PathBuf {
    if !dir.is_empty() {
        PathBuf::from(dir)
    } else if pattern.starts_with(is_separator) {
        PathBuf::from(&pattern[..1])
    } else {
        PathBuf::from(".")
    }
}

fn classify(pattern: &str) -> Scope {
    let (dir, basename) = match pattern.rfind(is_separator) {
        Some(idx) => (&pattern[..idx], &pattern[idx + 1..]),
        None => ("", pattern),
    };

    if pattern.contains("**") || contains_glob(dir) {
        let base = split_glob_base(pattern).map_or(dir, |(base, _)| base);
        return Scope::Recursive {
            root: literal_dir(base, pattern),
        };
    }

    if contains_glob(basename) {
        return Scope::DirectoryGlob {
            dir: literal_dir(dir, pattern),
            basename: basename.to_string(),
        };
    }

    Scope::SingleFile {
        path: PathBuf::from(pattern),
    }
}

/// Drops every root that lies beneath (or equals) another root.
fn minimal_roots<'a>(roots: impl Iterator<Item = &'a PathBuf>) -> HashSet<PathBuf> {
    let mut sorted: Vec<&PathBuf> = roots.collect();
    sorted.sort_by_key(|root| root.components().count());

    let mut kept: Vec<PathBuf> = Vec::new();
    for root in sorted {
        if !kept.iter().any(|existing| root.starts_with(existing)) {
            kept.push(root.clone());
        }
    }
    kept.into_iter().collect()
}

fn to_change(change: &FileChange) -> Change {
    match change {
        FileChange::Created { .. } => Change::Created,
        FileChange::Modified { .. } => Change::Changed,
        FileChange::Deleted { .. } => Change::Deleted,
    }
}

fn remove_from(table: &mut HashMap<PathBuf, Vec<Entry>>, key: &Path, id: SubscriptionId) -> bool {
    let Some(entries) = table.get_mut(key) else {
        return false;
    };
    let Some(idx) = entries.iter().position(|entry| entry.id == id) else {
        return false;
    };
    entries.remove(idx);
    if entries.is_empty() {
        table.remove(key);
    }
    true
}

fn fire(callbacks: Vec<ChangeCallback>, path: &Path, change: Change) {
    for callback in callbacks {
        callback(path, change);
    }
}

/// Synthesizes change notifications for path patterns on top of a [`FileWatcher`].
pub struct WatchEngine<W: FileWatcher> {
    watcher: W,
    mtimes: Arc<dyn ModifiedTimes>,
    next_id: u64,

    files: HashMap<PathBuf, Vec<Entry>>,
    globs: HashMap<PathBuf, Vec<Entry>>,
    recursive: HashMap<PathBuf, Vec<Entry>>,

    watched_dirs: HashSet<PathBuf>,
    watched_roots: HashSet<PathBuf>,

    /// Last known path for each modification time.
    renames: HashMap<SystemTime, PathBuf>,
    /// The key each watched file currently holds in `renames`.
    recorded: HashMap<PathBuf, SystemTime>,
}

impl<W: FileWatcher> WatchEngine<W> {
    pub fn new(watcher: W, mtimes: Arc<dyn ModifiedTimes>) -> Self {
        Self {
            watcher,
            mtimes,
            next_id: 0,
            files: HashMap::new(),
            globs: HashMap::new(),
            recursive: HashMap::new(),
            watched_dirs: HashSet::new(),
            watched_roots: HashSet::new(),
            renames: HashMap::new(),
            recorded: HashMap::new(),
        }
    }

    /// An engine reading modification times from the local file system.
    pub fn with_local_mtimes(watcher: W) -> Self {
        Self::new(watcher, Arc::new(LocalModifiedTimes))
    }

    pub fn watcher(&self) -> &W {
        &self.watcher
    }

    pub fn watcher_mut(&mut self) -> &mut W {
        &mut self.watcher
    }

    /// Number of registered callbacks across all patterns.
    pub fn subscription_count(&self) -> usize {
        [&self.files, &self.globs, &self.recursive]
            .iter()
            .flat_map(|table| table.values())
            .map(Vec::len)
            .sum()
    }

    /// Registers `callback` for changes matching `pattern`.
    ///
    /// Fails without registering anything if the pattern does not compile or the native watch it
    /// needs cannot be created.
    pub fn on_change(
        &mut self,
        pattern: &str,
        callback: impl Fn(&Path, Change) + Send + Sync + 'static,
    ) -> Result<SubscriptionId> {
        let scope = classify(pattern);
        let matcher = match &scope {
            Scope::Recursive { .. } => Some(Glob::new(pattern)?),
            Scope::DirectoryGlob { basename, .. } => Some(Glob::new(basename)?),
            Scope::SingleFile { .. } => None,
        };

        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        let entry = Entry {
            id,
            matcher,
            callback: Arc::new(callback),
        };

        match &scope {
            Scope::Recursive { root } => {
                self.recursive.entry(root.clone()).or_default().push(entry)
            }
            Scope::DirectoryGlob { dir, .. } => {
                self.globs.entry(dir.clone()).or_default().push(entry)
            }
            Scope::SingleFile { path } => {
                self.files.entry(path.clone()).or_default().push(entry)
            }
        }

        if let Err(err) = self.reconcile() {
            self.remove_entry(&scope, id);
            if let Err(err) = self.reconcile() {
                tracing::warn!(
                    target = "tessera.vfs",
                    error = %err,
                    "failed to restore native watches after a rejected subscription"
                );
            }
            return Err(err.into());
        }
        if let Scope::SingleFile { path } = &scope {
            self.seed_mtime(path);
        }

        tracing::debug!(target = "tessera.vfs", pattern, id = id.0, "registered change callback");
        Ok(id)
    }

    /// Removes one callback previously registered for `pattern`.
    ///
    /// A single-file callback that followed a rename is still found under the pattern it was
    /// registered with. Returns `false` if no such callback exists. Native watches nobody needs any
    /// more are disposed.
    pub fn remove_on_change(&mut self, pattern: &str, id: SubscriptionId) -> bool {
        let scope = classify(pattern);
        if !self.remove_entry(&scope, id) && !self.remove_by_id(id) {
            return false;
        }
        if let Err(err) = self.reconcile() {
            tracing::warn!(
                target = "tessera.vfs",
                pattern,
                error = %err,
                "failed to update native watches after removing a callback"
            );
        }
        true
    }

    /// Dispatches everything currently queued on the native watcher as one burst.
    ///
    /// Returns the number of native messages consumed.
    pub fn pump(&mut self) -> io::Result<usize> {
        let mut burst = Vec::new();
        loop {
            match self.watcher.receiver().try_recv() {
                Ok(msg) => burst.push(msg),
                Err(channel::TryRecvError::Empty) => break,
                Err(channel::TryRecvError::Disconnected) => {
                    if burst.is_empty() {
                        return Err(io::Error::new(
                            io::ErrorKind::BrokenPipe,
                            "file watcher disconnected",
                        ));
                    }
                    break;
                }
            }
        }
        let count = burst.len();
        self.handle_burst(burst);
        Ok(count)
    }

    /// Blocks dispatching native events until `stop` receives a message or disconnects.
    pub fn run(&mut self, stop: &channel::Receiver<()>) -> io::Result<()> {
        let events = self.watcher.receiver().clone();
        loop {
            channel::select! {
                recv(stop) -> _ => return Ok(()),
                recv(events) -> msg => {
                    let Ok(first) = msg else {
                        return Err(io::Error::new(
                            io::ErrorKind::BrokenPipe,
                            "file watcher disconnected",
                        ));
                    };
                    let mut burst = vec![first];
                    burst.extend(events.try_iter());
                    self.handle_burst(burst);
                }
            }
        }
    }

    /// Unwatches every native watch and drops all subscriptions.
    pub fn shutdown(&mut self) {
        self.files.clear();
        self.globs.clear();
        self.recursive.clear();
        self.renames.clear();
        self.recorded.clear();
        let dirs: Vec<PathBuf> = self.watched_dirs.drain().collect();
        let roots: Vec<PathBuf> = self.watched_roots.drain().collect();
        for path in dirs.iter().chain(roots.iter()) {
            self.unwatch(path);
        }
    }

    fn handle_burst(&mut self, burst: Vec<WatchMessage>) {
        let mut changes = Vec::new();
        let mut rescan = false;
        for msg in burst {
            match msg {
                Ok(WatchEvent::Changes(batch)) => changes.extend(batch),
                Ok(WatchEvent::Rescan) => rescan = true,
                Err(err) => {
                    tracing::warn!(target = "tessera.vfs", error = %err, "file watcher error");
                }
            }
        }
        if !changes.is_empty() {
            self.dispatch(&changes);
        }
        if rescan {
            self.rescan();
        }
    }

    /// Fires `Changed` for every single-file subscription.
    pub fn rescan(&mut self) {
        tracing::debug!(target = "tessera.vfs", "rescanning watched files");
        let snapshot: Vec<(PathBuf, Vec<ChangeCallback>)> = self
            .files
            .iter()
            .map(|(path, entries)| {
                (
                    path.clone(),
                    entries.iter().map(|e| e.callback.clone()).collect(),
                )
            })
            .collect();
        for (path, callbacks) in snapshot {
            fire(callbacks, &path, Change::Changed);
        }
    }

    /// Dispatches one burst of native changes.
    pub fn dispatch(&mut self, changes: &[FileChange]) {
        let mut seen = HashSet::new();
        let mut pending_creates: VecDeque<PathBuf> = VecDeque::new();
        let mut deferred_deletes: Vec<(usize, PathBuf)> = Vec::new();
        let mut last_created: HashMap<&Path, usize> = HashMap::new();

        for (idx, change) in changes.iter().enumerate() {
            if !seen.insert(change) {
                continue;
            }
            let path = change.path();
            if self.recursive.keys().any(|root| path.starts_with(root)) {
                self.dispatch_subtree(change);
                continue;
            }

            match change {
                FileChange::Modified { path } => {
                    if self.files.contains_key(path) && self.mtime_changed(path) {
                        fire(self.file_callbacks(path), path, Change::Changed);
                    }
                }
                FileChange::Created { path } => {
                    last_created.insert(path, idx);
                    pending_creates.push_back(path.clone());
                }
                FileChange::Deleted { path } => deferred_deletes.push((idx, path.clone())),
            }
            fire(self.glob_callbacks(path), path, to_change(change));
        }

        while let Some(path) = pending_creates.pop_front() {
            self.correlate_created(&path);
        }
        for (idx, path) in deferred_deletes {
            // Recreated later in the burst, so the file exists.
            if last_created
                .get(path.as_path())
                .is_some_and(|created| *created > idx)
            {
                continue;
            }
            fire(self.file_callbacks(&path), &path, Change::Deleted);
        }
    }

    fn dispatch_subtree(&self, change: &FileChange) {
        let path = change.path();
        let kind = to_change(change);
        let mut callbacks = self.file_callbacks(path);
        callbacks.extend(self.glob_callbacks(path));
        for (root, entries) in &self.recursive {
            if !path.starts_with(root) {
                continue;
            }
            callbacks.extend(
                entries
                    .iter()
                    .filter(|entry| entry.matches(path))
                    .map(|entry| entry.callback.clone()),
            );
        }
        fire(callbacks, path, kind);
    }

    fn correlate_created(&mut self, path: &Path) {
        let mtime = match self.mtimes.modified(path) {
            Ok(mtime) => Some(mtime),
            Err(err) => {
                tracing::debug!(
                    target = "tessera.vfs",
                    path = %path.display(),
                    error = %err,
                    "failed to read modification time of created file"
                );
                None
            }
        };

        let prior = mtime
            .and_then(|mtime| self.renames.get(&mtime))
            .filter(|prior| prior.as_path() != path)
            .cloned();

        if let (Some(prior), Some(mtime)) = (prior, mtime) {
            if let Some(moved) = self.files.remove(&prior) {
                let own = self.file_callbacks(path);
                let moved_ids: Vec<SubscriptionId> = moved.iter().map(|e| e.id).collect();
                let moved_callbacks: Vec<ChangeCallback> =
                    moved.iter().map(|e| e.callback.clone()).collect();
                self.files.entry(path.to_path_buf()).or_default().extend(moved);

                if let Err(err) = self.reconcile() {
                    // Without a watch on the new directory the callbacks stay on the old path,
                    // which then reports a plain deletion.
                    tracing::warn!(
                        target = "tessera.vfs",
                        from = %prior.display(),
                        to = %path.display(),
                        error = %err,
                        "failed to watch the directory of a renamed file"
                    );
                    self.undo_rename(&prior, path, &moved_ids);
                    fire(own, path, Change::Created);
                    return;
                }

                tracing::debug!(
                    target = "tessera.vfs",
                    from = %prior.display(),
                    to = %path.display(),
                    "correlated rename"
                );
                self.record_mtime(path, mtime);
                fire(moved_callbacks, path, Change::Renamed);
                fire(own, path, Change::Created);
                return;
            }
        }

        if self.files.contains_key(path) {
            if let Some(mtime) = mtime {
                self.record_mtime(path, mtime);
            }
        }
        fire(self.file_callbacks(path), path, Change::Created);
    }

    /// Puts the callbacks of a rename back on `prior`.
    fn undo_rename(&mut self, prior: &Path, path: &Path, moved: &[SubscriptionId]) {
        let (back, own): (Vec<Entry>, Vec<Entry>) = self
            .files
            .remove(path)
            .unwrap_or_default()
            .into_iter()
            .partition(|entry| moved.contains(&entry.id));
        if !own.is_empty() {
            self.files.insert(path.to_path_buf(), own);
        }
        self.files.insert(prior.to_path_buf(), back);
        if let Err(err) = self.reconcile() {
            tracing::warn!(
                target = "tessera.vfs",
                path = %prior.display(),
                error = %err,
                "failed to restore native watches after an unwatchable rename"
            );
        }
    }

    /// Records the current mtime of `path`; `false` when it is the one already on record.
    fn mtime_changed(&mut self, path: &Path) -> bool {
        match self.mtimes.modified(path) {
            Ok(mtime) => {
                if self.recorded.get(path) == Some(&mtime) {
                    return false;
                }
                self.record_mtime(path, mtime);
                true
            }
            Err(err) => {
                tracing::debug!(
                    target = "tessera.vfs",
                    path = %path.display(),
                    error = %err,
                    "failed to read modification time of changed file"
                );
                true
            }
        }
    }

    fn seed_mtime(&mut self, path: &Path) {
        match self.mtimes.modified(path) {
            Ok(mtime) => self.record_mtime(path, mtime),
            Err(err) => tracing::debug!(
                target = "tessera.vfs",
                path = %path.display(),
                error = %err,
                "failed to read modification time of watched file"
            ),
        }
    }

    /// Makes `mtime` the only rename key held by `path`.
    fn record_mtime(&mut self, path: &Path, mtime: SystemTime) {
        if let Some(old) = self.recorded.insert(path.to_path_buf(), mtime) {
            if old != mtime && self.renames.get(&old).is_some_and(|known| known == path) {
                self.renames.remove(&old);
            }
        }
        if let Some(displaced) = self.renames.insert(mtime, path.to_path_buf()) {
            if displaced != path && self.recorded.get(&displaced) == Some(&mtime) {
                self.recorded.remove(&displaced);
            }
        }
    }

    fn forget_mtime(&mut self, path: &Path) {
        if let Some(mtime) = self.recorded.remove(path) {
            if self.renames.get(&mtime).is_some_and(|known| known == path) {
                self.renames.remove(&mtime);
            }
        }
    }

    fn file_callbacks(&self, path: &Path) -> Vec<ChangeCallback> {
        self.files
            .get(path)
            .map(|entries| entries.iter().map(|e| e.callback.clone()).collect())
            .unwrap_or_default()
    }

    fn glob_callbacks(&self, path: &Path) -> Vec<ChangeCallback> {
        let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
            return Vec::new();
        };
        let Some(entries) = self.globs.get(dir) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter(|entry| entry.matches(Path::new(name)))
            .map(|entry| entry.callback.clone())
            .collect()
    }

    fn remove_entry(&mut self, scope: &Scope, id: SubscriptionId) -> bool {
        let (table, key) = match scope {
            Scope::Recursive { root } => (&mut self.recursive, root),
            Scope::DirectoryGlob { dir, .. } => (&mut self.globs, dir),
            Scope::SingleFile { path } => (&mut self.files, path),
        };
        if !remove_from(table, key, id) {
            return false;
        }
        if let Scope::SingleFile { path } = scope {
            if !self.files.contains_key(path) {
                self.forget_mtime(path);
            }
        }
        true
    }

    /// Finds `id` wherever it lives now; renames move single-file callbacks to new keys.
    fn remove_by_id(&mut self, id: SubscriptionId) -> bool {
        let owner = |table: &HashMap<PathBuf, Vec<Entry>>| {
            table
                .iter()
                .find(|(_, entries)| entries.iter().any(|entry| entry.id == id))
                .map(|(key, _)| key.clone())
        };
        if let Some(path) = owner(&self.files) {
            return self.remove_entry(&Scope::SingleFile { path }, id);
        }
        if let Some(dir) = owner(&self.globs) {
            return remove_from(&mut self.globs, &dir, id);
        }
        if let Some(root) = owner(&self.recursive) {
            return remove_from(&mut self.recursive, &root, id);
        }
        false
    }

    /// Brings native watches in line with the subscription tables.
    ///
    /// Missing watches are created before stale ones are removed, so coverage never lapses.
    fn reconcile(&mut self) -> io::Result<()> {
        let roots = minimal_roots(self.recursive.keys());
        let dirs: HashSet<PathBuf> = self
            .globs
            .keys()
            .cloned()
            .chain(
                self.files
                    .keys()
                    .filter_map(|path| path.parent().map(Path::to_path_buf)),
            )
            .filter(|dir| !roots.iter().any(|root| dir.starts_with(root)))
            .collect();

        for root in &roots {
            if self.watched_roots.contains(root) {
                continue;
            }
            self.watcher.watch_path(root, WatchMode::Recursive)?;
            tracing::debug!(target = "tessera.vfs", root = %root.display(), "watching subtree");
            self.watched_dirs.remove(root);
            self.watched_roots.insert(root.clone());
        }
        for dir in &dirs {
            if self.watched_dirs.contains(dir) {
                continue;
            }
            self.watcher.watch_path(dir, WatchMode::NonRecursive)?;
            tracing::debug!(target = "tessera.vfs", dir = %dir.display(), "watching directory");
            self.watched_roots.remove(dir);
            self.watched_dirs.insert(dir.clone());
        }

        let stale: Vec<PathBuf> = self
            .watched_dirs
            .iter()
            .filter(|dir| !dirs.contains(*dir))
            .chain(self.watched_roots.iter().filter(|root| !roots.contains(*root)))
            .cloned()
            .collect();
        for path in stale {
            self.watched_dirs.remove(&path);
            self.watched_roots.remove(&path);
            self.unwatch(&path);
        }
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) {
        match self.watcher.unwatch_path(path) {
            Ok(()) => {
                tracing::debug!(target = "tessera.vfs", path = %path.display(), "disposed native watch")
            }
            Err(err) => tracing::warn!(
                target = "tessera.vfs",
                path = %path.display(),
                error = %err,
                "failed to dispose native watch"
            ),
        }
    }
}

impl<W: FileWatcher> Drop for WatchEngine<W> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
