use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{Backend, ChangeSink, FileStat, WatchOptions};
use crate::error::{Error, Result};
use crate::event::Subscription;
use crate::file::File;
use crate::local::LocalBackend;
use crate::uri::Uri;

/// Maps URI schemes to the [`Backend`] serving them.
#[derive(Default)]
pub struct SchemeRegistry {
    backends: RwLock<HashMap<String, Arc<dyn Backend>>>,
}

impl SchemeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the local file system registered under `file`.
    pub fn with_local() -> Self {
        let registry = Self::new();
        registry.register(LocalBackend::SCHEME, Arc::new(LocalBackend::new()));
        registry
    }

    /// Registers `backend` for `scheme`, returning the backend it replaced.
    pub fn register(
        &self,
        scheme: impl Into<String>,
        backend: Arc<dyn Backend>,
    ) -> Option<Arc<dyn Backend>> {
        let scheme = scheme.into();
        tracing::debug!(target = "tessera.vfs", scheme = %scheme, "registering file system");
        self.backends.write().insert(scheme, backend)
    }

    /// Registers `backend` for as long as the returned subscription is alive.
    pub fn register_scoped(
        self: &Arc<Self>,
        scheme: impl Into<String>,
        backend: Arc<dyn Backend>,
    ) -> Subscription {
        let scheme = scheme.into();
        self.register(scheme.clone(), backend);
        let registry = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.unregister(&scheme);
            }
        })
    }

    pub fn unregister(&self, scheme: &str) -> Option<Arc<dyn Backend>> {
        tracing::debug!(target = "tessera.vfs", scheme, "unregistering file system");
        self.backends.write().remove(scheme)
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.backends.read().contains_key(scheme)
    }

    pub fn backend(&self, scheme: &str) -> Result<Arc<dyn Backend>> {
        self.backends
            .read()
            .get(scheme)
            .cloned()
            .ok_or_else(|| Error::SchemeNotFound(scheme.to_string()))
    }

    pub fn open_file(&self, uri: &Uri) -> Result<Box<dyn File>> {
        self.backend(uri.scheme())?.open_file(self, uri)
    }

    pub fn read_file(&self, uri: &Uri) -> Result<Vec<u8>> {
        self.backend(uri.scheme())?.read_file(self, uri)
    }

    pub fn write_file(&self, uri: &Uri, content: &[u8]) -> Result<()> {
        self.backend(uri.scheme())?.write_file(self, uri, content)
    }

    pub fn stat(&self, uri: &Uri) -> Result<FileStat> {
        self.backend(uri.scheme())?.stat(self, uri)
    }

    pub fn watch(&self, uri: &Uri, options: &WatchOptions, sink: ChangeSink) -> Result<Subscription> {
        self.backend(uri.scheme())?.watch(self, uri, options, sink)
    }
}

impl fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<String> = self.backends.read().keys().cloned().collect();
        schemes.sort();
        f.debug_struct("SchemeRegistry")
            .field("schemes", &schemes)
            .finish()
    }
}
