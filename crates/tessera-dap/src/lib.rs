//! File systems backed by a live debug session.
//!
//! - [`PagedMemoryBackend`] (`debug-memory`) exposes debuggee memory through the Debug Adapter
//!   Protocol `readMemory` / `writeMemory` requests.
//! - [`DebugSourceBackend`] (`debug-source`) serves sources that only the adapter can produce.
//! - [`Sessions`] tracks each session's run state and capabilities from adapter traffic; both
//!   backends resolve the session named by a URI's authority through it.

pub mod config;
mod error;
pub mod messages;
mod memory_fs;
mod session;
mod source_fs;

pub use config::MemoryConfig;
pub use error::{DapError, DapResult};
pub use memory_fs::{MemoryFile, MemoryLocation, PagedMemoryBackend};
pub use session::{DebugTransport, Session, SessionState, Sessions};
pub use source_fs::DebugSourceBackend;
