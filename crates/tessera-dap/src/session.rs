use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tessera_vfs::{Emitter, Subscription};

use crate::error::{DapError, DapResult};
use crate::messages::{
    Capabilities, MemoryEventBody, ProtocolMessage, ReadMemoryArguments, ReadMemoryResponseBody,
    SourceArguments, SourceResponseBody, StackTraceArguments, StackTraceResponseBody,
    StoppedEventBody, WriteMemoryArguments, WriteMemoryResponseBody,
};

/// The request side of a debug adapter connection.
///
/// Implementations send `command` with `arguments` and block until the matching response
/// arrives. A successful response yields its `body` (`Value::Null` when absent); an unsuccessful
/// one must be reported as [`DapError::RequestFailed`].
pub trait DebugTransport: Send + Sync {
    fn session_id(&self) -> &str;

    fn request(&self, command: &str, arguments: Value) -> DapResult<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Inactive,
    Initializing,
    Stopped,
    Running,
}

#[derive(Debug)]
struct Tracked {
    state: SessionState,
    thread_id: Option<i64>,
    capabilities: Option<Capabilities>,
}

/// Tracks one debug session from the adapter messages it produces and issues the memory and
/// source requests the debug file systems need.
pub struct Session {
    transport: Arc<dyn DebugTransport>,
    tracked: Mutex<Tracked>,
    messages: Emitter<ProtocolMessage>,
    state_changed: Emitter<SessionState>,
    memory_invalidated: Emitter<MemoryEventBody>,
}

impl Session {
    pub fn new(transport: Arc<dyn DebugTransport>) -> Self {
        Self {
            transport,
            tracked: Mutex::new(Tracked {
                state: SessionState::Inactive,
                thread_id: None,
                capabilities: None,
            }),
            messages: Emitter::new(),
            state_changed: Emitter::new(),
            memory_invalidated: Emitter::new(),
        }
    }

    pub fn id(&self) -> &str {
        self.transport.session_id()
    }

    pub fn state(&self) -> SessionState {
        self.tracked.lock().state
    }

    /// Thread reported by the most recent `stopped` event.
    pub fn thread_id(&self) -> Option<i64> {
        self.tracked.lock().thread_id
    }

    /// Capabilities from the `initialize` response, once it has been seen.
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.tracked.lock().capabilities.clone()
    }

    pub fn supports_write_memory(&self) -> bool {
        self.tracked
            .lock()
            .capabilities
            .as_ref()
            .is_some_and(|caps| caps.supports_write_memory_request)
    }

    /// Updates the state and notifies listeners. Listeners are notified on every call, including
    /// when the state is unchanged.
    pub fn set_state(&self, state: SessionState) {
        self.tracked.lock().state = state;
        tracing::debug!(target = "tessera.dap", session = self.id(), ?state, "session state");
        self.state_changed.fire(&state);
    }

    pub fn will_start(&self) {
        self.set_state(SessionState::Initializing);
    }

    pub fn will_stop(&self) {
        self.set_state(SessionState::Inactive);
    }

    /// Feeds one adapter-to-client message through the tracker.
    pub fn handle_message(&self, message: &ProtocolMessage) {
        self.messages.fire(message);

        if message.is_response_to("initialize") {
            if message.success == Some(false) {
                return;
            }
            match decode_body::<Capabilities>(message) {
                Ok(caps) => self.tracked.lock().capabilities = Some(caps),
                Err(err) => {
                    tracing::debug!(target = "tessera.dap", error = %err, "ignoring capabilities")
                }
            }
            return;
        }

        if message.type_ != "event" {
            return;
        }
        match message.event.as_deref() {
            Some("stopped") => {
                let body = decode_body::<StoppedEventBody>(message).unwrap_or_default();
                self.tracked.lock().thread_id = body.thread_id;
                self.set_state(SessionState::Stopped);
            }
            Some("continued") => self.set_state(SessionState::Running),
            Some("memory") => match decode_body::<MemoryEventBody>(message) {
                Ok(body) => self.memory_invalidated.fire(&body),
                Err(err) => {
                    tracing::debug!(target = "tessera.dap", error = %err, "ignoring memory event")
                }
            },
            _ => {}
        }
    }

    /// Decodes a raw JSON message and feeds it through [`Session::handle_message`].
    pub fn handle_json(&self, message: Value) -> DapResult<()> {
        let message: ProtocolMessage =
            serde_json::from_value(message).map_err(|source| DapError::Payload {
                command: "message".to_string(),
                source,
            })?;
        self.handle_message(&message);
        Ok(())
    }

    pub fn on_message(&self, listener: impl Fn(&ProtocolMessage) + Send + Sync + 'static) -> Subscription {
        self.messages.subscribe(listener)
    }

    pub fn on_state_changed(&self, listener: impl Fn(&SessionState) + Send + Sync + 'static) -> Subscription {
        self.state_changed.subscribe(listener)
    }

    pub fn on_memory_invalidated(
        &self,
        listener: impl Fn(&MemoryEventBody) + Send + Sync + 'static,
    ) -> Subscription {
        self.memory_invalidated.subscribe(listener)
    }

    /// Sends a typed request and decodes its body. A missing body decodes as `null`.
    pub fn request<A, R>(&self, command: &str, arguments: &A) -> DapResult<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        let arguments = serde_json::to_value(arguments).map_err(|source| DapError::Payload {
            command: command.to_string(),
            source,
        })?;
        let body = self.transport.request(command, arguments)?;
        serde_json::from_value(body).map_err(|source| DapError::Payload {
            command: command.to_string(),
            source,
        })
    }

    /// Reads up to `count` bytes at `offset` from `memory_reference`.
    pub fn read_memory(&self, memory_reference: &str, offset: u64, count: usize) -> DapResult<Vec<u8>> {
        let body: Option<ReadMemoryResponseBody> = self.request(
            "readMemory",
            &ReadMemoryArguments {
                memory_reference: memory_reference.to_string(),
                offset: Some(protocol_offset(offset)?),
                count: count as u64,
            },
        )?;
        match body.and_then(|body| body.data) {
            Some(data) => Ok(general_purpose::STANDARD.decode(data)?),
            None => Ok(Vec::new()),
        }
    }

    /// Writes `data` at `offset` into `memory_reference`, returning the number of bytes the
    /// adapter reports as written.
    pub fn write_memory(&self, memory_reference: &str, offset: u64, data: &[u8]) -> DapResult<usize> {
        let body: Option<WriteMemoryResponseBody> = self.request(
            "writeMemory",
            &WriteMemoryArguments {
                memory_reference: memory_reference.to_string(),
                offset: Some(protocol_offset(offset)?),
                allow_partial: None,
                data: general_purpose::STANDARD.encode(data),
            },
        )?;
        // Adapters that omit `bytesWritten` wrote everything.
        Ok(body
            .and_then(|body| body.bytes_written)
            .map_or(data.len(), |written| written as usize))
    }

    /// Fetches the contents of an adapter-provided source.
    pub fn source(&self, source_reference: i64) -> DapResult<String> {
        let body: SourceResponseBody =
            self.request("source", &SourceArguments { source_reference })?;
        Ok(body.content)
    }

    /// Id of the topmost frame of the stopped thread, if the session is stopped.
    pub fn top_frame_id(&self) -> DapResult<Option<i64>> {
        let thread_id = {
            let tracked = self.tracked.lock();
            match (tracked.state, tracked.thread_id) {
                (SessionState::Stopped, Some(thread_id)) => thread_id,
                _ => return Ok(None),
            }
        };
        let body: Option<StackTraceResponseBody> = self.request(
            "stackTrace",
            &StackTraceArguments {
                thread_id,
                levels: Some(1),
            },
        )?;
        Ok(body.and_then(|body| body.stack_frames.first().map(|frame| frame.id)))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("tracked", &*self.tracked.lock())
            .finish()
    }
}

fn decode_body<T: DeserializeOwned>(message: &ProtocolMessage) -> DapResult<T> {
    let body = message.body.clone().unwrap_or(Value::Null);
    serde_json::from_value(body).map_err(|source| DapError::Payload {
        command: message
            .command
            .clone()
            .or_else(|| message.event.clone())
            .unwrap_or_default(),
        source,
    })
}

fn protocol_offset(offset: u64) -> DapResult<i64> {
    i64::try_from(offset).map_err(|_| DapError::OffsetOutOfRange(offset))
}

/// All live debug sessions, keyed by session id.
#[derive(Default)]
pub struct Sessions {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    created: Emitter<Arc<Session>>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a session over `transport`, replacing any session with the same id.
    pub fn create(&self, transport: Arc<dyn DebugTransport>) -> Arc<Session> {
        let session = Arc::new(Session::new(transport));
        let previous = self
            .sessions
            .write()
            .insert(session.id().to_string(), Arc::clone(&session));
        if previous.is_some() {
            tracing::debug!(target = "tessera.dap", session = session.id(), "replacing session");
        }
        self.created.fire(&session);
        session
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Looks up `id`, failing with [`DapError::UnknownSession`].
    pub fn require(&self, id: &str) -> DapResult<Arc<Session>> {
        self.get(id)
            .ok_or_else(|| DapError::UnknownSession(id.to_string()))
    }

    /// Stops tracking a session once its adapter has exited.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.write().remove(id)
    }

    pub fn on_created(&self, listener: impl Fn(&Arc<Session>) + Send + Sync + 'static) -> Subscription {
        self.created.subscribe(listener)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl fmt::Debug for Sessions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<String> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        f.debug_struct("Sessions").field("ids", &ids).finish()
    }
}
