//! Connection builder and handle.
//!
//! The [`ConnectionBuilder`] resolves the compositor endpoint and configures
//! the dispatch loop. The [`Connection`] owns the lifecycle:
//! 1. Open the socket and split it
//! 2. Spawn the writer task on the write half
//! 3. Register the display as object 1
//! 4. Spawn the dispatch engine on the read half
//!
//! # Example
//!
//! ```ignore
//! use wayland_wire::Connection;
//!
//! #[tokio::main]
//! async fn main() -> wayland_wire::Result<()> {
//!     let connection = Connection::builder().display("wayland-1").connect().await?;
//!     let serial = connection.roundtrip().await?;
//!     println!("compositor answered sync with {serial}");
//!     connection.close().await
//! }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::net::UnixStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::codec::Argument;
use crate::dispatch::{DispatchEngine, DispatchMode, DispatchRequest, DispatchState, StateCell};
use crate::error::{Result, WaylandError};
use crate::interfaces::Display;
use crate::object::{ObjectRegistry, Proxy, ProxyCore, ProxyId};
use crate::protocol::MessageBuilder;
use crate::transport::{self, EndpointConfig};
use crate::writer::{spawn_writer_task, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Resolve once `close` flips to `true` or its sender is gone.
pub(crate) async fn wait_closed(close: &mut watch::Receiver<bool>) {
    let _ = close.wait_for(|closed| *closed).await;
}

/// Builder for configuring and opening a [`Connection`].
pub struct ConnectionBuilder {
    endpoint: EndpointConfig,
    mode: DispatchMode,
    channel_capacity: usize,
    span: Option<tracing::Span>,
}

impl ConnectionBuilder {
    /// Create a builder that reads its endpoint from the environment.
    pub fn new() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            mode: DispatchMode::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            span: None,
        }
    }

    /// Use an explicit endpoint configuration. Unset fields still fall back
    /// to the environment.
    pub fn endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Socket name (or absolute path), instead of `WAYLAND_DISPLAY`.
    pub fn display(mut self, name: impl Into<String>) -> Self {
        self.endpoint.display = Some(name.into());
        self
    }

    /// Runtime directory, instead of `XDG_RUNTIME_DIR`.
    pub fn runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.endpoint.runtime_dir = Some(dir.into());
        self
    }

    /// How dispatch cycles are started.
    ///
    /// Default: [`DispatchMode::Triggered`]
    pub fn dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Capacity of the queue in front of the writer task.
    ///
    /// Default: 64
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Span the connection's tasks log under.
    ///
    /// Default: `info_span!("wayland", display = <name>)`
    pub fn span(mut self, span: tracing::Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Resolve the endpoint, open the socket and start the connection.
    ///
    /// # Errors
    ///
    /// - `Config` if the runtime directory is unknown
    /// - `Connection` if the socket cannot be opened
    pub async fn connect(self) -> Result<Connection> {
        self.connect_with(transport::env_lookup).await
    }

    async fn connect_with<F>(mut self, lookup: F) -> Result<Connection>
    where
        F: Fn(&str) -> Option<std::ffi::OsString>,
    {
        self.endpoint = self.endpoint.resolve_with(lookup);
        let path = self.endpoint.socket_path()?;
        let stream = transport::connect(&path).await?;
        self.connect_stream(stream)
    }

    /// Start a connection over an already-connected socket.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect_stream(self, stream: UnixStream) -> Result<Connection> {
        let span = self.span.unwrap_or_else(|| {
            tracing::info_span!("wayland", display = %self.endpoint.display_name())
        });

        let (reader, writer) = stream.into_split();
        let (close_tx, close_rx) = watch::channel(false);
        let (writer, writer_task) =
            spawn_writer_task(writer, self.channel_capacity, close_rx.clone(), span.clone());
        let (dispatch_tx, requests) = mpsc::channel(1);
        let state = Arc::new(StateCell::new());

        let inner = Arc::new_cyclic(|weak| {
            let display = Arc::new(Display::new(ProxyCore::new(
                ProxyId::DISPLAY,
                WeakConnection {
                    inner: weak.clone(),
                },
            )));
            let mut objects = ObjectRegistry::new();
            objects.insert(display.clone());

            ConnectionInner {
                objects: Mutex::new(objects),
                display,
                writer,
                dispatch_tx,
                close_tx,
                closed: AtomicBool::new(false),
                state: state.clone(),
                mode: self.mode,
                tasks: Mutex::new(Vec::new()),
                span: span.clone(),
            }
        });
        let connection = Connection { inner };

        let engine = DispatchEngine::new(
            reader,
            requests,
            close_rx,
            connection.downgrade(),
            self.mode,
            state,
        );
        let dispatch_task = engine.spawn(span.clone());
        connection.tasks().extend([writer_task, dispatch_task]);

        tracing::debug!(parent: &span, mode = ?self.mode, "connection established");
        Ok(connection)
    }
}

impl Default for ConnectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

struct ConnectionInner {
    /// Registry and id counter, behind one lock.
    objects: Mutex<ObjectRegistry>,
    display: Arc<Display>,
    writer: WriterHandle,
    dispatch_tx: mpsc::Sender<DispatchRequest>,
    close_tx: watch::Sender<bool>,
    closed: AtomicBool,
    state: Arc<StateCell>,
    mode: DispatchMode,
    tasks: Mutex<Vec<JoinHandle<Result<()>>>>,
    span: tracing::Span,
}

impl ConnectionInner {
    /// Flip to closed. Returns `false` if it already was.
    fn shut_down(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        self.close_tx.send_replace(true);
        self.state.set(DispatchState::Closed);
        if first {
            self.objects
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
        first
    }
}

/// An open connection to a compositor.
///
/// Cheap to clone; all clones share the socket, registry and tasks. The
/// connection stays open until [`close`](Connection::close) is called, a
/// fatal error occurs, or the last clone is dropped.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Create a new connection builder.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Connect using only the environment.
    pub async fn connect() -> Result<Self> {
        ConnectionBuilder::new().connect().await
    }

    /// The display object (id 1).
    pub fn display(&self) -> &Arc<Display> {
        &self.inner.display
    }

    /// Non-owning handle, as held by proxies.
    pub fn downgrade(&self) -> WeakConnection {
        WeakConnection {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Allocate the next id, build a proxy for it and register it.
    ///
    /// `build` runs under the registry lock and must not call back into the
    /// connection.
    ///
    /// # Errors
    ///
    /// - `ConnectionClosed` if the connection is closed
    /// - `IdSpaceExhausted` once client ids run out
    pub fn register<P, F>(&self, build: F) -> Result<Arc<P>>
    where
        P: Proxy,
        F: FnOnce(ProxyCore) -> P,
    {
        self.ensure_open()?;
        let connection = self.downgrade();
        let proxy = self
            .objects()
            .register(|id| build(ProxyCore::new(id, connection)))?;
        tracing::trace!(parent: &self.inner.span, id = %proxy.id(), interface = proxy.interface(), "object registered");
        Ok(proxy)
    }

    /// Remove an object from the registry. Unknown ids are ignored.
    pub fn unregister(&self, id: ProxyId) {
        if self.objects().unregister(id).is_some() {
            tracing::trace!(parent: &self.inner.span, %id, "object unregistered");
        }
    }

    /// Look up a live object.
    pub fn resolve(&self, id: ProxyId) -> Option<Arc<dyn Proxy>> {
        self.objects().resolve(id)
    }

    /// Encode and send one request.
    ///
    /// Arguments are encoded in order on a private buffer; the first failure
    /// aborts before anything is written.
    ///
    /// # Errors
    ///
    /// - `ConnectionClosed` if the connection is closed
    /// - `Protocol` if an argument cannot be encoded or the message is too big
    /// - the socket error if the write fails, after which the connection is
    ///   closed
    pub async fn send_request(
        &self,
        target: ProxyId,
        opcode: u16,
        args: Vec<Argument>,
    ) -> Result<()> {
        self.ensure_open()?;

        let mut builder = MessageBuilder::new(target, opcode);
        for arg in args {
            builder.put(arg)?;
        }
        let frame = builder.finish()?;
        tracing::trace!(parent: &self.inner.span, id = %target, opcode, size = frame.size(), "sending request");

        match self.inner.writer.send(frame).await {
            Ok(()) => Ok(()),
            Err(WaylandError::ConnectionClosed) => Err(WaylandError::ConnectionClosed),
            Err(e) => {
                tracing::error!(parent: &self.inner.span, "request write failed: {}", e);
                self.mark_closed();
                Err(e)
            }
        }
    }

    /// Pump exactly one incoming message through the dispatch engine.
    ///
    /// Resolves once the cycle is finished. A no-op in
    /// [`DispatchMode::FreeRunning`], where cycles run on their own.
    ///
    /// # Errors
    ///
    /// - `ConnectionClosed` if the connection is (or becomes) closed
    /// - the fatal error that ended the cycle; the connection is then closed
    pub async fn request_dispatch(&self) -> Result<()> {
        self.ensure_open()?;
        if self.inner.mode == DispatchMode::FreeRunning {
            return Ok(());
        }

        let (ack, done) = oneshot::channel();
        self.inner
            .dispatch_tx
            .send(DispatchRequest { ack })
            .await
            .map_err(|_| WaylandError::ConnectionClosed)?;
        done.await.map_err(|_| WaylandError::ConnectionClosed)?
    }

    /// Send `sync` and wait for its `done`, returning the callback data.
    ///
    /// In triggered mode this pumps dispatch until the callback fires, so
    /// every event queued before the reply is delivered first.
    pub async fn roundtrip(&self) -> Result<u32> {
        let callback = self.display().sync().await?;
        match self.inner.mode {
            DispatchMode::Triggered => loop {
                if let Some(data) = callback.done().try_recv() {
                    return Ok(data);
                }
                self.request_dispatch().await?;
            },
            DispatchMode::FreeRunning => {
                let mut close = self.inner.close_tx.subscribe();
                tokio::select! {
                    data = callback.done().recv() => data.ok_or(WaylandError::ConnectionClosed),
                    _ = wait_closed(&mut close) => Err(WaylandError::ConnectionClosed),
                }
            }
        }
    }

    /// Close the socket and stop the dispatch loop.
    ///
    /// Waits for the writer and dispatch tasks to finish. Afterwards every
    /// operation fails with `ConnectionClosed`.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` if the connection was already closed.
    pub async fn close(&self) -> Result<()> {
        if !self.inner.shut_down() {
            return Err(WaylandError::ConnectionClosed);
        }

        let tasks = std::mem::take(&mut *self.tasks());
        for task in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(parent: &self.inner.span, "task ended with error: {}", e)
                }
                Err(e) => tracing::warn!(parent: &self.inner.span, "task did not finish cleanly: {}", e),
            }
        }
        tracing::debug!(parent: &self.inner.span, "connection closed");
        Ok(())
    }

    /// Whether the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Current dispatch engine state.
    pub fn dispatch_state(&self) -> DispatchState {
        self.inner.state.get()
    }

    /// Dispatch mode this connection was opened with.
    pub fn dispatch_mode(&self) -> DispatchMode {
        self.inner.mode
    }

    /// Close after a fatal fault without waiting for the tasks.
    pub(crate) fn mark_closed(&self) {
        self.inner.shut_down();
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(WaylandError::ConnectionClosed)
        } else {
            Ok(())
        }
    }

    fn objects(&self) -> MutexGuard<'_, ObjectRegistry> {
        self.inner
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<Result<()>>>> {
        self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("mode", &self.inner.mode)
            .field("state", &self.dispatch_state())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Non-owning reference to a [`Connection`].
#[derive(Clone, Default)]
pub struct WeakConnection {
    inner: Weak<ConnectionInner>,
}

impl WeakConnection {
    /// Get the connection back.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` once every [`Connection`] handle is gone.
    pub fn upgrade(&self) -> Result<Connection> {
        self.inner
            .upgrade()
            .map(|inner| Connection { inner })
            .ok_or(WaylandError::ConnectionClosed)
    }
}

impl fmt::Debug for WeakConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakConnection")
    }
}
