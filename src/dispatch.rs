//! Dispatch engine: reads one event at a time and delivers it to its proxy.
//!
//! # State machine
//!
//! ```text
//!            trigger / free-running
//!   Idle ────────────────────────► Reading
//!    ▲  ◄──── transient read error ───┘ │ frame read
//!    │                                  ▼
//!    └────────── delivered/dropped ── Delivering
//!
//!   any state ── close signal / fatal error ──► Closed
//! ```
//!
//! The engine runs as one task for the life of the connection. In
//! [`DispatchMode::Triggered`] each cycle waits for a request from
//! [`Connection::request_dispatch`], which receives the cycle's outcome; in
//! [`DispatchMode::FreeRunning`] cycles follow each other immediately.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::net::unix::OwnedReadHalf;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::codec::ArgKind;
use crate::connection::{wait_closed, Connection, WeakConnection};
use crate::error::{ErrorKind, Result, WaylandError};
use crate::object::{EventArg, EventArgs};
use crate::protocol::{is_transient, read_message, Message};

/// What starts a dispatch cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Each cycle runs on an explicit [`Connection::request_dispatch`].
    #[default]
    Triggered,
    /// Cycles run back to back; events flow without being pumped.
    FreeRunning,
}

/// Where the dispatch engine currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DispatchState {
    /// Waiting for the next trigger.
    Idle = 0,
    /// Waiting for a whole frame from the socket.
    Reading = 1,
    /// Decoding and handing an event to its object.
    Delivering = 2,
    /// Terminal.
    Closed = 3,
}

impl DispatchState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => DispatchState::Idle,
            1 => DispatchState::Reading,
            2 => DispatchState::Delivering,
            _ => DispatchState::Closed,
        }
    }
}

/// Shared dispatch state. Once `Closed`, it stays `Closed`.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(DispatchState::Idle as u8))
    }

    pub(crate) fn get(&self) -> DispatchState {
        DispatchState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: DispatchState) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != DispatchState::Closed as u8).then_some(state as u8)
            });
    }
}

/// One caller asking for one cycle.
pub(crate) struct DispatchRequest {
    pub(crate) ack: oneshot::Sender<Result<()>>,
}

enum Cycle {
    Continue,
    Closed,
}

/// The read/deliver loop. Owns the socket's read half.
pub(crate) struct DispatchEngine {
    reader: OwnedReadHalf,
    requests: mpsc::Receiver<DispatchRequest>,
    close: watch::Receiver<bool>,
    connection: WeakConnection,
    mode: DispatchMode,
    state: Arc<StateCell>,
}

impl DispatchEngine {
    pub(crate) fn new(
        reader: OwnedReadHalf,
        requests: mpsc::Receiver<DispatchRequest>,
        close: watch::Receiver<bool>,
        connection: WeakConnection,
        mode: DispatchMode,
        state: Arc<StateCell>,
    ) -> Self {
        Self {
            reader,
            requests,
            close,
            connection,
            mode,
            state,
        }
    }

    pub(crate) fn spawn(self, span: tracing::Span) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run().instrument(span))
    }

    async fn run(mut self) -> Result<()> {
        tracing::debug!(mode = ?self.mode, "dispatch loop started");
        let result = match self.mode {
            DispatchMode::Triggered => self.run_triggered().await,
            DispatchMode::FreeRunning => self.run_free().await,
        };
        self.state.set(DispatchState::Closed);

        match &result {
            Ok(()) => tracing::debug!("dispatch loop stopped"),
            Err(e) => {
                tracing::error!("dispatch loop failed, closing connection: {}", e);
                self.shut_down();
            }
        }
        result
    }

    /// Move the whole connection to Closed after a fatal error.
    fn shut_down(&self) {
        self.state.set(DispatchState::Closed);
        if let Ok(connection) = self.connection.upgrade() {
            connection.mark_closed();
        }
    }

    async fn run_triggered(&mut self) -> Result<()> {
        loop {
            let request = tokio::select! {
                biased;
                _ = wait_closed(&mut self.close) => return Ok(()),
                request = self.requests.recv() => match request {
                    Some(request) => request,
                    None => return Ok(()),
                },
            };

            match self.cycle().await {
                Ok(Cycle::Continue) => {
                    let _ = request.ack.send(Ok(()));
                }
                Ok(Cycle::Closed) => {
                    let _ = request.ack.send(Err(WaylandError::ConnectionClosed));
                    return Ok(());
                }
                Err(e) => {
                    let summary = summarize(&e);
                    // Closed before the caller hears about it.
                    self.shut_down();
                    let _ = request.ack.send(Err(e));
                    return Err(summary);
                }
            }
        }
    }

    async fn run_free(&mut self) -> Result<()> {
        loop {
            if let Cycle::Closed = self.cycle().await? {
                return Ok(());
            }
        }
    }

    /// Idle -> Reading -> Delivering -> Idle, once.
    async fn cycle(&mut self) -> Result<Cycle> {
        self.state.set(DispatchState::Reading);
        let read = tokio::select! {
            biased;
            _ = wait_closed(&mut self.close) => return Ok(Cycle::Closed),
            read = read_message(self.reader.as_ref()) => read,
        };

        let message = match read {
            Ok(message) => message,
            Err(e) if is_transient(&e) => {
                tracing::debug!("transient read error: {}", e);
                self.state.set(DispatchState::Idle);
                return Ok(Cycle::Continue);
            }
            Err(e) => return Err(e),
        };

        self.state.set(DispatchState::Delivering);
        let Ok(connection) = self.connection.upgrade() else {
            return Ok(Cycle::Closed);
        };
        deliver(&connection, message)?;
        self.state.set(DispatchState::Idle);
        Ok(Cycle::Continue)
    }
}

/// Resolve the target and hand it the decoded event.
///
/// Unknown targets are dropped. Unknown opcodes, leftover payload and
/// handler failures are errors.
pub(crate) fn deliver(connection: &Connection, mut message: Message) -> Result<()> {
    let target = message.target();
    let opcode = message.opcode();

    let Some(proxy) = connection.resolve(target) else {
        tracing::warn!(id = %target, opcode, "dropping event for unknown object");
        return Ok(());
    };

    let signature = proxy
        .event_signature(opcode)
        .ok_or(WaylandError::UnknownOpcode {
            interface: proxy.interface(),
            id: target.get(),
            opcode,
        })?;

    let args = decode_args(connection, &mut message, signature)?;
    if message.remaining() != 0 {
        return Err(WaylandError::protocol(format!(
            "{} unread bytes after {}@{} event {}",
            message.remaining(),
            proxy.interface(),
            target,
            opcode
        )));
    }

    tracing::trace!(id = %target, interface = proxy.interface(), opcode, "delivering event");
    proxy.dispatch_event(opcode, args).map_err(|e| match e {
        WaylandError::Delivery(_) | WaylandError::UnknownOpcode { .. } => e,
        other => WaylandError::Delivery(format!(
            "{}@{} event {}: {}",
            proxy.interface(),
            target,
            opcode,
            other
        )),
    })
}

/// Decode the arguments named by `signature`, in wire order.
fn decode_args(
    connection: &Connection,
    message: &mut Message,
    signature: &[ArgKind],
) -> Result<EventArgs> {
    let mut args = Vec::with_capacity(signature.len());
    for kind in signature {
        let arg = match kind {
            ArgKind::Int => EventArg::Int(message.get_int()?),
            ArgKind::Uint => EventArg::Uint(message.get_uint()?),
            ArgKind::Fixed => EventArg::Fixed(message.get_fixed()?),
            ArgKind::String => EventArg::String(message.get_string()?),
            ArgKind::Array => EventArg::Array(message.get_array()?),
            ArgKind::Object => {
                EventArg::Object(message.get_object_id()?.and_then(|id| connection.resolve(id)))
            }
            ArgKind::NewId => EventArg::NewId(message.get_new_id()?),
            ArgKind::Fd => EventArg::Fd(message.get_fd()?),
        };
        args.push(arg);
    }
    Ok(EventArgs::new(message.opcode(), args))
}

/// Copy of an error for the loop's own result; the original goes to the
/// caller that triggered the cycle.
fn summarize(err: &WaylandError) -> WaylandError {
    let reason = err.to_string();
    match err.kind() {
        ErrorKind::Configuration => WaylandError::Config(reason),
        ErrorKind::Connection => WaylandError::Connection(reason),
        ErrorKind::Protocol => WaylandError::Protocol(reason),
        ErrorKind::State => WaylandError::ConnectionClosed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Fixed;
    use crate::connection::ConnectionBuilder;
    use crate::object::testing::RecordingProxy;
    use crate::object::{EventSlot, Proxy, ProxyCore};
    use crate::protocol::{Header, HEADER_SIZE};
    use crate::writer::{write_frame, OutboundFrame};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::UnixStream;

    fn event(object_id: u32, opcode: u16, payload: &[u8]) -> Vec<u8> {
        let header = Header::new(object_id, opcode, (HEADER_SIZE + payload.len()) as u16);
        let mut bytes = header.encode().to_vec();
        bytes.extend_from_slice(payload);
        bytes
    }

    fn setup(mode: DispatchMode) -> (Connection, UnixStream) {
        let (client, peer) = UnixStream::pair().unwrap();
        let connection = ConnectionBuilder::new()
            .dispatch_mode(mode)
            .connect_stream(client)
            .unwrap();
        (connection, peer)
    }

    async fn dispatch(connection: &Connection) -> Result<()> {
        tokio::time::timeout(Duration::from_secs(2), connection.request_dispatch())
            .await
            .expect("dispatch timed out")
    }

    #[test]
    fn test_state_cell_closed_is_terminal() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), DispatchState::Idle);
        cell.set(DispatchState::Reading);
        assert_eq!(cell.get(), DispatchState::Reading);
        cell.set(DispatchState::Closed);
        cell.set(DispatchState::Idle);
        assert_eq!(cell.get(), DispatchState::Closed);
    }

    #[test]
    fn test_dispatch_mode_serde() {
        let mode: DispatchMode = serde_json::from_str("\"free_running\"").unwrap();
        assert_eq!(mode, DispatchMode::FreeRunning);
        assert_eq!(DispatchMode::default(), DispatchMode::Triggered);
    }

    #[tokio::test]
    async fn test_triggered_delivers_one_event() {
        let (connection, mut peer) = setup(DispatchMode::Triggered);
        let proxy = connection.register(RecordingProxy::new).unwrap();

        let mut bytes = event(proxy.id().get(), 1, &9u32.to_le_bytes());
        bytes.extend(event(proxy.id().get(), 0, &[]));
        peer.write_all(&bytes).await.unwrap();

        dispatch(&connection).await.unwrap();
        assert_eq!(proxy.seen.lock().unwrap().as_slice(), &[(2, 1, 1)]);
        assert_eq!(connection.dispatch_state(), DispatchState::Idle);

        dispatch(&connection).await.unwrap();
        assert_eq!(proxy.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_target_is_dropped() {
        let (connection, mut peer) = setup(DispatchMode::Triggered);
        peer.write_all(&event(42, 0, &[])).await.unwrap();

        dispatch(&connection).await.unwrap();
        assert!(!connection.is_closed());
    }

    #[tokio::test]
    async fn test_unknown_opcode_is_fatal() {
        let (connection, mut peer) = setup(DispatchMode::Triggered);
        let proxy = connection.register(RecordingProxy::new).unwrap();
        peer.write_all(&event(proxy.id().get(), 7, &[])).await.unwrap();

        let err = dispatch(&connection).await.unwrap_err();
        assert!(matches!(
            err,
            WaylandError::UnknownOpcode { interface: "test_recorder", opcode: 7, .. }
        ));
        assert!(connection.is_closed());
        assert_eq!(connection.dispatch_state(), DispatchState::Closed);

        let err = connection
            .send_request(proxy.id(), 0, Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
    }

    #[tokio::test]
    async fn test_trailing_payload_is_fatal() {
        let (connection, mut peer) = setup(DispatchMode::Triggered);
        let proxy = connection.register(RecordingProxy::new).unwrap();
        peer.write_all(&event(proxy.id().get(), 0, &[0, 0, 0, 0])).await.unwrap();

        let err = dispatch(&connection).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(proxy.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_undersized_frame_is_fatal() {
        let (connection, mut peer) = setup(DispatchMode::Triggered);
        let mut bytes = 1u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&(4u32 << 16).to_le_bytes());
        peer.write_all(&bytes).await.unwrap();

        let err = dispatch(&connection).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn test_descriptor_event() {
        let (connection, peer) = setup(DispatchMode::Triggered);
        let proxy = connection.register(RecordingProxy::new).unwrap();

        let file = tempfile::tempfile().unwrap();
        let header = Header::new(proxy.id().get(), 2, HEADER_SIZE as u16);
        write_frame(&peer, &OutboundFrame::new(&header, &[], vec![file.into()]))
            .await
            .unwrap();

        dispatch(&connection).await.unwrap();
        assert_eq!(proxy.seen.lock().unwrap().as_slice(), &[(2, 2, 1)]);
    }

    #[tokio::test]
    async fn test_missing_descriptor_is_fatal() {
        let (connection, mut peer) = setup(DispatchMode::Triggered);
        let proxy = connection.register(RecordingProxy::new).unwrap();
        peer.write_all(&event(proxy.id().get(), 2, &[])).await.unwrap();

        let err = dispatch(&connection).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_peer_hangup_closes_connection() {
        let (connection, peer) = setup(DispatchMode::Triggered);
        drop(peer);

        let err = dispatch(&connection).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert!(connection.is_closed());
    }

    #[tokio::test]
    async fn test_close_interrupts_pending_read() {
        let (connection, _peer) = setup(DispatchMode::Triggered);
        let pending = tokio::spawn({
            let connection = connection.clone();
            async move { connection.request_dispatch().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(connection.dispatch_state(), DispatchState::Reading);

        connection.close().await.unwrap();
        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, WaylandError::ConnectionClosed));
    }

    const ORDERED_EVENT: &[ArgKind] = &[ArgKind::Uint, ArgKind::Fixed];
    const HOLDER_EVENT: &[ArgKind] = &[ArgKind::Object];

    /// Publishes `(id, value)` into a per-object slot and a shared log.
    struct Ordered {
        core: ProxyCore,
        slot: EventSlot<u32>,
        log: Arc<Mutex<Vec<(u32, u32)>>>,
        /// Time spent inside the handler before publishing.
        delay: Duration,
    }

    impl Proxy for Ordered {
        fn core(&self) -> &ProxyCore {
            &self.core
        }

        fn interface(&self) -> &'static str {
            "test_ordered"
        }

        fn event_signature(&self, opcode: u16) -> Option<&'static [ArgKind]> {
            (opcode == 0).then_some(ORDERED_EVENT)
        }

        fn dispatch_event(&self, _opcode: u16, mut args: EventArgs) -> Result<()> {
            let value = args.uint()?;
            let _ = args.fixed()?;
            std::thread::sleep(self.delay);
            self.log.lock().unwrap().push((self.id().get(), value));
            self.slot.publish(value);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_free_running_keeps_order_with_slow_handler() {
        let (connection, mut peer) = setup(DispatchMode::FreeRunning);
        let log = Arc::new(Mutex::new(Vec::new()));
        let make = |delay: Duration| {
            let log = log.clone();
            move |core| Ordered {
                core,
                slot: EventSlot::new(),
                log,
                delay,
            }
        };
        // A's handler is much slower than B's.
        let a = connection.register(make(Duration::from_millis(50))).unwrap();
        let b = connection.register(make(Duration::ZERO)).unwrap();

        let payload = |v: u32| {
            let mut p = v.to_le_bytes().to_vec();
            p.extend_from_slice(&Fixed::from_f64(1.5).to_raw().to_le_bytes());
            p
        };
        let mut bytes = event(a.id().get(), 0, &payload(1));
        bytes.extend(event(b.id().get(), 0, &payload(2)));
        bytes.extend(event(a.id().get(), 0, &payload(3)));
        peer.write_all(&bytes).await.unwrap();

        // Nobody reads A's slot yet; B's event must still arrive, after A's first.
        let got = tokio::time::timeout(Duration::from_secs(2), b.slot.recv())
            .await
            .unwrap();
        assert_eq!(got, Some(2));

        assert_eq!(a.slot.recv().await, Some(1));
        assert_eq!(a.slot.recv().await, Some(3));
        assert_eq!(log.lock().unwrap().as_slice(), &[(2, 1), (3, 2), (2, 3)]);
    }

    #[tokio::test]
    async fn test_object_argument_resolves_through_registry() {
        struct Holder {
            core: ProxyCore,
            found: EventSlot<Option<u32>>,
        }
        impl Proxy for Holder {
            fn core(&self) -> &ProxyCore {
                &self.core
            }
            fn interface(&self) -> &'static str {
                "test_holder"
            }
            fn event_signature(&self, _opcode: u16) -> Option<&'static [ArgKind]> {
                Some(HOLDER_EVENT)
            }
            fn dispatch_event(&self, _opcode: u16, mut args: EventArgs) -> Result<()> {
                self.found.publish(args.object()?.map(|p| p.id().get()));
                Ok(())
            }
        }

        let (connection, mut peer) = setup(DispatchMode::Triggered);
        let holder = connection
            .register(|core| Holder {
                core,
                found: EventSlot::new(),
            })
            .unwrap();
        let id = holder.id().get();

        let mut bytes = event(id, 0, &1u32.to_le_bytes());
        bytes.extend(event(id, 0, &77u32.to_le_bytes()));
        bytes.extend(event(id, 0, &0u32.to_le_bytes()));
        peer.write_all(&bytes).await.unwrap();

        for _ in 0..3 {
            dispatch(&connection).await.unwrap();
        }
        assert_eq!(holder.found.try_recv(), Some(Some(1)));
        assert_eq!(holder.found.try_recv(), Some(None));
        assert_eq!(holder.found.try_recv(), Some(None));
    }
}
