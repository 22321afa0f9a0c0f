//! Integration tests for wayland-wire.
//!
//! These tests drive a real `Connection` against an in-process fake
//! compositor listening on a socket inside a temporary runtime directory.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};

use wayland_wire::codec::Argument;
use wayland_wire::object::{Proxy, ProxyId};
use wayland_wire::protocol::{read_message, MessageBuilder};
use wayland_wire::{Connection, DispatchMode, DispatchState, ErrorKind};

const DISPLAY_NAME: &str = "wayland-test";

/// How the fake compositor answers requests on the display.
#[derive(Default, Clone)]
struct FakeCompositor {
    globals: Vec<(u32, &'static str, u32)>,
    /// Send an event for an object the client never created before `done`.
    stray_event: bool,
    /// Answer `sync` with a header claiming 4 bytes.
    malformed_reply: bool,
}

fn event(target: u32, opcode: u16, args: Vec<Argument>) -> Vec<u8> {
    let mut builder = MessageBuilder::new(ProxyId::new(target).unwrap(), opcode);
    for arg in args {
        builder.put(arg).unwrap();
    }
    builder.finish().unwrap().bytes().to_vec()
}

impl FakeCompositor {
    async fn serve(self, stream: UnixStream) {
        let (read, mut write) = stream.into_split();
        let mut serial = 100u32;

        while let Ok(mut msg) = read_message(read.as_ref()).await {
            if msg.target() != ProxyId::DISPLAY {
                continue;
            }
            match msg.opcode() {
                // sync
                0 => {
                    let callback = msg.get_new_id().unwrap().get();
                    if self.malformed_reply {
                        let mut bytes = 1u32.to_le_bytes().to_vec();
                        bytes.extend_from_slice(&(4u32 << 16).to_le_bytes());
                        send(&mut write, bytes).await;
                        continue;
                    }
                    if self.stray_event {
                        send(&mut write, event(999, 0, Vec::new())).await;
                    }
                    serial += 1;
                    send(&mut write, event(callback, 0, vec![Argument::Uint(serial)])).await;
                    send(&mut write, event(1, 1, vec![Argument::Uint(callback)])).await;
                }
                // get_registry
                1 => {
                    let registry = msg.get_new_id().unwrap().get();
                    for (name, interface, version) in &self.globals {
                        let args = vec![
                            Argument::Uint(*name),
                            Argument::from(*interface),
                            Argument::Uint(*version),
                        ];
                        send(&mut write, event(registry, 0, args)).await;
                    }
                }
                _ => {}
            }
        }
    }
}

async fn send(write: &mut OwnedWriteHalf, bytes: Vec<u8>) {
    let _ = write.write_all(&bytes).await;
}

/// Bind a compositor socket in a fresh runtime dir and connect to it.
async fn connect(
    compositor: FakeCompositor,
    mode: DispatchMode,
) -> (Connection, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let listener = UnixListener::bind(dir.path().join(DISPLAY_NAME)).unwrap();

    let builder = Connection::builder()
        .runtime_dir(dir.path())
        .display(DISPLAY_NAME)
        .dispatch_mode(mode);
    let (connection, accepted) = tokio::join!(builder.connect(), listener.accept());
    let (stream, _) = accepted.unwrap();
    tokio::spawn(compositor.serve(stream));

    (connection.unwrap(), dir)
}

async fn within<T>(fut: impl std::future::Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("timed out")
}

#[tokio::test]
async fn test_sync_roundtrip_then_close() {
    let (connection, _dir) = connect(FakeCompositor::default(), DispatchMode::Triggered).await;

    let serial = within(connection.roundtrip()).await.unwrap();
    assert_eq!(serial, 101);

    connection.close().await.unwrap();
    assert_eq!(connection.dispatch_state(), DispatchState::Closed);

    let err = connection
        .send_request(ProxyId::DISPLAY, 0, Vec::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::State);
}

#[tokio::test]
async fn test_callback_done_with_bounded_wait() {
    let (connection, _dir) = connect(FakeCompositor::default(), DispatchMode::FreeRunning).await;

    let callback = connection.display().sync().await.unwrap();
    let done = within(callback.done().recv()).await;
    assert_eq!(done, Some(101));

    // delete_id follows done and clears the registry entry
    let deleted = within(connection.display().deleted_ids().recv()).await;
    assert_eq!(deleted, Some(callback.id()));
    assert!(connection.resolve(callback.id()).is_none());
}

#[tokio::test]
async fn test_ids_keep_increasing_after_deletion() {
    let (connection, _dir) = connect(FakeCompositor::default(), DispatchMode::FreeRunning).await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let callback = connection.display().sync().await.unwrap();
        within(callback.done().recv()).await;
        within(connection.display().deleted_ids().recv()).await;
        ids.push(callback.id().get());
    }
    assert_eq!(ids, vec![2, 3, 4]);
}

#[tokio::test]
async fn test_list_globals() {
    let compositor = FakeCompositor {
        globals: vec![(1, "wl_compositor", 6), (2, "wl_shm", 1), (3, "wl_seat", 9)],
        ..Default::default()
    };
    let (connection, _dir) = connect(compositor, DispatchMode::FreeRunning).await;

    let registry = connection.display().get_registry().await.unwrap();
    within(connection.roundtrip()).await.unwrap();

    let names: Vec<_> = registry
        .globals()
        .into_iter()
        .map(|g| (g.name, g.interface, g.version))
        .collect();
    assert_eq!(
        names,
        vec![
            (1, "wl_compositor".to_string(), 6),
            (2, "wl_shm".to_string(), 1),
            (3, "wl_seat".to_string(), 9),
        ]
    );
}

#[tokio::test]
async fn test_event_for_unknown_object_is_dropped() {
    let compositor = FakeCompositor {
        stray_event: true,
        ..Default::default()
    };
    let (connection, _dir) = connect(compositor, DispatchMode::Triggered).await;

    let serial = within(connection.roundtrip()).await.unwrap();
    assert_eq!(serial, 101);
    assert!(!connection.is_closed());
}

#[tokio::test]
async fn test_malformed_frame_closes_connection() {
    let compositor = FakeCompositor {
        malformed_reply: true,
        ..Default::default()
    };
    let (connection, _dir) = connect(compositor, DispatchMode::Triggered).await;

    let err = within(connection.roundtrip()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);
    assert!(connection.is_closed());
    assert!(connection.request_dispatch().await.is_err());
}

#[tokio::test]
async fn test_connect_without_compositor() {
    let dir = tempfile::tempdir().unwrap();
    let err = Connection::builder()
        .runtime_dir(dir.path())
        .display("wayland-none")
        .connect()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn test_compositor_hangup_is_connection_error() {
    let dir = tempfile::tempdir().unwrap();
    let listener = UnixListener::bind(dir.path().join(DISPLAY_NAME)).unwrap();
    let builder = Connection::builder()
        .runtime_dir(dir.path())
        .display(DISPLAY_NAME);
    let (connection, accepted) = tokio::join!(builder.connect(), listener.accept());
    drop(accepted.unwrap());
    let connection = connection.unwrap();

    let err = within(connection.request_dispatch()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(connection.is_closed());
}
