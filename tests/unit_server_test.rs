use std::sync::Arc;
use std::time::Duration;
use thermolink::config::ServerConfig;
use thermolink::server::{ClientSession, LinkServer, SessionFactory};
use thermolink::{EventBus, LinkEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::sleep;

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .compact()
        .try_init();
}

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::for_port(0);
    config.recv_timeout = Duration::from_millis(100);
    config
}

async fn expect_event(
    rx: &mut broadcast::Receiver<LinkEvent>,
    pred: impl Fn(&LinkEvent) -> bool,
) -> LinkEvent {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.expect("event bus closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    init_logging();
    let server = LinkServer::new(test_config());

    // Stopping a server that never ran is a no-op.
    server.stop().await;
    assert!(!server.is_running().await);

    assert!(server.start().await);
    assert!(server.is_running().await);
    server.stop().await;
    server.stop().await;
    assert!(!server.is_running().await);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    init_logging();
    let server = LinkServer::new(test_config());
    assert!(server.start().await);
    let addr = server.local_addr().await.unwrap();
    assert!(server.start().await);
    // The second start did not rebind anywhere else.
    assert_eq!(server.local_addr().await, Some(addr));
    server.stop().await;
}

#[tokio::test]
async fn test_bind_conflict_is_reported_not_thrown() {
    init_logging();
    let holder = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = holder.local_addr().unwrap().port();

    let server = LinkServer::new(ServerConfig::for_port(port));
    let mut events = server.subscribe();

    assert!(!server.start().await);
    assert!(!server.is_running().await);
    assert_eq!(server.local_addr().await, None);

    let event = expect_event(&mut events, |e| matches!(e, LinkEvent::Error { .. })).await;
    if let LinkEvent::Error { message, .. } = event {
        assert!(message.to_lowercase().contains("error"));
    }
}

#[tokio::test]
async fn test_client_count_tracks_accept_and_release() {
    init_logging();
    let server = LinkServer::new(test_config());
    assert!(server.start().await);
    let addr = server.local_addr().await.unwrap();
    assert_eq!(server.client_count(), 0);

    let stream = TcpStream::connect(addr).await.unwrap();
    sleep(Duration::from_millis(300)).await;
    assert_eq!(server.client_count(), 1);

    drop(stream);
    sleep(Duration::from_millis(500)).await;
    assert_eq!(server.client_count(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_data_fidelity_through_server_events() {
    init_logging();
    let server = LinkServer::new(test_config());
    let mut events = server.subscribe();
    assert!(server.start().await);
    let addr = server.local_addr().await.unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"ambiente: 23.5").await.unwrap();

    let event = expect_event(&mut events, |e| matches!(e, LinkEvent::DataReceived { .. })).await;
    if let LinkEvent::DataReceived { text, .. } = event {
        assert_eq!(text, "ambiente: 23.5");
    }

    server.stop().await;
}

#[tokio::test]
async fn test_client_close_emits_one_disconnect() {
    init_logging();
    let server = LinkServer::new(test_config());
    let mut events = server.subscribe();
    assert!(server.start().await);
    let addr = server.local_addr().await.unwrap();

    let stream = TcpStream::connect(addr).await.unwrap();
    expect_event(&mut events, |e| matches!(e, LinkEvent::Connected { .. })).await;

    drop(stream);
    expect_event(&mut events, |e| matches!(e, LinkEvent::Disconnected { .. })).await;
    sleep(Duration::from_millis(200)).await;
    assert_eq!(server.client_count(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_stop_closes_live_sessions() {
    init_logging();
    let server = LinkServer::new(test_config());
    assert!(server.start().await);
    let addr = server.local_addr().await.unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(server.client_count(), 1);

    server.stop().await;
    assert_eq!(server.client_count(), 0);

    // The remote end observes EOF once its session is torn down.
    let mut buf = [0u8; 16];
    let n = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_lifecycle_events_are_published() {
    init_logging();
    let server = LinkServer::new(test_config());
    let mut events = server.subscribe();

    assert!(server.start().await);
    expect_event(&mut events, |e| matches!(e, LinkEvent::ServerStarted { .. })).await;

    server.stop().await;
    expect_event(&mut events, |e| matches!(e, LinkEvent::ServerStopped)).await;
}

#[tokio::test]
async fn test_restart_after_stop() {
    init_logging();
    let server = LinkServer::new(test_config());
    assert!(server.start().await);
    server.stop().await;

    assert!(server.start().await);
    let addr = server.local_addr().await.unwrap();
    let _stream = TcpStream::connect(addr).await.unwrap();
    sleep(Duration::from_millis(300)).await;
    assert_eq!(server.client_count(), 1);
    server.stop().await;
}

struct TinyBufferFactory;

impl SessionFactory for TinyBufferFactory {
    fn make_session(
        &self,
        stream: TcpStream,
        peer: String,
        events: EventBus,
    ) -> Arc<ClientSession> {
        Arc::new(ClientSession::new(
            stream,
            peer,
            Duration::from_millis(50),
            64,
            events,
        ))
    }
}

#[tokio::test]
async fn test_custom_session_factory_is_used() {
    init_logging();
    let server = LinkServer::with_factory(test_config(), Arc::new(TinyBufferFactory));
    let mut events = server.subscribe();
    assert!(server.start().await);
    let addr = server.local_addr().await.unwrap();

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"75.5").await.unwrap();

    let event = expect_event(&mut events, |e| matches!(e, LinkEvent::DataReceived { .. })).await;
    if let LinkEvent::DataReceived { text, .. } = event {
        assert_eq!(text, "75.5");
    }

    server.stop().await;
}
