use thermolink::{EventBus, LinkEvent};

#[tokio::test]
async fn test_publish_without_subscribers_is_silent() {
    let bus = EventBus::new();
    assert_eq!(bus.listener_count(), 0);
    // Must neither panic nor block.
    bus.publish(LinkEvent::ServerStopped);
}

#[tokio::test]
async fn test_subscriber_receives_published_event() {
    let bus = EventBus::new();
    let mut rx = bus.subscribe();
    bus.publish(LinkEvent::Connected {
        peer: "127.0.0.1:4000".to_string(),
    });
    let event = rx.recv().await.unwrap();
    assert_eq!(
        event,
        LinkEvent::Connected {
            peer: "127.0.0.1:4000".to_string()
        }
    );
}

#[tokio::test]
async fn test_multiple_subscribers_are_independent() {
    let bus = EventBus::new();
    let mut rx1 = bus.subscribe();
    let mut rx2 = bus.subscribe();
    assert_eq!(bus.listener_count(), 2);

    bus.publish(LinkEvent::DataReceived {
        peer: "p".to_string(),
        text: "23.50".to_string(),
    });

    let e1 = rx1.recv().await.unwrap();
    let e2 = rx2.recv().await.unwrap();
    assert_eq!(e1, e2);
}

#[tokio::test]
async fn test_late_subscriber_misses_earlier_events() {
    let bus = EventBus::new();
    bus.publish(LinkEvent::ServerStopped);
    let mut rx = bus.subscribe();
    assert!(matches!(
        rx.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}
