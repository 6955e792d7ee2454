//! Connection lifecycle: liveness probes, the shared heartbeat cycle and
//! clean client-initiated closure.

use std::time::Duration;

use project_tests::{MockGateway, PING, PONG};

use lib_dbio::{Client, ClientEvent, ClientOptions, DbioError, SocketManagerOptions};

fn client_options(url: &str, heartbeat: Duration) -> ClientOptions {
    ClientOptions {
        rest: false,
        gateway: SocketManagerOptions {
            gateway_url: url.to_string(),
            heartbeat_interval: heartbeat,
            ..SocketManagerOptions::default()
        },
        ..ClientOptions::default()
    }
}

#[tokio::test]
async fn ping_resolves_with_a_round_trip_time() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mock = MockGateway::start(true).await;
    let client = Client::new(client_options(mock.url(), Duration::from_secs(60)));

    client.subscribe("42").await.unwrap();
    let mut conn = mock.next_connection().await;
    conn.next_frame().await;

    let socket = client.gateway().socket("42").unwrap();
    let rtt = socket.ping().await.unwrap();
    assert!(rtt < Duration::from_secs(5));

    let avg = client.ping_avg().await.unwrap();
    assert!(avg.is_some());
}

#[tokio::test]
async fn only_one_probe_may_be_in_flight() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mock = MockGateway::start(false).await;
    let client = Client::new(client_options(mock.url(), Duration::from_secs(60)));

    client.subscribe("42").await.unwrap();
    let mut conn = mock.next_connection().await;
    conn.next_frame().await;

    let socket = client.gateway().socket("42").unwrap();
    let in_flight = socket.clone();
    let first = tokio::spawn(async move { in_flight.ping().await });
    // The probe frame on the wire means the slot is taken.
    assert_eq!(conn.next_frame().await, PING);

    let err = socket.ping().await.unwrap_err();
    assert!(matches!(err, DbioError::InvalidState(_)));

    conn.send_raw(PONG);
    let rtt = first.await.unwrap().unwrap();
    assert!(rtt < Duration::from_secs(5));
}

#[tokio::test]
async fn unanswered_probes_time_out_and_release_the_slot() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mock = MockGateway::start(false).await;
    let mut options = client_options(mock.url(), Duration::from_secs(60));
    options.gateway.ping_timeout = Some(Duration::from_millis(100));
    let client = Client::new(options);

    client.subscribe("42").await.unwrap();
    let mut conn = mock.next_connection().await;
    conn.next_frame().await;

    let socket = client.gateway().socket("42").unwrap();
    let err = socket.ping().await.unwrap_err();
    assert!(matches!(err, DbioError::Timeout(_)));
    assert_eq!(conn.next_frame().await, PING);

    // The slot is free again; a second probe can run and resolve.
    let in_flight = socket.clone();
    let second = tokio::spawn(async move { in_flight.ping().await });
    assert_eq!(conn.next_frame().await, PING);
    conn.send_raw(PONG);
    second.await.unwrap().unwrap();
}

#[tokio::test]
async fn the_heartbeat_runs_exactly_while_sockets_exist() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mock = MockGateway::start(true).await;
    let client = Client::new(client_options(mock.url(), Duration::from_millis(100)));

    assert!(!client.gateway().heartbeat_running());

    client.subscribe("42").await.unwrap();
    let mut conn = mock.next_connection().await;
    conn.next_frame().await;
    assert!(client.gateway().heartbeat_running());

    // The cycle probes the socket on its own.
    assert_eq!(conn.next_frame().await, PING);
    assert_eq!(conn.next_frame().await, PING);

    client.unsubscribe("42").await.unwrap();
    assert!(!client.gateway().heartbeat_running());
    assert!(client.gateway().is_empty());
}

#[tokio::test]
async fn unsubscribing_closes_cleanly_and_never_reconnects() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mock = MockGateway::start(true).await;
    let client = Client::new(client_options(mock.url(), Duration::from_secs(60)));
    let mut events = client.events();

    client.subscribe("42").await.unwrap();
    let mut conn = mock.next_connection().await;
    conn.next_frame().await;

    client.unsubscribe("42").await.unwrap();
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for close event")
            .expect("event bus closed")
        {
            ClientEvent::Close { id, code, .. } => {
                assert_eq!(id, "42");
                assert_eq!(code, 1000);
                break;
            }
            ClientEvent::Error { message, .. } => {
                panic!("clean close must not surface an error: {message}")
            }
            _ => continue,
        }
    }
    // Client-initiated closes are terminal for the socket.
    mock.assert_no_connection(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn unsubscribing_an_unknown_id_is_not_found() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mock = MockGateway::start(true).await;
    let client = Client::new(client_options(mock.url(), Duration::from_secs(60)));
    let err = client.unsubscribe("missing").await.unwrap_err();
    assert!(matches!(err, DbioError::NotFound(id) if id == "missing"));
}

#[tokio::test]
async fn double_subscribing_the_same_id_is_rejected() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mock = MockGateway::start(true).await;
    let client = Client::new(client_options(mock.url(), Duration::from_secs(60)));

    client.subscribe("42").await.unwrap();
    mock.next_connection().await;
    let err = client.subscribe("42").await.unwrap_err();
    assert!(matches!(err, DbioError::InvalidState(_)));
    assert_eq!(client.gateway().len(), 1);
}

#[tokio::test]
async fn unsubscribe_all_tears_the_fleet_down() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mock = MockGateway::start(true).await;
    let client = Client::new(client_options(mock.url(), Duration::from_secs(60)));

    client.subscribe("1").await.unwrap();
    mock.next_connection().await;
    client.subscribe("2").await.unwrap();
    mock.next_connection().await;
    assert_eq!(client.gateway().len(), 2);

    client.unsubscribe_all().await;
    assert!(client.gateway().is_empty());
    assert!(!client.gateway().heartbeat_running());
    assert_eq!(client.ping_avg().await.unwrap(), None);
}
