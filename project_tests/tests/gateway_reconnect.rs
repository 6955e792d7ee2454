//! Auto-reconnect behavior: abnormal closures retried with backoff, clean
//! closures left alone, and the retry budget honored.

use std::time::Duration;

use project_tests::MockGateway;

use lib_dbio::{Client, ClientEvent, ClientOptions, ReconnectPolicy, SocketManagerOptions};

fn client_options(url: &str, max_retries: Option<u32>) -> ClientOptions {
    ClientOptions {
        rest: false,
        gateway: SocketManagerOptions {
            gateway_url: url.to_string(),
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(30),
                max_delay: Duration::from_millis(200),
                max_retries,
            },
            ..SocketManagerOptions::default()
        },
        ..ClientOptions::default()
    }
}

async fn next_event(rx: &mut tokio::sync::mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a client event")
        .expect("event bus closed")
}

#[tokio::test]
async fn an_abnormal_closure_reconnects_and_reannounces() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mock = MockGateway::start(true).await;
    let client = Client::new(client_options(mock.url(), None));
    let mut events = client.events();

    client.subscribe("42").await.unwrap();
    let mut conn = mock.next_connection().await;
    assert_eq!(conn.next_frame().await, r#"42["VIEWING","42"]"#);

    conn.drop_connection();
    loop {
        match next_event(&mut events).await {
            ClientEvent::Close { code, .. } => {
                // No close handshake happened, so the default code applies.
                assert_eq!(code, 1006);
                break;
            }
            _ => continue,
        }
    }

    // The replacement connection announces the same subscription again.
    let mut reconn = mock.next_connection().await;
    assert_eq!(reconn.next_frame().await, r#"42["VIEWING","42"]"#);
    loop {
        match next_event(&mut events).await {
            ClientEvent::Open { id } => {
                assert_eq!(id, "42");
                break;
            }
            _ => continue,
        }
    }
}

#[tokio::test]
async fn a_clean_server_closure_is_not_retried() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mock = MockGateway::start(true).await;
    let client = Client::new(client_options(mock.url(), None));
    let mut events = client.events();

    client.subscribe("42").await.unwrap();
    let mut conn = mock.next_connection().await;
    conn.next_frame().await;

    conn.close(1000, "done");
    loop {
        match next_event(&mut events).await {
            ClientEvent::Close { code, reason, .. } => {
                assert_eq!(code, 1000);
                assert_eq!(reason, "done");
                break;
            }
            _ => continue,
        }
    }
    mock.assert_no_connection(Duration::from_millis(300)).await;
}

#[tokio::test]
async fn a_nonstandard_close_code_is_retried() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mock = MockGateway::start(true).await;
    let client = Client::new(client_options(mock.url(), None));

    client.subscribe("42").await.unwrap();
    let mut conn = mock.next_connection().await;
    conn.next_frame().await;

    conn.close(4000, "server restarting");
    let mut reconn = mock.next_connection().await;
    assert_eq!(reconn.next_frame().await, r#"42["VIEWING","42"]"#);
}

#[tokio::test]
async fn unsubscribing_during_backoff_cancels_the_reconnect() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mock = MockGateway::start(true).await;
    let mut options = client_options(mock.url(), None);
    // A long backoff keeps the reconnect loop asleep while we unsubscribe.
    options.gateway.reconnect.base_delay = Duration::from_millis(300);
    options.gateway.reconnect.max_delay = Duration::from_millis(400);
    let client = Client::new(options);
    let mut events = client.events();

    client.subscribe("42").await.unwrap();
    let mut conn = mock.next_connection().await;
    conn.next_frame().await;

    conn.drop_connection();
    loop {
        match next_event(&mut events).await {
            ClientEvent::Close { .. } => break,
            _ => continue,
        }
    }

    // The socket sits in its backoff sleep now; withdrawing it must stop
    // the loop before the next attempt.
    client.unsubscribe("42").await.unwrap();
    assert!(client.gateway().is_empty());
    mock.assert_no_connection(Duration::from_millis(800)).await;
}

#[tokio::test]
async fn an_exhausted_retry_budget_is_terminal() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut mock = MockGateway::start(true).await;
    let client = Client::new(client_options(mock.url(), Some(2)));
    let mut events = client.events();

    client.subscribe("42").await.unwrap();
    let conn = mock.next_connection().await;

    // Take the gateway away entirely so every retry fails.
    drop(mock);
    conn.drop_connection();

    loop {
        match next_event(&mut events).await {
            ClientEvent::ReconnectFailed { id } => {
                assert_eq!(id, "42");
                break;
            }
            _ => continue,
        }
    }
}
