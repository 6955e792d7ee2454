//! End-to-end webhook delivery: a profile update on a subscription created
//! with webhook options posts a notification to the configured endpoint.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use project_tests::MockGateway;
use serde_json::{json, Value};

use lib_dbio::{Client, ClientEvent, ClientOptions, SocketManagerOptions, WebhookOptions};

/// Accepts a single HTTP request, answers 204 and hands the request head
/// and body back to the test.
fn serve_webhook_once() -> (String, mpsc::Receiver<(String, String)>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind webhook server");
    let addr = listener.local_addr().expect("webhook server has no addr");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let Ok(n) = stream.read(&mut chunk) else { return };
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
            let body_len: usize = head
                .lines()
                .find_map(|line| {
                    let lower = line.to_ascii_lowercase();
                    lower
                        .strip_prefix("content-length:")
                        .and_then(|v| v.trim().parse().ok())
                })
                .unwrap_or(0);
            let body_start = head_end + 4;
            while buf.len() < body_start + body_len {
                let Ok(n) = stream.read(&mut chunk) else { return };
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let body = String::from_utf8_lossy(&buf[body_start..]).to_string();
            let _ = stream.write_all(
                b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
            let _ = tx.send((head, body));
            return;
        }
    });
    (format!("http://{addr}"), rx)
}

#[tokio::test]
async fn profile_updates_notify_the_subscription_webhook() {
    let _ = env_logger::builder().is_test(true).try_init();
    let (webhook_url, delivered) = serve_webhook_once();
    let mut mock = MockGateway::start(true).await;
    let client = Client::new(ClientOptions {
        webhook_url,
        gateway: SocketManagerOptions {
            gateway_url: mock.url().to_string(),
            ..SocketManagerOptions::default()
        },
        ..ClientOptions::default()
    });
    let mut events = client.events();

    client
        .subscribe_with(
            "42",
            WebhookOptions {
                id: "hook".into(),
                token: "sekrit".into(),
            },
        )
        .await
        .unwrap();
    let mut conn = mock.next_connection().await;
    conn.next_frame().await;

    conn.send_event(
        "PROFILE_UPDATE",
        json!({
            "user": { "details": { "slug": "ferris", "user_id": "42", "likes": 1 } }
        }),
    );
    loop {
        match tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for a client event")
            .expect("event bus closed")
        {
            ClientEvent::ProfileUpdate { .. } => break,
            _ => continue,
        }
    }

    // Delivery happens on a detached task; poll until it lands.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let (head, body) = loop {
        match delivered.try_recv() {
            Ok(hit) => break hit,
            Err(_) => {
                assert!(
                    tokio::time::Instant::now() < deadline,
                    "webhook was never delivered"
                );
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    };
    assert!(
        head.starts_with("POST /hook/sekrit HTTP/1.1"),
        "unexpected request head: {head}"
    );
    let payload: Value = serde_json::from_str(&body).expect("webhook body was not JSON");
    assert_eq!(payload["content"], "Profile 42 was updated");
}
