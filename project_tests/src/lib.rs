//! # Test Support
//!
//! A scriptable in-process gateway server for the integration tests in
//! `tests/`. It speaks just enough of the wire protocol to exercise the
//! client: it records every text frame a client sends, optionally answers
//! ping frames, and injects server frames or closures on command.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Engine.io-style ping frame the client sends as a liveness probe.
pub const PING: &str = "2";
/// The pong answer to [`PING`].
pub const PONG: &str = "3";

const WAIT: Duration = Duration::from_secs(5);

enum ServerCmd {
    /// Send a raw text frame to the client.
    Send(String),
    /// Perform a close handshake with the given code and reason.
    Close { code: u16, reason: String },
    /// Sever the TCP connection without a close handshake.
    Drop,
}

/// A scripted gateway server listening on a random local port.
pub struct MockGateway {
    url: String,
    connections: mpsc::UnboundedReceiver<MockConnection>,
}

/// The server side of one accepted client connection.
pub struct MockConnection {
    frames: mpsc::UnboundedReceiver<String>,
    cmds: mpsc::UnboundedSender<ServerCmd>,
}

impl MockGateway {
    /// Binds a listener and starts accepting connections. When `auto_pong`
    /// is set, every [`PING`] frame is answered with [`PONG`] immediately;
    /// the ping still shows up in the recorded frames either way.
    pub async fn start(auto_pong: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock gateway");
        let addr = listener.local_addr().expect("mock gateway has no addr");
        let (conn_tx, connections) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let (frame_tx, frames) = mpsc::unbounded_channel();
                let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
                if conn_tx
                    .send(MockConnection {
                        frames,
                        cmds: cmd_tx,
                    })
                    .is_err()
                {
                    return;
                }
                tokio::spawn(serve_connection(stream, auto_pong, frame_tx, cmd_rx));
            }
        });
        Self {
            url: format!("ws://{addr}"),
            connections,
        }
    }

    /// The `ws://` URL clients should connect to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Waits for the next client connection to be accepted.
    pub async fn next_connection(&mut self) -> MockConnection {
        tokio::time::timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for a client connection")
            .expect("mock gateway accept loop ended")
    }

    /// Asserts that no further client connects within `window`.
    pub async fn assert_no_connection(&mut self, window: Duration) {
        if tokio::time::timeout(window, self.connections.recv())
            .await
            .is_ok()
        {
            panic!("unexpected client connection");
        }
    }
}

impl MockConnection {
    /// Waits for the next text frame from the client.
    pub async fn next_frame(&mut self) -> String {
        tokio::time::timeout(WAIT, self.frames.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("connection task ended")
    }

    /// Asserts that the client sends no frame within `window`.
    pub async fn assert_no_frame(&mut self, window: Duration) {
        if let Ok(Some(frame)) = tokio::time::timeout(window, self.frames.recv()).await {
            panic!("unexpected client frame: {frame}");
        }
    }

    /// Sends a raw text frame to the client.
    pub fn send_raw(&self, frame: impl Into<String>) {
        self.cmds
            .send(ServerCmd::Send(frame.into()))
            .expect("connection task ended");
    }

    /// Sends a `42["NAME",data]` event frame to the client.
    pub fn send_event(&self, name: &str, data: Value) {
        let body = Value::Array(vec![Value::String(name.to_string()), data]);
        self.send_raw(format!("42{body}"));
    }

    /// Closes the connection with a proper close handshake.
    pub fn close(&self, code: u16, reason: &str) {
        self.cmds
            .send(ServerCmd::Close {
                code,
                reason: reason.to_string(),
            })
            .expect("connection task ended");
    }

    /// Severs the connection without a close handshake, so the client
    /// observes an abnormal closure.
    pub fn drop_connection(&self) {
        self.cmds
            .send(ServerCmd::Drop)
            .expect("connection task ended");
    }
}

async fn serve_connection(
    stream: TcpStream,
    auto_pong: bool,
    frames: mpsc::UnboundedSender<String>,
    mut cmds: mpsc::UnboundedReceiver<ServerCmd>,
) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if auto_pong && text.as_str() == PING {
                        let _ = write.send(Message::Text(PONG.into())).await;
                    }
                    let _ = frames.send(text.as_str().to_string());
                }
                Some(Ok(Message::Close(frame))) => {
                    // Echo the close so the client sees its own code back.
                    let _ = write.send(Message::Close(frame)).await;
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return,
            },
            cmd = cmds.recv() => match cmd {
                Some(ServerCmd::Send(frame)) => {
                    let _ = write.send(Message::Text(frame.into())).await;
                }
                Some(ServerCmd::Close { code, reason }) => {
                    let _ = write
                        .send(Message::Close(Some(CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        })))
                        .await;
                    // Drain until the client echoes the close.
                    while let Some(Ok(message)) = read.next().await {
                        if matches!(message, Message::Close(_)) {
                            break;
                        }
                    }
                    return;
                }
                Some(ServerCmd::Drop) | None => return,
            },
        }
    }
}
