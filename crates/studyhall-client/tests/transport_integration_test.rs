//! Transport integration tests against local sockets.
//!
//! A minimal WebSocket broker and a minimal HTTP server stand in for the
//! backend, so these tests cover the real tokio-tungstenite and reqwest
//! code paths without any network access.

#![cfg(feature = "transport")]

use std::time::Duration;

use chrono::DateTime;
use futures_util::{SinkExt, StreamExt};
use secrecy::Secret;
use studyhall_client::{
    GroupId,
    history::HistoryClient,
    transport::{self, TransportEventKind, TransportId},
};
use studyhall_core::TransportRequest;
use studyhall_proto::{Command, Frame};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::mpsc,
    time::timeout,
};
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        Message,
        handshake::server::{Request, Response},
    },
};

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn transport_exchanges_stomp_frames() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let broker = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut auth = None;
        let mut ws = accept_hdr_async(socket, |req: &Request, resp: Response| {
            auth = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok(resp)
        })
        .await
        .unwrap();

        let Some(Ok(Message::Text(text))) = ws.next().await else {
            panic!("expected CONNECT");
        };
        let connect = Frame::decode(text.as_str()).unwrap().unwrap();
        assert_eq!(connect.command, Command::Connect);

        let connected = Frame::new(Command::Connected).with_header("version", "1.2");
        ws.send(Message::text(connected.encode())).await.unwrap();
        ws.send(Message::text("\n")).await.unwrap();
        ws.close(None).await.unwrap();
        auth
    });

    let (events_tx, mut events) = mpsc::channel(16);
    let request = TransportRequest {
        url: format!("ws://{addr}/ws/websocket?token=abc"),
        headers: vec![("Authorization".to_string(), "Bearer abc".to_string())],
    };
    let handle = transport::spawn(TransportId(7), request, events_tx);

    let opened = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(opened.id, TransportId(7));
    assert_eq!(opened.kind, TransportEventKind::Opened);

    handle.send_frame(&Frame::new(Command::Connect).with_header("accept-version", "1.2"));

    let frame = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert!(matches!(frame.kind, TransportEventKind::Frame(f) if f.command == Command::Connected));

    let heartbeat = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(heartbeat.kind, TransportEventKind::Heartbeat);

    let closed = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert!(matches!(closed.kind, TransportEventKind::Closed { .. }));

    assert_eq!(broker.await.unwrap().as_deref(), Some("Bearer abc"));
}

#[tokio::test]
async fn close_flushes_queued_frames_before_closing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let broker = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
        let mut received = Vec::new();
        let mut closed_cleanly = false;
        while let Some(message) = ws.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if let Ok(Some(frame)) = Frame::decode(text.as_str()) {
                        received.push(frame.command);
                    }
                },
                Ok(Message::Close(_)) => closed_cleanly = true,
                Ok(_) => {},
                Err(_) => break,
            }
        }
        (received, closed_cleanly)
    });

    let (events_tx, mut events) = mpsc::channel(16);
    let request = TransportRequest { url: format!("ws://{addr}/ws"), headers: vec![] };
    let handle = transport::spawn(TransportId(3), request, events_tx);

    let opened = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(opened.kind, TransportEventKind::Opened);

    // Leaving the group: last chat line, then DISCONNECT, then close, with no
    // await in between.
    handle.send_frame(&Frame::new(Command::Send).with_header("destination", "/app/chat/42"));
    handle.send_frame(&Frame::new(Command::Disconnect));
    let closing = handle.close();

    timeout(WAIT, closing).await.unwrap().unwrap();
    let (received, closed_cleanly) = timeout(WAIT, broker).await.unwrap().unwrap();
    assert_eq!(received, vec![Command::Send, Command::Disconnect]);
    assert!(closed_cleanly);
}

#[tokio::test]
async fn transport_reports_refused_connection() {
    // Bind then drop to get a port nobody listens on.
    let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();

    let (events_tx, mut events) = mpsc::channel(4);
    let request = TransportRequest { url: format!("ws://{addr}/ws"), headers: vec![] };
    let _handle = transport::spawn(TransportId(1), request, events_tx);

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert!(matches!(event.kind, TransportEventKind::Closed { .. }));
}

#[tokio::test]
async fn history_fetch_sends_bearer_token() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }

        let body = concat!(
            r#"[{"id":1,"senderEmail":"a@x.com","senderName":"Alice","#,
            r#""content":"old","timestamp":"2024-01-01T10:00:00"}]"#
        );
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\
             connection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&request).to_lowercase()
    });

    let client = HistoryClient::new(&format!("http://{addr}/api")).unwrap();
    let entries = client
        .fetch(&GroupId::new("42").unwrap(), &Secret::new("abc".to_string()), DateTime::UNIX_EPOCH)
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].content, "old");
    assert!(!entries[0].timestamp_defaulted);

    let request = server.await.unwrap();
    assert!(request.starts_with("get /api/chat/42/history "));
    assert!(request.contains("authorization: bearer abc"));
}
