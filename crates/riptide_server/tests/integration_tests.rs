//! End-to-end tests over real TCP sockets: plain HTTP dispatch, WebSocket
//! chat rooms with broadcast, SSE feeds, and shutdown behavior.

use futures::{SinkExt, StreamExt};
use riptide_hub::{ConnectionContext, Envelope, Hub};
use riptide_router::{handler, HandlerError, Method, RequestContext, Response};
use riptide_server::{RiptideServer, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

fn test_config(port: u16) -> ServerConfig {
    ServerConfig {
        bind_address: format!("127.0.0.1:{port}").parse().unwrap(),
        ..Default::default()
    }
}

async fn ping(_ctx: RequestContext) -> Result<Response, HandlerError> {
    Ok(Response::text("pong"))
}

/// The reference wiring used by most tests: one plain route, room-scoped
/// WebSocket chat, and a room-scoped SSE feed.
fn chat_server(port: u16) -> RiptideServer {
    RiptideServer::builder(test_config(port))
        .route(Method::Get, "/ping", handler(ping))
        .unwrap()
        .websocket("/ws/:room")
        .unwrap()
        .sse("/events/:room")
        .unwrap()
        .on_connect(|hub: Arc<Hub>, ctx: &ConnectionContext| {
            if let Some(room) = ctx.params.get("room") {
                let _ = hub.join(room, ctx.id);
            }
        })
        .on_message(
            "chat",
            |hub: Arc<Hub>, ctx: ConnectionContext, envelope: Envelope| async move {
                if let Some(room) = ctx.params.get("room") {
                    hub.broadcast(room, &Envelope::new("chat", envelope.data).excluding(ctx.id))?;
                }
                Ok(())
            },
        )
        .build()
}

async fn start(server: RiptideServer) -> Arc<RiptideServer> {
    let server = Arc::new(server);
    let running = server.clone();
    tokio::spawn(async move {
        let _ = running.start().await;
    });
    sleep(Duration::from_millis(200)).await;
    server
}

async fn http_request(port: u16, raw: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8(response).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn plain_http_round_trip() {
    let port = 9310;
    let _server = start(chat_server(port)).await;

    let response = http_request(port, "GET /ping HTTP/1.1\r\nconnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.ends_with("pong"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_path_is_404() {
    let port = 9311;
    let _server = start(chat_server(port)).await;

    let response = http_request(port, "GET /missing HTTP/1.1\r\nconnection: close\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
}

#[tokio::test(flavor = "multi_thread")]
async fn keep_alive_serves_sequential_requests() {
    let port = 9312;
    let _server = start(chat_server(port)).await;

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();

    stream
        .write_all(b"GET /ping HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    let mut buf = vec![0u8; 1024];
    let read = stream.read(&mut buf).await.unwrap();
    let first = String::from_utf8_lossy(&buf[..read]).to_string();
    assert!(first.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(first.contains("connection: keep-alive"));

    stream
        .write_all(b"GET /ping HTTP/1.1\r\nconnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    let second = String::from_utf8_lossy(&rest).to_string();
    assert!(second.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(second.contains("connection: close"));
}

#[tokio::test(flavor = "multi_thread")]
async fn websocket_chat_broadcasts_to_room_except_sender() {
    let port = 9313;
    let _server = start(chat_server(port)).await;

    let (mut alice, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/lobby"))
        .await
        .unwrap();
    let (mut bob, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/lobby"))
        .await
        .unwrap();
    let (mut carol, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/other"))
        .await
        .unwrap();

    // Give the server a moment to register the connections and run the
    // room joins.
    sleep(Duration::from_millis(200)).await;

    alice
        .send(Message::text(r#"{"event":"chat","data":{"text":"hi"}}"#))
        .await
        .unwrap();

    let received = timeout(Duration::from_secs(5), bob.next())
        .await
        .expect("bob should receive the broadcast")
        .unwrap()
        .unwrap();
    let Message::Text(text) = received else {
        panic!("expected text frame");
    };
    let envelope: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(envelope["event"], "chat");
    assert_eq!(envelope["data"]["text"], "hi");

    // The sender is excluded and the other room hears nothing.
    assert!(timeout(Duration::from_millis(300), alice.next()).await.is_err());
    assert!(timeout(Duration::from_millis(300), carol.next()).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn websocket_broadcasts_arrive_in_order() {
    let port = 9314;
    let server = start(chat_server(port)).await;

    let (mut listener, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/feed"))
        .await
        .unwrap();
    sleep(Duration::from_millis(200)).await;

    let hub = server.hub();
    for n in 1..=5 {
        hub.broadcast("feed", &Envelope::new("seq", serde_json::json!({ "n": n })))
            .unwrap();
    }

    for n in 1..=5 {
        let received = timeout(Duration::from_secs(5), listener.next())
            .await
            .expect("broadcast should arrive")
            .unwrap()
            .unwrap();
        let Message::Text(text) = received else {
            panic!("expected text frame");
        };
        let envelope: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(envelope["data"]["n"], n);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn sse_stream_receives_room_broadcasts() {
    let port = 9315;
    let server = start(chat_server(port)).await;

    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream
        .write_all(b"GET /events/feed HTTP/1.1\r\nhost: localhost\r\n\r\n")
        .await
        .unwrap();

    // Read until the stream preamble (including the retry hint) arrived.
    let mut collected = String::new();
    let mut buf = [0u8; 1024];
    while !collected.contains("retry:") {
        let read = timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("preamble should arrive")
            .unwrap();
        assert!(read > 0, "stream closed before preamble");
        collected.push_str(&String::from_utf8_lossy(&buf[..read]));
    }
    assert!(collected.contains("content-type: text/event-stream"));

    // The preamble goes out before the connection registers with the hub;
    // give the join a moment before broadcasting.
    sleep(Duration::from_millis(200)).await;

    server
        .hub()
        .broadcast("feed", &Envelope::new("tick", serde_json::json!({ "n": 1 })))
        .unwrap();

    while !collected.contains("event: tick") {
        let read = timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("event should arrive")
            .unwrap();
        assert!(read > 0, "stream closed before event");
        collected.push_str(&String::from_utf8_lossy(&buf[..read]));
    }
    assert!(collected.contains("data: {\"n\":1}"));
}

#[tokio::test(flavor = "multi_thread")]
async fn disconnected_client_purged_from_rooms() {
    let port = 9316;
    let server = start(chat_server(port)).await;

    let (mut alice, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/lobby"))
        .await
        .unwrap();
    let (bob_conn, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/lobby"))
        .await
        .unwrap();
    sleep(Duration::from_millis(200)).await;
    assert_eq!(server.hub().room_members("lobby"), 2);

    drop(bob_conn);
    sleep(Duration::from_millis(300)).await;
    assert_eq!(server.hub().room_members("lobby"), 1);

    // Delivery to the survivor keeps working.
    server
        .hub()
        .broadcast("lobby", &Envelope::new("still_here", serde_json::json!(null)))
        .unwrap();
    let received = timeout(Duration::from_secs(5), alice.next())
        .await
        .expect("survivor should receive")
        .unwrap()
        .unwrap();
    assert!(matches!(received, Message::Text(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_stops_accepting_and_closes_live_connections() {
    let port = 9317;
    let server = start(chat_server(port)).await;

    let (mut client, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/lobby"))
        .await
        .unwrap();
    sleep(Duration::from_millis(200)).await;

    server.shutdown().await.unwrap();
    sleep(Duration::from_millis(300)).await;

    // The live connection was closed by the hub...
    let next = timeout(Duration::from_secs(5), client.next())
        .await
        .expect("close should arrive");
    match next {
        None | Some(Ok(Message::Close(_))) | Some(Err(_)) => {}
        other => panic!("expected close, got {other:?}"),
    }

    // ...and the listener is gone.
    assert!(TcpStream::connect(("127.0.0.1", port)).await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn stats_separate_not_found_from_faults() {
    let port = 9318;

    async fn faulty(_ctx: RequestContext) -> Result<Response, HandlerError> {
        Err(HandlerError::fault("database unreachable"))
    }

    let server = start(
        RiptideServer::builder(test_config(port))
            .route(Method::Get, "/ok", handler(ping))
            .unwrap()
            .route(Method::Get, "/fail", handler(faulty))
            .unwrap()
            .build(),
    )
    .await;

    http_request(port, "GET /ok HTTP/1.1\r\nconnection: close\r\n\r\n").await;
    http_request(port, "GET /missing HTTP/1.1\r\nconnection: close\r\n\r\n").await;
    let fail = http_request(port, "GET /fail HTTP/1.1\r\nconnection: close\r\n\r\n").await;
    assert!(fail.starts_with("HTTP/1.1 500"));

    let stats = server.stats();
    assert_eq!(stats.requests, 3);
    assert_eq!(stats.routes_not_found, 1);
    assert_eq!(stats.handler_faults, 1);
}
