//! End-to-end tests using a real WebSocket client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use board_core::ProjectId;
use board_hub::{HubConfig, HubServer};
use futures::{SinkExt, StreamExt};
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

const TIMEOUT: Duration = Duration::from_secs(5);

const ALICE: &str = r#"{"type":"chat","sender_name":"alice","content":"hi","created_at":"2024-01-01T00:00:00Z"}"#;

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn boot_server(config: HubConfig) -> (SocketAddr, Arc<HubServer>) {
    let server = Arc::new(HubServer::new(config));
    let handle = server.listen().await.unwrap();
    (handle.addr(), server)
}

async fn connect(addr: SocketAddr, project: i64) -> WsStream {
    let (ws, _) = connect_async(format!("ws://{addr}/ws/{project}")).await.unwrap();
    ws
}

/// Wait until the hub reports `n` members in `project`.
async fn wait_for_members(server: &HubServer, project: i64, n: usize) {
    let deadline = Instant::now() + TIMEOUT;
    while server.registry().member_count(ProjectId::new(project)) != n {
        assert!(
            Instant::now() < deadline,
            "project {project} never reached {n} members"
        );
        sleep(Duration::from_millis(10)).await;
    }
}

/// Next text frame, skipping control frames.
async fn recv_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("read failed");
        match msg {
            Message::Text(t) => return t.as_str().to_owned(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("expected text, got {other:?}"),
        }
    }
}

/// Read until the server closes the socket.
async fn expect_closed(ws: &mut WsStream) {
    let closed = timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Ok(Message::Close(_)) | Err(_)) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "server did not close the socket");
}

#[tokio::test]
async fn message_reaches_every_member_in_canonical_form() {
    let (addr, server) = boot_server(HubConfig::local()).await;
    let mut a = connect(addr, 42).await;
    let mut b = connect(addr, 42).await;
    wait_for_members(&server, 42, 2).await;

    a.send(Message::text(ALICE.to_string())).await.unwrap();

    assert_eq!(recv_text(&mut b).await, ALICE);
    // The sender is a member too.
    assert_eq!(recv_text(&mut a).await, ALICE);
}

#[tokio::test]
async fn binary_frames_are_decoded_like_text() {
    let (addr, server) = boot_server(HubConfig::local()).await;
    let mut a = connect(addr, 9).await;
    let mut b = connect(addr, 9).await;
    wait_for_members(&server, 9, 2).await;

    a.send(Message::binary(ALICE.as_bytes().to_vec())).await.unwrap();
    assert_eq!(recv_text(&mut b).await, ALICE);
}

#[tokio::test]
async fn channels_are_isolated() {
    let (addr, server) = boot_server(HubConfig::local()).await;
    let mut a = connect(addr, 1).await;
    let mut b = connect(addr, 2).await;
    wait_for_members(&server, 1, 1).await;
    wait_for_members(&server, 2, 1).await;

    a.send(Message::text(ALICE.to_string())).await.unwrap();
    assert_eq!(recv_text(&mut a).await, ALICE);

    let leaked = timeout(Duration::from_millis(300), b.next()).await;
    assert!(leaked.is_err(), "project 2 saw project 1 traffic: {leaked:?}");
}

#[tokio::test]
async fn bad_project_id_is_rejected_with_400() {
    let (addr, server) = boot_server(HubConfig::local()).await;
    let err = connect_async(format!("ws://{addr}/ws/abc")).await.err().unwrap();
    match err {
        tungstenite::Error::Http(resp) => assert_eq!(resp.status(), 400),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
    assert_eq!(server.registry().connection_count(), 0);
}

#[tokio::test]
async fn malformed_frame_drops_only_the_sender() {
    let (addr, server) = boot_server(HubConfig::local()).await;
    let mut bad = connect(addr, 5).await;
    let mut good = connect(addr, 5).await;
    wait_for_members(&server, 5, 2).await;

    bad.send(Message::text("not json".to_string())).await.unwrap();
    expect_closed(&mut bad).await;
    wait_for_members(&server, 5, 1).await;

    // The survivor still chats.
    good.send(Message::text(ALICE.to_string())).await.unwrap();
    assert_eq!(recv_text(&mut good).await, ALICE);
}

#[tokio::test]
async fn client_close_removes_empty_channel() {
    let (addr, server) = boot_server(HubConfig::local()).await;
    let mut a = connect(addr, 77).await;
    wait_for_members(&server, 77, 1).await;
    assert_eq!(server.registry().channel_count(), 1);

    a.close(None).await.unwrap();
    wait_for_members(&server, 77, 0).await;
    assert_eq!(server.registry().channel_count(), 0);
    assert_eq!(server.registry().connection_count(), 0);
}

#[tokio::test]
async fn oversize_message_ends_session() {
    let config = HubConfig {
        max_message_bytes: 1024,
        ..HubConfig::local()
    };
    let (addr, server) = boot_server(config).await;
    let mut a = connect(addr, 3).await;
    wait_for_members(&server, 3, 1).await;

    let huge = format!(
        r#"{{"type":"chat","sender_name":"a","content":"{}","created_at":""}}"#,
        "x".repeat(4096)
    );
    let _ = a.send(Message::text(huge)).await;
    expect_closed(&mut a).await;
    wait_for_members(&server, 3, 0).await;
}

#[tokio::test]
async fn shutdown_closes_open_sessions() {
    let (addr, server) = boot_server(HubConfig::local()).await;
    let mut a = connect(addr, 11).await;
    let mut b = connect(addr, 12).await;
    wait_for_members(&server, 11, 1).await;
    wait_for_members(&server, 12, 1).await;

    server.shutdown().trigger();

    expect_closed(&mut a).await;
    expect_closed(&mut b).await;
    assert_eq!(server.registry().connection_count(), 0);
}

#[tokio::test]
async fn drain_waits_for_sessions_to_end() {
    let server = HubServer::new(HubConfig::local());
    let handle = server.listen().await.unwrap();
    let mut a = connect(handle.addr(), 13).await;
    wait_for_members(&server, 13, 1).await;
    assert!(!server.sessions().is_empty());

    let clean = server
        .shutdown()
        .drain(vec![handle.into_task()], Some(TIMEOUT))
        .await;
    assert!(clean);
    // The close frame was written before the serve task finished.
    assert!(server.sessions().is_empty());
    expect_closed(&mut a).await;
}

#[tokio::test]
async fn messages_keep_their_order() {
    let (addr, server) = boot_server(HubConfig::local()).await;
    let mut a = connect(addr, 20).await;
    let mut b = connect(addr, 20).await;
    wait_for_members(&server, 20, 2).await;

    for i in 0..20 {
        let msg = format!(
            r#"{{"type":"chat","sender_name":"a","content":"{i}","created_at":""}}"#
        );
        a.send(Message::text(msg)).await.unwrap();
    }

    // Payloads may arrive coalesced into one frame, newline-separated.
    let mut seen = Vec::new();
    while seen.len() < 20 {
        for line in recv_text(&mut b).await.split('\n') {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            seen.push(v["content"].as_str().unwrap().to_owned());
        }
    }
    let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    assert_eq!(seen, expected);
}
