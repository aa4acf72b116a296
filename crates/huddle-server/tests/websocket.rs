//! End-to-end tests over real WebSocket connections.

use futures_util::{SinkExt, StreamExt};
use huddle_core::{Hub, HubConfig};
use huddle_protocol::{decode, encode, Encoding, Message, Payload, Scope};
use huddle_server::{router, AppState, Config};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> (SocketAddr, Hub) {
    let config = Config::default();
    let hub = Hub::spawn(HubConfig::default());
    let state = Arc::new(AppState::new(&config, hub.clone()));
    let app = router(&config, state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hub)
}

async fn connect(addr: SocketAddr, user: &str, device: &str, encoding: &str) -> Client {
    let url = format!("ws://{addr}/v1/api/ws?token={user}&deviceId={device}&username={user}&encoding={encoding}");
    let (stream, _) = connect_async(url).await.unwrap();
    stream
}

async fn wait_for(hub: &Hub, mut condition: impl FnMut(&Hub) -> bool) {
    for _ in 0..500 {
        if condition(hub) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

/// Next non-system message received by a client.
async fn next_chat(client: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let frame = client.next().await.unwrap().unwrap();
            let message = match frame {
                WsMessage::Text(text) => decode(text.as_bytes(), Encoding::Json).unwrap(),
                WsMessage::Binary(data) => decode(&data, Encoding::MessagePack).unwrap(),
                _ => continue,
            };
            if !message.is_system() {
                return message;
            }
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_global_message_reaches_every_client() {
    let (addr, hub) = start_server().await;
    let mut alice = connect(addr, "alice", "d1", "json").await;
    let mut bob = connect(addr, "bob", "d1", "msgpack").await;
    wait_for(&hub, |h| h.stats().connections == 2).await;

    let message = Message::new(Scope::Global, Payload::text("hello"), "", "");
    let text = String::from_utf8(encode(&message, Encoding::Json).unwrap().to_vec()).unwrap();
    alice.send(WsMessage::Text(text)).await.unwrap();

    for client in [&mut alice, &mut bob] {
        let received = next_chat(client).await;
        assert_eq!(received.from, "alice");
        assert_eq!(received.payload.unwrap().content, "hello");
    }
}

#[tokio::test]
async fn test_disconnect_leaves_rooms() {
    let (addr, hub) = start_server().await;
    let alice = connect(addr, "alice", "d1", "json").await;
    wait_for(&hub, |h| h.stats().connections == 1).await;

    hub.create_room(
        "alice",
        huddle_core::Room::new("r1", "lobby", "", "alice", "alice"),
    )
    .await
    .unwrap();
    wait_for(&hub, |h| h.room_exists("r1")).await;
    hub.join_room("alice", "d1", "r1").await.unwrap();
    wait_for(&hub, |h| h.room_detail("r1").is_some_and(|d| d.count == 1)).await;

    drop(alice);
    wait_for(&hub, |h| h.stats().connections == 0).await;
    wait_for(&hub, |h| !h.room_exists("r1")).await;
    assert!(hub.users().is_empty());
}

#[tokio::test]
async fn test_room_message_only_reaches_members() {
    let (addr, hub) = start_server().await;
    let mut alice = connect(addr, "alice", "d1", "json").await;
    let mut bob = connect(addr, "bob", "d1", "json").await;
    let mut carol = connect(addr, "carol", "d1", "json").await;
    wait_for(&hub, |h| h.stats().connections == 3).await;

    hub.create_room("alice", huddle_core::Room::new("r1", "lobby", "", "alice", "alice"))
        .await
        .unwrap();
    wait_for(&hub, |h| h.room_exists("r1")).await;
    hub.join_room("alice", "d1", "r1").await.unwrap();
    hub.join_room("bob", "d1", "r1").await.unwrap();
    wait_for(&hub, |h| h.room_detail("r1").is_some_and(|d| d.count == 2)).await;

    let room = Message::new(Scope::Room, Payload::text("members only"), "", "r1");
    let direct = Message::new(Scope::User, Payload::text("just carol"), "", "carol");
    for message in [room, direct] {
        let text = String::from_utf8(encode(&message, Encoding::Json).unwrap().to_vec()).unwrap();
        alice.send(WsMessage::Text(text)).await.unwrap();
    }

    assert_eq!(next_chat(&mut alice).await.payload.unwrap().content, "members only");
    assert_eq!(next_chat(&mut bob).await.payload.unwrap().content, "members only");
    assert_eq!(next_chat(&mut carol).await.payload.unwrap().content, "just carol");
}
