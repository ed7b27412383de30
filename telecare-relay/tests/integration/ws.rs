use crate::utils::init_tracing;
use anyhow::{Context, Result, bail};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use telecare_core::{
    ClientMessage, IceServerConfig, ParticipantId, ServerMessage, SessionDescription, SessionKey,
};
use telecare_relay::{RelayState, SignalingService, router};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_relay() -> SocketAddr {
    init_tracing();
    let service = SignalingService::new(vec![IceServerConfig {
        urls: vec!["stun:stun.example.org:3478".into()],
        username: None,
        credential: None,
    }]);
    let state = RelayState::new(service);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, user: &str) -> WsClient {
    let (stream, _) = connect_async(format!("ws://{addr}/ws/{user}"))
        .await
        .expect("websocket connect failed");
    stream
}

async fn recv_message(client: &mut WsClient) -> Result<ServerMessage> {
    let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .context("timed out waiting for server message")?
        .context("stream ended")?
        .context("websocket error")?;
    match frame {
        Message::Text(text) => Ok(serde_json::from_str(&text)?),
        other => bail!("unexpected frame: {other:?}"),
    }
}

async fn send_message(client: &mut WsClient, message: &ClientMessage) {
    let json = serde_json::to_string(message).unwrap();
    client.send(Message::Text(json)).await.unwrap();
}

/// Welcome carries our transient id; IceConfig follows immediately.
async fn handshake(client: &mut WsClient) -> ParticipantId {
    let id = match recv_message(client).await.unwrap() {
        ServerMessage::Welcome { participant_id } => participant_id,
        other => panic!("expected Welcome, got {other:?}"),
    };
    match recv_message(client).await.unwrap() {
        ServerMessage::IceConfig { ice_servers } => assert!(!ice_servers.is_empty()),
        other => panic!("expected IceConfig, got {other:?}"),
    }
    id
}

#[tokio::test]
async fn full_signaling_round_trip() {
    let addr = spawn_relay().await;
    let key = SessionKey::from("200");

    let mut patient = connect(addr, "patient-7").await;
    let patient_id = handshake(&mut patient).await;
    send_message(
        &mut patient,
        &ClientMessage::JoinRoom {
            session_key: key.clone(),
        },
    )
    .await;

    let mut practitioner = connect(addr, "dr-strange").await;
    let practitioner_id = handshake(&mut practitioner).await;
    send_message(
        &mut practitioner,
        &ClientMessage::JoinRoom {
            session_key: key.clone(),
        },
    )
    .await;

    // The participant that was already present learns about the newcomer.
    match recv_message(&mut patient).await.unwrap() {
        ServerMessage::UserJoined { peer_id } => assert_eq!(peer_id, practitioner_id),
        other => panic!("expected UserJoined, got {other:?}"),
    }

    send_message(
        &mut patient,
        &ClientMessage::Offer {
            target: practitioner_id.clone(),
            payload: SessionDescription {
                sdp: "v=0 test-offer".into(),
            },
        },
    )
    .await;

    match recv_message(&mut practitioner).await.unwrap() {
        ServerMessage::Offer { from, payload } => {
            assert_eq!(from, patient_id);
            assert_eq!(payload.sdp, "v=0 test-offer");
        }
        other => panic!("expected Offer, got {other:?}"),
    }
}

#[tokio::test]
async fn third_connection_gets_room_error() {
    let addr = spawn_relay().await;
    let key = SessionKey::from("201");

    let mut patient = connect(addr, "patient").await;
    handshake(&mut patient).await;
    send_message(
        &mut patient,
        &ClientMessage::JoinRoom {
            session_key: key.clone(),
        },
    )
    .await;

    let mut practitioner = connect(addr, "practitioner").await;
    handshake(&mut practitioner).await;
    send_message(
        &mut practitioner,
        &ClientMessage::JoinRoom {
            session_key: key.clone(),
        },
    )
    .await;
    let _user_joined = recv_message(&mut patient).await.unwrap();

    let mut intruder = connect(addr, "third-wheel").await;
    handshake(&mut intruder).await;
    send_message(
        &mut intruder,
        &ClientMessage::JoinRoom {
            session_key: key.clone(),
        },
    )
    .await;

    match recv_message(&mut intruder).await.unwrap() {
        ServerMessage::RoomError { message } => assert!(message.contains("201")),
        other => panic!("expected RoomError, got {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_is_reported_as_peer_left() {
    let addr = spawn_relay().await;
    let key = SessionKey::from("202");

    let mut patient = connect(addr, "patient").await;
    handshake(&mut patient).await;
    send_message(
        &mut patient,
        &ClientMessage::JoinRoom {
            session_key: key.clone(),
        },
    )
    .await;

    let mut practitioner = connect(addr, "practitioner").await;
    let practitioner_id = handshake(&mut practitioner).await;
    send_message(
        &mut practitioner,
        &ClientMessage::JoinRoom {
            session_key: key.clone(),
        },
    )
    .await;
    let _user_joined = recv_message(&mut patient).await.unwrap();

    // Socket vanishes without an explicit LeaveRoom.
    drop(practitioner);

    match recv_message(&mut patient).await.unwrap() {
        ServerMessage::PeerLeft { peer_id } => assert_eq!(peer_id, practitioner_id),
        other => panic!("expected PeerLeft, got {other:?}"),
    }
}
