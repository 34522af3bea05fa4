//! Integration tests driving the rendezvous server with raw websocket
//! clients, one per endpoint, exactly as the real transport would.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream,
};

use tranx_core::{Password, RendezvousMessage};
use tranx_server::mailbox::Registry;
use tranx_server::{Server, ServerConfig, RECEIVER_PATH, SENDER_PATH};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

async fn start_server(config: ServerConfig) -> (Arc<Server>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(config, Registry::default());
    tokio::spawn(Arc::clone(&server).serve(listener));
    (server, format!("ws://{}", addr))
}

async fn connect(url: &str, path: &str) -> Ws {
    let (ws, _) = connect_async(format!("{url}{path}")).await.unwrap();
    ws
}

async fn send_msg(ws: &mut Ws, message: &RendezvousMessage) {
    ws.send(Message::Text(message.to_json().unwrap()))
        .await
        .unwrap();
}

async fn read_msg(ws: &mut Ws) -> RendezvousMessage {
    let raw = read_raw(ws).await;
    RendezvousMessage::from_slice(&raw).unwrap()
}

async fn read_raw(ws: &mut Ws) -> Vec<u8> {
    tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.into_bytes(),
                Some(Ok(Message::Binary(data))) => return data,
                Some(Ok(_)) => continue,
                other => panic!("connection ended unexpectedly: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for a frame")
}

/// Waits until the server closes our connection.
async fn expect_closed(ws: &mut Ws) {
    tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return,
            }
        }
    })
    .await
    .expect("timed out waiting for the server to close the connection");
}

/// Runs both sides through establish, PAKE and salt, returning the two
/// connections still in the relay phase.
async fn paired_session(url: &str, password_hash: &str) -> (Ws, Ws) {
    let mut sender = connect(url, SENDER_PATH).await;
    let RendezvousMessage::TranxToSenderBind { .. } = read_msg(&mut sender).await else {
        panic!("expected bind");
    };
    send_msg(
        &mut sender,
        &RendezvousMessage::SenderToTranxEstablish {
            password: password_hash.to_owned(),
        },
    )
    .await;

    // let the sender handler store the mailbox before the receiver looks
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut receiver = connect(url, RECEIVER_PATH).await;
    send_msg(
        &mut receiver,
        &RendezvousMessage::ReceiverToTranxEstablish {
            password: password_hash.to_owned(),
        },
    )
    .await;

    assert!(matches!(
        read_msg(&mut sender).await,
        RendezvousMessage::TranxToSenderReady
    ));

    send_msg(
        &mut sender,
        &RendezvousMessage::SenderToTranxPake {
            bytes: vec![1, 2, 3],
        },
    )
    .await;
    match read_msg(&mut receiver).await {
        RendezvousMessage::TranxToReceiverPake { bytes } => assert_eq!(bytes, vec![1, 2, 3]),
        other => panic!("expected sender pake, got {}", other.name()),
    }

    send_msg(
        &mut receiver,
        &RendezvousMessage::ReceiverToTranxPake {
            bytes: vec![4, 5, 6],
        },
    )
    .await;
    match read_msg(&mut sender).await {
        RendezvousMessage::TranxToSenderPake { bytes } => assert_eq!(bytes, vec![4, 5, 6]),
        other => panic!("expected receiver pake, got {}", other.name()),
    }

    send_msg(
        &mut sender,
        &RendezvousMessage::SenderToTranxSalt { salt: vec![9; 32] },
    )
    .await;
    match read_msg(&mut receiver).await {
        RendezvousMessage::TranxToReceiverSalt { salt } => assert_eq!(salt, vec![9; 32]),
        other => panic!("expected salt, got {}", other.name()),
    }

    (sender, receiver)
}

#[tokio::test]
async fn full_handshake_then_relay_and_close() {
    let (server, url) = start_server(ServerConfig::default()).await;
    let password = Password::generate(1);
    let hash = password.hashed();

    let (mut sender, mut receiver) = paired_session(&url, &hash).await;
    assert_eq!(server.registry().mailboxes.len(), 1);

    // opaque binary traffic is forwarded verbatim in both directions
    sender
        .send(Message::Binary(vec![0xde, 0xad, 0xbe, 0xef]))
        .await
        .unwrap();
    assert_eq!(read_raw(&mut receiver).await, vec![0xde, 0xad, 0xbe, 0xef]);

    receiver
        .send(Message::Binary(b"not json at all".to_vec()))
        .await
        .unwrap();
    assert_eq!(read_raw(&mut sender).await, b"not json at all".to_vec());

    // a close message from the receiver tears the whole session down
    send_msg(&mut receiver, &RendezvousMessage::ReceiverToTranxClose).await;
    expect_closed(&mut sender).await;
    expect_closed(&mut receiver).await;

    // mailbox is gone, so a late receiver cannot join
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.registry().mailboxes.is_empty());
}

#[tokio::test]
async fn close_from_sender_also_tears_down() {
    let (server, url) = start_server(ServerConfig::default()).await;
    let (mut sender, mut receiver) = paired_session(&url, "aabbcc").await;

    send_msg(&mut sender, &RendezvousMessage::SenderToTranxClose).await;
    expect_closed(&mut sender).await;
    expect_closed(&mut receiver).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.registry().mailboxes.is_empty());
}

#[tokio::test]
async fn receiver_timeout_deletes_the_mailbox() {
    let (server, url) = start_server(ServerConfig {
        receiver_timeout: Duration::from_millis(100),
    })
    .await;

    let mut sender = connect(&url, SENDER_PATH).await;
    let RendezvousMessage::TranxToSenderBind { id } = read_msg(&mut sender).await else {
        panic!("expected bind");
    };
    send_msg(
        &mut sender,
        &RendezvousMessage::SenderToTranxEstablish {
            password: "feedface".to_owned(),
        },
    )
    .await;

    // no receiver shows up; the sender gets dropped and the mailbox and
    // reserved id are released
    expect_closed(&mut sender).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.registry().mailboxes.is_empty());
    assert!(!server.registry().ids.is_pending(id));
}

#[tokio::test]
async fn unknown_password_hash_is_rejected() {
    let (_server, url) = start_server(ServerConfig::default()).await;

    let mut receiver = connect(&url, RECEIVER_PATH).await;
    send_msg(
        &mut receiver,
        &RendezvousMessage::ReceiverToTranxEstablish {
            password: "0000000000000000".to_owned(),
        },
    )
    .await;
    expect_closed(&mut receiver).await;
}

#[tokio::test]
async fn duplicate_receiver_is_rejected() {
    let (_server, url) = start_server(ServerConfig::default()).await;
    let (mut sender, mut receiver) = paired_session(&url, "c0ffee").await;

    let mut intruder = connect(&url, RECEIVER_PATH).await;
    send_msg(
        &mut intruder,
        &RendezvousMessage::ReceiverToTranxEstablish {
            password: "c0ffee".to_owned(),
        },
    )
    .await;
    expect_closed(&mut intruder).await;

    // the established pair is unaffected
    sender.send(Message::Binary(vec![7, 7, 7])).await.unwrap();
    assert_eq!(read_raw(&mut receiver).await, vec![7, 7, 7]);
}

#[tokio::test]
async fn unknown_path_is_not_upgraded() {
    let (_server, url) = start_server(ServerConfig::default()).await;
    let result = connect_async(format!("{url}/somewhere-else")).await;
    assert!(result.is_err());
}
