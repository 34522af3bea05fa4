//! Connection handlers for the two rendezvous endpoints.
//!
//! The sender handler drives: bind id, establish mailbox, wait for the
//! receiver, forward PAKE and salt, then relay. The receiver handler is the
//! mirror image. After the salt both handlers drop into the same relay loop
//! that shovels opaque frames through the mailbox channels until one side
//! sends a close message or disconnects.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, warn};

use tranx_core::RendezvousMessage;

use crate::mailbox::{Mailbox, ReceiverLink, SenderLink};
use crate::{Server, ServerError};

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Drives a sender connection to completion. Logs and swallows errors so
/// the accept loop never sees them.
pub(crate) async fn handle_sender(server: Arc<Server>, ws: WebSocketStream<TcpStream>) {
    let id = server.registry.ids.bind();
    let result = sender_session(&server, id, ws).await;
    // the id is normally released when the receiver joins; make sure it
    // does not leak on error paths either
    server.registry.ids.delete(id);
    if let Err(error) = result {
        warn!(id, %error, "sender connection closed");
    }
}

/// Drives a receiver connection to completion.
pub(crate) async fn handle_receiver(server: Arc<Server>, ws: WebSocketStream<TcpStream>) {
    if let Err(error) = receiver_session(&server, ws).await {
        warn!(%error, "receiver connection closed");
    }
}

async fn sender_session(
    server: &Server,
    id: u64,
    ws: WebSocketStream<TcpStream>,
) -> Result<(), ServerError> {
    let (mut ws_tx, mut ws_rx) = ws.split();

    send(&mut ws_tx, &RendezvousMessage::TranxToSenderBind { id }).await?;

    let password_hash = match read(&mut ws_rx).await? {
        RendezvousMessage::SenderToTranxEstablish { password } => password,
        other => return Err(other.unexpected("SenderToTranxEstablish").into()),
    };

    let (mailbox, link) = Mailbox::new();
    server
        .registry
        .mailboxes
        .store(password_hash.clone(), Arc::clone(&mailbox));
    // the entry must be visible to a receiver before we sit down to wait
    server.registry.mailboxes.get(&password_hash)?;
    debug!(id, "mailbox established");

    let result = sender_exchange(server, id, &password_hash, ws_tx, ws_rx, &mailbox, link).await;
    if result.is_err() {
        server.registry.mailboxes.delete(&password_hash);
    }
    result
}

/// Everything after the mailbox exists. Split out so the caller can tear
/// the mailbox down on any error.
async fn sender_exchange(
    server: &Server,
    id: u64,
    password_hash: &str,
    mut ws_tx: WsSink,
    mut ws_rx: WsSource,
    mailbox: &Arc<Mailbox>,
    mut link: SenderLink,
) -> Result<(), ServerError> {
    // the receiver announces itself with an empty marker frame
    match timeout(server.config.receiver_timeout, link.from_receiver.recv()).await {
        Err(_) => return Err(ServerError::ReceiverTimeout),
        Ok(None) => return Err(ServerError::PeerGone),
        Ok(Some(_joined)) => server.registry.ids.delete(id),
    }

    send(&mut ws_tx, &RendezvousMessage::TranxToSenderReady).await?;

    let pake_bytes = match read(&mut ws_rx).await? {
        RendezvousMessage::SenderToTranxPake { bytes } => bytes,
        other => return Err(other.unexpected("SenderToTranxPake").into()),
    };
    link.to_receiver
        .send(pake_bytes)
        .await
        .map_err(|_| ServerError::PeerGone)?;

    let peer_pake = link.from_receiver.recv().await.ok_or(ServerError::PeerGone)?;
    send(
        &mut ws_tx,
        &RendezvousMessage::TranxToSenderPake { bytes: peer_pake },
    )
    .await?;

    let salt = match read(&mut ws_rx).await? {
        RendezvousMessage::SenderToTranxSalt { salt } => salt,
        other => return Err(other.unexpected("SenderToTranxSalt").into()),
    };
    link.to_receiver
        .send(salt)
        .await
        .map_err(|_| ServerError::PeerGone)?;

    relay(
        server,
        mailbox,
        password_hash,
        ws_tx,
        ws_rx,
        link.to_receiver,
        link.from_receiver,
        "sender",
    )
    .await
}

async fn receiver_session(
    server: &Server,
    ws: WebSocketStream<TcpStream>,
) -> Result<(), ServerError> {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let password_hash = match read(&mut ws_rx).await? {
        RendezvousMessage::ReceiverToTranxEstablish { password } => password,
        other => return Err(other.unexpected("ReceiverToTranxEstablish").into()),
    };

    let mailbox = server.registry.mailboxes.get(&password_hash)?;
    let mut link: ReceiverLink = mailbox.take_receiver_link().await?;
    debug!("receiver joined mailbox");

    // wake the waiting sender handler
    link.to_sender
        .send(Vec::new())
        .await
        .map_err(|_| ServerError::PeerGone)?;

    let sender_pake = link.from_sender.recv().await.ok_or(ServerError::PeerGone)?;
    send(
        &mut ws_tx,
        &RendezvousMessage::TranxToReceiverPake { bytes: sender_pake },
    )
    .await?;

    let pake_bytes = match read(&mut ws_rx).await? {
        RendezvousMessage::ReceiverToTranxPake { bytes } => bytes,
        other => return Err(other.unexpected("ReceiverToTranxPake").into()),
    };
    link.to_sender
        .send(pake_bytes)
        .await
        .map_err(|_| ServerError::PeerGone)?;

    let salt = link.from_sender.recv().await.ok_or(ServerError::PeerGone)?;
    send(&mut ws_tx, &RendezvousMessage::TranxToReceiverSalt { salt }).await?;

    relay(
        server,
        &mailbox,
        &password_hash,
        ws_tx,
        ws_rx,
        link.to_sender,
        link.from_sender,
        "receiver",
    )
    .await
}

/// Relay phase shared by both handlers. A spawned task drains the websocket
/// so the select loop can react to peer frames and the quit signal at the
/// same time. Frames that parse as a close message tear the mailbox down;
/// everything else is forwarded verbatim, since transfer traffic is
/// encrypted and opaque to the server.
#[allow(clippy::too_many_arguments)]
async fn relay(
    server: &Server,
    mailbox: &Arc<Mailbox>,
    password_hash: &str,
    mut ws_tx: WsSink,
    mut ws_rx: WsSource,
    to_peer: mpsc::Sender<Vec<u8>>,
    mut from_peer: mpsc::Receiver<Vec<u8>>,
    side: &'static str,
) -> Result<(), ServerError> {
    let mut quit = mailbox.quit_signal();

    let (inbound_tx, mut inbound_rx) = mpsc::channel::<Vec<u8>>(1);
    let reader_quit = Arc::clone(mailbox);
    let reader = tokio::spawn(async move {
        loop {
            match ws_rx.next().await {
                Some(Ok(Message::Text(text))) => {
                    if inbound_tx.send(text.into_bytes()).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Binary(data))) => {
                    if inbound_tx.send(data).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    reader_quit.signal_quit();
                    return;
                }
                Some(Ok(_)) => continue,
                Some(Err(error)) => {
                    debug!(%error, "relay read failed");
                    reader_quit.signal_quit();
                    return;
                }
            }
        }
    });

    loop {
        // biased so buffered peer frames drain before a quit is observed;
        // otherwise the last frame before a close could be dropped
        tokio::select! {
            biased;
            frame = from_peer.recv() => match frame {
                Some(bytes) => {
                    if ws_tx.send(Message::Binary(bytes)).await.is_err() {
                        mailbox.signal_quit();
                    }
                }
                None => {
                    mailbox.signal_quit();
                    break;
                }
            },
            frame = inbound_rx.recv() => match frame {
                Some(bytes) => match RendezvousMessage::from_slice(&bytes) {
                    Ok(RendezvousMessage::ReceiverToTranxClose)
                    | Ok(RendezvousMessage::SenderToTranxClose) => {
                        debug!(side, "close message received, tearing down mailbox");
                        mailbox.signal_quit();
                    }
                    Ok(other) => {
                        // control messages have no business here; drop them
                        warn!(side, message = other.name(), "unexpected control message during relay");
                    }
                    // opaque transfer traffic
                    Err(_) => {
                        if to_peer.send(bytes).await.is_err() {
                            mailbox.signal_quit();
                        }
                    }
                },
                None => {
                    mailbox.signal_quit();
                    break;
                }
            },
            _ = quit.recv() => break,
        }
    }

    server.registry.mailboxes.delete(password_hash);
    reader.abort();
    let _ = ws_tx.close().await;
    debug!(side, "relay finished");
    Ok(())
}

async fn send(ws_tx: &mut WsSink, message: &RendezvousMessage) -> Result<(), ServerError> {
    ws_tx.send(Message::Text(message.to_json()?)).await?;
    Ok(())
}

/// Reads the next data frame and parses it as a rendezvous message.
/// Ping and pong frames are transparent.
async fn read(ws_rx: &mut WsSource) -> Result<RendezvousMessage, ServerError> {
    loop {
        match ws_rx.next().await {
            Some(Ok(Message::Text(text))) => {
                return Ok(RendezvousMessage::from_slice(text.as_bytes())?)
            }
            Some(Ok(Message::Binary(data))) => return Ok(RendezvousMessage::from_slice(&data)?),
            Some(Ok(Message::Close(_))) | None => return Err(ServerError::PeerGone),
            Some(Ok(_)) => continue,
            Some(Err(error)) => return Err(error.into()),
        }
    }
}
