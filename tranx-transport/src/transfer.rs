//! The transfer executor.
//!
//! Runs the same regardless of whether the stream goes through the relay
//! or directly to the peer: the receiver requests the payload, the sender
//! streams encrypted chunks, then both walk through payload-sent,
//! payload-ack, closing and closing-ack.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

use tranx_core::{Crypt, TransferMessage, MAX_CHUNK_BYTES};

use crate::error::TransportError;
use crate::stream::TransferStream;

/// Coarse phase of a transfer, reported through the progress channel.
/// Strictly monotonic; consumers may use it to drive a UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransferState {
    /// Payload bytes are moving.
    Initial,
    /// All payload bytes are out; the closing exchange is in flight.
    WaitForCloseMessage,
    /// The closing exchange completed.
    Finished,
}

/// One progress update.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    /// Current transfer phase.
    pub state: TransferState,
    /// Fraction of the payload moved so far, in `0.0..=1.0`.
    pub ratio: f64,
}

/// Where progress updates go. Updates are advisory; a full or dropped
/// channel never stalls the transfer.
pub type ProgressSender = mpsc::UnboundedSender<Progress>;

/// The bytes a sender offers, with their total size known up front.
pub struct Payload {
    /// Source of the payload bytes.
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// Total payload size in bytes, communicated to the receiver during
    /// the handshake.
    pub size: u64,
}

fn report(progress: &Option<ProgressSender>, state: TransferState, ratio: f64) {
    if let Some(sink) = progress {
        let _ = sink.send(Progress { state, ratio });
    }
}

/// Sender side: waits for the payload request, streams encrypted chunks,
/// then drives the closing exchange.
pub(crate) async fn send_payload(
    stream: &mut TransferStream,
    crypt: &Crypt,
    mut payload: Payload,
    progress: &Option<ProgressSender>,
) -> Result<(), TransportError> {
    match stream.recv_encrypted(crypt).await? {
        TransferMessage::ReceiverRequestPayload => {}
        other => return Err(other.unexpected("ReceiverRequestPayload").into()),
    }
    report(progress, TransferState::Initial, 0.0);

    let mut buffer = vec![0u8; MAX_CHUNK_BYTES];
    let mut sent: u64 = 0;
    loop {
        let n = payload.reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        stream.send(crypt.encrypt(&buffer[..n])?).await?;
        sent += n as u64;
        report(
            progress,
            TransferState::Initial,
            ratio_of(sent, payload.size),
        );
    }
    debug!(bytes = sent, "payload streamed");

    stream
        .send_encrypted(&TransferMessage::SenderPayloadSent, crypt)
        .await?;
    report(progress, TransferState::WaitForCloseMessage, 1.0);

    match stream.recv_encrypted(crypt).await? {
        TransferMessage::ReceiverPayloadAck => {}
        other => return Err(other.unexpected("ReceiverPayloadAck").into()),
    }

    stream
        .send_encrypted(&TransferMessage::SenderClosing, crypt)
        .await?;
    match stream.recv_encrypted(crypt).await? {
        TransferMessage::ReceiverClosingAck => {}
        other => return Err(other.unexpected("ReceiverClosingAck").into()),
    }
    report(progress, TransferState::Finished, 1.0);
    Ok(())
}

/// Receiver side: requests the payload, writes decrypted chunks until the
/// advertised size is reached, then answers the closing exchange. Returns
/// the number of payload bytes written.
pub(crate) async fn receive_payload<W>(
    stream: &mut TransferStream,
    crypt: &Crypt,
    writer: &mut W,
    payload_size: u64,
    progress: &Option<ProgressSender>,
) -> Result<u64, TransportError>
where
    W: AsyncWrite + Unpin,
{
    stream
        .send_encrypted(&TransferMessage::ReceiverRequestPayload, crypt)
        .await?;
    report(progress, TransferState::Initial, 0.0);

    let mut received: u64 = 0;
    while received < payload_size {
        let chunk = crypt.decrypt(&stream.recv().await?)?;
        writer.write_all(&chunk).await?;
        received += chunk.len() as u64;
        report(
            progress,
            TransferState::Initial,
            ratio_of(received, payload_size),
        );
    }
    writer.flush().await?;
    debug!(bytes = received, "payload written");

    match stream.recv_encrypted(crypt).await? {
        TransferMessage::SenderPayloadSent => {}
        other => return Err(other.unexpected("SenderPayloadSent").into()),
    }
    stream
        .send_encrypted(&TransferMessage::ReceiverPayloadAck, crypt)
        .await?;
    report(progress, TransferState::WaitForCloseMessage, 1.0);

    match stream.recv_encrypted(crypt).await? {
        TransferMessage::SenderClosing => {}
        other => return Err(other.unexpected("SenderClosing").into()),
    }
    stream
        .send_encrypted(&TransferMessage::ReceiverClosingAck, crypt)
        .await?;
    report(progress, TransferState::Finished, 1.0);

    Ok(received)
}

fn ratio_of(done: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_ordered() {
        assert!(TransferState::Initial < TransferState::WaitForCloseMessage);
        assert!(TransferState::WaitForCloseMessage < TransferState::Finished);
    }

    #[test]
    fn ratio_handles_empty_payload() {
        assert_eq!(ratio_of(0, 0), 1.0);
        assert_eq!(ratio_of(5, 10), 0.5);
    }
}
