//! Mailbox registry shared between sender and receiver connections.
//!
//! A mailbox is created when a sender establishes under a password hash and
//! holds the pair of single-slot channels that bridge the two websocket
//! handlers. The receiver half can be claimed exactly once, which is also
//! what enforces the one-receiver-per-mailbox rule.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex};

/// Single-slot handoff between the paired connection handlers. Each side
/// blocks until the other has taken the previous frame, mirroring the
/// lock-step nature of the pairing handshake.
const LINK_CAPACITY: usize = 1;

/// Errors produced by registry lookups.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No sender has established a mailbox under the presented hash.
    #[error("no mailbox bound for this password hash")]
    MailboxNotFound,
    /// A receiver already claimed this mailbox.
    #[error("mailbox already has a receiver")]
    DuplicateReceiver,
}

/// The sender handler's ends of the mailbox channel pair.
pub struct SenderLink {
    /// Frames destined for the receiver handler.
    pub to_receiver: mpsc::Sender<Vec<u8>>,
    /// Frames arriving from the receiver handler.
    pub from_receiver: mpsc::Receiver<Vec<u8>>,
}

/// The receiver handler's ends of the mailbox channel pair.
pub struct ReceiverLink {
    /// Frames destined for the sender handler.
    pub to_sender: mpsc::Sender<Vec<u8>>,
    /// Frames arriving from the sender handler.
    pub from_sender: mpsc::Receiver<Vec<u8>>,
}

/// Pairing state for one sender/receiver rendezvous.
pub struct Mailbox {
    receiver_link: Mutex<Option<ReceiverLink>>,
    quit: broadcast::Sender<()>,
}

impl Mailbox {
    /// Creates a mailbox together with the sender handler's channel ends.
    pub fn new() -> (Arc<Self>, SenderLink) {
        let (to_receiver, from_sender) = mpsc::channel(LINK_CAPACITY);
        let (to_sender, from_receiver) = mpsc::channel(LINK_CAPACITY);
        let (quit, _) = broadcast::channel(1);
        let mailbox = Arc::new(Self {
            receiver_link: Mutex::new(Some(ReceiverLink {
                to_sender,
                from_sender,
            })),
            quit,
        });
        (
            mailbox,
            SenderLink {
                to_receiver,
                from_receiver,
            },
        )
    }

    /// Claims the receiver half of the mailbox. Succeeds at most once per
    /// mailbox; a second claim means a duplicate receiver connected.
    pub async fn take_receiver_link(&self) -> Result<ReceiverLink, RegistryError> {
        self.receiver_link
            .lock()
            .await
            .take()
            .ok_or(RegistryError::DuplicateReceiver)
    }

    /// Subscribes to the teardown signal for this mailbox.
    pub fn quit_signal(&self) -> broadcast::Receiver<()> {
        self.quit.subscribe()
    }

    /// Fires the teardown signal. Both relay loops observe it and shut down.
    pub fn signal_quit(&self) {
        // No subscribers is fine: the other side may already be gone.
        let _ = self.quit.send(());
    }
}

/// Mailboxes keyed by the hex sha-256 of the transfer password.
#[derive(Default)]
pub struct Mailboxes {
    inner: DashMap<String, Arc<Mailbox>>,
}

impl Mailboxes {
    /// Stores a mailbox under a password hash, replacing any stale entry.
    pub fn store(&self, password_hash: String, mailbox: Arc<Mailbox>) {
        self.inner.insert(password_hash, mailbox);
    }

    /// Looks up the mailbox for a password hash.
    pub fn get(&self, password_hash: &str) -> Result<Arc<Mailbox>, RegistryError> {
        self.inner
            .get(password_hash)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(RegistryError::MailboxNotFound)
    }

    /// Removes a mailbox. Removing an absent entry is a no-op, so both
    /// relay loops may call this during teardown.
    pub fn delete(&self, password_hash: &str) {
        self.inner.remove(password_hash);
    }

    /// Number of live mailboxes.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether no mailboxes are live.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Allocator for the numeric prefix of generated passwords. An id stays
/// reserved from sender bind until its receiver joins or the sender
/// times out.
pub struct Ids {
    next: AtomicU64,
    pending: DashMap<u64, ()>,
}

impl Default for Ids {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
            pending: DashMap::new(),
        }
    }
}

impl Ids {
    /// Reserves the next free id.
    pub fn bind(&self) -> u64 {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        self.pending.insert(id, ());
        id
    }

    /// Releases an id. Idempotent.
    pub fn delete(&self, id: u64) {
        self.pending.remove(&id);
    }

    /// Whether an id is still reserved.
    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }
}

/// The server's shared state: one instance per server, injected at
/// construction so independent servers never interfere.
#[derive(Default)]
pub struct Registry {
    /// Live mailboxes keyed by password hash.
    pub mailboxes: Mailboxes,
    /// Reserved password ids.
    pub ids: Ids,
}
