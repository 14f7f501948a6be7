//! Live connection state and the non-blocking delivery primitive.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use relay_core::{ConnectionId, ParticipantId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Serialized message shared by every recipient of one broadcast.
pub type Payload = Arc<str>;

/// Why a delivery did not reach the outbound buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The buffer is at capacity; the consumer is not keeping up.
    Full,
    /// The buffer was closed by unregister or the writer went away.
    Closed,
}

impl DropReason {
    /// Metric label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Closed => "closed",
        }
    }
}

/// Result of [`ClientConnection::try_deliver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The payload is in the outbound buffer.
    Delivered,
    /// The payload was discarded.
    Dropped(DropReason),
}

/// One live channel to a participant.
///
/// The outbound buffer is written only through [`try_deliver`] and drained
/// by the connection's writer task. [`close`] drops the sender so the
/// writer's `recv` returns `None`.
///
/// [`try_deliver`]: ClientConnection::try_deliver
/// [`close`]: ClientConnection::close
pub struct ClientConnection {
    id: ConnectionId,
    participant: ParticipantId,
    tx: Mutex<Option<mpsc::Sender<Payload>>>,
    is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    dropped: AtomicU64,
}

impl ClientConnection {
    /// New connection with an outbound buffer of `capacity` (at least 1).
    ///
    /// Returns the receiving half for the writer task.
    pub fn open(
        participant: ParticipantId,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self::with_sender(participant, tx)), rx)
    }

    /// Wrap an existing sender.
    pub fn with_sender(participant: ParticipantId, tx: mpsc::Sender<Payload>) -> Self {
        let now = Instant::now();
        Self {
            id: ConnectionId::new(),
            participant,
            tx: Mutex::new(Some(tx)),
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            dropped: AtomicU64::new(0),
        }
    }

    /// Unique connection ID.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Owning participant.
    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    /// Write `payload` into the outbound buffer without waiting.
    ///
    /// Never retries. A full or closed buffer increments the drop counter
    /// and reports why.
    pub fn try_deliver(&self, payload: Payload) -> DeliveryOutcome {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            drop(guard);
            return self.dropped(DropReason::Closed);
        };
        match tx.try_send(payload) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(TrySendError::Full(_)) => {
                drop(guard);
                self.dropped(DropReason::Full)
            }
            Err(TrySendError::Closed(_)) => {
                drop(guard);
                self.dropped(DropReason::Closed)
            }
        }
    }

    fn dropped(&self, reason: DropReason) -> DeliveryOutcome {
        let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
        DeliveryOutcome::Dropped(reason)
    }

    /// Close the outbound buffer. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.tx.lock().take().is_some()
    }

    /// Whether [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Payloads dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Record client activity (pong or any inbound frame).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Check and reset the alive flag. `true` if the client was heard from
    /// since the previous check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time since the client was last heard from.
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("participant", &self.participant)
            .field("closed", &self.is_closed())
            .field("dropped", &self.drop_count())
            .finish_non_exhaustive()
    }
}
