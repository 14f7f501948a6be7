//! Persistence worker pool.
//!
//! Workers drain a bounded queue of messages and save each one with bounded
//! linear retry: after failed attempt `n` the worker sleeps `n × base_delay`
//! before trying again. A message whose last attempt fails is dropped with
//! an `error` record and a metric increment; there is no dead-letter queue.
//!
//! Each job runs in its own task, so a store that panics loses that one
//! message and the worker moves on to the next.
//!
//! [`PersistencePool::stop`] cancels the pool. A save already in flight
//! finishes, but no new attempt starts and no new job is dequeued. Every
//! message left behind (mid-retry or still queued) is logged at `error`.

use std::sync::Arc;

use metrics::counter;
use parking_lot::Mutex;
use relay_core::retry::{RetryConfig, total_backoff_ms};
use relay_core::{Message, MessageId};
use relay_settings::PersistenceSettings;
use relay_store::MessageStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::PoolClosed;
use crate::metrics::{
    PERSIST_ABANDONED_TOTAL, PERSIST_ATTEMPT_FAILURES_TOTAL, PERSIST_EXHAUSTED_TOTAL,
    PERSIST_SAVES_TOTAL,
};

/// How one message left the retry loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Stored.
    Saved {
        /// Store-assigned ID.
        id: MessageId,
        /// Attempts used, including the successful one.
        attempts: u32,
    },
    /// Every attempt failed; the message was dropped.
    Exhausted {
        /// Attempts made.
        attempts: u32,
    },
    /// Shutdown interrupted the retry loop.
    Abandoned {
        /// Attempts made before shutdown.
        attempts: u32,
    },
}

/// Save `message`, retrying with linear backoff until it succeeds, the
/// attempts run out, or `cancel` fires.
///
/// Cancellation is checked before each retry and during the backoff sleep.
/// A save call that has started is never interrupted.
pub async fn persist_with_retry(
    store: &dyn MessageStore,
    message: &Message,
    retry: &RetryConfig,
    cancel: &CancellationToken,
) -> PersistOutcome {
    let max_attempts = retry.attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        let err = match store.save(message).await {
            Ok(id) => {
                counter!(PERSIST_SAVES_TOTAL).increment(1);
                debug!(message_id = %id, attempt, "message persisted");
                return PersistOutcome::Saved {
                    id,
                    attempts: attempt,
                };
            }
            Err(e) => e,
        };

        counter!(PERSIST_ATTEMPT_FAILURES_TOTAL).increment(1);
        warn!(attempt, max_attempts, error = %err, "failed to save message");

        if attempt >= max_attempts {
            counter!(PERSIST_EXHAUSTED_TOTAL).increment(1);
            error!(
                attempts = attempt,
                sender = %message.sender,
                conversation = %message.participants,
                error = %err,
                "retries exhausted, dropping message"
            );
            return PersistOutcome::Exhausted { attempts: attempt };
        }

        let delay = retry.delay_after(attempt);
        let cancelled = cancel.is_cancelled()
            || tokio::select! {
                biased;
                () = cancel.cancelled() => true,
                () = tokio::time::sleep(delay) => false,
            };
        if cancelled {
            counter!(PERSIST_ABANDONED_TOTAL).increment(1);
            error!(
                attempts = attempt,
                sender = %message.sender,
                conversation = %message.participants,
                "shutdown during retry, abandoning message"
            );
            return PersistOutcome::Abandoned { attempts: attempt };
        }
    }
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<Message>>>;

/// Bounded pool of persistence workers.
pub struct PersistencePool {
    tx: mpsc::Sender<Message>,
    rx: SharedReceiver,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PersistencePool {
    /// Spawn `settings.workers` workers over a queue of `settings.queue_depth`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(settings: &PersistenceSettings, store: Arc<dyn MessageStore>) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_depth.max(1));
        let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));
        let cancel = CancellationToken::new();
        let workers = settings.workers.max(1);
        let retry = settings.retry.clone();

        info!(
            workers,
            queue_depth = settings.queue_depth,
            max_attempts = retry.attempts(),
            base_delay_ms = retry.base_delay_ms,
            worst_case_backoff_ms = total_backoff_ms(retry.attempts(), retry.base_delay_ms),
            backend = store.backend(),
            "persistence pool started"
        );

        let handles = (0..workers)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&rx),
                    Arc::clone(&store),
                    retry.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        Self {
            tx,
            rx,
            cancel,
            workers: Mutex::new(handles),
        }
    }

    /// Queue a message, waiting for a free slot when the queue is full.
    pub async fn enqueue(&self, message: Message) -> Result<(), PoolClosed> {
        if self.cancel.is_cancelled() {
            return Err(PoolClosed("persistence"));
        }
        self.tx
            .send(message)
            .await
            .map_err(|_| PoolClosed("persistence"))
    }

    /// Whether [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the pool and wait for every worker to exit.
    ///
    /// Messages still queued afterwards are abandoned and logged. Returns
    /// how many were abandoned from the queue.
    pub async fn stop(&self) -> usize {
        self.cancel.cancel();
        let handles = std::mem::take(&mut *self.workers.lock());
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "persistence worker ended abnormally");
            }
        }

        let mut queue = self.rx.lock().await;
        queue.close();
        let mut abandoned = 0usize;
        while let Ok(message) = queue.try_recv() {
            abandoned += 1;
            error!(
                sender = %message.sender,
                conversation = %message.participants,
                "shutdown before save, abandoning queued message"
            );
        }
        if abandoned > 0 {
            counter!(PERSIST_ABANDONED_TOTAL).increment(abandoned as u64);
            error!(abandoned, "persistence pool stopped with unsaved messages");
        }
        info!("persistence pool stopped");
        abandoned
    }
}

async fn run_worker(
    worker: usize,
    rx: SharedReceiver,
    store: Arc<dyn MessageStore>,
    retry: RetryConfig,
    cancel: CancellationToken,
) {
    debug!(worker, "persistence worker started");
    loop {
        let message = {
            let mut queue = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                guard = rx.lock() => guard,
            };
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                message = queue.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            }
        };
        let job = {
            let store = Arc::clone(&store);
            let retry = retry.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                persist_with_retry(store.as_ref(), &message, &retry, &cancel).await
            })
        };
        if let Err(e) = job.await {
            counter!(PERSIST_EXHAUSTED_TOTAL).increment(1);
            error!(worker, error = %e, "save task failed, dropping message");
        }
    }
    debug!(worker, "persistence worker stopped");
}
