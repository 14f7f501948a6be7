//! Live delivery worker pool.
//!
//! A fixed set of workers drains one bounded queue of [`DeliveryJob`]s.
//! Each job is a single [`ClientConnection::try_deliver`]; a dropped
//! payload means the consumer is dead or too slow, and the worker
//! unregisters that connection on the spot.
//!
//! A worker holds the queue lock from dequeue through `try_deliver`, so
//! jobs for the same connection land in its buffer in enqueue order.
//! `try_deliver` never waits, so the lock is held for O(1).

use std::sync::Arc;

use metrics::counter;
use parking_lot::Mutex;
use relay_settings::DispatchSettings;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::PoolClosed;
use crate::metrics::{
    CONNECTIONS_PRUNED_TOTAL, DELIVERIES_TOTAL, DELIVERY_DROPS_TOTAL, DELIVERY_JOBS_ENQUEUED_TOTAL,
};
use crate::websocket::connection::{ClientConnection, DeliveryOutcome, Payload};
use crate::websocket::registry::ConnectionRegistry;

/// Deliver `payload` to `connection`. Consumed exactly once.
#[derive(Debug)]
pub struct DeliveryJob {
    /// Target connection.
    pub connection: Arc<ClientConnection>,
    /// Serialized message.
    pub payload: Payload,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<DeliveryJob>>>;

/// Bounded pool of delivery workers.
pub struct DispatchPool {
    tx: mpsc::Sender<DeliveryJob>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DispatchPool {
    /// Spawn `settings.workers` workers over a queue of `settings.queue_depth`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(settings: &DispatchSettings, registry: Arc<ConnectionRegistry>) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_depth.max(1));
        let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));
        let cancel = CancellationToken::new();
        let workers = settings.workers.max(1);

        let handles = (0..workers)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    Arc::clone(&rx),
                    Arc::clone(&registry),
                    cancel.clone(),
                ))
            })
            .collect();

        info!(workers, queue_depth = settings.queue_depth, "dispatch pool started");
        Self {
            tx,
            cancel,
            workers: Mutex::new(handles),
        }
    }

    /// Queue a job, waiting for a free slot when the queue is full.
    pub async fn enqueue(&self, job: DeliveryJob) -> Result<(), PoolClosed> {
        if self.cancel.is_cancelled() {
            return Err(PoolClosed("dispatch"));
        }
        self.tx.send(job).await.map_err(|_| PoolClosed("dispatch"))?;
        counter!(DELIVERY_JOBS_ENQUEUED_TOTAL).increment(1);
        Ok(())
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop every worker and wait for them to exit. Queued jobs are discarded.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles = std::mem::take(&mut *self.workers.lock());
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "dispatch worker ended abnormally");
            }
        }
        info!("dispatch pool stopped");
    }
}

async fn run_worker(
    worker: usize,
    rx: SharedReceiver,
    registry: Arc<ConnectionRegistry>,
    cancel: CancellationToken,
) {
    debug!(worker, "dispatch worker started");
    loop {
        let (job, outcome) = {
            let mut queue = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                guard = rx.lock() => guard,
            };
            let job = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                job = queue.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            let outcome = job.connection.try_deliver(Arc::clone(&job.payload));
            (job, outcome)
        };

        match outcome {
            DeliveryOutcome::Delivered => {
                counter!(DELIVERIES_TOTAL).increment(1);
            }
            DeliveryOutcome::Dropped(reason) => {
                counter!(DELIVERY_DROPS_TOTAL, "reason" => reason.as_str()).increment(1);
                if registry.unregister(&job.connection) {
                    counter!(CONNECTIONS_PRUNED_TOTAL).increment(1);
                    warn!(
                        worker,
                        participant = %job.connection.participant(),
                        conn_id = %job.connection.id(),
                        reason = reason.as_str(),
                        "delivery dropped, connection unregistered"
                    );
                }
            }
        }
    }
    debug!(worker, "dispatch worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ParticipantId;
    use std::time::Duration;

    fn settings(workers: usize, queue_depth: usize) -> DispatchSettings {
        DispatchSettings {
            workers,
            queue_depth,
        }
    }

    fn job(connection: &Arc<ClientConnection>, text: &str) -> DeliveryJob {
        DeliveryJob {
            connection: Arc::clone(connection),
            payload: Arc::from(text),
        }
    }

    #[tokio::test]
    async fn delivers_in_enqueue_order_per_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let pool = DispatchPool::start(&settings(4, 64), Arc::clone(&registry));
        let (bob, mut rx) = ClientConnection::open(ParticipantId::from("bob"), 64);
        registry.register(Arc::clone(&bob));

        for i in 0..20 {
            pool.enqueue(job(&bob, &format!("m{i}"))).await.unwrap();
        }
        for i in 0..20 {
            let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&*got, format!("m{i}"));
        }
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn full_buffer_unregisters_connection() {
        let registry = Arc::new(ConnectionRegistry::new());
        let pool = DispatchPool::start(&settings(2, 16), Arc::clone(&registry));
        let (slow, _rx) = ClientConnection::open(ParticipantId::from("slow"), 1);
        registry.register(Arc::clone(&slow));

        pool.enqueue(job(&slow, "fits")).await.unwrap();
        pool.enqueue(job(&slow, "overflows")).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.count_for("slow") > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(slow.is_closed());
        assert_eq!(slow.drop_count(), 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn stalled_connection_does_not_block_others() {
        let registry = Arc::new(ConnectionRegistry::new());
        let pool = DispatchPool::start(&settings(4, 8), Arc::clone(&registry));
        let (stalled, _stalled_rx) = ClientConnection::open(ParticipantId::from("stalled"), 2);
        let (healthy, mut healthy_rx) = ClientConnection::open(ParticipantId::from("healthy"), 256);
        registry.register(Arc::clone(&stalled));
        registry.register(Arc::clone(&healthy));

        let reader = tokio::spawn(async move {
            let mut received = Vec::new();
            while received.len() < 200 {
                match healthy_rx.recv().await {
                    Some(p) => received.push(p.to_string()),
                    None => break,
                }
            }
            received
        });

        for i in 0..200 {
            pool.enqueue(job(&stalled, &format!("s{i}"))).await.unwrap();
            pool.enqueue(job(&healthy, &format!("h{i}"))).await.unwrap();
        }

        let received = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .unwrap()
            .unwrap();
        let expected: Vec<String> = (0..200).map(|i| format!("h{i}")).collect();
        assert_eq!(received, expected);
        assert_eq!(registry.count_for("stalled"), 0);
        assert_eq!(registry.count_for("healthy"), 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_fails() {
        let registry = Arc::new(ConnectionRegistry::new());
        let pool = DispatchPool::start(&settings(1, 4), registry);
        pool.shutdown().await;
        assert!(pool.is_closed());

        let (c, _rx) = ClientConnection::open(ParticipantId::from("bob"), 1);
        assert_eq!(pool.enqueue(job(&c, "x")).await, Err(PoolClosed("dispatch")));
    }

    #[tokio::test]
    async fn pruning_is_logged_at_warn() {
        let (logs, _guard) = relay_core::logging::capture_logs();
        let registry = Arc::new(ConnectionRegistry::new());
        let pool = DispatchPool::start(&settings(1, 4), Arc::clone(&registry));
        let (gone, rx) = ClientConnection::open(ParticipantId::from("gone"), 1);
        drop(rx);
        registry.register(Arc::clone(&gone));

        pool.enqueue(job(&gone, "x")).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while registry.count_for("gone") > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        pool.shutdown().await;

        let events = logs.matching("connection unregistered");
        assert!(events.iter().any(|e| e.level == tracing::Level::WARN
            && e.field("reason") == Some("closed")));
    }
}
