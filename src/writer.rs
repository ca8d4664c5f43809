//! Deferred visit persistence
//!
//! Request handlers hand a [`VisitJob`] to the [`VisitWriter`] and return
//! immediately. A background actor owns storage access and runs each job as
//! its own task, so writes for different requests complete in no particular
//! order. Failed writes are logged and dropped; nothing is retried.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::WriterConfig;
use crate::models::{NewVisit, RecordOutcome};
use crate::storage::{Storage, StorageResult};

/// One pending visit write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitJob {
    pub ip: String,
    pub user_agent: Option<String>,
    pub dedup_seconds: u64,
    pub region: Option<String>,
}

#[derive(Debug, Error)]
#[error("visit writer has shut down")]
pub struct WriterClosed;

enum WriterMessage {
    Record(VisitJob),
    /// Reply once every job received before this message has finished
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

struct WriterActor {
    receiver: mpsc::Receiver<WriterMessage>,
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    permits: Arc<Semaphore>,
    in_flight: JoinSet<(String, StorageResult<RecordOutcome>)>,
}

impl WriterActor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                msg = self.receiver.recv() => match msg {
                    Some(WriterMessage::Record(job)) => self.spawn_job(job).await,
                    Some(WriterMessage::Flush(done)) => {
                        self.drain().await;
                        let _ = done.send(());
                    }
                    Some(WriterMessage::Shutdown(done)) => {
                        info!("Visit writer received shutdown signal, draining pending writes...");
                        self.receiver.close();
                        while let Some(msg) = self.receiver.recv().await {
                            if let WriterMessage::Record(job) = msg {
                                self.spawn_job(job).await;
                            }
                        }
                        self.drain().await;
                        info!("Visit writer drained");
                        let _ = done.send(());
                        break;
                    }
                    None => {
                        warn!("Visit writer channel closed unexpectedly, draining...");
                        self.drain().await;
                        break;
                    }
                },
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    log_completion(joined);
                }
            }
        }
    }

    async fn spawn_job(&mut self, job: VisitJob) {
        let permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                warn!(ip = %job.ip, "Write permits closed, dropping visit");
                return;
            }
        };

        let storage = Arc::clone(&self.storage);
        let clock = Arc::clone(&self.clock);
        self.in_flight.spawn(async move {
            let _permit = permit;
            let ip = job.ip.clone();
            let result = write_visit(storage.as_ref(), clock.as_ref(), job).await;
            (ip, result)
        });
    }

    async fn drain(&mut self) {
        while let Some(joined) = self.in_flight.join_next().await {
            log_completion(joined);
        }
    }
}

/// Persist a single job, applying its dedup window at the current time
pub async fn write_visit(
    storage: &dyn Storage,
    clock: &dyn Clock,
    job: VisitJob,
) -> StorageResult<RecordOutcome> {
    let visit = NewVisit {
        ip: job.ip,
        user_agent: job.user_agent,
        region: job.region,
    };
    storage
        .record_visit(&visit, job.dedup_seconds, clock.now())
        .await
}

fn log_completion(joined: Result<(String, StorageResult<RecordOutcome>), JoinError>) {
    match joined {
        Ok((ip, Ok(RecordOutcome::Inserted(id)))) => {
            debug!(ip = %ip, visit_id = id, "Visit recorded");
        }
        Ok((ip, Ok(RecordOutcome::Deduplicated))) => {
            debug!(ip = %ip, "Visit within dedup window, skipped");
        }
        Ok((ip, Err(err))) => {
            error!(ip = %ip, error = %err, "Failed to record visit");
        }
        Err(err) => {
            error!(error = %err, "Visit write task failed");
        }
    }
}

/// Handle for submitting visit writes to the background actor
#[derive(Clone)]
pub struct VisitWriter {
    tx: mpsc::Sender<WriterMessage>,
}

impl VisitWriter {
    /// Spawn the writer actor on the current tokio runtime
    pub fn spawn(storage: Arc<dyn Storage>, clock: Arc<dyn Clock>, config: &WriterConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_size.max(1));

        let actor = WriterActor {
            receiver: rx,
            storage,
            clock,
            permits: Arc::new(Semaphore::new(config.max_concurrency.max(1))),
            in_flight: JoinSet::new(),
        };

        tokio::spawn(async move {
            actor.run().await;
        });

        Self { tx }
    }

    /// Queue a write without waiting for it
    ///
    /// Returns `false` when the job was dropped because the queue is full or
    /// the writer has shut down.
    pub fn submit(&self, job: VisitJob) -> bool {
        match self.tx.try_send(WriterMessage::Record(job)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(WriterMessage::Record(job))) => {
                warn!(ip = %job.ip, "Visit write queue full, dropping visit");
                false
            }
            Err(_) => {
                warn!("Visit writer has shut down, dropping visit");
                false
            }
        }
    }

    /// Wait until every job submitted so far has been written or has failed
    pub async fn flush(&self) -> Result<(), WriterClosed> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(WriterMessage::Flush(done_tx))
            .await
            .map_err(|_| WriterClosed)?;
        done_rx.await.map_err(|_| WriterClosed)
    }

    /// Finish queued and in-flight writes, then stop the actor
    pub async fn shutdown(&self) -> Result<(), WriterClosed> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(WriterMessage::Shutdown(done_tx))
            .await
            .map_err(|_| WriterClosed)?;
        done_rx.await.map_err(|_| WriterClosed)
    }
}
