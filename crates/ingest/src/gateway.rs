//! Ingestion gateway: turns transport messages into persistence and alerting
//! work.
//!
//! [`IngestionGateway::on_message`] returns as soon as the payload is
//! decoded. Readings are queued to a single long-lived writer, so the store
//! sees them in arrival order, while each alert evaluation runs on its own
//! tracked task. A slow or failing store never delays an alert and a slow
//! SMTP relay never delays the store or the transport loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use o2watch_core::Reading;
use o2watch_events::{AlertPipeline, ReadingStore};
use tokio::sync::{mpsc, oneshot};
use tokio_util::task::TaskTracker;

/// Work item for the persistence writer.
enum WriteCommand {
    Persist(Arc<Reading>),
    /// Acknowledged once every earlier command has been handled.
    Flush(oneshot::Sender<()>),
}

pub struct IngestionGateway {
    pipeline: Arc<AlertPipeline>,
    disconnect_topic: String,
    alerts: TaskTracker,
    /// `None` once shutdown has begun.
    writer: Mutex<Option<mpsc::UnboundedSender<WriteCommand>>>,
    writer_task: TaskTracker,
    /// Readings queued or being written.
    queued_writes: Arc<AtomicUsize>,
}

impl IngestionGateway {
    /// Build the gateway and start its persistence writer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        pipeline: Arc<AlertPipeline>,
        store: Arc<dyn ReadingStore>,
        disconnect_topic: impl Into<String>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let queued_writes = Arc::new(AtomicUsize::new(0));

        let writer_task = TaskTracker::new();
        writer_task.spawn(run_writer(store, rx, Arc::clone(&queued_writes)));
        writer_task.close();

        Self {
            pipeline,
            disconnect_topic: disconnect_topic.into(),
            alerts: TaskTracker::new(),
            writer: Mutex::new(Some(tx)),
            writer_task,
            queued_writes,
        }
    }

    /// Handle one inbound message. Never fails and never blocks on I/O.
    pub fn on_message(&self, payload: &[u8], topic: &str) {
        if topic == self.disconnect_topic {
            self.on_disconnect(payload);
            return;
        }

        let reading = match Reading::from_slice(payload) {
            Ok(reading) => Arc::new(reading),
            Err(e) => {
                tracing::warn!(
                    topic,
                    error = %e,
                    payload = %String::from_utf8_lossy(payload),
                    "Dropping undecodable reading"
                );
                return;
            }
        };

        tracing::debug!(
            entity = %reading.entity_name,
            class = reading.entity_class.label(),
            "Reading received"
        );

        self.queued_writes.fetch_add(1, Ordering::SeqCst);
        if !self.send_command(WriteCommand::Persist(Arc::clone(&reading))) {
            self.queued_writes.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(entity = %reading.entity_name, "Writer stopped, reading not persisted");
        }

        let pipeline = Arc::clone(&self.pipeline);
        self.alerts.spawn(async move {
            pipeline.process_reading(&reading).await;
        });
    }

    fn on_disconnect(&self, payload: &[u8]) {
        let message = String::from_utf8_lossy(payload).into_owned();
        tracing::warn!(message = %message, "Device disconnect notification received");

        let pipeline = Arc::clone(&self.pipeline);
        self.alerts.spawn(async move {
            pipeline.process_disconnect(&message).await;
        });
    }

    /// Wait until every alert task spawned and every reading queued so far
    /// has been handled.
    pub async fn flush(&self) {
        self.alerts.close();
        self.alerts.wait().await;
        self.alerts.reopen();

        let (ack, done) = oneshot::channel();
        if self.send_command(WriteCommand::Flush(ack)) {
            let _ = done.await;
        }
    }

    /// Stop the writer after it drains its queue, and wait at most `grace`
    /// for it and for outstanding alert tasks.
    ///
    /// Returns `false` if work was still running when `grace` ran out.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.alerts.close();
        drop(self.writer().take());

        let pending = self.pending();
        if pending > 0 {
            tracing::info!(pending, "Waiting for in-flight ingest work");
        }

        let drained = async {
            self.alerts.wait().await;
            self.writer_task.wait().await;
        };
        match tokio::time::timeout(grace, drained).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    pending = self.pending(),
                    grace_secs = grace.as_secs(),
                    "Ingest work still running at shutdown"
                );
                false
            }
        }
    }

    /// Alert tasks still running plus readings not yet persisted.
    pub fn pending(&self) -> usize {
        self.alerts.len() + self.queued_writes.load(Ordering::SeqCst)
    }

    pub fn pipeline(&self) -> &AlertPipeline {
        &self.pipeline
    }

    fn send_command(&self, command: WriteCommand) -> bool {
        self.writer()
            .as_ref()
            .is_some_and(|tx| tx.send(command).is_ok())
    }

    fn writer(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<WriteCommand>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Persist queued readings one at a time, in arrival order.
///
/// Exits once the gateway drops its sender and the queue is empty.
async fn run_writer(
    store: Arc<dyn ReadingStore>,
    mut commands: mpsc::UnboundedReceiver<WriteCommand>,
    queued: Arc<AtomicUsize>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            WriteCommand::Persist(reading) => {
                persist(store.as_ref(), &reading).await;
                queued.fetch_sub(1, Ordering::SeqCst);
            }
            WriteCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    tracing::info!("Reading writer shutting down");
}

/// Write the latest reading and register the entity in the reverse index.
async fn persist(store: &dyn ReadingStore, reading: &Reading) {
    let collection = reading.entity_class.collection();
    let entity = reading.entity_name.as_str();

    if let Err(e) = store.write(collection, entity, &reading.fields_json()).await {
        tracing::error!(entity, collection, error = %e, "Failed to persist reading");
        return;
    }
    if let Err(e) = store.register_entity(entity, collection).await {
        tracing::error!(entity, collection, error = %e, "Failed to register entity");
    }
}
