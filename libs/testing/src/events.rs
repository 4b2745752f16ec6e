//! Background event stream receiver and its buffer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use converge_client::{ClientError, ControlPlane, EventSource};
use converge_events::Event;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::HarnessError;

/// How long `close()` waits for the receiver task to exit.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Append-only, receive-ordered event log shared by one writer and many readers.
#[derive(Debug, Clone, Default)]
pub struct EventBuffer {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, event: Event) {
        self.lock().push(event);
    }

    /// A copy of the events received so far.
    pub fn snapshot(&self) -> Vec<Event> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

enum ReceiverExit {
    /// Stopped by `close()`, drop, or scenario shutdown.
    Stopped,
    /// `next()` returned an error first.
    StreamEnded(ClientError),
}

/// Subscribes to the change feed and buffers every event in the background.
pub struct EventListener {
    buffer: EventBuffer,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<ReceiverExit>>,
    drain_timeout: Duration,
}

impl EventListener {
    /// Subscribe via `client` and start receiving.
    pub async fn start(
        client: &dyn ControlPlane,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, HarnessError> {
        let source = client.subscribe_to_events().await?;
        Ok(Self::from_source(source, shutdown))
    }

    /// Start receiving from an already open source.
    pub fn from_source(source: Box<dyn EventSource>, shutdown: watch::Receiver<bool>) -> Self {
        let buffer = EventBuffer::new();
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(receive(source, buffer.clone(), stop_rx, shutdown));

        Self {
            buffer,
            stop: Some(stop_tx),
            task: Some(task),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// The buffer the receiver appends to.
    pub fn buffer(&self) -> EventBuffer {
        self.buffer.clone()
    }

    /// Returns true once the receiver task has exited for any reason.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Stop the receiver and wait for it to exit.
    ///
    /// Fails if the stream had already ended on its own, or if the receiver
    /// does not exit within the drain timeout.
    pub async fn close(mut self) -> Result<(), HarnessError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let Some(task) = self.task.take() else {
            return Ok(());
        };

        let abort = task.abort_handle();
        match tokio::time::timeout(self.drain_timeout, task).await {
            Ok(Ok(ReceiverExit::Stopped)) => {
                debug!(received = self.buffer.len(), "event listener drained");
                Ok(())
            }
            Ok(Ok(ReceiverExit::StreamEnded(err))) => {
                Err(HarnessError::ListenerEndedUnexpectedly {
                    reason: err.to_string(),
                    received: self.buffer.len(),
                })
            }
            Ok(Err(join_err)) => Err(HarnessError::ListenerPanicked(join_err.to_string())),
            Err(_) => {
                abort.abort();
                warn!(timeout = ?self.drain_timeout, "event receiver did not exit; aborted");
                Err(HarnessError::ListenerLeaked(self.drain_timeout))
            }
        }
    }
}

impl Drop for EventListener {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn receive(
    mut source: Box<dyn EventSource>,
    buffer: EventBuffer,
    mut stop: oneshot::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) -> ReceiverExit {
    loop {
        let next = tokio::select! {
            biased;
            _ = &mut stop => None,
            _ = wait_for_shutdown(&mut shutdown) => None,
            next = source.next() => Some(next),
        };

        match next {
            None => {
                source.close();
                return ReceiverExit::Stopped;
            }
            Some(Ok(event)) => {
                debug!(kind = %event.kind(), key = %event.key(), "event received");
                buffer.push(event);
            }
            Some(Err(err)) => {
                warn!(error = %err, received = buffer.len(), "event stream ended");
                return ReceiverExit::StreamEnded(err);
            }
        }
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
