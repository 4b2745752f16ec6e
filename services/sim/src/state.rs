//! Application state shared across request handlers and the worker.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use converge_events::Event;
use tokio::sync::{broadcast, watch};

use crate::config::SimConfig;
use crate::store::Store;

/// Shared simulator state.
///
/// Passed to all request handlers via Axum's state extractor.
#[derive(Clone)]
pub struct SimState {
    inner: Arc<SimStateInner>,
}

struct SimStateInner {
    store: Mutex<Store>,
    events: broadcast::Sender<Event>,
    config: SimConfig,
    http: reqwest::Client,
    shutdown: watch::Receiver<bool>,
}

impl SimState {
    pub fn new(config: SimConfig, shutdown: watch::Receiver<bool>) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            inner: Arc::new(SimStateInner {
                store: Mutex::new(Store::new(&config)),
                events,
                config,
                http: reqwest::Client::new(),
                shutdown,
            }),
        }
    }

    /// Run `f` against the store and publish the events it produced.
    ///
    /// Events are sent before the lock is released so every subscriber sees
    /// them in the order the mutations happened.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut Store) -> R) -> R {
        let mut store = self.lock();
        let result = f(&mut store);
        for event in store.drain_events() {
            // No subscribers is fine.
            let _ = self.inner.events.send(event);
        }
        result
    }

    pub fn read<R>(&self, f: impl FnOnce(&Store) -> R) -> R {
        f(&self.lock())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &SimConfig {
        &self.inner.config
    }

    /// Client used for completion callbacks.
    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.inner
            .store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
