//! Local HTTP receiver for task completion callbacks.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use converge_events::Task;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Path the receiver accepts deliveries on.
pub const CALLBACK_PATH: &str = "/callback";

#[derive(Default)]
struct CallbackState {
    fail_first: u32,
    attempts: AtomicU32,
    deliveries: Mutex<Vec<Task>>,
}

/// Records completion callbacks, rejecting the first `fail_first` attempts
/// with 503 so the caller's retry path is exercised.
///
/// The listener stays up across attempts and shuts down on drop.
pub struct CallbackReceiver {
    addr: SocketAddr,
    state: Arc<CallbackState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl CallbackReceiver {
    pub async fn spawn(fail_first: u32) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = Arc::new(CallbackState {
            fail_first,
            ..Default::default()
        });

        let app = Router::new()
            .route(CALLBACK_PATH, post(receive))
            .with_state(Arc::clone(&state));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "callback receiver stopped");
            }
        });

        debug!(%addr, fail_first, "callback receiver listening");
        Ok(Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// URL to put in a task's `completion_callback_url`.
    pub fn url(&self) -> String {
        format!("http://{}{}", self.addr, CALLBACK_PATH)
    }

    /// Every delivery attempt so far, rejected ones included.
    pub fn attempts(&self) -> u32 {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Task bodies of accepted deliveries, in arrival order.
    pub fn deliveries(&self) -> Vec<Task> {
        self.state
            .deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for CallbackReceiver {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn receive(State(state): State<Arc<CallbackState>>, body: Bytes) -> StatusCode {
    let attempt = state.attempts.fetch_add(1, Ordering::SeqCst) + 1;
    if attempt <= state.fail_first {
        debug!(attempt, "rejecting callback delivery");
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    match serde_json::from_slice::<Task>(&body) {
        Ok(task) => {
            debug!(attempt, task_guid = %task.task_guid, "callback delivered");
            state
                .deliveries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(task);
            StatusCode::OK
        }
        Err(e) => {
            warn!(attempt, error = %e, "callback body is not a task");
            StatusCode::BAD_REQUEST
        }
    }
}
