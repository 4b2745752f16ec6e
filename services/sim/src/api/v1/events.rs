//! Change feed as server-sent events.
//!
//! Every frame is `event: <wire name>` plus the JSON event as `data`. The
//! stream ends when the simulator shuts down, or when a subscriber falls
//! behind the broadcast buffer, so a reader never sees a feed with gaps.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::State,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures_util::{future, stream, Stream, StreamExt};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, warn};

use crate::state::SimState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

pub fn routes() -> Router<SimState> {
    Router::new().route("/events", get(stream_events))
}

/// GET /v1/events
async fn stream_events(
    State(state): State<SimState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.subscribe();
    let mut shutdown = state.shutdown_signal();
    debug!("Event subscriber connected");

    let connected =
        stream::once(async { Ok::<_, Infallible>(SseEvent::default().comment("connected")) });
    let events = BroadcastStream::new(receiver)
        .take_while(|item| {
            if let Err(BroadcastStreamRecvError::Lagged(skipped)) = item {
                warn!(skipped, "Event subscriber lagged; closing stream");
            }
            future::ready(item.is_ok())
        })
        .filter_map(|item| async move {
            let event = item.ok()?;
            match serde_json::to_string(&event) {
                Ok(data) => Some(Ok::<_, Infallible>(
                    SseEvent::default().event(event.kind().wire_name()).data(data),
                )),
                Err(e) => {
                    warn!(error = %e, "Failed to encode event");
                    None
                }
            }
        });

    let stopped = async move {
        loop {
            if *shutdown.borrow() {
                break;
            }
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        debug!("Event subscriber closed by shutdown");
    };

    Sse::new(connected.chain(events).take_until(stopped))
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{header::ACCEPT, Method, Request, StatusCode},
    };
    use converge_events::{Event, EventKind};
    use futures_util::StreamExt;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::api::v1::test_support::{app, app_with, call};
    use crate::config::SimConfig;

    #[tokio::test]
    async fn test_mutations_are_streamed_in_order() {
        let (app, _state, shutdown) = app();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/v1/events")
                    .header(ACCEPT, "text/event-stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let task = json!({
            "task_guid": "t1",
            "domain": "converge-test",
            "definition": {
                "root_fs": "docker:///busybox",
                "action": { "path": "sh", "args": ["-c", "echo"] }
            }
        });
        call(&app, Method::POST, "/v1/tasks", Some(task)).await;
        call(&app, Method::POST, "/v1/tasks/t1/cancel", None).await;

        let mut body = response.into_body().into_data_stream();
        let mut text = String::new();
        while !text.contains("event: task_changed") {
            let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
                .await
                .expect("timed out waiting for frames")
                .expect("stream ended early")
                .unwrap();
            text.push_str(&String::from_utf8_lossy(&chunk));
        }

        shutdown.send_replace(true);
        let rest = tokio::time::timeout(Duration::from_secs(5), async {
            while body.next().await.is_some() {}
        })
        .await;
        assert!(rest.is_ok(), "stream should end on shutdown");

        assert!(text.starts_with(':'), "first frame is the connected comment");
        let events: Vec<Event> = text
            .split("\n\n")
            .filter_map(|frame| frame.lines().find_map(|l| l.strip_prefix("data: ")))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect();
        let kinds: Vec<EventKind> = events.iter().map(Event::kind).collect();
        assert_eq!(kinds, vec![EventKind::TaskCreated, EventKind::TaskChanged]);
        assert!(text.contains("event: task_created"));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_is_disconnected() {
        let config = SimConfig {
            event_buffer: 2,
            ..SimConfig::fast()
        };
        let (app, _state, _shutdown) = app_with(config);
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/v1/events")
                    .header(ACCEPT, "text/event-stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        // the body is not read yet, so these overflow the subscriber's buffer
        for i in 0..4 {
            let task = json!({
                "task_guid": format!("t{i}"),
                "domain": "converge-test",
                "definition": {
                    "root_fs": "docker:///busybox",
                    "action": { "path": "sh", "args": ["-c", "echo"] }
                }
            });
            let (status, _) = call(&app, Method::POST, "/v1/tasks", Some(task)).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let text = tokio::time::timeout(Duration::from_secs(5), async {
            let mut body = response.into_body().into_data_stream();
            let mut text = String::new();
            while let Some(chunk) = body.next().await {
                text.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
            }
            text
        })
        .await
        .expect("stream should end once the subscriber lagged");

        assert!(text.starts_with(':'));
        assert!(!text.contains("event: task_created"), "no frames after a gap: {text}");
    }
}
