//! API v1 routes.

mod actual_lrps;
mod cells;
mod desired_lrps;
mod domains;
mod events;
mod tasks;

use axum::Router;
use serde::Deserialize;

use crate::state::SimState;

/// Create API v1 routes.
pub fn routes() -> Router<SimState> {
    Router::new()
        .nest("/tasks", tasks::routes())
        .nest("/desired_lrps", desired_lrps::routes())
        .nest("/actual_lrps", actual_lrps::routes())
        .merge(cells::routes())
        .merge(domains::routes())
        .merge(events::routes())
}

/// `?domain=` filter shared by the list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct DomainQuery {
    pub domain: Option<String>,
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::{
        body::{to_bytes, Body},
        http::{header::CONTENT_TYPE, Method, Request, StatusCode},
        Router,
    };
    use serde::de::DeserializeOwned;
    use tokio::sync::watch;
    use tower::ServiceExt;

    use crate::api::create_router;
    use crate::config::SimConfig;
    use crate::state::SimState;

    pub fn app() -> (Router, SimState, watch::Sender<bool>) {
        app_with(SimConfig::fast())
    }

    pub fn app_with(config: SimConfig) -> (Router, SimState, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let state = SimState::new(config, rx);
        (create_router(state.clone()), state, tx)
    }

    pub async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub fn items<T: DeserializeOwned>(json: serde_json::Value) -> Vec<T> {
        serde_json::from_value(json["items"].clone()).unwrap()
    }
}
