//! Task endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use converge_events::{ListResponse, Task, TaskRequest};
use converge_id::{Domain, TaskGuid};

use super::DomainQuery;
use crate::api::error::ApiError;
use crate::state::SimState;

pub fn routes() -> Router<SimState> {
    Router::new()
        .route("/", post(desire_task).get(list_tasks))
        .route("/{task_guid}", get(get_task).delete(delete_task))
        .route("/{task_guid}/cancel", post(cancel_task))
}

/// POST /v1/tasks
async fn desire_task(
    State(state): State<SimState>,
    payload: Result<Json<TaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(request) = payload?;
    let task = state.mutate(|store| store.desire_task(request))?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /v1/tasks?domain=
async fn list_tasks(
    State(state): State<SimState>,
    Query(query): Query<DomainQuery>,
) -> Json<ListResponse<Task>> {
    let domain = query.domain.map(Domain::new);
    Json(ListResponse::new(
        state.read(|store| store.tasks(domain.as_ref())),
    ))
}

/// GET /v1/tasks/{task_guid}
async fn get_task(
    State(state): State<SimState>,
    Path(guid): Path<TaskGuid>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.read(|store| store.task(&guid))?))
}

/// POST /v1/tasks/{task_guid}/cancel
async fn cancel_task(
    State(state): State<SimState>,
    Path(guid): Path<TaskGuid>,
) -> Result<StatusCode, ApiError> {
    state.mutate(|store| store.cancel_task(&guid))?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /v1/tasks/{task_guid}
async fn delete_task(
    State(state): State<SimState>,
    Path(guid): Path<TaskGuid>,
) -> Result<StatusCode, ApiError> {
    state.mutate(|store| store.delete_task(&guid))?;
    Ok(StatusCode::NO_CONTENT)
}
