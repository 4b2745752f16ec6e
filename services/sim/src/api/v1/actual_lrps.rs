//! Actual LRP endpoints.

use axum::{
    extract::{rejection::PathRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use converge_events::{ActualLrp, ActualLrpFilter, ListResponse};
use converge_id::ProcessGuid;

use crate::api::error::ApiError;
use crate::state::SimState;

pub fn routes() -> Router<SimState> {
    Router::new()
        .route("/", get(list_actual_lrps))
        .route("/{process_guid}/{index}", get(get_actual_lrp))
        .route("/{process_guid}/{index}/retire", post(retire_actual_lrp))
}

/// GET /v1/actual_lrps?domain=&process_guid=&index=
async fn list_actual_lrps(
    State(state): State<SimState>,
    query: Result<Query<ActualLrpFilter>, QueryRejection>,
) -> Result<Json<ListResponse<ActualLrp>>, ApiError> {
    let Query(filter) = query?;
    Ok(Json(ListResponse::new(
        state.read(|store| store.actual_lrps(&filter)),
    )))
}

/// GET /v1/actual_lrps/{process_guid}/{index}
async fn get_actual_lrp(
    State(state): State<SimState>,
    path: Result<Path<(ProcessGuid, i32)>, PathRejection>,
) -> Result<Json<ActualLrp>, ApiError> {
    let Path((guid, index)) = path?;
    Ok(Json(state.read(|store| store.actual_lrp(&guid, index))?))
}

/// POST /v1/actual_lrps/{process_guid}/{index}/retire
async fn retire_actual_lrp(
    State(state): State<SimState>,
    path: Result<Path<(ProcessGuid, i32)>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path((guid, index)) = path?;
    state.mutate(|store| store.retire_actual_lrp(&guid, index))?;
    Ok(StatusCode::NO_CONTENT)
}
