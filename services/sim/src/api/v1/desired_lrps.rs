//! Desired LRP endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use converge_events::{DesiredLrp, DesiredLrpUpdate, ListResponse};
use converge_id::{Domain, ProcessGuid};

use super::DomainQuery;
use crate::api::error::ApiError;
use crate::state::SimState;

pub fn routes() -> Router<SimState> {
    Router::new()
        .route("/", post(desire_lrp).get(list_desired_lrps))
        .route(
            "/{process_guid}",
            get(get_desired_lrp)
                .patch(update_desired_lrp)
                .delete(remove_desired_lrp),
        )
}

/// POST /v1/desired_lrps
async fn desire_lrp(
    State(state): State<SimState>,
    payload: Result<Json<DesiredLrp>, JsonRejection>,
) -> Result<(StatusCode, Json<DesiredLrp>), ApiError> {
    let Json(lrp) = payload?;
    let lrp = state.mutate(|store| store.desire_lrp(lrp))?;
    Ok((StatusCode::CREATED, Json(lrp)))
}

/// GET /v1/desired_lrps?domain=
async fn list_desired_lrps(
    State(state): State<SimState>,
    Query(query): Query<DomainQuery>,
) -> Json<ListResponse<DesiredLrp>> {
    let domain = query.domain.map(Domain::new);
    Json(ListResponse::new(
        state.read(|store| store.desired_lrps(domain.as_ref())),
    ))
}

/// GET /v1/desired_lrps/{process_guid}
async fn get_desired_lrp(
    State(state): State<SimState>,
    Path(guid): Path<ProcessGuid>,
) -> Result<Json<DesiredLrp>, ApiError> {
    Ok(Json(state.read(|store| store.desired_lrp(&guid))?))
}

/// PATCH /v1/desired_lrps/{process_guid}
async fn update_desired_lrp(
    State(state): State<SimState>,
    Path(guid): Path<ProcessGuid>,
    payload: Result<Json<DesiredLrpUpdate>, JsonRejection>,
) -> Result<Json<DesiredLrp>, ApiError> {
    let Json(update) = payload?;
    let lrp = state.mutate(|store| store.update_desired_lrp(&guid, update))?;
    Ok(Json(lrp))
}

/// DELETE /v1/desired_lrps/{process_guid}
async fn remove_desired_lrp(
    State(state): State<SimState>,
    Path(guid): Path<ProcessGuid>,
) -> Result<StatusCode, ApiError> {
    state.mutate(|store| store.remove_desired_lrp(&guid))?;
    Ok(StatusCode::NO_CONTENT)
}
