//! Domain freshness endpoints.

use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use converge_events::{DomainUpsertRequest, ListResponse};
use converge_id::Domain;
use tokio::time::Instant;

use crate::api::error::ApiError;
use crate::state::SimState;

pub fn routes() -> Router<SimState> {
    Router::new()
        .route("/domains", get(list_domains))
        .route("/domains/{domain}", put(upsert_domain))
}

/// GET /v1/domains
async fn list_domains(State(state): State<SimState>) -> Json<ListResponse<Domain>> {
    let now = Instant::now();
    Json(ListResponse::new(state.read(|store| store.domains(now))))
}

/// PUT /v1/domains/{domain}
async fn upsert_domain(
    State(state): State<SimState>,
    Path(domain): Path<String>,
    payload: Result<Json<DomainUpsertRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload?;
    let ttl = Duration::from_secs(request.ttl_seconds);
    state.mutate(|store| store.upsert_domain(&domain, ttl, Instant::now()))?;
    Ok(StatusCode::NO_CONTENT)
}
