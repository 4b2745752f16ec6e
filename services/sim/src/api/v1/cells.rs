use axum::{extract::State, routing::get, Json, Router};
use converge_events::{CellPresence, ListResponse};

use crate::state::SimState;

pub fn routes() -> Router<SimState> {
    Router::new().route("/cells", get(list_cells))
}

/// GET /v1/cells
async fn list_cells(State(state): State<SimState>) -> Json<ListResponse<CellPresence>> {
    Json(ListResponse::new(state.read(|store| store.cells())))
}
