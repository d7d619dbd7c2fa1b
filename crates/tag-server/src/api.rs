use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use domain::tag::TagRepository;
use infrastructure::SeaOrmTagRepository;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::state::AppState;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/autocomplete/{app}/{model}/{field}", get(autocomplete))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize)]
struct AutocompleteParams {
    /// Prefix typed so far
    q: Option<String>,
    /// 1-based page
    p: Option<u64>,
}

async fn autocomplete(
    Path((app, model, field)): Path<(String, String, String)>,
    Query(params): Query<AutocompleteParams>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some((binding, table)) = state.tag_table(&app, &model, &field) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Unknown tag field {}.{}.{}", app, model, field) })),
        )
            .into_response();
    };

    let query = params.q.unwrap_or_default();
    let page = params.p.unwrap_or(1);
    let store = SeaOrmTagRepository::new(&state.db, table);
    match store.autocomplete(&query, page).await {
        Ok(found) => {
            debug!(
                field = %binding,
                query = %query,
                page,
                results = found.results.len(),
                "Autocomplete"
            );
            Json(found).into_response()
        }
        Err(e) => {
            warn!(field = %binding, error = %e, "Autocomplete failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
