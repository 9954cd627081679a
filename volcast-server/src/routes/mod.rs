pub mod model;
pub mod onchain;

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// Assemble the API router.
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(model::routes())
        .merge(onchain::routes())
}
