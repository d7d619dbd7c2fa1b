pub mod api;
pub mod state;

use application::TagRegistry;
use sea_orm::DatabaseConnection;
use state::AppState;
use std::sync::Arc;

pub fn setup_app_state(registry: Arc<TagRegistry>, db: DatabaseConnection) -> Arc<AppState> {
    Arc::new(AppState::new(registry, db))
}
