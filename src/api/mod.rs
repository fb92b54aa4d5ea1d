use crate::geocode::Geocoder;
use crate::service::RefreshTrigger;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use std::sync::{Arc, RwLock};
use time::UtcOffset;

pub mod handlers;
pub mod responses;

/// Shared handler state.
pub struct ApiContext<G> {
    pub state: Arc<RwLock<AppState>>,
    pub refresh: RefreshTrigger,
    pub geocoder: Option<Arc<G>>,
    /// Offset used for the congestion score reported with the lot list.
    pub utc_offset: UtcOffset,
}

// Derived Clone would require `G: Clone`.
impl<G> Clone for ApiContext<G> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            refresh: self.refresh.clone(),
            geocoder: self.geocoder.clone(),
            utc_offset: self.utc_offset,
        }
    }
}

pub fn router<G>(ctx: ApiContext<G>) -> Router
where
    G: Geocoder + 'static,
{
    Router::new()
        .route("/api/lots", get(handlers::get_lots::<G>))
        .route("/api/lots/{id}", get(handlers::get_lot::<G>))
        .route("/api/search", get(handlers::get_search::<G>))
        .route("/api/health", get(handlers::get_health::<G>))
        .route("/api/refresh", post(handlers::post_refresh::<G>))
        .with_state(ctx)
}
