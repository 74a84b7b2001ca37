pub mod categories;
pub mod images;
pub mod products;
pub mod stock;
pub mod tags;

use utoipa_axum::router::OpenApiRouter;

use crate::{middleware, state::AppState};

/// Back-office surface. Every route here requires an admin session.
pub fn routes_with_openapi(state: AppState) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(products::routes_with_openapi())
        .merge(categories::routes_with_openapi())
        .merge(tags::routes_with_openapi())
        .merge(images::routes_with_openapi())
        .merge(stock::routes_with_openapi())
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::admin_authorization,
        ))
}
