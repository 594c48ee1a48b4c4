//! HTTP side endpoints next to the WebSocket upgrade.

pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of the HTTP endpoints.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "state-bridge", description = "WebSocket bridge for a home-automation state tree"),
    paths(handlers::system::health_handler),
    components(schemas(handlers::system::HealthResponse)),
    tags((name = "System", description = "Service health"))
)]
pub struct ApiDoc;

/// Builds the HTTP router (health, and Swagger UI when enabled).
pub fn build_router() -> Router<AppState> {
    let router = Router::new().merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
