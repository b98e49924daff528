use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

/// Upload endpoints, mounted under `/api`.
pub fn api_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::upload::upload_admin))
        .routes(routes!(handlers::upload::upload_private))
        .routes(routes!(handlers::upload::upload_url))
        .layer(handlers::upload::upload_body_limit(&config.upload))
}

/// Public image retrieval, mounted at the root.
pub fn image_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::image::serve_image))
}
