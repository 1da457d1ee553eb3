use axum::http::Method;
use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::cors::{Any, CorsLayer};

use crate::handler::{self, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/productos", get(handler::list_productos).post(handler::create_producto))
        .route(
            "/productos/:id",
            get(handler::get_producto)
                .put(handler::update_producto)
                .delete(handler::delete_producto),
        )
        .route("/productos/:id/camara", patch(handler::update_camara))
        .route("/sincronizar", post(handler::sincronizar))
        .route("/test-connection", get(handler::test_connection))
}

/// The full service: health check, the `/api` routes and open CORS.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(handler::healthcheck))
        .nest("/api", routes())
        .layer(cors)
        .with_state(state)
}
