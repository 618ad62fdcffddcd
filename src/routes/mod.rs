//! Router assembly: common routes, admin API, uploads and the catalog route table.

pub mod common;
pub mod table;

pub use common::common_routes;
pub use table::{reverse, RouteMatch, RouteName, RouteTable};

use crate::handlers::{admin, catalog, upload};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;

/// Catalog paths. Everything not claimed by another router falls through to the ordered
/// route table, so unmatched paths get the table's `NotFound`.
pub fn catalog_routes(state: AppState) -> Router {
    Router::new().fallback(catalog::dispatch).with_state(state)
}

/// Back-office API under `/admin`.
pub fn admin_routes(state: AppState) -> Router {
    Router::new()
        .route("/admin/", get(admin::registry))
        .route("/admin/:model/", get(admin::changelist).post(admin::create))
        .route(
            "/admin/:model/:id",
            get(admin::change_form).put(admin::update).delete(admin::delete),
        )
        .with_state(state)
}

/// Multipart uploads under `/api/v1/uploads`. Bodies are capped at `max_upload_bytes`.
pub fn upload_routes(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/v1/uploads/book/:id/photo", post(upload::book_photo))
        .route("/api/v1/uploads/book/:id/file", post(upload::book_file))
        .route("/api/v1/uploads/cover", post(upload::create_cover))
        .route(
            "/api/v1/uploads/cover/:id",
            get(upload::get_cover).delete(upload::delete_cover),
        )
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state)
}

/// The whole application.
pub fn app(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .merge(common_routes(state.clone()))
        .merge(admin_routes(state.clone()))
        .merge(upload_routes(state.clone(), max_upload_bytes))
        .merge(catalog_routes(state))
}
