use axum::{Router, routing::get, routing::post};

use crate::state::AppState;

pub mod admin;
pub mod auth;
pub mod cart;
pub mod doc;
pub mod health;
pub mod items;
pub mod orders;
pub mod params;
pub mod query;
pub mod upload;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/items", items::router())
        .route("/categories", get(items::list_categories))
        .nest("/cart", cart::router())
        .nest("/orders", orders::router())
        .nest("/admin", admin::router())
        .nest("/query", query::router())
        .route("/upload", post(upload::upload_file))
}
