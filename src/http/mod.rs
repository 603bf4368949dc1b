//! HTTP server: the UPnP device description endpoints, the ContentDirectory
//! SOAP control endpoint, and ranged media streaming (spec §4.3).

mod handlers;
mod range;
mod xml;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub use range::{parse_range_header, RangeError};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/description.xml", get(handlers::description))
        .route("/ContentDirectory.xml", get(handlers::content_directory_scpd))
        .route("/ConnectionManager.xml", get(handlers::connection_manager_scpd))
        .route(
            "/ContentDirectory/control",
            post(handlers::content_directory_control),
        )
        .route(
            "/ConnectionManager/control",
            post(handlers::connection_manager_control),
        )
        .route("/media/{id}/{*title}", get(handlers::serve_media))
        .route("/media/{id}", get(handlers::serve_media_no_title))
        .route("/browse", get(handlers::browse_debug))
        .fallback(handlers::not_found)
        .with_state(state)
}
