/// HTTP handlers for the realtime notification service
pub mod notifications;
pub mod websocket;

pub use notifications::register_routes as register_notifications;
pub use websocket::register_routes as register_websocket;

use crate::middleware::CORRELATION_ID_HEADER;
use crate::websocket::OriginPolicy;
use actix_cors::Cors;
use actix_web::http::{header, Method};
use serde::Serialize;

/// CORS for the HTTP surface, sharing the WebSocket origin allow-list
pub fn cors(policy: &OriginPolicy) -> Cors {
    let cors = match policy {
        OriginPolicy::AllowAll => Cors::default().allow_any_origin(),
        OriginPolicy::AllowList(origins) => origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin)),
    };

    cors.allowed_methods([
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ])
    .allowed_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    .allowed_header(notifications::USER_ID_HEADER)
    .allowed_header(notifications::APP_ID_HEADER)
    .allowed_header(CORRELATION_ID_HEADER)
    .expose_headers([CORRELATION_ID_HEADER])
    .supports_credentials()
    .max_age(3600)
}

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}
