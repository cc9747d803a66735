/// WebSocket upgrade and connection status endpoints
use crate::error::AppError;
use crate::state::AppState;
use crate::websocket::session::policy_violation;
use crate::websocket::{run_connection, NotificationSession};
use actix_web::http::header;
use actix_web::{web, Error, HttpRequest, HttpResponse, Result as ActixResult};
use actix_ws::{CloseCode, CloseReason};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, warn, Instrument, Span};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// Upgrade to a notification WebSocket
///
/// Endpoint: GET /ws?userId=<id>
///
/// Disallowed origins are refused before the upgrade. A missing `userId`
/// is reported by closing the socket right after the upgrade.
pub async fn ws_handler(
    req: HttpRequest,
    body: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    if !state.origins.is_allowed(origin) {
        warn!(origin = ?origin, "WebSocket origin rejected");
        let shown = origin.unwrap_or("<none>");
        return Err(AppError::Forbidden(format!("origin {shown} not allowed")).into());
    }

    let user_id = query
        .into_inner()
        .user_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    let (response, ws, stream) = actix_ws::handle(&req, body)?;
    let state = state.get_ref().clone();

    // Session logs keep the request span and its correlation id.
    let span = Span::current();
    actix_web::rt::spawn(
        async move {
            let Some(user_id) = user_id else {
                warn!("Missing user ID");
                let _ = ws.close(Some(policy_violation("userId query parameter is required"))).await;
                return;
            };

            let (tx, rx) = mpsc::unbounded_channel();
            match NotificationSession::open(state.clone(), &user_id, tx).await {
                Ok(session) => run_connection(session, ws, stream, rx, state.session).await,
                Err(e) => {
                    error!(user_id = %user_id, error = %e, "Failed to open notification session");
                    let _ = ws
                        .close(Some(CloseReason {
                            code: CloseCode::Error,
                            description: Some("session setup failed".to_string()),
                        }))
                        .await;
                }
            }
        }
        .instrument(span),
    );

    Ok(response)
}

/// Get WebSocket connection status for a user
///
/// Endpoint: GET /api/v1/ws/status/{user_id}
pub async fn ws_status(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let user_id = path.into_inner();
    let connection_count = state.registry.connection_count(&user_id).await;

    Ok(HttpResponse::Ok().json(json!({
        "user_id": user_id,
        "connected": connection_count > 0,
        "connection_count": connection_count
    })))
}

/// Get connection metrics
///
/// Endpoint: GET /api/v1/ws/metrics
pub async fn ws_metrics(state: web::Data<AppState>) -> ActixResult<HttpResponse> {
    let total_connections = state.registry.total_connections().await;
    let connected_users = state.registry.connected_users_count().await;

    Ok(HttpResponse::Ok().json(json!({
        "total_connections": total_connections,
        "connected_users": connected_users,
        "average_connections_per_user": if connected_users > 0 {
            total_connections as f64 / connected_users as f64
        } else {
            0.0
        }
    })))
}

/// Register WebSocket routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws", web::get().to(ws_handler)).service(
        web::scope("/api/v1/ws")
            .route("/status/{user_id}", web::get().to(ws_status))
            .route("/metrics", web::get().to(ws_metrics)),
    );
}
