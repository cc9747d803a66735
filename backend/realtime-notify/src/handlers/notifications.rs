/// Notification creation over HTTP
use super::ApiResponse;
use crate::error::{AppError, Result};
use crate::models::NewNotification;
use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use validator::Validate;

pub const USER_ID_HEADER: &str = "X-User-ID";
pub const APP_ID_HEADER: &str = "X-App-ID";

/// Body of `POST /notification`; recipient and app come from headers
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationPayload {
    #[validate(length(min = 1))]
    pub group_key: String,

    #[validate(length(min = 1))]
    pub message: String,

    #[validate(length(min = 1))]
    pub status: String,
}

fn required_header(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Persist a notification and push it to the recipient if connected
///
/// POST /notification
pub async fn create_notification(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<CreateNotificationPayload>,
) -> Result<HttpResponse> {
    let (Some(user_id), Some(app_id)) = (
        required_header(&req, USER_ID_HEADER),
        required_header(&req, APP_ID_HEADER),
    ) else {
        return Err(AppError::BadRequest(format!(
            "{} and {} headers are required",
            USER_ID_HEADER, APP_ID_HEADER
        )));
    };

    let payload = body.into_inner();
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let record = state
        .notifications
        .create(NewNotification {
            user_id,
            app_id,
            group_key: payload.group_key,
            message: payload.message,
            status: payload.status,
        })
        .await?;

    info!(notification_id = %record.id, user_id = %record.user_id, "Notification created");

    if let Err(e) = state.hub.send_notification(&record).await {
        debug!(notification_id = %record.id, error = %e, "Created notification not pushed");
    }

    Ok(HttpResponse::Created().json(ApiResponse::ok(record)))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/notification", web::post().to(create_notification));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_validation_rejects_empty_fields() {
        let payload = CreateNotificationPayload {
            group_key: String::new(),
            message: "hello".to_string(),
            status: "info".to_string(),
        };
        assert!(payload.validate().is_err());
    }

    #[test]
    fn test_payload_uses_camel_case() {
        let payload: CreateNotificationPayload =
            serde_json::from_str(r#"{"groupKey":"g","message":"m","status":"s"}"#).unwrap();
        assert_eq!(payload.group_key, "g");
        assert!(payload.validate().is_ok());
    }
}
