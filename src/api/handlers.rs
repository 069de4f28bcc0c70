use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ApiError;
use super::routes::AppState;
use crate::gateway::RelayMessage;

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PublishResponse {
    pub success: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<RelayMessage>,
}

/// GET /
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Backend API is running",
    })
}

/// POST /messages
///
/// A body that is not a JSON object with a string `message` is treated the
/// same as a missing message.
pub async fn publish_message(
    State(state): State<AppState>,
    body: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PublishResponse>), ApiError> {
    let message = match body {
        Ok(Json(request)) => request.message.unwrap_or_default(),
        Err(rejection) => {
            debug!(%rejection, "Unreadable publish body");
            String::new()
        }
    };

    state
        .gateway
        .publish(&message)
        .await
        .map_err(|e| ApiError::from_gateway(e, "Failed to send message"))?;

    Ok((
        StatusCode::CREATED,
        Json(PublishResponse {
            success: true,
            message: "Message sent to queue",
        }),
    ))
}

/// GET /messages
///
/// Takes (and acknowledges) at most one message per call.
pub async fn take_message(
    State(state): State<AppState>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let taken = state
        .gateway
        .take_one()
        .await
        .map_err(|e| ApiError::from_gateway(e, "Failed to retrieve messages"))?;

    Ok(Json(MessagesResponse {
        messages: taken.into_iter().collect(),
    }))
}
