use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::upload::{self, IMAGE_URL_PREFIX};
use crate::prediction::{ClassificationOutcome, PredictedClass, PredictionDraft};
use crate::server::AppState;

/// Predictions shown by the diagnostics endpoint
const DIAGNOSTIC_SAMPLE: usize = 5;

#[derive(Deserialize)]
pub struct ListParams {
    /// Kept as text: anything but a positive integer lists everything
    pub limit: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreatePredictionRequest {
    pub image_name: Option<String>,
    pub image_url: Option<String>,
    pub image_base64: Option<String>,
    pub predicted_class: Option<String>,
    pub confidence: Option<f64>,
    pub probability_bleached: Option<f64>,
    pub probability_healthy: Option<f64>,
}

/// Failure envelope; the message is generic, the cause goes to the log
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: &str, cause: impl std::fmt::Display) -> Self {
        tracing::error!("{}: {}", message, cause);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

type ApiResult = Result<Json<serde_json::Value>, ApiError>;

/// A positive integer, or `None` meaning "no valid limit"
pub fn parse_limit(raw: Option<&str>) -> Option<usize> {
    raw?.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

pub async fn list_predictions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult {
    let predictions = match parse_limit(params.limit.as_deref()) {
        Some(limit) => state.repository.list_recent(limit).await,
        None => state.repository.list_all().await,
    }
    .map_err(|e| ApiError::internal("Failed to fetch predictions", e))?;

    Ok(Json(json!({ "success": true, "data": predictions })))
}

pub async fn create_prediction(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreatePredictionRequest>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload.map_err(|e| {
        tracing::warn!("Rejected prediction body: {}", e);
        ApiError::bad_request("Invalid request body")
    })?;

    let image_name = match body.image_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(ApiError::bad_request("Missing required fields")),
    };

    let predicted_class = match body.predicted_class.as_deref() {
        Some(raw) => raw
            .parse::<PredictedClass>()
            .map_err(|_| ApiError::bad_request("Invalid predictedClass"))?,
        None => PredictedClass::Pending,
    };

    // Caller-supplied verdict; kept when no image is classified here
    let mut outcome = ClassificationOutcome {
        predicted_class,
        confidence: body.confidence.unwrap_or(0.0),
        probability_bleached: body.probability_bleached.unwrap_or(0.0),
        probability_healthy: body.probability_healthy.unwrap_or(0.0),
    };

    let mut image_url = body.image_url.filter(|url| !url.is_empty());
    if let Some(payload) = body.image_base64.filter(|p| !p.is_empty()) {
        let decoded = upload::decode_image_payload(&payload).map_err(|e| {
            tracing::warn!("Rejected image upload for {}: {}", image_name, e);
            ApiError::bad_request("Invalid image data")
        })?;

        let images_dir = state.images_dir.clone();
        let name = image_name.clone();
        let millis = chrono::Utc::now().timestamp_millis();
        let saved = tokio::task::spawn_blocking(move || upload::save_upload(&images_dir, &name, &decoded, millis))
            .await
            .map_err(|e| ApiError::internal("Failed to save uploaded image", e))?
            .map_err(|e| ApiError::internal("Failed to save uploaded image", e))?;
        image_url = Some(saved.url);
    }

    let local_image = image_url
        .as_deref()
        .filter(|url| url.starts_with(IMAGE_URL_PREFIX))
        .and_then(|url| upload::local_image_path(&state.images_dir, url));
    if let Some(path) = local_image {
        let classifier = state.classifier.clone();
        match tokio::task::spawn_blocking(move || classifier.classify(&path)).await {
            Ok(Ok(result)) => outcome = result,
            Ok(Err(e)) => {
                tracing::warn!("Prediction failed for uploaded image, using placeholder values: {}", e)
            }
            Err(e) => tracing::warn!("Prediction task failed, using placeholder values: {}", e),
        }
    }

    let draft = PredictionDraft::new(image_name, outcome).with_image_url(image_url.clone());
    let result = state
        .repository
        .insert(draft)
        .await
        .map_err(|e| ApiError::internal("Failed to save prediction", e))?;

    Ok(Json(json!({
        "success": true,
        "message": "Prediction saved successfully",
        "data": {
            "id": result.last_insert_id,
            "prediction": outcome,
            "imageUrl": image_url,
        },
    })))
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult {
    let stats = state
        .repository
        .stats()
        .await
        .map_err(|e| ApiError::internal("Failed to fetch statistics", e))?;

    Ok(Json(json!({ "success": true, "data": stats })))
}

/// Database smoke test: count plus the newest few rows
pub async fn test_database(State(state): State<Arc<AppState>>) -> ApiResult {
    let predictions = state
        .repository
        .list_recent(DIAGNOSTIC_SAMPLE)
        .await
        .map_err(|e| ApiError::internal("Database test failed", e))?;
    let count = state
        .repository
        .count()
        .await
        .map_err(|e| ApiError::internal("Database test failed", e))?;

    Ok(Json(json!({
        "success": true,
        "data": {
            "count": count,
            "predictions": predictions,
            "message": format!("Database working! Found {} predictions.", count),
        },
    })))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<serde_json::Value>, ApiError> {
    match state.store.status() {
        Some(status) => Ok(Json(json!({ "success": true, "data": status }))),
        None => Err(ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "Store not initialized".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(Some("5")), Some(5));
        assert_eq!(parse_limit(Some(" 12 ")), Some(12));
        assert_eq!(parse_limit(Some("0")), None);
        assert_eq!(parse_limit(Some("-3")), None);
        assert_eq!(parse_limit(Some("ten")), None);
        assert_eq!(parse_limit(None), None);
    }
}
