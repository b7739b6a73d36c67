//! Request handlers for the four face endpoints.

use axum::extract::multipart::Multipart;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use facecheck_core::{Matcher, NearestMatcher, PipelineError};
use serde::{Deserialize, Serialize};

use crate::engine::{DecodedImage, EngineError};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub status: &'static str,
    pub name: String,
    pub file_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckinResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckinResponse {
    fn success(name: String, confidence: f32) -> Self {
        Self {
            status: "success",
            name: Some(name),
            confidence: Some(confidence),
            message: None,
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: "not_found",
            name: None,
            confidence: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub name: String,
    pub registered_at: String,
    pub file_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub file_id: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: String,
}

/// `POST /register`: multipart `name` + `photo`. Requires exactly one
/// detectable face; creates a new record and returns its id with 201.
pub async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let (name, photo) = read_register_form(multipart).await?;

    let name = name.ok_or_else(|| ApiError::bad_request("invalid request: send 'name' and 'photo'"))?;
    let photo = photo.ok_or_else(|| ApiError::bad_request("invalid request: send 'name' and 'photo'"))?;
    if name.trim().is_empty() {
        return Err(ApiError::bad_request("name must not be empty"));
    }

    let image = decode_photo(&photo)?;
    let descriptor = state.engine.enroll(image).await.map_err(ApiError::from)?;
    let file_id = state.store.create(&name, descriptor, &photo)?;

    tracing::info!(name = %name, file_id = %file_id, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { status: "success", name, file_id }),
    ))
}

/// `POST /checkin`: multipart `photo`. Matches the probe against every
/// registered descriptor and reports the nearest one within tolerance.
pub async fn checkin(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<CheckinResponse>> {
    // Records are loaded before the photo is touched: an empty store is a
    // caller error regardless of the upload.
    let records = state.store.list()?;
    if records.is_empty() {
        return Err(ApiError::bad_request("no users registered"));
    }

    let photo = read_photo_field(multipart)
        .await?
        .ok_or_else(|| ApiError::bad_request("invalid request: send 'photo'"))?;
    let image = decode_photo(&photo)?;

    let descriptor = match state.engine.probe(image).await {
        Ok(descriptor) => descriptor,
        // A probe photo without a face is a miss, not a request error.
        Err(EngineError::Pipeline(PipelineError::NoFaceDetected)) => {
            return Ok(Json(CheckinResponse::not_found("no face detected")));
        }
        Err(other) => return Err(other.into()),
    };

    let outcome = NearestMatcher.compare(&descriptor, &records, state.config.tolerance);
    if outcome.matched {
        let name = outcome.name.clone().unwrap_or_default();
        let confidence = round2(outcome.confidence());
        tracing::info!(name = %name, confidence, "check-in recognized");
        Ok(Json(CheckinResponse::success(name, confidence)))
    } else {
        tracing::info!(distance = outcome.distance, "check-in: no match within tolerance");
        Ok(Json(CheckinResponse::not_found("unknown")))
    }
}

/// `GET /users`: every registered record, descriptors omitted.
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserSummary>>> {
    let users = state
        .store
        .list()?
        .into_iter()
        .map(|r| UserSummary {
            name: r.name,
            registered_at: r.registered_at,
            file_id: r.id,
        })
        .collect();
    Ok(Json(users))
}

/// `POST /users/delete`: JSON `{fileId}`; removes the record and its photo.
pub async fn delete_user(
    State(state): State<AppState>,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> ApiResult<Json<StatusResponse>> {
    let Json(request) =
        payload.map_err(|_| ApiError::bad_request("send a JSON body with a 'fileId' key"))?;

    if state.store.delete(&request.file_id)? {
        Ok(Json(StatusResponse {
            status: "success",
            message: format!("user {} removed", request.file_id),
        }))
    } else {
        Err(ApiError::not_found(format!("user {} not found", request.file_id)))
    }
}

/// `GET /health`: liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn read_register_form(
    mut multipart: Multipart,
) -> ApiResult<(Option<String>, Option<Vec<u8>>)> {
    let mut name = None;
    let mut photo = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("name") => {
                name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("unreadable 'name' field: {e}")))?,
                );
            }
            Some("photo") => {
                photo = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("unreadable 'photo' field: {e}")))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    Ok((name, photo))
}

async fn read_photo_field(mut multipart: Multipart) -> ApiResult<Option<Vec<u8>>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {e}")))?
    {
        if field.name() == Some("photo") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("unreadable 'photo' field: {e}")))?;
            return Ok(Some(bytes.to_vec()));
        }
    }
    Ok(None)
}

/// Decode uploaded bytes into interleaved RGB8. Decode failures surface as
/// internal errors rather than 400s.
fn decode_photo(bytes: &[u8]) -> ApiResult<DecodedImage> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| ApiError::internal(format!("failed to decode image: {e}")))?
        .to_rgb8();

    Ok(DecodedImage {
        width: decoded.width(),
        height: decoded.height(),
        rgb: decoded.into_raw(),
    })
}

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}
