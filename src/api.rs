//! HTTP API for the profile service.
//!
//! JSON surface over the profile workflow. View rendering, CSRF protection,
//! and the sign-in redirect remain with the hosting frontend; this layer only
//! translates requests into workflow calls and workflow errors into status
//! codes.

use crate::auth::{verified_claims_middleware, AuthenticatedUser};
use crate::config::ApiConfig;
use crate::directory::{DirectoryError, UserProfile};
use crate::workflow::{ImageUpload, ProfileForm, ProfileView, ProfileWorkflow, WorkflowError};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Json, Router};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, instrument};

/// Uploaded images are buffered in memory; cap the request size
const MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<ProfileWorkflow>,
}

/// Profile response with an optional signed image URL
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub id: String,
    pub profile: UserProfile,
    /// Time-limited read URL for the current picture
    pub image_url: Option<String>,
    /// Expiry of the signed URL (present when the URL is)
    pub image_url_expires_at: Option<DateTime<Utc>>,
}

impl From<ProfileView> for ProfileResponse {
    fn from(view: ProfileView) -> Self {
        let (image_url, image_url_expires_at) = match view.image_url {
            Some(signed) => (Some(signed.url), Some(signed.expires_at)),
            None => (None, None),
        };
        Self {
            id: view.user.id,
            profile: view.user.profile,
            image_url,
            image_url_expires_at,
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

fn workflow_error(e: WorkflowError) -> ApiError {
    match e {
        WorkflowError::Validation(messages) => error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "VALIDATION_ERROR",
            messages.join("; "),
        ),
        WorkflowError::Directory(DirectoryError::NotFound(subject)) => error_response(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("No user for subject {subject}"),
        ),
        other => {
            error!(error = %other, "Workflow failed on an external service");
            error_response(
                StatusCode::BAD_GATEWAY,
                "UPSTREAM_ERROR",
                "An external service failed",
            )
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route(
            "/api/v1/profile",
            get(view_profile).put(edit_profile),
        )
        .route("/api/v1/profile/edit", get(prefill_edit_form))
        .layer(middleware::from_fn(verified_claims_middleware))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "profile-service"
    }))
}

/// Readiness check endpoint. The service keeps no local state; readiness is
/// process liveness.
async fn readiness_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready"
    }))
}

/// View the authenticated user's profile
#[instrument(skip(state, user), fields(subject = %user.subject))]
async fn view_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ProfileResponse>, ApiError> {
    let view = state
        .workflow
        .view_profile(&user.subject)
        .await
        .map_err(workflow_error)?;

    Ok(Json(view.into()))
}

/// Current editable field values for prefilling the edit form
#[instrument(skip(state, user), fields(subject = %user.subject))]
async fn prefill_edit_form(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<ProfileForm>, ApiError> {
    let form = state
        .workflow
        .prefill(&user.subject)
        .await
        .map_err(workflow_error)?;

    Ok(Json(form))
}

/// Submit the edit form: scalar fields plus the uploaded picture
#[instrument(skip(state, user, multipart), fields(subject = %user.subject))]
async fn edit_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> Result<Json<ProfileResponse>, ApiError> {
    let (form, image) = parse_edit_form(multipart).await?;

    let updated = state
        .workflow
        .edit_profile(&user.subject, &form, &image)
        .await
        .map_err(workflow_error)?;

    // Sign a URL from the just-updated record so the client can render the
    // new picture immediately, without a second directory fetch
    let signed = state
        .workflow
        .sign_image_url(&updated)
        .await
        .map_err(workflow_error)?;
    let (image_url, image_url_expires_at) = match signed {
        Some(signed) => (Some(signed.url), Some(signed.expires_at)),
        None => (None, None),
    };

    Ok(Json(ProfileResponse {
        id: updated.id,
        profile: updated.profile,
        image_url,
        image_url_expires_at,
    }))
}

/// Read the multipart edit form into a validated-shape form and a buffered
/// image payload
async fn parse_edit_form(mut multipart: Multipart) -> Result<(ProfileForm, ImageUpload), ApiError> {
    let mut form = ProfileForm::default();
    let mut image: Option<(Bytes, String)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "VALIDATION_ERROR",
            format!("Malformed multipart body: {e}"),
        )
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "firstName" => form.first_name = read_text(field).await?,
            "lastName" => form.last_name = read_text(field).await?,
            "email" => form.email = read_text(field).await?,
            "city" => form.city = Some(read_text(field).await?).filter(|s| !s.is_empty()),
            "countryCode" => {
                form.country_code = Some(read_text(field).await?).filter(|s| !s.is_empty())
            }
            "image" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(|e| {
                    error_response(
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "VALIDATION_ERROR",
                        format!("Failed to read image upload: {e}"),
                    )
                })?;
                image = Some((bytes, content_type));
            }
            _ => {} // Unknown fields are ignored
        }
    }

    let (bytes, content_type) = image.ok_or_else(|| {
        error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "VALIDATION_ERROR",
            "A profile picture upload is required",
        )
    })?;

    if bytes.is_empty() {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "VALIDATION_ERROR",
            "The uploaded picture is empty",
        ));
    }

    Ok((
        form,
        ImageUpload {
            bytes,
            content_type,
        },
    ))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field.text().await.map_err(|e| {
        error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "VALIDATION_ERROR",
            format!("Malformed form field: {e}"),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::SignedUrl;
    use crate::directory::UserRecord;

    fn test_view(image_url: Option<SignedUrl>) -> ProfileView {
        ProfileView {
            user: UserRecord {
                id: "00u1".to_string(),
                profile: UserProfile {
                    login: "ann@example.com".to_string(),
                    first_name: "Ann".to_string(),
                    last_name: "Olsen".to_string(),
                    email: "ann@example.com".to_string(),
                    city: Some("Oslo".to_string()),
                    country_code: Some("NO".to_string()),
                    profile_image_key: Some("blob-1".to_string()),
                    person_id: Some("p-1".to_string()),
                },
            },
            image_url,
        }
    }

    #[test]
    fn test_profile_response_carries_signed_url() {
        let expires = Utc::now();
        let response: ProfileResponse = test_view(Some(SignedUrl {
            url: "https://signed.example/blob-1".to_string(),
            expires_at: expires,
        }))
        .into();

        assert_eq!(response.id, "00u1");
        assert_eq!(
            response.image_url.as_deref(),
            Some("https://signed.example/blob-1")
        );
        assert_eq!(response.image_url_expires_at, Some(expires));
    }

    #[test]
    fn test_profile_response_without_image() {
        let response: ProfileResponse = test_view(None).into();
        assert!(response.image_url.is_none());
        assert!(response.image_url_expires_at.is_none());
    }

    #[test]
    fn test_workflow_error_mapping() {
        let (status, Json(body)) =
            workflow_error(WorkflowError::Validation(vec!["bad field".to_string()]));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body.code, "VALIDATION_ERROR");

        let (status, Json(body)) = workflow_error(WorkflowError::Directory(
            DirectoryError::NotFound("ghost".to_string()),
        ));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "NOT_FOUND");

        let (status, Json(body)) = workflow_error(WorkflowError::Directory(DirectoryError::Api {
            status: 500,
            message: "boom".to_string(),
        }));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.code, "UPSTREAM_ERROR");
    }
}
