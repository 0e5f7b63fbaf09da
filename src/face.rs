//! Face detection and verification client.
//!
//! Wraps the Azure Face REST API: detect faces in an uploaded image, maintain
//! one enrollment group per user holding a single enrolled person, and verify
//! a probe face against that person. The workflow only ever consults the
//! trait; the HTTP client lives behind it.

use crate::config::FaceConfig;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from the face service
#[derive(Error, Debug)]
pub enum FaceError {
    #[error("Face service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Face service API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode face service response: {0}")]
    Decode(String),
}

/// A face found by detection
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectedFace {
    /// Transient face identifier usable for verification, absent when the
    /// detection produced no usable face reference
    #[serde(default)]
    pub face_id: Option<String>,
}

/// Outcome of verifying a probe face against an enrolled person
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
pub struct Verification {
    /// Whether the service judged the faces to be the same identity
    #[serde(rename = "isIdentical")]
    pub is_match: bool,
    /// Similarity strength in [0, 1]
    pub confidence: f64,
}

/// Abstract face service operations used by the profile workflow
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FaceVerifier: Send + Sync {
    /// Detect faces in an image
    async fn detect(&self, image: Bytes) -> Result<Vec<DetectedFace>, FaceError>;

    /// Create an enrollment group. Called once per user, before the first
    /// person is created in it.
    async fn create_enrollment_group(
        &self,
        group_id: &str,
        display_name: &str,
    ) -> Result<(), FaceError>;

    /// Create a person within an enrollment group, returning its identifier
    async fn create_person(&self, group_id: &str, display_name: &str)
        -> Result<String, FaceError>;

    /// Enroll a face image as a sample of an existing person
    async fn enroll_face(
        &self,
        group_id: &str,
        person_id: &str,
        image: Bytes,
    ) -> Result<(), FaceError>;

    /// Verify a detected face against an enrolled person
    async fn verify(
        &self,
        face_id: &str,
        person_id: &str,
        group_id: &str,
    ) -> Result<Verification, FaceError>;
}

/// Azure Face API client
pub struct AzureFaceClient {
    client: reqwest::Client,
    endpoint: String,
    subscription_key: String,
    recognition_model: String,
    detection_model: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePersonResponse {
    person_id: String,
}

impl AzureFaceClient {
    pub fn new(config: &FaceConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            subscription_key: config.subscription_key.clone(),
            recognition_model: config.recognition_model.clone(),
            detection_model: config.detection_model.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/face/v1.0/{}", self.endpoint, path)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, FaceError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            Err(FaceError::Api { status, message })
        }
    }
}

#[async_trait]
impl FaceVerifier for AzureFaceClient {
    #[instrument(skip(self, image), fields(size_bytes = image.len()))]
    async fn detect(&self, image: Bytes) -> Result<Vec<DetectedFace>, FaceError> {
        let response = self
            .client
            .post(self.url("detect"))
            .query(&[
                ("returnFaceId", "true"),
                ("recognitionModel", self.recognition_model.as_str()),
                ("detectionModel", self.detection_model.as_str()),
            ])
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .header("Content-Type", "application/octet-stream")
            .body(image)
            .send()
            .await?;

        let faces: Vec<DetectedFace> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| FaceError::Decode(e.to_string()))?;

        debug!(count = faces.len(), "Face detection completed");
        Ok(faces)
    }

    #[instrument(skip(self), fields(group_id = %group_id))]
    async fn create_enrollment_group(
        &self,
        group_id: &str,
        display_name: &str,
    ) -> Result<(), FaceError> {
        let body = serde_json::json!({
            "name": display_name,
            "recognitionModel": self.recognition_model,
        });

        let response = self
            .client
            .put(self.url(&format!("persongroups/{group_id}")))
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .json(&body)
            .send()
            .await?;

        Self::check(response).await?;
        debug!(group_id = %group_id, "Enrollment group created");
        Ok(())
    }

    #[instrument(skip(self), fields(group_id = %group_id))]
    async fn create_person(
        &self,
        group_id: &str,
        display_name: &str,
    ) -> Result<String, FaceError> {
        let body = serde_json::json!({ "name": display_name });

        let response = self
            .client
            .post(self.url(&format!("persongroups/{group_id}/persons")))
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .json(&body)
            .send()
            .await?;

        let created: CreatePersonResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| FaceError::Decode(e.to_string()))?;

        debug!(group_id = %group_id, person_id = %created.person_id, "Person created");
        Ok(created.person_id)
    }

    #[instrument(skip(self, image), fields(group_id = %group_id, person_id = %person_id))]
    async fn enroll_face(
        &self,
        group_id: &str,
        person_id: &str,
        image: Bytes,
    ) -> Result<(), FaceError> {
        let response = self
            .client
            .post(self.url(&format!(
                "persongroups/{group_id}/persons/{person_id}/persistedFaces"
            )))
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .header("Content-Type", "application/octet-stream")
            .body(image)
            .send()
            .await?;

        Self::check(response).await?;
        debug!(person_id = %person_id, "Face sample enrolled");
        Ok(())
    }

    #[instrument(skip(self), fields(person_id = %person_id, group_id = %group_id))]
    async fn verify(
        &self,
        face_id: &str,
        person_id: &str,
        group_id: &str,
    ) -> Result<Verification, FaceError> {
        let body = serde_json::json!({
            "faceId": face_id,
            "personId": person_id,
            "personGroupId": group_id,
        });

        let response = self
            .client
            .post(self.url("verify"))
            .header("Ocp-Apim-Subscription-Key", &self.subscription_key)
            .json(&body)
            .send()
            .await?;

        let verification: Verification = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| FaceError::Decode(e.to_string()))?;

        debug!(
            is_match = verification.is_match,
            confidence = verification.confidence,
            "Face verification completed"
        );
        Ok(verification)
    }
}
