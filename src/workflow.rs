//! Profile workflow orchestration.
//!
//! Coordinates the identity directory, blob store, and face service to
//! implement the view/edit profile use cases. Editing is gated: the uploaded
//! picture must contain exactly one face, and once a user has an enrolled
//! face, every new picture must verify against it before anything is
//! persisted. Only the rightful face may replace a previously verified
//! picture.
//!
//! All submitted field values are staged on an in-memory copy of the user
//! record and committed to the directory in a single update call after every
//! gate has passed, so a validation failure never leaves partial state
//! behind. A failure between the blob upload and the directory update can
//! leave an unreferenced blob; that orphan is accepted and not reconciled.

use crate::blob_store::{new_blob_name, BlobError, BlobStore, SignedUrl};
use crate::directory::{DirectoryError, UserDirectory, UserRecord};
use crate::face::{FaceError, FaceVerifier};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Errors from the profile workflow
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// Recoverable input rejection; the caller re-renders the edit form and
    /// no state has been mutated
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Face(#[from] FaceError),
}

impl WorkflowError {
    fn validation(message: impl Into<String>) -> Self {
        WorkflowError::Validation(vec![message.into()])
    }
}

/// Editable scalar profile fields submitted from the edit form
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
}

impl ProfileForm {
    /// Field-level validation, run before any external call
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let mut errors = Vec::new();

        if self.first_name.trim().is_empty() {
            errors.push("First name is required".to_string());
        }
        if self.last_name.trim().is_empty() {
            errors.push("Last name is required".to_string());
        }
        if self.email.trim().is_empty() {
            errors.push("Email is required".to_string());
        } else if !self.email.contains('@') {
            errors.push("Email is not a valid address".to_string());
        }
        if let Some(code) = &self.country_code {
            if !code.is_empty() && (code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()))
            {
                errors.push("Country code must be a two-letter code".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(WorkflowError::Validation(errors))
        }
    }

    fn apply_to(&self, record: &mut UserRecord) {
        record.profile.first_name = self.first_name.clone();
        record.profile.last_name = self.last_name.clone();
        record.profile.email = self.email.clone();
        record.profile.city = self.city.clone();
        record.profile.country_code = self.country_code.clone();
    }
}

/// An uploaded profile picture, fully buffered so detection and enrollment
/// can each read it independently
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub content_type: String,
}

/// A user record together with a signed URL for their current picture
#[derive(Debug, Clone)]
pub struct ProfileView {
    pub user: UserRecord,
    pub image_url: Option<SignedUrl>,
}

/// Orchestrates the identity directory, blob store, and face service
pub struct ProfileWorkflow {
    directory: Arc<dyn UserDirectory>,
    blobs: Arc<dyn BlobStore>,
    faces: Arc<dyn FaceVerifier>,
    verification_threshold: f64,
    signed_url_ttl: Duration,
}

impl ProfileWorkflow {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        blobs: Arc<dyn BlobStore>,
        faces: Arc<dyn FaceVerifier>,
        verification_threshold: f64,
        signed_url_ttl: Duration,
    ) -> Self {
        Self {
            directory,
            blobs,
            faces,
            verification_threshold,
            signed_url_ttl,
        }
    }

    /// View a profile: the user record plus a short-lived read URL for the
    /// current picture, when one exists
    #[instrument(skip(self), fields(subject = %subject))]
    pub async fn view_profile(&self, subject: &str) -> Result<ProfileView, WorkflowError> {
        let user = self.directory.get_user(subject).await?;
        let image_url = self.sign_image_url(&user).await?;

        Ok(ProfileView { user, image_url })
    }

    /// Sign a short-lived read URL for the record's current picture, when
    /// one exists. Works off an already-fetched record so callers holding
    /// one (a just-completed edit) do not re-fetch it.
    pub async fn sign_image_url(
        &self,
        user: &UserRecord,
    ) -> Result<Option<SignedUrl>, WorkflowError> {
        match &user.profile.profile_image_key {
            Some(key) => Ok(Some(
                self.blobs.signed_read_url(key, self.signed_url_ttl).await?,
            )),
            None => Ok(None),
        }
    }

    /// Current editable field values, for prefilling the edit form
    #[instrument(skip(self), fields(subject = %subject))]
    pub async fn prefill(&self, subject: &str) -> Result<ProfileForm, WorkflowError> {
        let user = self.directory.get_user(subject).await?;

        Ok(ProfileForm {
            first_name: user.profile.first_name,
            last_name: user.profile.last_name,
            email: user.profile.email,
            city: user.profile.city,
            country_code: user.profile.country_code,
        })
    }

    /// Edit a profile: validate the form and the uploaded picture, enroll or
    /// verify the face, swap the stored image, and persist the record in one
    /// update call
    #[instrument(skip(self, form, image), fields(subject = %subject))]
    pub async fn edit_profile(
        &self,
        subject: &str,
        form: &ProfileForm,
        image: &ImageUpload,
    ) -> Result<UserRecord, WorkflowError> {
        let started = std::time::Instant::now();

        // Gate 1: field validation, before any external call
        form.validate()?;

        // Stage submitted fields on an in-memory copy; nothing persists
        // until the final update call
        let mut user = self.directory.get_user(subject).await?;
        form.apply_to(&mut user);

        // Gate 2: the picture must contain exactly one usable face
        let detected = self.faces.detect(image.bytes.clone()).await?;
        let face_id = match detected.as_slice() {
            [single] => single.face_id.clone(),
            _ => None,
        };
        let face_id = match face_id {
            Some(id) => id,
            None => {
                metrics::counter!("profile.edits.rejected_face_count").increment(1);
                warn!(count = detected.len(), "Rejected upload by face count");
                return Err(WorkflowError::validation(format!(
                    "Detected {} faces instead of 1 face",
                    detected.len()
                )));
            }
        };

        // Enrollment groups are keyed by the case-normalized user id;
        // person display names keep the login verbatim
        let group_id = user.id.to_lowercase();

        match user.profile.person_id.clone() {
            None => {
                // Gate 3a: first enrollment, always proceeds
                let login = user.profile.login.clone();
                self.faces.create_enrollment_group(&group_id, &login).await?;
                let person_id = self.faces.create_person(&group_id, &login).await?;
                self.faces
                    .enroll_face(&group_id, &person_id, image.bytes.clone())
                    .await?;

                metrics::counter!("profile.enrollments.created").increment(1);
                info!(subject = %subject, person_id = %person_id, "Enrolled first face");

                user.profile.person_id = Some(person_id);
                self.swap_image(&mut user, image).await?;
            }
            Some(person_id) => {
                // Gate 3b: the new picture must verify against the enrolled face
                let verification = self
                    .faces
                    .verify(&face_id, &person_id, &group_id)
                    .await?;

                if verification.is_match && verification.confidence >= self.verification_threshold {
                    self.swap_image(&mut user, image).await?;
                } else {
                    metrics::counter!("profile.edits.rejected_verification").increment(1);
                    warn!(
                        is_match = verification.is_match,
                        confidence = verification.confidence,
                        "Rejected upload by face verification"
                    );
                    return Err(WorkflowError::validation(
                        "The uploaded picture doesn't match your current picture",
                    ));
                }
            }
        }

        // Single update call commits scalar fields and both staged attributes
        self.directory.update_user(&user.id, &user).await?;

        metrics::counter!("profile.edits.accepted").increment(1);
        metrics::histogram!("profile.edit.duration_seconds")
            .record(started.elapsed().as_secs_f64());
        info!(subject = %subject, "Profile updated");

        Ok(user)
    }

    /// Replace the stored picture: delete the superseded blob, upload the new
    /// one under a fresh name, and stage that name on the record
    async fn swap_image(
        &self,
        user: &mut UserRecord,
        image: &ImageUpload,
    ) -> Result<(), WorkflowError> {
        let blob_name = new_blob_name();

        if let Some(old_key) = user.profile.profile_image_key.clone() {
            self.blobs.delete(&old_key).await?;
        }

        self.blobs
            .upload(&blob_name, image.bytes.clone(), &image.content_type)
            .await?;

        user.profile.profile_image_key = Some(blob_name);
        Ok(())
    }
}
