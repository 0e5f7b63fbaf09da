//! Profile Service
//!
//! Profile editing service with face-verified picture updates. The service
//! orchestrates three external collaborators: an identity directory (Okta)
//! that owns the user record, S3 blob storage holding the profile pictures,
//! and a face service (Azure Face API) used to gate picture updates. A user's
//! first picture enrolls their face; every later picture must verify against
//! that enrollment before anything is persisted.
//!
//! ## Features
//!
//! - **Face-Gated Updates**: Exactly one detectable face per upload; once
//!   enrolled, new pictures must verify at or above the confidence threshold
//! - **Signed Image Access**: Pictures are served through short-lived
//!   presigned URLs, never through public bucket access
//! - **Single-Commit Persistence**: Submitted fields and staged attributes
//!   are written back to the directory in one update call after all gates
//!
//! ## Architecture
//!
//! ```text
//! HTTP (axum)                Profile Workflow              External services
//! ┌──────────────┐          ┌──────────────────┐          ┌──────────────┐
//! │ GET /profile │─────────▶│ view_profile     │─────────▶│ Identity     │
//! │ PUT /profile │          │ edit_profile     │          │ Directory    │
//! └──────────────┘          │   validate form  │          └──────────────┘
//!        │                  │   detect face    │          ┌──────────────┐
//!        ▼                  │   enroll/verify  │─────────▶│ Face         │
//! ┌──────────────┐          │   swap blob      │          │ Service      │
//! │ Verified     │          │   persist record │          └──────────────┘
//! │ claims (sub) │          └──────────────────┘          ┌──────────────┐
//! └──────────────┘                                 ──────▶│ S3 Blob      │
//!                                                         │ Store        │
//!                                                         └──────────────┘
//! ```

pub mod api;
pub mod auth;
pub mod blob_store;
pub mod config;
pub mod directory;
pub mod face;
pub mod workflow;

pub use api::{AppState, ErrorResponse, ProfileResponse};
pub use auth::{AuthenticatedUser, Claims};
pub use blob_store::{BlobStore, S3BlobStore, SignedUrl};
pub use config::Config;
pub use directory::{OktaDirectory, UserDirectory, UserProfile, UserRecord};
pub use face::{AzureFaceClient, DetectedFace, FaceVerifier, Verification};
pub use workflow::{ImageUpload, ProfileForm, ProfileView, ProfileWorkflow, WorkflowError};
