//! Identity directory client.
//!
//! The user record of truth lives in the identity provider (Okta). This module
//! provides a narrow async abstraction over fetching and updating a user's
//! profile so the workflow can be tested against a deterministic fake.

use crate::config::OktaConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors from the identity directory
#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("User not found: {0}")]
    NotFound(String),

    #[error("Directory request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Directory API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode directory response: {0}")]
    Decode(String),
}

/// Profile fields stored on the identity provider's user record.
///
/// Scalar fields are typed; `profile_image_key` and `person_id` are the two
/// free-form attributes this service owns. Wire names are camelCase per the
/// Okta users API.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub login: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    /// Name of the blob currently holding the user's picture
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_key: Option<String>,
    /// Face-service person identifier, set once on first enrollment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_id: Option<String>,
}

/// A user record as held by the identity directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub profile: UserProfile,
}

/// Abstract identity directory operations used by the profile workflow
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetch a user by the subject identifier from their token claims
    async fn get_user(&self, subject: &str) -> Result<UserRecord, DirectoryError>;

    /// Persist the full profile back to the directory in one update call
    async fn update_user(&self, user_id: &str, record: &UserRecord) -> Result<(), DirectoryError>;
}

/// Okta users API client
pub struct OktaDirectory {
    client: reqwest::Client,
    domain: String,
    api_token: String,
}

impl OktaDirectory {
    pub fn new(config: &OktaConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            domain: config.domain.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        }
    }

    fn user_url(&self, user_id: &str) -> String {
        format!("{}/api/v1/users/{}", self.domain, user_id)
    }

    async fn error_from_response(response: reqwest::Response) -> DirectoryError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        DirectoryError::Api { status, message }
    }
}

#[async_trait]
impl UserDirectory for OktaDirectory {
    #[instrument(skip(self), fields(subject = %subject))]
    async fn get_user(&self, subject: &str) -> Result<UserRecord, DirectoryError> {
        let response = self
            .client
            .get(self.user_url(subject))
            .header("Authorization", format!("SSWS {}", self.api_token))
            .header("Accept", "application/json")
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(subject.to_string()));
        }
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let record: UserRecord = response
            .json()
            .await
            .map_err(|e| DirectoryError::Decode(e.to_string()))?;

        debug!(user_id = %record.id, "Fetched user from directory");
        Ok(record)
    }

    #[instrument(skip(self, record), fields(user_id = %user_id))]
    async fn update_user(&self, user_id: &str, record: &UserRecord) -> Result<(), DirectoryError> {
        // Partial profile update; omitted attributes are left untouched
        let body = serde_json::json!({ "profile": record.profile });

        let response = self
            .client
            .post(self.user_url(user_id))
            .header("Authorization", format!("SSWS {}", self.api_token))
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(user_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        debug!(user_id = %user_id, "Updated user profile in directory");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_record_deserializes_okta_payload() {
        let payload = serde_json::json!({
            "id": "00u1abcd",
            "status": "ACTIVE",
            "profile": {
                "login": "ann@example.com",
                "firstName": "Ann",
                "lastName": "Olsen",
                "email": "ann@example.com",
                "city": "Oslo",
                "countryCode": "NO",
                "profileImageKey": "blob-123",
                "personId": "person-456"
            }
        });

        let record: UserRecord = serde_json::from_value(payload).unwrap();
        assert_eq!(record.id, "00u1abcd");
        assert_eq!(record.profile.first_name, "Ann");
        assert_eq!(record.profile.profile_image_key.as_deref(), Some("blob-123"));
        assert_eq!(record.profile.person_id.as_deref(), Some("person-456"));
    }

    #[test]
    fn test_user_profile_tolerates_missing_attributes() {
        let payload = serde_json::json!({
            "id": "00u2",
            "profile": {
                "login": "bob@example.com",
                "firstName": "Bob",
                "lastName": "Berg",
                "email": "bob@example.com"
            }
        });

        let record: UserRecord = serde_json::from_value(payload).unwrap();
        assert!(record.profile.profile_image_key.is_none());
        assert!(record.profile.person_id.is_none());
        assert!(record.profile.city.is_none());
    }

    #[test]
    fn test_profile_serializes_camel_case() {
        let profile = UserProfile {
            login: "ann@example.com".to_string(),
            first_name: "Ann".to_string(),
            last_name: "Olsen".to_string(),
            email: "ann@example.com".to_string(),
            city: Some("Oslo".to_string()),
            country_code: Some("NO".to_string()),
            profile_image_key: Some("blob-1".to_string()),
            person_id: None,
        };

        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["firstName"], "Ann");
        assert_eq!(value["profileImageKey"], "blob-1");
        // Absent attributes are omitted so the directory keeps prior values
        assert!(value.get("personId").is_none());
    }

    #[test]
    fn test_okta_directory_user_url() {
        let directory = OktaDirectory::new(&OktaConfig {
            domain: "https://dev-1.okta.com/".to_string(),
            api_token: "token".to_string(),
        });
        assert_eq!(
            directory.user_url("00u1"),
            "https://dev-1.okta.com/api/v1/users/00u1"
        );
    }
}
