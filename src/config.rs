use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the profile service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,
    /// Identity directory (Okta) configuration
    pub okta: OktaConfig,
    /// S3 blob storage configuration
    pub s3: S3Config,
    /// Face service configuration
    pub face: FaceConfig,
    /// API configuration
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Identity directory configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OktaConfig {
    /// Okta org base URL, e.g. https://dev-123456.okta.com
    pub domain: String,
    /// API token for the SSWS authorization scheme
    pub api_token: String,
}

/// S3 storage configuration for profile images
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// S3 bucket name for profile images
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Signed read URL expiration in seconds
    #[serde(default = "default_signed_url_expiry_secs")]
    pub signed_url_expiry_secs: u64,
}

/// Face detection/verification service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FaceConfig {
    /// Face API endpoint, e.g. https://westeurope.api.cognitive.microsoft.com
    pub endpoint: String,
    /// API subscription key
    pub subscription_key: String,
    /// Recognition model used for detection and enrollment
    #[serde(default = "default_recognition_model")]
    pub recognition_model: String,
    /// Detection model used for face detection
    #[serde(default = "default_detection_model")]
    pub detection_model: String,
    /// Minimum verification confidence to accept a picture update
    #[serde(default = "default_verification_threshold")]
    pub verification_threshold: f64,
}

/// API configuration for the HTTP surface
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "profile-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_signed_url_expiry_secs() -> u64 {
    900 // 15 minutes
}

fn default_recognition_model() -> String {
    "recognition_04".to_string()
}

fn default_detection_model() -> String {
    "detection_01".to_string()
}

fn default_verification_threshold() -> f64 {
    0.8
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "profile-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/profile").required(false))
            .add_source(config::File::with_name("/etc/profile-service/profile").required(false))
            // Override with environment variables
            // PROFILE__OKTA__API_TOKEN -> okta.api_token
            .add_source(
                config::Environment::with_prefix("PROFILE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get signed URL expiry as Duration
    pub fn signed_url_expiry(&self) -> Duration {
        Duration::from_secs(self.s3.signed_url_expiry_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}
