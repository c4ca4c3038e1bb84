pub mod app_config;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod media;
pub mod tenants;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use tenants::{load_tenants, TenantConfig, TenantConnectionConfig, TenantsFile};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read tenants file at {path}: {source}")]
    TenantsFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse tenants file: {0}")]
    TenantsFileParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),
}
