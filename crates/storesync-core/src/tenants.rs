use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// One tenant entry from `config/tenants.yaml`, used to seed the control
/// plane. The API key is the raw value handed to the tenant; only its salted
/// hash is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub name: String,
    pub api_key: String,
    pub connection: TenantConnectionConfig,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConnectionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
}

fn default_port() -> u16 {
    5432
}

impl TenantConfig {
    /// Generate a URL-safe slug from the tenant name.
    #[must_use]
    pub fn slug(&self) -> String {
        self.name
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' {
                    c
                } else if c == ' ' {
                    '-'
                } else {
                    '\0'
                }
            })
            .filter(|&c| c != '\0')
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }
}

#[derive(Debug, Deserialize)]
pub struct TenantsFile {
    pub tenants: Vec<TenantConfig>,
}

/// Load and validate the tenants configuration from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_tenants(path: &Path) -> Result<TenantsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::TenantsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let tenants_file: TenantsFile = serde_yaml::from_str(&content)?;

    validate_tenants(&tenants_file)?;

    Ok(tenants_file)
}

fn validate_tenants(tenants_file: &TenantsFile) -> Result<(), ConfigError> {
    let mut seen_names = HashSet::new();
    let mut seen_keys = HashSet::new();

    for tenant in &tenants_file.tenants {
        if tenant.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "tenant name must be non-empty".to_string(),
            ));
        }

        if tenant.api_key.trim().len() < 16 {
            return Err(ConfigError::Validation(format!(
                "tenant '{}' has an api_key shorter than 16 characters",
                tenant.name
            )));
        }

        let lower_name = tenant.name.to_lowercase();
        if !seen_names.insert(lower_name) {
            return Err(ConfigError::Validation(format!(
                "duplicate tenant name: '{}'",
                tenant.name
            )));
        }

        if !seen_keys.insert(tenant.api_key.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate api_key (tenant '{}')",
                tenant.name
            )));
        }

        let conn = &tenant.connection;
        if conn.host.trim().is_empty()
            || conn.database.trim().is_empty()
            || conn.username.trim().is_empty()
        {
            return Err(ConfigError::Validation(format!(
                "tenant '{}' connection must set host, database, and username",
                tenant.name
            )));
        }
    }

    Ok(())
}
