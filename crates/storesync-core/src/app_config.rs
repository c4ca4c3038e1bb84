use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub tenants_path: PathBuf,
    pub api_key_hash_salt: String,
    pub service_api_key: Option<String>,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub tenant_db_max_connections: u32,
    pub tenant_db_connect_timeout_secs: u64,
    pub sync_batch_size: usize,
    pub sync_time_ceiling_secs: u64,
    pub sync_schedule: String,
    pub media_base_url: String,
    pub listing_base_url: Option<String>,
    pub listing_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("tenants_path", &self.tenants_path)
            .field("database_url", &"[redacted]")
            .field("api_key_hash_salt", &"[redacted]")
            .field(
                "service_api_key",
                &self.service_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("tenant_db_max_connections", &self.tenant_db_max_connections)
            .field(
                "tenant_db_connect_timeout_secs",
                &self.tenant_db_connect_timeout_secs,
            )
            .field("sync_batch_size", &self.sync_batch_size)
            .field("sync_time_ceiling_secs", &self.sync_time_ceiling_secs)
            .field("sync_schedule", &self.sync_schedule)
            .field("media_base_url", &self.media_base_url)
            .field("listing_base_url", &self.listing_base_url)
            .field("listing_timeout_secs", &self.listing_timeout_secs)
            .finish()
    }
}
