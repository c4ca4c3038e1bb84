//! HTTP client for the remote media-listing service.
//!
//! The listing service fronts the store's upload volume and exposes two
//! endpoints: a directory listing (`GET /api/files?directory=`) returning a
//! flat JSON array of files, and a content fetch (`GET /api/files/content?path=`)
//! returning raw bytes. Only the listing-based attach mode talks to it; the
//! main synchronization run never does.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;

/// Errors returned by the listing client.
#[derive(Debug, Error)]
pub enum ListingError {
    /// Network or TLS failure from the underlying HTTP client.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The configured base URL could not be parsed.
    #[error("invalid listing base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The listing service answered 404 for the requested directory or path.
    #[error("listing endpoint not found: {url}")]
    NotFound { url: String },

    /// Any other non-2xx status.
    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// The response body could not be deserialized into the expected type.
    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One entry in a remote directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub size: u64,
}

/// Client for the remote media-listing service.
#[derive(Debug)]
pub struct ListingClient {
    client: Client,
    base_url: Url,
}

impl ListingClient {
    /// Creates a client pointed at the given listing service.
    ///
    /// # Errors
    ///
    /// Returns [`ListingError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ListingError::InvalidBaseUrl`] if
    /// `base_url` does not parse.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ListingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("storesync/0.1 (catalog-sync)")
            .build()?;

        // Normalise: exactly one trailing slash so Url::join treats the base
        // as a directory rather than replacing its last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| ListingError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self { client, base_url })
    }

    /// Lists the files under a remote directory.
    ///
    /// # Errors
    ///
    /// - [`ListingError::NotFound`] if the directory does not exist.
    /// - [`ListingError::UnexpectedStatus`] on any other non-2xx status.
    /// - [`ListingError::Http`] on network failure.
    /// - [`ListingError::Deserialize`] if the body is not a file array.
    pub async fn list_directory(&self, directory: &str) -> Result<Vec<RemoteFile>, ListingError> {
        let url = self.build_url("api/files", &[("directory", directory)])?;
        let body = self.request_bytes(&url).await?;

        serde_json::from_slice(&body).map_err(|e| ListingError::Deserialize {
            context: format!("list_directory({directory})"),
            source: e,
        })
    }

    /// Fetches the raw bytes of one remote file.
    ///
    /// # Errors
    ///
    /// - [`ListingError::NotFound`] if the path does not exist.
    /// - [`ListingError::UnexpectedStatus`] on any other non-2xx status.
    /// - [`ListingError::Http`] on network failure.
    pub async fn fetch_file(&self, path: &str) -> Result<Vec<u8>, ListingError> {
        let url = self.build_url("api/files/content", &[("path", path)])?;
        self.request_bytes(&url).await
    }

    fn build_url(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Url, ListingError> {
        let mut url = self
            .base_url
            .join(endpoint)
            .map_err(|e| ListingError::InvalidBaseUrl {
                url: self.base_url.to_string(),
                reason: e.to_string(),
            })?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }
        Ok(url)
    }

    async fn request_bytes(&self, url: &Url) -> Result<Vec<u8>, ListingError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ListingError::NotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ListingError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_appends_endpoint_and_query() {
        let client = ListingClient::new("https://media.acme.test", 5).expect("client");
        let url = client
            .build_url("api/files", &[("directory", "products")])
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://media.acme.test/api/files?directory=products"
        );
    }

    #[test]
    fn build_url_tolerates_trailing_slash_on_base() {
        let client = ListingClient::new("https://media.acme.test/", 5).expect("client");
        let url = client
            .build_url("api/files/content", &[("path", "products/a b.jpg")])
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://media.acme.test/api/files/content?path=products%2Fa+b.jpg"
        );
    }

    #[test]
    fn new_rejects_unparseable_base_url() {
        let err = ListingClient::new("not a url", 5).unwrap_err();
        assert!(matches!(err, ListingError::InvalidBaseUrl { .. }));
    }
}
