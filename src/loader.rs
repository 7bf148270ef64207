use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::channels::Catalog;
use crate::metrics::CATALOG_FETCHES;

/// Why a playlist could not be turned into a catalog. Distinct from an
/// empty catalog, which is a successful load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("response from {url} is not readable text: {reason}")]
    Decode { url: String, reason: String },
}

impl FetchError {
    pub fn url(&self) -> &str {
        match self {
            Self::Request { url, .. } | Self::Status { url, .. } | Self::Decode { url, .. } => url,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request_error",
            Self::Status { .. } => "status_error",
            Self::Decode { .. } => "decode_error",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoaderConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: None,
        }
    }
}

/// Fetches playlists and parses them. Holds no state besides the HTTP client,
/// so repeated loads of unchanged content give equal catalogs.
#[derive(Clone)]
pub struct CatalogLoader {
    client: reqwest::Client,
}

impl CatalogLoader {
    pub fn new(config: &LoaderConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    pub async fn load(&self, url: &str) -> Result<Catalog, FetchError> {
        let result = self.fetch_text(url).await;
        match result {
            Ok(text) => {
                let catalog = Catalog::from_m3u(url, &text);
                info!("Loaded {} channels from {}", catalog.len(), url);
                CATALOG_FETCHES.with_label_values(&["ok"]).inc();
                Ok(catalog)
            }
            Err(e) => {
                warn!("Failed to load playlist {}: {}", url, e);
                CATALOG_FETCHES.with_label_values(&[e.outcome()]).inc();
                Err(e)
            }
        }
    }

    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        resp.text().await.map_err(|e| FetchError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_source() {
        let err = FetchError::Status {
            url: "http://iptv.test/index.m3u".to_string(),
            status: 404,
        };
        assert_eq!(err.to_string(), "http://iptv.test/index.m3u returned HTTP 404");
        assert_eq!(err.url(), "http://iptv.test/index.m3u");
        assert_eq!(err.outcome(), "status_error");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_a_request_error() {
        let loader = CatalogLoader::new(&LoaderConfig {
            timeout_secs: 5,
            user_agent: None,
        })
        .unwrap();
        // Port 9 (discard) on localhost is closed in test environments.
        let err = loader.load("http://127.0.0.1:9/index.m3u").await.unwrap_err();
        assert!(matches!(err, FetchError::Request { .. }));
    }
}
