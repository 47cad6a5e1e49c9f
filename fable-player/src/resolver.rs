//! Storage-path to media-URL resolution
//!
//! The catalog backend stores opaque object paths; before the engine can
//! fetch audio it needs a signed, time-limited download URL. Signed URLs
//! expire (the backend issues 7-day signatures), so players resolve per
//! load and never cache a resolved URL beyond their own lifetime.

use fable_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Schemes that are already directly fetchable and skip the backend call.
const DIRECT_SCHEMES: &[&str] = &["http://", "https://", "blob:", "file://", "data:"];

#[derive(Debug, Serialize)]
struct ResolveRequest<'a> {
    path: &'a str,
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ResolveErrorBody {
    error: Option<String>,
}

/// Exchanges opaque storage paths for signed download URLs.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    client: reqwest::Client,
    api_base: String,
}

impl UrlResolver {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.into(),
        }
    }

    /// True when `path` already carries a recognized fetchable scheme.
    pub fn is_direct_url(path: &str) -> bool {
        DIRECT_SCHEMES.iter().any(|scheme| path.starts_with(scheme))
    }

    /// Resolve an opaque storage path into a fetchable URL.
    ///
    /// Pass-through for paths that are already URLs. Backend failures map to
    /// [`Error::Resolution`] carrying the backend's message when it supplies
    /// one.
    pub async fn resolve(&self, path: &str) -> Result<String> {
        if Self::is_direct_url(path) {
            return Ok(path.to_string());
        }

        let endpoint = format!(
            "{}/api/storage/download-url",
            self.api_base.trim_end_matches('/')
        );
        debug!(path, %endpoint, "Resolving storage path");

        let response = self
            .client
            .post(&endpoint)
            .json(&ResolveRequest { path })
            .send()
            .await
            .map_err(|e| Error::Resolution(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<ResolveErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| "Failed to get download URL".to_string());
            return Err(Error::Resolution(message));
        }

        let body: ResolveResponse = response
            .json()
            .await
            .map_err(|e| Error::Resolution(e.to_string()))?;
        Ok(body.url)
    }
}
