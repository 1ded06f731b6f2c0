//! Explicit Salesforce session context.
//!
//! The identity collaborator (OAuth) hands us an access token and the org's
//! instance host. Both travel together in a [`SessionContext`] that is passed
//! into every upload; nothing is kept in ambient state.

use std::sync::Arc;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::AppError;
use crate::salesforce::BulkIngestV2Client;

/// Access token and instance URL for one Salesforce org.
#[derive(Clone)]
pub struct SessionContext {
    access_token: SecretString,
    instance_url: Url,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("instance_url", &self.instance_url.as_str())
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

impl SessionContext {
    /// Builds a session from a token and a host.
    ///
    /// `host` may be a bare hostname (`na1.salesforce.com`), which is reached
    /// over https, or a full URL (`https://acme.my.salesforce.com`).
    ///
    /// # Errors
    ///
    /// - `AppError::NotAuthenticated` - empty token or host
    /// - `AppError::InvalidInput` - host cannot be turned into a URL
    pub fn new(access_token: SecretString, host: &str) -> Result<Self, AppError> {
        let host = host.trim();
        if access_token.expose_secret().trim().is_empty() || host.is_empty() {
            return Err(AppError::NotAuthenticated);
        }

        let raw = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };

        let instance_url = Url::parse(&raw)
            .map_err(|e| AppError::InvalidInput(format!("Invalid Salesforce instance '{}': {}", host, e)))?;

        if instance_url.host_str().is_none() || !matches!(instance_url.scheme(), "http" | "https") {
            return Err(AppError::InvalidInput(format!(
                "Invalid Salesforce instance '{}': expected an http(s) host",
                host
            )));
        }

        Ok(Self {
            access_token,
            instance_url,
        })
    }

    pub fn instance_url(&self) -> &Url {
        &self.instance_url
    }

    /// Host part of the instance URL, used in log lines.
    pub fn host(&self) -> &str {
        self.instance_url.host_str().unwrap_or_default()
    }

    /// Creates a Bulk API v2 ingest client bound to this session.
    pub fn ingest_client(&self, http: Arc<Client>) -> BulkIngestV2Client {
        BulkIngestV2Client::new(http, self.instance_url.clone(), self.access_token.clone())
    }
}
