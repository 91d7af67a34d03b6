// src/publish/credential.rs
//! Managed identity tokens for Event Hubs. No secrets are configured: the
//! hosting platform's identity endpoint issues the bearer token.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::CredentialError;

/// Audience for Event Hubs data-plane tokens.
pub const EVENTHUBS_RESOURCE: &str = "https://eventhubs.azure.net";

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

pub const ENV_IDENTITY_ENDPOINT: &str = "IDENTITY_ENDPOINT";
pub const ENV_IDENTITY_HEADER: &str = "IDENTITY_HEADER";
pub const ENV_AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    /// Unix seconds, when the endpoint reports it.
    pub expires_on: Option<i64>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token_len", &self.token.len())
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn token(&self, resource: &str) -> Result<AccessToken, CredentialError>;
}

/// Where the identity token comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    /// App Service / Container Apps style endpoint with a shared secret header.
    AppService { endpoint: String, header: String },
    /// Azure instance metadata service (VMs, AKS pod identity).
    Imds { endpoint: String },
}

impl IdentitySource {
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        match (lookup(ENV_IDENTITY_ENDPOINT), lookup(ENV_IDENTITY_HEADER)) {
            (Some(endpoint), Some(header)) if !endpoint.is_empty() => {
                Self::AppService { endpoint, header }
            }
            _ => Self::Imds {
                endpoint: IMDS_ENDPOINT.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManagedIdentityCredential {
    source: IdentitySource,
    client_id: Option<String>,
    http: reqwest::Client,
}

impl ManagedIdentityCredential {
    pub fn new(
        source: IdentitySource,
        client_id: Option<String>,
        timeout: Duration,
    ) -> Result<Self, CredentialError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(crate::ingest::feed::USER_AGENT)
            .build()
            .map_err(|e| CredentialError::Client(e.to_string()))?;
        Ok(Self {
            source,
            client_id,
            http,
        })
    }

    pub fn from_env(timeout: Duration) -> Result<Self, CredentialError> {
        let lookup = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        let source = IdentitySource::from_lookup(lookup);
        let client_id = lookup(ENV_AZURE_CLIENT_ID);
        tracing::debug!(
            source = source_label(&source),
            user_assigned = client_id.is_some(),
            "managed identity configured"
        );
        Self::new(source, client_id, timeout)
    }

    fn request(&self, resource: &str) -> reqwest::RequestBuilder {
        let mut query: Vec<(&str, &str)> = vec![("resource", resource)];
        let req = match &self.source {
            IdentitySource::AppService { endpoint, header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION));
                self.http.get(endpoint).header("X-IDENTITY-HEADER", header)
            }
            IdentitySource::Imds { endpoint } => {
                query.push(("api-version", IMDS_API_VERSION));
                self.http.get(endpoint).header("Metadata", "true")
            }
        };
        if let Some(id) = &self.client_id {
            query.push(("client_id", id.as_str()));
        }
        req.query(&query)
    }
}

fn source_label(source: &IdentitySource) -> &'static str {
    match source {
        IdentitySource::AppService { .. } => "app_service",
        IdentitySource::Imds { .. } => "imds",
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_on: Option<serde_json::Value>,
}

/// `expires_on` arrives as a number or a numeric string depending on the endpoint.
fn parse_expires_on(v: Option<&serde_json::Value>) -> Option<i64> {
    match v? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn token(&self, resource: &str) -> Result<AccessToken, CredentialError> {
        let resp = self
            .request(resource)
            .send()
            .await
            .map_err(|e| CredentialError::Unreachable(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| CredentialError::Unreachable(e.to_string()))?;
        if !status.is_success() {
            return Err(CredentialError::Rejected { status, body });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| CredentialError::Malformed(e.to_string()))?;
        let token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| CredentialError::Malformed("empty token".to_string()))?;

        Ok(AccessToken {
            token,
            expires_on: parse_expires_on(parsed.expires_on.as_ref()),
        })
    }
}
