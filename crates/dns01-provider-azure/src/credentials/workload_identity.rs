// # Workload Identity Credential
//
// Exchanges a projected service account token for an Entra ID token:
//
// ```http
// POST {authority}/{tenant}/oauth2/v2.0/token
//
// grant_type=client_credentials
// &client_assertion_type=urn:ietf:params:oauth:client-assertion-type:jwt-bearer
// &client_assertion={contents of AZURE_FEDERATED_TOKEN_FILE}
// &client_id=...&scope=...
// ```
//
// The token file is rotated by the kubelet, so it is read again on every
// fetch.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dns01_core::traits::{AccessToken, TokenSource};
use dns01_core::{AzureEnvironment, Error, Result};

use super::{
    JWT_BEARER_ASSERTION, env_var, http_client, read_token_response, token_transport_error,
};

/// Federated credential backed by a token file
#[derive(Debug)]
pub struct WorkloadIdentityCredential {
    tenant_id: String,
    client_id: String,
    token_file: PathBuf,
    authority_host: String,
    client: reqwest::Client,
}

impl WorkloadIdentityCredential {
    /// Create a credential
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        token_file: impl Into<PathBuf>,
        authority_host: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            token_file: token_file.into(),
            authority_host: authority_host.into().trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }

    /// Create a credential from the variables the workload identity webhook injects
    ///
    /// Returns `Ok(None)` when `AZURE_CLIENT_ID`, the tenant or
    /// `AZURE_FEDERATED_TOKEN_FILE` is missing. `tenant_id` overrides
    /// `AZURE_TENANT_ID`; `AZURE_AUTHORITY_HOST` overrides the environment's
    /// authority.
    pub fn from_env(
        tenant_id: Option<String>,
        environment: AzureEnvironment,
    ) -> Result<Option<Self>> {
        let tenant_id = tenant_id
            .filter(|t| !t.trim().is_empty())
            .or_else(|| env_var("AZURE_TENANT_ID"));
        let (Some(tenant_id), Some(client_id), Some(token_file)) = (
            tenant_id,
            env_var("AZURE_CLIENT_ID"),
            env_var("AZURE_FEDERATED_TOKEN_FILE"),
        ) else {
            return Ok(None);
        };

        let authority_host = env_var("AZURE_AUTHORITY_HOST")
            .unwrap_or_else(|| environment.authority_host().to_string());
        Self::new(tenant_id, client_id, token_file, authority_host).map(Some)
    }

    /// Path of the federated token file
    pub fn token_file(&self) -> &Path {
        &self.token_file
    }

    async fn read_assertion(&self) -> Result<String> {
        let assertion = tokio::fs::read_to_string(&self.token_file)
            .await
            .map_err(|e| {
                Error::auth(format!(
                    "workload_identity: cannot read token file {}: {}",
                    self.token_file.display(),
                    e
                ))
            })?;
        let assertion = assertion.trim().to_string();
        if assertion.is_empty() {
            return Err(Error::auth(format!(
                "workload_identity: token file {} is empty",
                self.token_file.display()
            )));
        }
        Ok(assertion)
    }
}

#[async_trait]
impl TokenSource for WorkloadIdentityCredential {
    async fn fetch_token(&self, scope: &str) -> Result<AccessToken> {
        let assertion = self.read_assertion().await?;
        tracing::debug!(tenant = %self.tenant_id, client_id = %self.client_id, "Exchanging federated token");

        let response = self
            .client
            .post(format!(
                "{}/{}/oauth2/v2.0/token",
                self.authority_host, self.tenant_id
            ))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_assertion_type", JWT_BEARER_ASSERTION),
                ("client_assertion", assertion.as_str()),
                ("client_id", self.client_id.as_str()),
                ("scope", scope),
            ])
            .send()
            .await
            .map_err(|e| token_transport_error(self.source_name(), e))?;

        read_token_response(response, self.source_name()).await
    }

    fn source_name(&self) -> &'static str {
        "workload_identity"
    }
}
