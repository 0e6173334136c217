// # Azure Credential Providers
//
// One [`TokenSource`] per credential mode. Each source performs exactly one
// token round trip per call; caching and refresh live in
// `dns01_core::TokenCache`.
//
// ## Modes
//
// - [`ServicePrincipalCredential`]: client id + secret against Entra ID
// - [`CertificateCredential`]: client id + certificate-signed assertion
// - [`ManagedIdentityCredential`]: IMDS or the App Service identity endpoint
// - [`WorkloadIdentityCredential`]: federated token file exchanged at Entra ID
// - [`AzureCliCredential`]: `az account get-access-token`
// - [`DefaultChainCredential`]: environment credentials, then managed identity
//
// ## Security Requirements
//
// - Secrets and tokens NEVER appear in logs or error messages
// - Every type holding a secret implements `Debug` with `<REDACTED>`

pub mod azure_cli;
pub mod certificate;
pub mod chain;
pub mod managed_identity;
pub mod service_principal;
pub mod workload_identity;

pub use azure_cli::AzureCliCredential;
pub use certificate::CertificateCredential;
pub use chain::DefaultChainCredential;
pub use managed_identity::{ManagedIdentityCredential, MsiEndpoint};
pub use service_principal::ServicePrincipalCredential;
pub use workload_identity::WorkloadIdentityCredential;

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use dns01_core::traits::{AccessToken, TokenSource};
use dns01_core::{AzureEnvironment, CredentialSpec, Error, Result};
use serde::Deserialize;

/// Default HTTP timeout for token requests
const TOKEN_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// `client_assertion_type` for JWT client assertions
pub(crate) const JWT_BEARER_ASSERTION: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Build the credential for `spec`
///
/// No network traffic happens here; the first token is fetched on first use.
pub fn token_source_for(
    spec: &CredentialSpec,
    environment: AzureEnvironment,
) -> Result<Arc<dyn TokenSource>> {
    spec.validate()?;

    let source: Arc<dyn TokenSource> = match spec {
        CredentialSpec::ServicePrincipal {
            client_id,
            client_secret,
            tenant_id,
        } => Arc::new(ServicePrincipalCredential::new(
            tenant_id.clone(),
            client_id.clone(),
            client_secret.clone(),
            environment.authority_host(),
        )?),
        CredentialSpec::ServicePrincipalCertificate {
            client_id,
            certificate_path,
            tenant_id,
        } => Arc::new(CertificateCredential::new(
            tenant_id.clone(),
            client_id.clone(),
            certificate_path.clone(),
            environment.authority_host(),
        )?),
        CredentialSpec::ManagedIdentity { client_id } => {
            Arc::new(ManagedIdentityCredential::from_env(client_id.clone())?)
        }
        CredentialSpec::WorkloadIdentity { tenant_id } => Arc::new(
            WorkloadIdentityCredential::from_env(tenant_id.clone(), environment)?
                .ok_or_else(|| {
                    Error::config(
                        "Workload identity requires AZURE_CLIENT_ID, AZURE_TENANT_ID and AZURE_FEDERATED_TOKEN_FILE",
                    )
                })?,
        ),
        CredentialSpec::AzureCli { tenant_id } => {
            Arc::new(AzureCliCredential::new(tenant_id.clone()))
        }
        CredentialSpec::Default => Arc::new(DefaultChainCredential::from_env(environment)?),
    };

    tracing::debug!(mode = spec.mode_name(), source = source.source_name(), "Credential selected");
    Ok(source)
}

/// HTTP client for token endpoints
pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(TOKEN_HTTP_TIMEOUT)
        .build()
        .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))
}

/// Resource (audience) for a `.default` scope
pub(crate) fn resource_from_scope(scope: &str) -> &str {
    scope.strip_suffix("/.default").unwrap_or(scope)
}

/// Non-empty environment variable
pub(crate) fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Seconds as returned by token endpoints: a number, or a number in a string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Seconds {
    Number(i64),
    Text(String),
}

impl Seconds {
    fn value(&self) -> Option<i64> {
        match self {
            Seconds::Number(n) => Some(*n),
            Seconds::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Token response of Entra ID and the managed identity endpoints
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<Seconds>,
    #[serde(default)]
    expires_on: Option<Seconds>,
}

impl TokenResponse {
    /// Convert to an [`AccessToken`], preferring the absolute expiry
    pub(crate) fn into_access_token(self) -> Result<AccessToken> {
        let absolute = self
            .expires_on
            .as_ref()
            .and_then(Seconds::value)
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
        let relative = self
            .expires_in
            .as_ref()
            .and_then(Seconds::value)
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));

        let expires_at = absolute
            .or(relative)
            .ok_or_else(|| Error::auth("Token response carries no expiry"))?;
        Ok(AccessToken::new(self.access_token, expires_at))
    }
}

/// Error body of Entra ID token endpoints
#[derive(Deserialize)]
struct TokenErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

/// Read a token endpoint response
///
/// 4xx responses are authentication failures; 429, 5xx and transport
/// failures are transient. The response body is only inspected for the
/// error code and description, never logged whole.
pub(crate) async fn read_token_response(
    response: reqwest::Response,
    source: &str,
) -> Result<AccessToken> {
    let status = response.status();
    if status.is_success() {
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::auth(format!("{}: invalid token response: {}", source, e)))?;
        return body.into_access_token();
    }

    let text = response.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<TokenErrorBody>(&text) {
        Ok(TokenErrorBody {
            error: Some(code),
            error_description,
        }) => {
            let description = error_description.unwrap_or_default();
            // Entra ID descriptions end with trace ids on later lines
            let first_line = description.lines().next().unwrap_or_default();
            format!("{} {}", code, first_line)
        }
        _ => String::new(),
    };

    let message = format!(
        "{}: token request failed with HTTP {} {}",
        source,
        status.as_u16(),
        detail
    );
    match status.as_u16() {
        429 | 500..=599 => Err(Error::api_status(status.as_u16(), message)),
        _ => Err(Error::auth(message.trim_end().to_string())),
    }
}

/// Map a transport failure talking to a token endpoint
pub(crate) fn token_transport_error(source: &str, err: reqwest::Error) -> Error {
    Error::transient(format!("{}: token request failed: {}", source, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_accept_numbers_and_strings() {
        let json = r#"{"access_token":"t","expires_in":"3599"}"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        let token = response.into_access_token().unwrap();
        assert!(token.is_valid_for(chrono::Duration::minutes(59)));

        let json = r#"{"access_token":"t","expires_in":3599}"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        assert!(response.into_access_token().is_ok());
    }

    #[test]
    fn absolute_expiry_wins() {
        let json = r#"{"access_token":"t","expires_in":"3599","expires_on":"1700000000"}"#;
        let response: TokenResponse = serde_json::from_str(json).unwrap();
        let token = response.into_access_token().unwrap();
        assert_eq!(token.expires_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn missing_expiry_is_auth_error() {
        let response: TokenResponse = serde_json::from_str(r#"{"access_token":"t"}"#).unwrap();
        assert!(matches!(response.into_access_token(), Err(Error::Auth(_))));
    }

    #[test]
    fn resource_strips_default_suffix() {
        assert_eq!(
            resource_from_scope("https://management.azure.com/.default"),
            "https://management.azure.com"
        );
        assert_eq!(resource_from_scope("https://x"), "https://x");
    }

    #[test]
    fn incomplete_service_principal_is_rejected() {
        let spec = CredentialSpec::ServicePrincipal {
            client_id: "id".to_string(),
            client_secret: " ".to_string(),
            tenant_id: "tenant".to_string(),
        };
        assert!(matches!(
            token_source_for(&spec, AzureEnvironment::Public),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn certificate_mode_builds_certificate_source() {
        let spec = CredentialSpec::ServicePrincipalCertificate {
            client_id: "app-1".to_string(),
            certificate_path: std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("testdata/service-principal.pem"),
            tenant_id: "tenant-1".to_string(),
        };
        let source = token_source_for(&spec, AzureEnvironment::Public).unwrap();
        assert_eq!(source.source_name(), "service_principal_certificate");
    }

    #[test]
    fn cli_mode_builds_cli_source() {
        let spec = CredentialSpec::AzureCli { tenant_id: None };
        let source = token_source_for(&spec, AzureEnvironment::Public).unwrap();
        assert_eq!(source.source_name(), "azure_cli");
    }
}
