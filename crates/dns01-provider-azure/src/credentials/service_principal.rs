// # Service Principal Credential
//
// Client-credentials grant against the Entra ID v2 token endpoint:
//
// ```http
// POST {authority}/{tenant}/oauth2/v2.0/token
// Content-Type: application/x-www-form-urlencoded
//
// grant_type=client_credentials&client_id=...&client_secret=...&scope=...
// ```

use async_trait::async_trait;
use dns01_core::traits::{AccessToken, TokenSource};
use dns01_core::{Error, Result};

use super::{http_client, read_token_response, token_transport_error};

/// Entra ID application authenticating with a client secret
pub struct ServicePrincipalCredential {
    tenant_id: String,
    client_id: String,
    /// ⚠️ NEVER log this value
    client_secret: String,
    authority_host: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for ServicePrincipalCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServicePrincipalCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<REDACTED>")
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

impl ServicePrincipalCredential {
    /// Create a credential
    ///
    /// # Parameters
    ///
    /// - `tenant_id`: directory (tenant) id
    /// - `client_id`: application (client) id
    /// - `client_secret`: client secret
    /// - `authority_host`: Entra ID host, e.g. `https://login.microsoftonline.com`
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        authority_host: impl Into<String>,
    ) -> Result<Self> {
        let client_secret = client_secret.into();
        if client_secret.trim().is_empty() {
            return Err(Error::config("Service principal client secret cannot be empty"));
        }

        Ok(Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret,
            authority_host: authority_host.into().trim_end_matches('/').to_string(),
            client: http_client()?,
        })
    }

    fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_host, self.tenant_id)
    }
}

#[async_trait]
impl TokenSource for ServicePrincipalCredential {
    async fn fetch_token(&self, scope: &str) -> Result<AccessToken> {
        tracing::debug!(tenant = %self.tenant_id, client_id = %self.client_id, "Requesting service principal token");

        let response = self
            .client
            .post(self.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", scope),
            ])
            .send()
            .await
            .map_err(|e| token_transport_error(self.source_name(), e))?;

        read_token_response(response, self.source_name()).await
    }

    fn source_name(&self) -> &'static str {
        "service_principal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SCOPE: &str = "https://management.azure.com/.default";

    #[tokio::test]
    async fn fetches_token_with_client_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=app-1"))
            .and(body_string_contains("scope=https%3A%2F%2Fmanagement.azure.com%2F.default"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "sp-token"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential =
            ServicePrincipalCredential::new("tenant-1", "app-1", "s3cret", server.uri()).unwrap();
        let token = credential.fetch_token(SCOPE).await.unwrap();
        assert_eq!(token.token, "sp-token");
    }

    #[tokio::test]
    async fn rejected_secret_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided.\r\nTrace ID: x"
            })))
            .mount(&server)
            .await;

        let credential =
            ServicePrincipalCredential::new("tenant-1", "app-1", "s3cret", server.uri()).unwrap();
        let err = credential.fetch_token(SCOPE).await.unwrap_err();
        match err {
            Error::Auth(message) => {
                assert!(message.contains("invalid_client"));
                assert!(!message.contains("Trace ID"));
                assert!(!message.contains("s3cret"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let credential =
            ServicePrincipalCredential::new("tenant-1", "app-1", "s3cret", server.uri()).unwrap();
        let err = credential.fetch_token(SCOPE).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn secret_not_exposed_in_debug() {
        let credential =
            ServicePrincipalCredential::new("tenant-1", "app-1", "s3cret-value", "https://login").unwrap();
        let text = format!("{credential:?}");
        assert!(!text.contains("s3cret-value"));
        assert!(text.contains("<REDACTED>"));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(ServicePrincipalCredential::new("t", "c", "", "https://login").is_err());
    }
}
