// # Managed Identity Credential
//
// Two endpoints serve managed identity tokens:
//
// - IMDS on virtual machines and AKS nodes:
//   `GET http://169.254.169.254/metadata/identity/oauth2/token?api-version=2018-02-01&resource=...`
//   with header `Metadata: true`
// - App Service and Functions, announced through `IDENTITY_ENDPOINT` and
//   `IDENTITY_HEADER`: `GET {IDENTITY_ENDPOINT}?api-version=2019-08-01&resource=...`
//   with header `X-IDENTITY-HEADER: {IDENTITY_HEADER}`
//
// Off Azure the IMDS address is unroutable; a short connect timeout turns
// that into an authentication error instead of a long hang.

use std::time::Duration;

use async_trait::async_trait;
use dns01_core::traits::{AccessToken, TokenSource};
use dns01_core::{Error, Result};

use super::{env_var, read_token_response, resource_from_scope};

/// Default IMDS token endpoint
pub const IMDS_TOKEN_URL: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Where managed identity tokens come from
#[derive(Clone, PartialEq, Eq)]
pub enum MsiEndpoint {
    /// Instance Metadata Service
    Imds { url: String },
    /// App Service identity endpoint
    AppService { url: String, header: String },
}

impl std::fmt::Debug for MsiEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MsiEndpoint::Imds { url } => f.debug_struct("Imds").field("url", url).finish(),
            MsiEndpoint::AppService { url, .. } => f
                .debug_struct("AppService")
                .field("url", url)
                .field("header", &"<REDACTED>")
                .finish(),
        }
    }
}

impl MsiEndpoint {
    /// Detect the endpoint from the process environment
    pub fn from_env() -> Self {
        match (env_var("IDENTITY_ENDPOINT"), env_var("IDENTITY_HEADER")) {
            (Some(url), Some(header)) => MsiEndpoint::AppService { url, header },
            _ => MsiEndpoint::Imds {
                url: IMDS_TOKEN_URL.to_string(),
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            MsiEndpoint::Imds { .. } => "imds",
            MsiEndpoint::AppService { .. } => "app_service",
        }
    }
}

/// System- or user-assigned managed identity
#[derive(Debug)]
pub struct ManagedIdentityCredential {
    endpoint: MsiEndpoint,
    /// User-assigned identity; `None` selects the system-assigned one
    client_id: Option<String>,
    client: reqwest::Client,
}

impl ManagedIdentityCredential {
    /// Create a credential for an explicit endpoint
    pub fn new(endpoint: MsiEndpoint, client_id: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint,
            client_id: client_id.filter(|id| !id.trim().is_empty()),
            client,
        })
    }

    /// Create a credential for the endpoint announced by the environment
    pub fn from_env(client_id: Option<String>) -> Result<Self> {
        Self::new(MsiEndpoint::from_env(), client_id)
    }

    /// Endpoint in use
    pub fn endpoint(&self) -> &MsiEndpoint {
        &self.endpoint
    }

    fn request(&self, resource: &str) -> reqwest::RequestBuilder {
        let mut query: Vec<(&str, &str)> = Vec::with_capacity(3);
        let request = match &self.endpoint {
            MsiEndpoint::Imds { url } => {
                query.push(("api-version", IMDS_API_VERSION));
                self.client.get(url).header("Metadata", "true")
            }
            MsiEndpoint::AppService { url, header } => {
                query.push(("api-version", APP_SERVICE_API_VERSION));
                self.client
                    .get(url)
                    .header("X-IDENTITY-HEADER", header.as_str())
            }
        };
        query.push(("resource", resource));
        if let Some(client_id) = &self.client_id {
            query.push(("client_id", client_id.as_str()));
        }
        request.query(&query)
    }
}

#[async_trait]
impl TokenSource for ManagedIdentityCredential {
    async fn fetch_token(&self, scope: &str) -> Result<AccessToken> {
        let resource = resource_from_scope(scope);
        tracing::debug!(
            endpoint = self.endpoint.kind(),
            user_assigned = self.client_id.is_some(),
            "Requesting managed identity token"
        );

        let response = self.request(resource).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                Error::auth(format!(
                    "managed_identity: {} endpoint unreachable: {}",
                    self.endpoint.kind(),
                    e
                ))
            } else {
                Error::transient(format!("managed_identity: token request failed: {}", e))
            }
        })?;

        read_token_response(response, self.source_name()).await
    }

    fn source_name(&self) -> &'static str {
        "managed_identity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SCOPE: &str = "https://management.azure.com/.default";

    fn token_body() -> serde_json::Value {
        serde_json::json!({
            "access_token": "mi-token",
            "expires_on": "4102444800",
            "resource": "https://management.azure.com",
            "token_type": "Bearer"
        })
    }

    #[tokio::test]
    async fn imds_request_carries_metadata_header_and_resource() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .and(header("Metadata", "true"))
            .and(query_param("api-version", IMDS_API_VERSION))
            .and(query_param("resource", "https://management.azure.com"))
            .and(query_param("client_id", "user-assigned-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = MsiEndpoint::Imds {
            url: format!("{}/metadata/identity/oauth2/token", server.uri()),
        };
        let credential =
            ManagedIdentityCredential::new(endpoint, Some("user-assigned-id".to_string())).unwrap();
        let token = credential.fetch_token(SCOPE).await.unwrap();

        assert_eq!(token.token, "mi-token");
        assert_eq!(token.expires_at.timestamp(), 4_102_444_800);
    }

    #[tokio::test]
    async fn app_service_request_carries_identity_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/msi/token"))
            .and(header("X-IDENTITY-HEADER", "secret-header"))
            .and(query_param("api-version", APP_SERVICE_API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body()))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = MsiEndpoint::AppService {
            url: format!("{}/msi/token", server.uri()),
            header: "secret-header".to_string(),
        };
        let credential = ManagedIdentityCredential::new(endpoint, None).unwrap();
        assert_eq!(credential.fetch_token(SCOPE).await.unwrap().token, "mi-token");
    }

    #[tokio::test]
    async fn missing_identity_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_request",
                "error_description": "Identity not found"
            })))
            .mount(&server)
            .await;

        let endpoint = MsiEndpoint::Imds { url: server.uri() };
        let credential = ManagedIdentityCredential::new(endpoint, None).unwrap();
        assert!(matches!(
            credential.fetch_token(SCOPE).await,
            Err(Error::Auth(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_auth_error() {
        // Bind then drop a listener so the port refuses connections
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/token", listener.local_addr().unwrap());
        drop(listener);

        let credential = ManagedIdentityCredential::new(MsiEndpoint::Imds { url }, None).unwrap();
        assert!(matches!(
            credential.fetch_token(SCOPE).await,
            Err(Error::Auth(_))
        ));
    }

    #[test]
    fn identity_header_not_exposed_in_debug() {
        let endpoint = MsiEndpoint::AppService {
            url: "http://localhost/msi".to_string(),
            header: "secret-header".to_string(),
        };
        let text = format!("{endpoint:?}");
        assert!(!text.contains("secret-header"));
    }
}
