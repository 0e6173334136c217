// # Azure DNS Record Set Client
//
// ## API Reference
//
// - Record sets, api-version 2018-05-01:
//   `{arm}/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.Network/dnsZones/{zone}/TXT/{name}`
// - GET returns the set or 404
// - PUT creates or replaces the set; `If-None-Match: *` only creates,
//   `If-Match: {etag}` only replaces that version
// - DELETE removes the set; 200 when deleted, 204 when there was nothing
// - A failed precondition returns 412
//
// ## Security Requirements
//
// - Bearer tokens NEVER appear in logs or `Debug` output
// - Error bodies are reduced to Azure's `code` and `message`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dns01_core::traits::{RecordSetApi, TxtRecordSet, WriteCondition};
use dns01_core::{ApiErrorKind, AzureEnvironment, Error, Result, TokenCache, ZoneConfig};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Record set API version
pub const API_VERSION: &str = "2018-05-01";

/// Longest character-string inside one TXT record
pub const TXT_CHUNK_LEN: usize = 255;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct RecordSetBody<'a> {
    properties: RecordSetPropertiesBody<'a>,
}

#[derive(Serialize)]
struct RecordSetPropertiesBody<'a> {
    #[serde(rename = "TTL")]
    ttl: u32,
    #[serde(rename = "TXTRecords")]
    txt_records: Vec<TxtRecordBody<'a>>,
}

#[derive(Serialize)]
struct TxtRecordBody<'a> {
    value: Vec<&'a str>,
}

#[derive(Deserialize)]
struct RecordSetResponse {
    #[serde(default)]
    etag: Option<String>,
    #[serde(default)]
    properties: Option<RecordSetProperties>,
}

#[derive(Deserialize)]
struct RecordSetProperties {
    #[serde(rename = "TTL", default)]
    ttl: Option<u32>,
    #[serde(rename = "TXTRecords", default)]
    txt_records: Vec<TxtRecordValue>,
}

#[derive(Deserialize)]
struct TxtRecordValue {
    #[serde(default)]
    value: Vec<String>,
}

#[derive(Deserialize)]
struct CloudErrorBody {
    #[serde(default)]
    error: Option<CloudError>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct CloudError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Split a TXT value into character-strings of at most [`TXT_CHUNK_LEN`]
fn chunk_value(value: &str) -> Vec<&str> {
    if value.len() <= TXT_CHUNK_LEN {
        return vec![value];
    }
    let mut chunks = Vec::with_capacity(value.len() / TXT_CHUNK_LEN + 1);
    let mut rest = value;
    while !rest.is_empty() {
        let mut end = rest.len().min(TXT_CHUNK_LEN);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (head, tail) = rest.split_at(end);
        chunks.push(head);
        rest = tail;
    }
    chunks
}

impl RecordSetResponse {
    fn into_record_set(self, etag_header: Option<String>) -> TxtRecordSet {
        let properties = self.properties;
        TxtRecordSet {
            values: properties
                .as_ref()
                .map(|p| p.txt_records.iter().map(|r| r.value.concat()).collect())
                .unwrap_or_default(),
            ttl: properties.and_then(|p| p.ttl),
            etag: self.etag.or(etag_header),
        }
    }
}

/// Azure DNS management client
///
/// # Trust Level: Untrusted
///
/// One HTTP request per call. Retries, merging and locking belong to
/// `RecordManager`; the only state kept here is the shared token cache.
pub struct AzureDnsClient {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<TokenCache>,
}

impl std::fmt::Debug for AzureDnsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureDnsClient")
            .field("base_url", &self.base_url)
            .field("credential", &self.tokens.source_name())
            .field("token", &"<REDACTED>")
            .finish()
    }
}

impl AzureDnsClient {
    /// Create a client for the Resource Manager endpoint of `environment`
    pub fn new(tokens: Arc<TokenCache>, environment: AzureEnvironment) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: environment.resource_manager_endpoint().to_string(),
            tokens,
        })
    }

    /// Send requests to `base_url` instead of the environment's endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Token cache used for every request
    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    fn record_set_url(&self, zone: &ZoneConfig, record_name: &str) -> String {
        format!(
            "{}{}/TXT/{}?api-version={}",
            self.base_url,
            zone.zone_id(),
            record_name,
            API_VERSION
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let token = self.tokens.token().await?;
        request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::transient(format!("Azure DNS request failed: {}", e)))
    }

    /// Map a non-success response to an API error
    async fn error_for(&self, response: reqwest::Response, context: &str) -> Error {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }

        let text = response.text().await.unwrap_or_default();
        let detail = match serde_json::from_str::<CloudErrorBody>(&text) {
            Ok(body) => {
                let (code, message) = match body.error {
                    Some(error) => (error.code, error.message),
                    None => (body.code, body.message),
                };
                format!(
                    "{}: {}",
                    code.unwrap_or_else(|| "Unknown".to_string()),
                    message.unwrap_or_default()
                )
            }
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        };

        Error::api_status(
            status.as_u16(),
            format!("{} failed with HTTP {}: {}", context, status.as_u16(), detail),
        )
    }

    async fn read_record_set(response: reqwest::Response) -> Result<TxtRecordSet> {
        let etag_header = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body: RecordSetResponse = response.json().await.map_err(|e| {
            Error::api(
                ApiErrorKind::Fatal,
                None,
                format!("Invalid record set response: {}", e),
            )
        })?;
        Ok(body.into_record_set(etag_header))
    }
}

#[async_trait]
impl RecordSetApi for AzureDnsClient {
    async fn get_txt(&self, zone: &ZoneConfig, record_name: &str) -> Result<Option<TxtRecordSet>> {
        tracing::debug!(zone = %zone.zone_name, record = record_name, "Reading TXT record set");

        let url = self.record_set_url(zone, record_name);
        let response = self.send(self.client.get(&url)).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Self::read_record_set(response).await.map(Some),
            _ => Err(self.error_for(response, "Record set read").await),
        }
    }

    async fn put_txt(
        &self,
        zone: &ZoneConfig,
        record_name: &str,
        values: &[String],
        ttl: u32,
        condition: &WriteCondition,
    ) -> Result<TxtRecordSet> {
        tracing::debug!(
            zone = %zone.zone_name,
            record = record_name,
            values = values.len(),
            "Writing TXT record set"
        );

        let body = RecordSetBody {
            properties: RecordSetPropertiesBody {
                ttl,
                txt_records: values
                    .iter()
                    .map(|v| TxtRecordBody {
                        value: chunk_value(v),
                    })
                    .collect(),
            },
        };

        let url = self.record_set_url(zone, record_name);
        let mut request = self.client.put(&url).json(&body);
        request = match condition {
            WriteCondition::IfNoneMatch => request.header(reqwest::header::IF_NONE_MATCH, "*"),
            WriteCondition::IfMatch(etag) => request.header(reqwest::header::IF_MATCH, etag),
            WriteCondition::Unconditional => request,
        };

        let response = self.send(request).await?;
        if response.status().is_success() {
            Self::read_record_set(response).await
        } else {
            Err(self.error_for(response, "Record set write").await)
        }
    }

    async fn delete_txt(
        &self,
        zone: &ZoneConfig,
        record_name: &str,
        condition: &WriteCondition,
    ) -> Result<()> {
        tracing::debug!(zone = %zone.zone_name, record = record_name, "Deleting TXT record set");

        let url = self.record_set_url(zone, record_name);
        let mut request = self.client.delete(&url);
        if let WriteCondition::IfMatch(etag) = condition {
            request = request.header(reqwest::header::IF_MATCH, etag);
        }

        let response = self.send(request).await?;
        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Err(Error::api(
                ApiErrorKind::NotFound,
                Some(response.status().as_u16()),
                format!("TXT record set {} not found in {}", record_name, zone.zone_name),
            )),
            status if status.is_success() => Ok(()),
            _ => Err(self.error_for(response, "Record set delete").await),
        }
    }

    fn api_name(&self) -> &'static str {
        "azure_dns"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dns01_core::traits::{AccessToken, TokenSource};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RECORD_PATH: &str = "/subscriptions/sub-1/resourceGroups/rg-dns/providers/Microsoft.Network/dnsZones/example.com/TXT/_acme-challenge.www";

    struct StaticToken {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl TokenSource for StaticToken {
        async fn fetch_token(&self, _scope: &str) -> Result<AccessToken> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(AccessToken::new(
                format!("token-{n}"),
                Utc::now() + chrono::Duration::hours(1),
            ))
        }

        fn source_name(&self) -> &'static str {
            "static"
        }
    }

    fn zone() -> ZoneConfig {
        ZoneConfig::new("example.com", "sub-1", "rg-dns")
    }

    fn client(server: &MockServer) -> AzureDnsClient {
        let source = Arc::new(StaticToken {
            fetches: AtomicUsize::new(0),
        });
        let tokens = Arc::new(TokenCache::new(source, "https://management.azure.com/.default"));
        AzureDnsClient::new(tokens, AzureEnvironment::Public)
            .unwrap()
            .with_base_url(server.uri())
    }

    fn record_set_json(values: &[&[&str]], etag: &str) -> serde_json::Value {
        serde_json::json!({
            "id": RECORD_PATH,
            "name": "_acme-challenge.www",
            "type": "Microsoft.Network/dnszones/TXT",
            "etag": etag,
            "properties": {
                "TTL": 120,
                "fqdn": "_acme-challenge.www.example.com.",
                "TXTRecords": values.iter().map(|v| serde_json::json!({ "value": v })).collect::<Vec<_>>()
            }
        })
    }

    #[tokio::test]
    async fn get_reads_values_and_etag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(RECORD_PATH))
            .and(query_param("api-version", API_VERSION))
            .and(header("Authorization", "Bearer token-0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(record_set_json(&[&["first"], &["sec", "ond"]], "etag-1")),
            )
            .mount(&server)
            .await;

        let set = client(&server)
            .get_txt(&zone(), "_acme-challenge.www")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(set.values, vec!["first".to_string(), "second".to_string()]);
        assert_eq!(set.ttl, Some(120));
        assert_eq!(set.etag.as_deref(), Some("etag-1"));
    }

    #[tokio::test]
    async fn get_missing_set_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "code": "NotFound",
                "message": "The resource record '_acme-challenge.www' does not exist"
            })))
            .mount(&server)
            .await;

        let set = client(&server)
            .get_txt(&zone(), "_acme-challenge.www")
            .await
            .unwrap();
        assert!(set.is_none());
    }

    #[tokio::test]
    async fn create_sends_if_none_match_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path(RECORD_PATH))
            .and(header("If-None-Match", "*"))
            .and(body_json(serde_json::json!({
                "properties": {
                    "TTL": 60,
                    "TXTRecords": [{ "value": ["token-value"] }]
                }
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(record_set_json(&[&["token-value"]], "etag-2")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let set = client(&server)
            .put_txt(
                &zone(),
                "_acme-challenge.www",
                &["token-value".to_string()],
                60,
                &WriteCondition::IfNoneMatch,
            )
            .await
            .unwrap();
        assert_eq!(set.etag.as_deref(), Some("etag-2"));
    }

    #[tokio::test]
    async fn stale_etag_is_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(header("If-Match", "etag-old"))
            .respond_with(ResponseTemplate::new(412).set_body_json(serde_json::json!({
                "error": {
                    "code": "PreconditionFailed",
                    "message": "The condition 'etag-old' in the If-Match header was not satisfied."
                }
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .put_txt(
                &zone(),
                "_acme-challenge.www",
                &["v".to_string()],
                60,
                &WriteCondition::IfMatch("etag-old".to_string()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Conflict));
        assert!(err.to_string().contains("PreconditionFailed"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn throttling_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = client(&server)
            .get_txt(&zone(), "_acme-challenge.www")
            .await
            .unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Transient));
    }

    #[tokio::test]
    async fn rejected_token_is_dropped_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("Authorization", "Bearer token-0"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("Authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server);
        let err = client
            .get_txt(&zone(), "_acme-challenge.www")
            .await
            .unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::Unauthorized));

        // Next call fetches a fresh token
        assert!(client.get_txt(&zone(), "_acme-challenge.www").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_sends_if_match() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path(RECORD_PATH))
            .and(header("If-Match", "etag-3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .delete_txt(
                &zone(),
                "_acme-challenge.www",
                &WriteCondition::IfMatch("etag-3".to_string()),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_of_missing_set_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let err = client(&server)
            .delete_txt(&zone(), "_acme-challenge.www", &WriteCondition::Unconditional)
            .await
            .unwrap_err();
        assert_eq!(err.api_kind(), Some(ApiErrorKind::NotFound));
    }

    #[test]
    fn long_values_are_chunked() {
        let value = "x".repeat(600);
        let chunks = chunk_value(&value);
        assert_eq!(
            chunks.iter().map(|c| c.len()).collect::<Vec<_>>(),
            vec![255, 255, 90]
        );
        assert_eq!(chunks.concat(), value);
        assert_eq!(chunk_value("short"), vec!["short"]);
    }

    #[test]
    fn debug_hides_token() {
        let source = Arc::new(StaticToken {
            fetches: AtomicUsize::new(0),
        });
        let tokens = Arc::new(TokenCache::new(source, "scope"));
        let client = AzureDnsClient::new(tokens, AzureEnvironment::Public).unwrap();
        assert!(format!("{client:?}").contains("<REDACTED>"));
    }
}
