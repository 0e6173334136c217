//! Configuration types for DNS-01 challenge fulfillment
//!
//! The configuration file is a flat `key = value` file that the host tool
//! hands over. It contains secrets, so nothing in this module logs values;
//! only key names appear in diagnostics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Prefix the host tool puts in front of plugin keys
const HOST_KEY_PREFIX: &str = "dns_azure_";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dns01Config {
    /// Credential mode used to reach the management API
    #[serde(default)]
    pub credential: CredentialSpec,

    /// Azure cloud the zones live in
    #[serde(default)]
    pub environment: AzureEnvironment,

    /// Zone mappings, in configuration order
    pub zones: Vec<ZoneConfig>,

    /// TTL written on challenge record sets (seconds)
    #[serde(default = "default_ttl")]
    pub ttl: u32,

    /// Retry policy for management API calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Propagation waiting policy
    #[serde(default)]
    pub propagation: PropagationConfig,

    /// Maximum number of record names processed in parallel
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Capacity of the orchestrator event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Dns01Config {
    /// Create a configuration with defaults and the given zones
    pub fn new(credential: CredentialSpec, zones: Vec<ZoneConfig>) -> Self {
        Self {
            credential,
            environment: AzureEnvironment::default(),
            zones,
            ttl: default_ttl(),
            retry: RetryConfig::default(),
            propagation: PropagationConfig::default(),
            max_concurrency: default_max_concurrency(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Validate the configuration
    ///
    /// Duplicate zone suffixes are accepted here and rejected by the zone
    /// resolver when a lookup actually hits them.
    pub fn validate(&self) -> Result<()> {
        if self.zones.is_empty() {
            return Err(Error::config(
                "At least one zone mapping is required, e.g. zone1 = example.com:/subscriptions/<id>/resourceGroups/<rg>",
            ));
        }
        self.credential.validate()?;
        self.retry.validate()?;
        self.propagation.validate()?;

        if self.ttl == 0 {
            return Err(Error::config("ttl must be > 0"));
        }
        if self.max_concurrency == 0 {
            return Err(Error::config("max_concurrency must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("event channel capacity must be > 0"));
        }
        Ok(())
    }

    /// Load the configuration file at `path`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_ini_str(&text)
    }

    /// Parse a `key = value` configuration text
    ///
    /// `AZURE_ENVIRONMENT` from the process environment is used when the file
    /// does not set `environment`.
    pub fn from_ini_str(text: &str) -> Result<Self> {
        let values = parse_key_values(text)?;
        let env_fallback = std::env::var("AZURE_ENVIRONMENT").ok();
        Self::from_key_values(&values, env_fallback.as_deref())
    }

    /// Build a configuration from already-split key/value pairs
    pub fn from_key_values(
        values: &BTreeMap<String, String>,
        environment_fallback: Option<&str>,
    ) -> Result<Self> {
        let environment = match values.get("environment").map(String::as_str).or(environment_fallback) {
            Some(name) => name.parse()?,
            None => AzureEnvironment::default(),
        };

        let mut zones = Vec::new();
        for (key, value) in values {
            if is_zone_key(key) {
                zones.push(ZoneConfig::from_mapping(value).map_err(|e| {
                    Error::config(format!("Invalid zone mapping for key {}: {}", key, e))
                })?);
            }
        }

        let credential = CredentialSpec::from_key_values(values)?;

        let mut config = Self::new(credential, zones);
        config.environment = environment;

        if let Some(ttl) = parse_number(values, "ttl")? {
            config.ttl = ttl;
        }
        if let Some(attempts) = parse_number(values, "max_attempts")? {
            config.retry.max_attempts = attempts;
        }
        if let Some(concurrency) = parse_number(values, "max_concurrency")? {
            config.max_concurrency = concurrency;
        }
        if let Some(secs) = parse_number(values, "propagation_timeout")? {
            config.propagation.timeout_secs = secs;
        }
        if let Some(secs) = parse_number(values, "propagation_interval")? {
            config.propagation.poll_interval_secs = secs;
        }
        if let Some(secs) = parse_number(values, "propagation_initial_delay")? {
            config.propagation.initial_delay_secs = secs;
        }
        if let Some(list) = values.get("nameservers") {
            config.propagation.nameservers = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<IpAddr>()
                        .map_err(|_| Error::config(format!("Invalid nameserver address: {}", s)))
                })
                .collect::<Result<Vec<_>>>()?;
        }

        for key in values.keys() {
            if !is_zone_key(key) && !KNOWN_KEYS.contains(&key.as_str()) {
                tracing::debug!(key = %key, "Ignoring unknown configuration key");
            }
        }

        config.validate()?;
        Ok(config)
    }
}

const KNOWN_KEYS: &[&str] = &[
    "sp_client_id",
    "sp_client_secret",
    "sp_certificate_path",
    "tenant_id",
    "msi_client_id",
    "msi_system_assigned",
    "use_cli_credentials",
    "use_workload_identity_credentials",
    "environment",
    "ttl",
    "max_attempts",
    "max_concurrency",
    "propagation_timeout",
    "propagation_interval",
    "propagation_initial_delay",
    "nameservers",
];

fn is_zone_key(key: &str) -> bool {
    key.strip_prefix("zone")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

fn parse_number<T: FromStr>(values: &BTreeMap<String, String>, key: &str) -> Result<Option<T>> {
    match values.get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("{} must be a non-negative integer", key))),
        None => Ok(None),
    }
}

fn parse_flag(values: &BTreeMap<String, String>, key: &str) -> bool {
    values
        .get(key)
        .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1" | "on"))
}

/// Split `key = value` lines into a map
///
/// Blank lines and lines starting with `#` or `;` are skipped. The host
/// prefix `dns_azure_` is stripped from keys and keys are lowercased. One
/// matching pair of surrounding `"` or `'` is stripped from values.
pub fn parse_key_values(text: &str) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            Error::config(format!("Line {} is not a key = value pair", index + 1))
        })?;
        let key = key.trim().to_ascii_lowercase();
        let key = key.strip_prefix(HOST_KEY_PREFIX).unwrap_or(&key).to_string();
        if key.is_empty() {
            return Err(Error::config(format!("Line {} has an empty key", index + 1)));
        }
        if values.insert(key.clone(), unquote(value.trim()).to_string()).is_some() {
            return Err(Error::config(format!("Key {} is set more than once", key)));
        }
    }
    Ok(values)
}

/// Strip one matching pair of surrounding quotes
fn unquote(value: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|q| {
            value
                .strip_prefix(*q)
                .and_then(|rest| rest.strip_suffix(*q))
        })
        .unwrap_or(value)
}

/// Azure cloud environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AzureEnvironment {
    /// Azure public cloud
    #[default]
    Public,
    /// Azure US Government
    UsGovernment,
    /// Azure China (21Vianet)
    China,
    /// Azure Germany
    Germany,
}

impl AzureEnvironment {
    /// Resource Manager endpoint, without trailing slash
    pub fn resource_manager_endpoint(&self) -> &'static str {
        match self {
            AzureEnvironment::Public => "https://management.azure.com",
            AzureEnvironment::UsGovernment => "https://management.usgovcloudapi.net",
            AzureEnvironment::China => "https://management.chinacloudapi.cn",
            AzureEnvironment::Germany => "https://management.microsoftazure.de",
        }
    }

    /// Entra ID authority host, without trailing slash
    pub fn authority_host(&self) -> &'static str {
        match self {
            AzureEnvironment::Public => "https://login.microsoftonline.com",
            AzureEnvironment::UsGovernment => "https://login.microsoftonline.us",
            AzureEnvironment::China => "https://login.chinacloudapi.cn",
            AzureEnvironment::Germany => "https://login.microsoftonline.de",
        }
    }

    /// OAuth scope for the Resource Manager audience
    pub fn management_scope(&self) -> String {
        format!("{}/.default", self.resource_manager_endpoint())
    }
}

impl FromStr for AzureEnvironment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" | "azurepubliccloud" | "azurecloud" => Ok(AzureEnvironment::Public),
            "us-government" | "usgovernment" | "azureusgovernmentcloud" | "azureusgovernment" => {
                Ok(AzureEnvironment::UsGovernment)
            }
            "china" | "azurechinacloud" => Ok(AzureEnvironment::China),
            "germany" | "azuregermancloud" => Ok(AzureEnvironment::Germany),
            other => Err(Error::config(format!(
                "Unknown Azure environment '{}'. Valid: AzurePublicCloud, AzureUSGovernmentCloud, AzureChinaCloud, AzureGermanCloud",
                other
            ))),
        }
    }
}

impl fmt::Display for AzureEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AzureEnvironment::Public => "AzurePublicCloud",
            AzureEnvironment::UsGovernment => "AzureUSGovernmentCloud",
            AzureEnvironment::China => "AzureChinaCloud",
            AzureEnvironment::Germany => "AzureGermanCloud",
        };
        f.write_str(name)
    }
}

/// Parsed Azure resource id of a resource group, DNS zone or TXT record set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureResourceId {
    /// Subscription id
    pub subscription_id: String,
    /// Resource group name
    pub resource_group: String,
    /// Explicit DNS zone name, if the id addresses a zone
    pub dns_zone: Option<String>,
    /// Explicit TXT record name, if the id addresses a record set
    pub txt_record: Option<String>,
}

impl AzureResourceId {
    /// Parse `/subscriptions/<id>/resourceGroups/<rg>[/providers/Microsoft.Network/dnsZones/<zone>[/TXT/<name>]]`
    ///
    /// Segment keys are matched case-insensitively.
    pub fn parse(resource_id: &str) -> Result<Self> {
        let trimmed = resource_id.trim().trim_start_matches('/').trim_end_matches('/');
        if !trimmed.contains('/') {
            return Err(Error::config(format!("Invalid resource ID: {}", resource_id)));
        }
        let parts: Vec<&str> = trimmed.split('/').collect();
        if parts.len() % 2 != 0 || parts.iter().any(|p| p.is_empty()) {
            return Err(Error::config(format!("Invalid resource ID: {}", resource_id)));
        }

        let mut segments: BTreeMap<String, String> = BTreeMap::new();
        for pair in parts.chunks(2) {
            segments.insert(pair[0].to_ascii_lowercase(), pair[1].to_string());
        }

        let subscription_id = segments.remove("subscriptions").ok_or_else(|| {
            Error::config(format!("Resource ID has no subscription: {}", resource_id))
        })?;
        let resource_group = segments.remove("resourcegroups").ok_or_else(|| {
            Error::config(format!("Resource ID has no resource group: {}", resource_id))
        })?;

        Ok(Self {
            subscription_id,
            resource_group,
            dns_zone: segments.remove("dnszones"),
            txt_record: segments.remove("txt"),
        })
    }
}

/// One configured zone mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneConfig {
    /// DNS suffix this zone serves challenges for (lowercase, no trailing dot)
    pub suffix: String,
    /// Subscription id of the zone
    pub subscription_id: String,
    /// Resource group of the zone
    pub resource_group: String,
    /// Azure DNS zone name
    pub zone_name: String,
    /// Fixed TXT record name to write into instead of the derived one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_record: Option<String>,
}

impl ZoneConfig {
    /// Create a zone mapping where the zone name equals the suffix
    pub fn new(
        suffix: impl Into<String>,
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
    ) -> Self {
        let suffix = normalize_name(&suffix.into());
        Self {
            zone_name: suffix.clone(),
            suffix,
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            pinned_record: None,
        }
    }

    /// Serve the suffix from a differently named zone
    pub fn with_zone_name(mut self, zone_name: impl Into<String>) -> Self {
        self.zone_name = normalize_name(&zone_name.into());
        self
    }

    /// Always write challenge values to this record name
    pub fn with_pinned_record(mut self, record: impl Into<String>) -> Self {
        self.pinned_record = Some(record.into());
        self
    }

    /// Parse a `<dns-suffix>:<azure-resource-id>` mapping
    pub fn from_mapping(mapping: &str) -> Result<Self> {
        let (suffix, resource_id) = mapping.split_once(':').ok_or_else(|| {
            Error::config("Zone mapping is not in the format DOMAIN:AZURE_RESOURCE_ID")
        })?;
        let suffix = normalize_name(suffix);
        if suffix.is_empty() {
            return Err(Error::config("Zone mapping has an empty domain"));
        }
        let resource = AzureResourceId::parse(resource_id)?;

        let mut zone = Self::new(suffix, resource.subscription_id, resource.resource_group);
        if let Some(zone_name) = resource.dns_zone {
            zone = zone.with_zone_name(zone_name);
        }
        if let Some(record) = resource.txt_record {
            zone = zone.with_pinned_record(record);
        }
        Ok(zone)
    }

    /// Full resource id of the zone, used as a lock and cache key
    pub fn zone_id(&self) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/dnsZones/{}",
            self.subscription_id, self.resource_group, self.zone_name
        )
    }

    /// Record name of `validation_name` relative to this zone
    ///
    /// `@` denotes the zone apex. A pinned record overrides the derivation.
    pub fn relative_record_name(&self, validation_name: &str) -> String {
        if let Some(pinned) = &self.pinned_record {
            return pinned.clone();
        }
        let fqdn = normalize_name(validation_name);
        if fqdn == self.zone_name {
            return "@".to_string();
        }
        match fqdn.strip_suffix(&self.zone_name) {
            Some(head) if head.ends_with('.') => head.trim_end_matches('.').to_string(),
            _ => fqdn,
        }
    }

    /// Whether cleanup may delete the record set once it is empty
    pub fn can_delete(&self) -> bool {
        self.pinned_record.is_none()
    }
}

/// Lowercase a DNS name and drop the trailing root dot
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Credential mode for the management API
///
/// Exactly one mode is active per run.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CredentialSpec {
    /// Entra ID application with a client secret
    ServicePrincipal {
        /// Application (client) id
        client_id: String,
        /// Client secret; never logged
        client_secret: String,
        /// Directory (tenant) id
        tenant_id: String,
    },

    /// Entra ID application with a certificate
    ServicePrincipalCertificate {
        /// Application (client) id
        client_id: String,
        /// PEM file holding the certificate and its private key
        certificate_path: PathBuf,
        /// Directory (tenant) id
        tenant_id: String,
    },

    /// System- or user-assigned managed identity
    ManagedIdentity {
        /// Client id of a user-assigned identity; `None` selects system-assigned
        client_id: Option<String>,
    },

    /// Federated workload identity (Kubernetes service account token)
    WorkloadIdentity {
        /// Tenant override; defaults to `AZURE_TENANT_ID`
        tenant_id: Option<String>,
    },

    /// Token of the locally signed-in Azure CLI
    AzureCli {
        /// Tenant to request the token for
        tenant_id: Option<String>,
    },

    /// Environment credentials, then managed identity
    #[default]
    Default,
}

impl fmt::Debug for CredentialSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSpec::ServicePrincipal {
                client_id,
                tenant_id,
                ..
            } => f
                .debug_struct("ServicePrincipal")
                .field("client_id", client_id)
                .field("client_secret", &"<REDACTED>")
                .field("tenant_id", tenant_id)
                .finish(),
            CredentialSpec::ServicePrincipalCertificate {
                client_id,
                certificate_path,
                tenant_id,
            } => f
                .debug_struct("ServicePrincipalCertificate")
                .field("client_id", client_id)
                .field("certificate_path", certificate_path)
                .field("tenant_id", tenant_id)
                .finish(),
            CredentialSpec::ManagedIdentity { client_id } => f
                .debug_struct("ManagedIdentity")
                .field("client_id", client_id)
                .finish(),
            CredentialSpec::WorkloadIdentity { tenant_id } => f
                .debug_struct("WorkloadIdentity")
                .field("tenant_id", tenant_id)
                .finish(),
            CredentialSpec::AzureCli { tenant_id } => f
                .debug_struct("AzureCli")
                .field("tenant_id", tenant_id)
                .finish(),
            CredentialSpec::Default => f.write_str("Default"),
        }
    }
}

impl CredentialSpec {
    /// Short name for logs
    pub fn mode_name(&self) -> &'static str {
        match self {
            CredentialSpec::ServicePrincipal { .. } => "service_principal",
            CredentialSpec::ServicePrincipalCertificate { .. } => "service_principal_certificate",
            CredentialSpec::ManagedIdentity { .. } => "managed_identity",
            CredentialSpec::WorkloadIdentity { .. } => "workload_identity",
            CredentialSpec::AzureCli { .. } => "azure_cli",
            CredentialSpec::Default => "default",
        }
    }

    /// Validate required fields of the selected mode
    pub fn validate(&self) -> Result<()> {
        let required: Vec<(&str, &str)> = match self {
            CredentialSpec::ServicePrincipal {
                client_id,
                client_secret,
                tenant_id,
            } => vec![
                ("sp_client_id", client_id.as_str()),
                ("sp_client_secret", client_secret.as_str()),
                ("tenant_id", tenant_id.as_str()),
            ],
            CredentialSpec::ServicePrincipalCertificate {
                client_id,
                certificate_path,
                tenant_id,
            } => {
                if certificate_path.as_os_str().is_empty() {
                    return Err(Error::config(
                        "Service principal credentials require sp_certificate_path",
                    ));
                }
                vec![("sp_client_id", client_id.as_str()), ("tenant_id", tenant_id.as_str())]
            }
            _ => Vec::new(),
        };

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::config(format!(
                    "Service principal credentials require {}",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Select the credential mode from configuration keys
    ///
    /// Precedence: Azure CLI, workload identity, service principal with a
    /// secret, service principal with a certificate, user-assigned identity,
    /// system-assigned identity, default chain.
    pub fn from_key_values(values: &BTreeMap<String, String>) -> Result<Self> {
        let non_empty = |key: &str| {
            values
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let tenant_id = non_empty("tenant_id");

        if parse_flag(values, "use_cli_credentials") {
            return Ok(CredentialSpec::AzureCli { tenant_id });
        }
        if parse_flag(values, "use_workload_identity_credentials") {
            return Ok(CredentialSpec::WorkloadIdentity { tenant_id });
        }

        let client_id = non_empty("sp_client_id");
        let client_secret = non_empty("sp_client_secret");
        let certificate_path = non_empty("sp_certificate_path");
        match (client_id, client_secret, certificate_path, tenant_id.clone()) {
            (Some(client_id), Some(client_secret), _, Some(tenant_id)) => {
                return Ok(CredentialSpec::ServicePrincipal {
                    client_id,
                    client_secret,
                    tenant_id,
                });
            }
            (Some(client_id), None, Some(certificate_path), Some(tenant_id)) => {
                return Ok(CredentialSpec::ServicePrincipalCertificate {
                    client_id,
                    certificate_path: certificate_path.into(),
                    tenant_id,
                });
            }
            (None, None, None, _) => {}
            _ => {
                return Err(Error::config(
                    "Service principal credentials are incomplete: sp_client_id, tenant_id and one of sp_client_secret or sp_certificate_path are required",
                ));
            }
        }

        if let Some(client_id) = non_empty("msi_client_id") {
            return Ok(CredentialSpec::ManagedIdentity {
                client_id: Some(client_id),
            });
        }
        if parse_flag(values, "msi_system_assigned") {
            return Ok(CredentialSpec::ManagedIdentity { client_id: None });
        }

        Ok(CredentialSpec::Default)
    }
}

/// Retry policy for management API calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt (milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff (milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl RetryConfig {
    /// Validate the retry policy
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("max_attempts must be > 0"));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::config("retry base delay exceeds max delay"));
        }
        Ok(())
    }

    /// Backoff window after the failed attempt number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Propagation waiting policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationConfig {
    /// Give up after this many seconds
    #[serde(default = "default_propagation_timeout_secs")]
    pub timeout_secs: u64,

    /// Seconds between lookups
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seconds to wait before the first lookup
    #[serde(default)]
    pub initial_delay_secs: u64,

    /// Recursive resolvers to query; empty means system configuration
    #[serde(default = "default_nameservers")]
    pub nameservers: Vec<IpAddr>,
}

impl PropagationConfig {
    /// Validate the propagation policy
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(Error::config("propagation_interval must be > 0"));
        }
        Ok(())
    }

    /// Overall deadline
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay between lookups
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Delay before the first lookup
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_propagation_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            initial_delay_secs: 0,
            nameservers: default_nameservers(),
        }
    }
}

fn default_ttl() -> u32 {
    120
}

fn default_max_concurrency() -> usize {
    4
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    6
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_propagation_timeout_secs() -> u64 {
    120
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_nameservers() -> Vec<IpAddr> {
    vec![
        IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
        IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
        IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9)),
    ]
}
