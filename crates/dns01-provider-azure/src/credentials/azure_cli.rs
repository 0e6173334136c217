// # Azure CLI Credential
//
// Runs `az account get-access-token --resource {resource} --output json` and
// reads `accessToken` plus `expires_on` (epoch seconds, newer CLIs) or
// `expiresOn` (local time, older CLIs).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use dns01_core::traits::{AccessToken, TokenSource};
use dns01_core::{Error, Result};
use serde::Deserialize;

use super::{Seconds, resource_from_scope};

const CLI_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    #[serde(default, rename = "expires_on")]
    expires_on: Option<Seconds>,
    #[serde(default, rename = "expiresOn")]
    expires_on_local: Option<String>,
}

/// Token from the signed-in Azure CLI session
#[derive(Debug, Clone)]
pub struct AzureCliCredential {
    tenant_id: Option<String>,
    program: String,
}

impl AzureCliCredential {
    /// Create a credential, optionally pinned to a tenant
    pub fn new(tenant_id: Option<String>) -> Self {
        Self {
            tenant_id: tenant_id.filter(|t| !t.trim().is_empty()),
            program: "az".to_string(),
        }
    }

    /// Use a different executable than `az` on `PATH`
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn parse_output(stdout: &[u8]) -> Result<AccessToken> {
        let parsed: CliToken = serde_json::from_slice(stdout)
            .map_err(|e| Error::auth(format!("azure_cli: unexpected output: {}", e)))?;

        let expires_at = match (&parsed.expires_on, &parsed.expires_on_local) {
            (Some(epoch), _) => epoch
                .value()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            (None, Some(local)) => parse_local_expiry(local),
            (None, None) => None,
        }
        .ok_or_else(|| Error::auth("azure_cli: token carries no usable expiry"))?;

        Ok(AccessToken::new(parsed.access_token, expires_at))
    }
}

/// Parse `2024-01-01 12:00:00.000000` in the local time zone
fn parse_local_expiry(text: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

#[async_trait]
impl TokenSource for AzureCliCredential {
    async fn fetch_token(&self, scope: &str) -> Result<AccessToken> {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(["account", "get-access-token", "--output", "json", "--resource"])
            .arg(resource_from_scope(scope))
            .kill_on_drop(true);
        if let Some(tenant) = &self.tenant_id {
            command.args(["--tenant", tenant.as_str()]);
        }

        tracing::debug!(tenant = ?self.tenant_id, "Requesting token from Azure CLI");
        let output = tokio::time::timeout(CLI_TIMEOUT, command.output())
            .await
            .map_err(|_| Error::auth("azure_cli: timed out waiting for az"))?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::auth("azure_cli: az executable not found on PATH")
                } else {
                    Error::auth(format!("azure_cli: failed to run az: {}", e))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first_line = stderr
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or("no error output");
            return Err(Error::auth(format!(
                "azure_cli: az exited with {}: {}",
                output.status, first_line
            )));
        }

        Self::parse_output(&output.stdout)
    }

    fn source_name(&self) -> &'static str {
        "azure_cli"
    }
}
