// # Azure DNS Provider
//
// Azure DNS implementation of the `dns01-core` record set API, plus the
// credential sources that authenticate it against Resource Manager.
//
// ## Architectural Constraints
//
// ### Trust Level: Untrusted (Record Set API)
//
// **Allowed Capabilities**:
// - ✅ HTTPS calls to Resource Manager and the Entra ID token endpoints
// - ✅ Parse Azure responses and classify failures
// - ✅ Cache the access token until shortly before expiry
//
// **Forbidden Capabilities**:
// - ❌ Retry or back off (owned by `RecordManager`)
// - ❌ Merge TXT values (owned by `RecordManager`)
// - ❌ Spawn tasks or threads
//
// ## Security Requirements
//
// - Client secrets, private keys and bearer tokens NEVER appear in logs
// - Every type holding one implements `Debug` with `<REDACTED>`
//
// ## Usage
//
// ```rust,ignore
// use dns01_core::{AzureEnvironment, CredentialSpec};
// use dns01_provider_azure::authenticate;
//
// let client = authenticate(&CredentialSpec::Default, AzureEnvironment::Public).await?;
// ```

pub mod client;
pub mod credentials;

pub use client::AzureDnsClient;
pub use credentials::{
    AzureCliCredential, CertificateCredential, DefaultChainCredential, ManagedIdentityCredential, MsiEndpoint,
    ServicePrincipalCredential, WorkloadIdentityCredential, token_source_for,
};

use std::sync::Arc;

use dns01_core::{AzureEnvironment, CredentialSpec, Result, TokenCache};

/// Build an authenticated Azure DNS client
///
/// Acquires the first token before returning so that a bad credential
/// surfaces as an authentication error before any record is touched.
pub async fn authenticate(
    spec: &CredentialSpec,
    environment: AzureEnvironment,
) -> Result<AzureDnsClient> {
    let source = token_source_for(spec, environment)?;
    let tokens = Arc::new(TokenCache::new(source, environment.management_scope()));
    tokens.token().await?;

    tracing::info!(
        mode = spec.mode_name(),
        credential = tokens.source_name(),
        environment = %environment,
        "Authenticated against Azure Resource Manager"
    );
    AzureDnsClient::new(tokens, environment)
}
