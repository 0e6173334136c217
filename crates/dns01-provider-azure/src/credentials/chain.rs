// # Default Credential Chain
//
// Tries, in order:
//
// 1. Service principal from `AZURE_CLIENT_ID`, `AZURE_TENANT_ID` and either
//    `AZURE_CLIENT_SECRET` or `AZURE_CLIENT_CERTIFICATE_PATH`
// 2. Workload identity from `AZURE_CLIENT_ID`, `AZURE_TENANT_ID` and
//    `AZURE_FEDERATED_TOKEN_FILE`
// 3. Managed identity (user-assigned when `AZURE_CLIENT_ID` is set)
//
// The first source that returns a token is remembered and used alone from
// then on. Transient failures are returned as they are so the caller's retry
// applies to the source that hit them.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dns01_core::traits::{AccessToken, TokenSource};
use dns01_core::{AzureEnvironment, Error, Result};

use super::{
    CertificateCredential, ManagedIdentityCredential, ServicePrincipalCredential,
    WorkloadIdentityCredential, env_var,
};

const NO_WINNER: usize = usize::MAX;

/// Environment credentials, then managed identity
pub struct DefaultChainCredential {
    sources: Vec<Arc<dyn TokenSource>>,
    winner: AtomicUsize,
}

impl std::fmt::Debug for DefaultChainCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.source_name()).collect();
        f.debug_struct("DefaultChainCredential")
            .field("sources", &names)
            .finish()
    }
}

impl DefaultChainCredential {
    /// Build the chain from the process environment
    pub fn from_env(environment: AzureEnvironment) -> Result<Self> {
        let mut sources: Vec<Arc<dyn TokenSource>> = Vec::new();

        if let (Some(tenant), Some(client_id)) =
            (env_var("AZURE_TENANT_ID"), env_var("AZURE_CLIENT_ID"))
        {
            let authority = env_var("AZURE_AUTHORITY_HOST")
                .unwrap_or_else(|| environment.authority_host().to_string());
            if let Some(secret) = env_var("AZURE_CLIENT_SECRET") {
                sources.push(Arc::new(ServicePrincipalCredential::new(
                    tenant, client_id, secret, authority,
                )?));
            } else if let Some(path) = env_var("AZURE_CLIENT_CERTIFICATE_PATH") {
                sources.push(Arc::new(CertificateCredential::new(
                    tenant, client_id, path, authority,
                )?));
            }
        }

        if let Some(workload) = WorkloadIdentityCredential::from_env(None, environment)? {
            sources.push(Arc::new(workload));
        }

        sources.push(Arc::new(ManagedIdentityCredential::from_env(env_var(
            "AZURE_CLIENT_ID",
        ))?));

        Ok(Self::with_sources(sources))
    }

    /// Build a chain over explicit sources, tried in order
    pub fn with_sources(sources: Vec<Arc<dyn TokenSource>>) -> Self {
        Self {
            sources,
            winner: AtomicUsize::new(NO_WINNER),
        }
    }

    /// Names of the sources in the chain
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.source_name()).collect()
    }
}

#[async_trait]
impl TokenSource for DefaultChainCredential {
    async fn fetch_token(&self, scope: &str) -> Result<AccessToken> {
        let winner = self.winner.load(Ordering::Acquire);
        if let Some(source) = self.sources.get(winner) {
            return source.fetch_token(scope).await;
        }

        let mut attempts = Vec::with_capacity(self.sources.len());
        for (index, source) in self.sources.iter().enumerate() {
            match source.fetch_token(scope).await {
                Ok(token) => {
                    tracing::info!(source = source.source_name(), "Default chain selected credential");
                    self.winner.store(index, Ordering::Release);
                    return Ok(token);
                }
                Err(e) if e.is_retryable() => return Err(e),
                Err(e) => {
                    tracing::debug!(source = source.source_name(), error = %e, "Credential unavailable");
                    attempts.push(format!("{}: {}", source.source_name(), e));
                }
            }
        }

        Err(Error::auth(format!(
            "No credential in the default chain succeeded ({})",
            attempts.join("; ")
        )))
    }

    fn source_name(&self) -> &'static str {
        "default"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct StubSource {
        name: &'static str,
        result: fn() -> Result<AccessToken>,
        calls: AtomicU32,
    }

    impl StubSource {
        fn new(name: &'static str, result: fn() -> Result<AccessToken>) -> Arc<Self> {
            Arc::new(Self {
                name,
                result,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenSource for StubSource {
        async fn fetch_token(&self, _scope: &str) -> Result<AccessToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }

        fn source_name(&self) -> &'static str {
            self.name
        }
    }

    fn ok() -> Result<AccessToken> {
        Ok(AccessToken::new(
            "token",
            chrono::Utc::now() + chrono::Duration::hours(1),
        ))
    }

    fn unavailable() -> Result<AccessToken> {
        Err(Error::auth("not configured"))
    }

    fn throttled() -> Result<AccessToken> {
        Err(Error::api_status(503, "busy"))
    }

    #[tokio::test]
    async fn falls_through_to_first_working_source_and_remembers_it() {
        let first = StubSource::new("environment", unavailable);
        let second = StubSource::new("managed_identity", ok);
        let sources: Vec<Arc<dyn TokenSource>> = vec![first.clone(), second.clone()];
        let chain = DefaultChainCredential::with_sources(sources);

        chain.fetch_token("scope").await.unwrap();
        chain.fetch_token("scope").await.unwrap();

        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_chain_lists_every_attempt() {
        let sources: Vec<Arc<dyn TokenSource>> = vec![
            StubSource::new("service_principal", unavailable),
            StubSource::new("managed_identity", unavailable),
        ];
        let chain = DefaultChainCredential::with_sources(sources);

        match chain.fetch_token("scope").await {
            Err(Error::Auth(message)) => {
                assert!(message.contains("service_principal"));
                assert!(message.contains("managed_identity"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn transient_failure_stops_the_chain() {
        let later = StubSource::new("managed_identity", ok);
        let sources: Vec<Arc<dyn TokenSource>> =
            vec![StubSource::new("service_principal", throttled), later.clone()];
        let chain = DefaultChainCredential::with_sources(sources);

        assert!(chain.fetch_token("scope").await.unwrap_err().is_retryable());
        assert_eq!(later.calls(), 0);
    }
}
