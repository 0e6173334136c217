// # TXT Resolver Trait
//
// Public DNS lookups used only to confirm that a challenge value became
// visible. Never used for authoritative decisions.
//
// ## Implementations
//
// - hickory-resolver: `dns01-resolver-hickory` crate

use async_trait::async_trait;

/// Trait for TXT lookups against recursive resolvers
#[async_trait]
pub trait TxtResolver: Send + Sync {
    /// Look up the TXT values published at `fqdn`
    ///
    /// NXDOMAIN, empty answers and resolver failures may all be reported as
    /// errors; the propagation waiter treats every error as "not visible
    /// yet".
    async fn lookup_txt(&self, fqdn: &str) -> Result<Vec<String>, crate::Error>;
}
