// # Hickory TXT Resolver
//
// Public-resolver TXT lookups for propagation checks.
//
// ## Purpose
//
// Confirms that a challenge value written through the management API is
// visible to the recursive resolvers an ACME server is likely to use. The
// answer is advisory only: record management never depends on it.
//
// ## Caching
//
// The resolver cache is disabled. Every poll must reach the network,
// otherwise a negative answer cached on the first lookup would hide the
// record until its SOA minimum expires.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use dns01_core::traits::TxtResolver;
use dns01_core::{Error, Result};
use hickory_resolver::config::{NameServerConfig, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::{Resolver, TokioResolver};

/// Per-query timeout
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// TXT resolver backed by hickory-resolver
#[derive(Debug)]
pub struct HickoryTxtResolver {
    resolver: TokioResolver,
    nameservers: Vec<IpAddr>,
}

impl HickoryTxtResolver {
    /// Create a resolver querying `nameservers` on port 53
    ///
    /// An empty list uses the system resolver configuration.
    pub fn new(nameservers: &[IpAddr]) -> Self {
        let (config, mut opts) = if nameservers.is_empty() {
            match hickory_resolver::system_conf::read_system_conf() {
                Ok(system) => system,
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot read system resolver configuration, using defaults");
                    (ResolverConfig::default(), ResolverOpts::default())
                }
            }
        } else {
            let mut config = ResolverConfig::new();
            for ip in nameservers {
                config.add_name_server(NameServerConfig::new(SocketAddr::new(*ip, 53), Protocol::Udp));
                config.add_name_server(NameServerConfig::new(SocketAddr::new(*ip, 53), Protocol::Tcp));
            }
            (config, ResolverOpts::default())
        };

        opts.timeout = QUERY_TIMEOUT;
        opts.attempts = 2;
        opts.cache_size = 0;

        let resolver = Resolver::builder_with_config(config, TokioConnectionProvider::default())
            .with_options(opts)
            .build();

        tracing::debug!(nameservers = ?nameservers, "TXT resolver ready");
        Self {
            resolver,
            nameservers: nameservers.to_vec(),
        }
    }

    /// Configured nameservers; empty when the system configuration is used
    pub fn nameservers(&self) -> &[IpAddr] {
        &self.nameservers
    }
}

#[async_trait]
impl TxtResolver for HickoryTxtResolver {
    async fn lookup_txt(&self, fqdn: &str) -> Result<Vec<String>> {
        // Fully qualified so no search domain is appended
        let name = format!("{}.", fqdn.trim_end_matches('.'));

        let lookup = self
            .resolver
            .txt_lookup(name.as_str())
            .await
            .map_err(|e| Error::transient(format!("TXT lookup for {} failed: {}", fqdn, e)))?;

        let values: Vec<String> = lookup
            .iter()
            .map(|record| {
                record
                    .txt_data()
                    .iter()
                    .map(|data| String::from_utf8_lossy(data))
                    .collect()
            })
            .collect();

        tracing::trace!(record = fqdn, found = values.len(), "TXT lookup answered");
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn keeps_configured_nameservers() {
        let servers = [IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8))];
        let resolver = HickoryTxtResolver::new(&servers);
        assert_eq!(resolver.nameservers(), &servers);
    }

    #[tokio::test]
    async fn empty_list_uses_system_configuration() {
        let resolver = HickoryTxtResolver::new(&[]);
        assert!(resolver.nameservers().is_empty());
    }
}
