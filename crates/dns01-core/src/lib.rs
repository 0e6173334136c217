// # dns01-core
//
// Core library for DNS-01 ACME challenge fulfillment against Azure DNS.
//
// ## Architecture Overview
//
// - **ZoneResolver**: Maps a requested domain to the most specific configured zone
// - **RecordManager**: Adds and removes single TXT values in shared record sets
// - **PropagationWaiter**: Polls public DNS until a value is visible
// - **ChallengeOrchestrator**: Runs perform and cleanup for a batch of challenges
// - **TokenCache**: Shares one refreshing bearer token across all API calls
//
// Integrations plug in through the traits in [`traits`]:
// - **RecordSetApi**: The DNS management API (`dns01-provider-azure`)
// - **TokenSource**: Credential modes (`dns01-provider-azure`)
// - **TxtResolver**: Public DNS lookups (`dns01-resolver-hickory`)
// - **PendingStore**: Perform-to-cleanup state ([`state`])
//
// ## Design Principles
//
// 1. **Library-First**: The hook binary only wires configuration to the orchestrator
// 2. **Retry in one place**: Integrations are single-shot; the Record Manager retries
// 3. **Symmetric cleanup**: Only values this process added are ever removed
// 4. **No secrets in logs**: Secret-bearing types redact themselves in `Debug`

pub mod challenge;
pub mod config;
pub mod credential;
pub mod error;
pub mod orchestrator;
pub mod propagation;
pub mod record;
pub mod state;
pub mod traits;
pub mod zone;

// Re-export core types for convenience
pub use challenge::{ChallengeRequest, ChallengeState, PendingRecord};
pub use config::{
    AzureEnvironment, AzureResourceId, CredentialSpec, Dns01Config, PropagationConfig,
    RetryConfig, ZoneConfig,
};
pub use credential::TokenCache;
pub use error::{ApiErrorKind, Error, Result};
pub use orchestrator::{
    ChallengeEvent, ChallengeOrchestrator, ChallengeOutcome, CleanupReport, PerformReport,
};
pub use propagation::PropagationWaiter;
pub use record::{MemoryRecordApi, RecordManager};
pub use state::{FilePendingStore, MemoryPendingStore};
pub use traits::{PendingStore, RecordSetApi, TokenSource, TxtResolver};
pub use zone::ZoneResolver;
