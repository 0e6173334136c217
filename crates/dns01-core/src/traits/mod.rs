//! Core traits for DNS-01 challenge fulfillment
//!
//! This module defines the abstract interfaces that integrations implement.
//!
//! - [`RecordSetApi`]: Read and write TXT record sets in a managed DNS zone
//! - [`TokenSource`]: Acquire bearer tokens for the management API
//! - [`TxtResolver`]: Public DNS TXT lookups for propagation checks
//! - [`PendingStore`]: Keep pending records between perform and cleanup

pub mod pending_store;
pub mod record_api;
pub mod token_source;
pub mod txt_resolver;

pub use pending_store::PendingStore;
pub use record_api::{RecordSetApi, TxtRecordSet, WriteCondition};
pub use token_source::{AccessToken, TokenSource};
pub use txt_resolver::TxtResolver;
