//! Match-history API integration
//!
//! All outbound traffic goes through [`client::RiotClient`]; no other module
//! builds HTTP requests against the provider.

pub mod client;
pub mod types;

pub use client::RiotClient;
pub use types::EndpointClass;
