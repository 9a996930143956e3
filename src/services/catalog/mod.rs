//! Catalog client adapter: the HTTP client, the shared retry policy, and the
//! retry-wrapped operations the rest of the engine calls.

pub mod adapter;
pub mod client;
pub mod retry;

pub use adapter::{CatalogAdapter, PlaylistAddResult};
pub use client::{CatalogCredentials, HttpCatalogClient};
pub use retry::RetryPolicy;
