//! Hawaiian-language search provider layer / 夏威夷语检索提供者层
//!
//! - `search`: backend-independent pieces (normalization, modes, masks, result shaping)
//! - `providers`: query executors for MySQL, Postgres and Elasticsearch behind one facade

pub mod config;
pub mod error;
pub mod providers;
pub mod search;

pub use error::{BackendError, SearchError};
pub use providers::{Provider, ProviderManager, SearchProvider};
