//! subsleuth library
//!
//! Vertical subdomain enumeration for a configured set of root domains.
//! Passive data sources, recursive DNS resolution, wildcard detection,
//! reverse sweeps across nearby address space, and derivation of new
//! subdomains from prior findings all feed one deduplicated, rate-paced
//! stream, and results land in a graph store keyed by run.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use subsleuth::config::Config;
//! use subsleuth::enumeration::Enumeration;
//! use subsleuth::graph::MemoryGraph;
//! use subsleuth::netutil::MemoryAsnCache;
//! use subsleuth::resolve::TrustDnsPool;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> subsleuth::errors::Result<()> {
//! let mut cfg = Config::new();
//! cfg.add_domain("example.com");
//!
//! let e = Enumeration::new(
//!     Arc::new(cfg),
//!     Arc::new(MemoryGraph::new()),
//!     Arc::new(TrustDnsPool::new(1000)),
//!     Arc::new(MemoryAsnCache::new()),
//!     Vec::new(),
//! );
//! e.start(CancellationToken::new()).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod enumeration;
pub mod errors;
pub mod filter;
pub mod graph;
pub mod netutil;
pub mod pipeline;
pub mod requests;
pub mod resolve;
pub mod retry;
pub mod sources;
pub mod tasks;

// Re-export commonly used types for convenience.
pub use config::{Config, SourceFilter};
pub use enumeration::Enumeration;
pub use errors::{EnumError, ErrorCategory, Result};
pub use graph::{GraphStore, MemoryGraph};
pub use requests::{AddrRequest, AsnRequest, NameRequest, Record, Request, Tag};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
