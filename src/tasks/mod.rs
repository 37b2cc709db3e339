//! Stage bodies composed by the pipeline driver.
//!
//! Each task is a thin adapter between the pipeline and an external
//! collaborator: the resolver pool, the graph store, or the input source
//! itself (for names derived mid-run). The heavy lifting — pacing,
//! dedup, backpressure — happens upstream in the input source.

pub mod active;
pub mod derive;
pub mod dns;
pub mod filter;
pub mod store;

pub use active::ActiveTask;
pub use derive::SubdomainTask;
pub use dns::{DnsTask, RootTask};
pub use filter::FilterTask;
pub use store::DataManager;
