//! Resolver pool seam.
//!
//! The dns stage drives recursive resolution through the `ResolverPool`
//! trait; transport, upstream selection, and retry-at-the-wire-level live
//! behind it. `TrustDnsPool` is the default implementation over
//! trust-dns-resolver, and also carries the wildcard check used to discard
//! names answered by catch-all records.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::timeout;
use trust_dns_resolver::{
    config::{ResolverConfig, ResolverOpts},
    proto::rr::RecordType,
    TokioAsyncResolver,
};

use crate::errors::{EnumError, Result};
use crate::requests::Record;

const QUERY_TIMEOUT_SECS: u64 = 5;

#[async_trait]
pub trait ResolverPool: Send + Sync {
    /// Queries per second the pool sustains; sizes the dns stage and the
    /// input-source admission bound.
    fn qps(&self) -> usize;

    /// Resolve `name` for the given record type, blocking until an answer
    /// or a terminal failure.
    async fn query(&self, name: &str, rr_type: RecordType) -> Result<Vec<Record>>;

    /// True when the response for `name` looks like the product of a
    /// wildcard (catch-all) record under `domain`.
    async fn wildcard_detected(&self, records: &[Record], domain: &str) -> bool;
}

/// Default pool over trust-dns-resolver.
pub struct TrustDnsPool {
    resolver: TokioAsyncResolver,
    qps: usize,
    /// domain -> answer data observed for a random probe label.
    wildcards: Mutex<HashMap<String, Vec<String>>>,
}

impl TrustDnsPool {
    pub fn new(qps: usize) -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
            qps,
            wildcards: Mutex::new(HashMap::new()),
        }
    }

    /// Probe a random label under the domain once and remember what a
    /// wildcard answer looks like there.
    async fn wildcard_answers(&self, domain: &str) -> Vec<String> {
        {
            let cache = self.wildcards.lock().await;
            if let Some(answers) = cache.get(domain) {
                return answers.clone();
            }
        }

        let label: String = {
            let mut rng = rand::rng();
            (0..16)
                .map(|_| char::from(b'a' + rng.random_range(0..26)))
                .collect()
        };
        let probe = format!("{label}.{domain}");
        let answers = match self.query(&probe, RecordType::A).await {
            Ok(records) => records.into_iter().map(|r| r.data).collect(),
            Err(_) => Vec::new(),
        };

        let mut cache = self.wildcards.lock().await;
        cache.entry(domain.to_string()).or_insert_with(|| answers.clone());
        answers
    }
}

#[async_trait]
impl ResolverPool for TrustDnsPool {
    fn qps(&self) -> usize {
        self.qps
    }

    async fn query(&self, name: &str, rr_type: RecordType) -> Result<Vec<Record>> {
        let lookup = self.resolver.lookup(name, rr_type);
        let answer = timeout(Duration::from_secs(QUERY_TIMEOUT_SECS), lookup)
            .await
            .map_err(|_| EnumError::query_timeout(name, QUERY_TIMEOUT_SECS))?
            .map_err(|e| EnumError::resolver(name, e.to_string()))?;

        Ok(answer
            .record_iter()
            .map(|r| Record {
                rr_type: u16::from(r.record_type()),
                name: r.name().to_utf8().trim_end_matches('.').to_string(),
                data: r
                    .data()
                    .map(|d| d.to_string().trim_end_matches('.').to_string())
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn wildcard_detected(&self, records: &[Record], domain: &str) -> bool {
        if records.is_empty() {
            return false;
        }
        let wild = self.wildcard_answers(domain).await;
        if wild.is_empty() {
            return false;
        }
        records.iter().any(|r| wild.iter().any(|w| *w == r.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pool_reports_qps() {
        let pool = TrustDnsPool::new(250);
        assert_eq!(pool.qps(), 250);
    }
}
