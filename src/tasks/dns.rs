//! Resolution stages.
//!
//! `RootTask` watches for root-domain requests and fans out the zone-level
//! queries (NS, MX) whose targets seed further discovery. `DnsTask` is the
//! worker-pool stage: forward resolution for names, reverse resolution for
//! swept addresses. Transient resolver failures are retried before a name
//! is dropped; wildcard answers are discarded.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};
use trust_dns_resolver::proto::rr::RecordType;

use crate::config::Config;
use crate::enumeration::EnumSource;
use crate::errors::Result;
use crate::pipeline::Task;
use crate::requests::{AddrRequest, NameRequest, Record, Request, Tag};
use crate::resolve::ResolverPool;
use crate::retry::{with_retries, RetryConfig};

/// First stage in the dns pipeline: pass everything through, and expand
/// root domains into their zone-level queries.
pub struct RootTask {
    cfg: Arc<Config>,
    src: Arc<EnumSource>,
    resolvers: Arc<dyn ResolverPool>,
}

impl RootTask {
    pub fn new(cfg: Arc<Config>, src: Arc<EnumSource>, resolvers: Arc<dyn ResolverPool>) -> Self {
        Self {
            cfg,
            src,
            resolvers,
        }
    }

    async fn query_zone(&self, domain: &str) {
        for rr_type in [RecordType::NS, RecordType::MX] {
            let Ok(records) = self.resolvers.query(domain, rr_type).await else {
                continue;
            };
            for rec in records {
                let target = rec.data.trim_end_matches('.');
                // MX data is "pref host"; take the final token either way.
                let host = target.rsplit(' ').next().unwrap_or(target);
                if self.cfg.is_domain_in_scope(host) {
                    self.src
                        .submit_name(NameRequest::new(host, domain, Tag::Dns, "DNS"));
                }
            }
        }
    }
}

#[async_trait]
impl Task for RootTask {
    async fn process(&self, req: Request) -> Result<Option<Request>> {
        if let Request::Name(ref name_req) = req {
            if name_req.name == name_req.domain {
                trace!(domain = %name_req.domain, "expanding root domain");
                self.query_zone(&name_req.domain).await;
            }
        }
        Ok(Some(req))
    }
}

/// The resolver-pool stage.
pub struct DnsTask {
    cfg: Arc<Config>,
    src: Arc<EnumSource>,
    resolvers: Arc<dyn ResolverPool>,
    retry: RetryConfig,
}

impl DnsTask {
    pub fn new(cfg: Arc<Config>, src: Arc<EnumSource>, resolvers: Arc<dyn ResolverPool>) -> Self {
        Self {
            cfg,
            src,
            resolvers,
            retry: RetryConfig::default(),
        }
    }

    async fn resolve_name(&self, mut req: NameRequest) -> Option<Request> {
        if !req.records.is_empty() {
            // Already carries an answer from its discovering source.
            return Some(Request::Name(req));
        }

        let mut records: Vec<Record> = Vec::new();
        for rr_type in [RecordType::A, RecordType::AAAA, RecordType::CNAME] {
            let name = req.name.clone();
            let answer = with_retries(&self.retry, || {
                let name = name.clone();
                async move { self.resolvers.query(&name, rr_type).await }
            })
            .await;

            if let Ok(mut recs) = answer {
                records.append(&mut recs);
                if rr_type == RecordType::A && !records.is_empty() {
                    // CNAME chains already surface through the A answer.
                    break;
                }
            }
        }

        if records.is_empty() {
            debug!(name = %req.name, "dropped after persistent resolution failure");
            return None;
        }
        if self
            .resolvers
            .wildcard_detected(&records, &req.domain)
            .await
        {
            debug!(name = %req.name, domain = %req.domain, "wildcard answer discarded");
            return None;
        }

        // Resolved addresses feed reverse sweeps through the front door.
        for rec in &records {
            if rec.data.parse::<IpAddr>().is_ok() {
                let mut addr =
                    AddrRequest::new(rec.data.clone(), req.domain.clone(), Tag::Dns, "DNS");
                addr.in_scope = self.cfg.is_domain_in_scope(&req.name);
                self.src.submit_addr(addr);
            }
        }

        req.records = records;
        Some(Request::Name(req))
    }

    async fn resolve_addr(&self, req: AddrRequest) -> Option<Request> {
        let addr: IpAddr = req.address.parse().ok()?;
        let ptr = ptr_name(addr);

        let answer = with_retries(&self.retry, || {
            let ptr = ptr.clone();
            async move { self.resolvers.query(&ptr, RecordType::PTR).await }
        })
        .await
        .ok()?;

        let mut found = false;
        for rec in &answer {
            let host = rec.data.trim_end_matches('.');
            if let Some(domain) = self.cfg.which_domain(host) {
                found = true;
                self.src.submit_name(NameRequest::new(
                    host,
                    domain,
                    Tag::Dns,
                    "Reverse DNS",
                ));
            }
        }
        found.then_some(Request::Addr(req))
    }
}

#[async_trait]
impl Task for DnsTask {
    async fn process(&self, req: Request) -> Result<Option<Request>> {
        match req {
            Request::Name(r) => Ok(self.resolve_name(r).await),
            Request::Addr(r) => Ok(self.resolve_addr(r).await),
            other => Ok(Some(other)),
        }
    }
}

/// The reverse-lookup name for an address.
pub fn ptr_name(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa", o[3], o[2], o[1], o[0])
        }
        IpAddr::V6(v6) => {
            let mut nibbles = String::with_capacity(64);
            for byte in v6.octets().iter().rev() {
                nibbles.push_str(&format!("{:x}.{:x}.", byte & 0x0f, byte >> 4));
            }
            format!("{nibbles}ip6.arpa")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ptr_names() {
        assert_eq!(
            ptr_name("192.0.2.10".parse().unwrap()),
            "10.2.0.192.in-addr.arpa"
        );
        let v6 = ptr_name("2001:db8::1".parse().unwrap());
        assert!(v6.ends_with("ip6.arpa"));
        assert!(v6.starts_with("1.0.0.0."));
    }
}
