//! Active probing stage.
//!
//! Only appended in active mode. Each name triggers additional record
//! probes (NS, SRV discovery labels) whose targets re-enter the stream.
//! Probes run detached from the pipeline flow, capped at a fixed number
//! in flight so the resolver pool is never monopolized.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::trace;
use trust_dns_resolver::proto::rr::RecordType;

use crate::config::Config;
use crate::enumeration::EnumSource;
use crate::errors::Result;
use crate::pipeline::Task;
use crate::requests::{NameRequest, Request, Tag};
use crate::resolve::ResolverPool;

/// Upper bound on concurrently running probes.
pub const MAX_ACTIVE_TASKS: usize = 25;

const SRV_LABELS: [&str; 4] = ["_ldap._tcp", "_sip._tcp", "_sip._udp", "_xmpp-server._tcp"];

pub struct ActiveTask {
    cfg: Arc<Config>,
    src: Arc<EnumSource>,
    resolvers: Arc<dyn ResolverPool>,
    slots: Arc<Semaphore>,
}

impl ActiveTask {
    pub fn new(cfg: Arc<Config>, src: Arc<EnumSource>, resolvers: Arc<dyn ResolverPool>) -> Self {
        Self {
            cfg,
            src,
            resolvers,
            slots: Arc::new(Semaphore::new(MAX_ACTIVE_TASKS)),
        }
    }

    async fn probe(
        cfg: Arc<Config>,
        src: Arc<EnumSource>,
        resolvers: Arc<dyn ResolverPool>,
        name: String,
        domain: String,
    ) {
        let mut probes = vec![(name.clone(), RecordType::NS)];
        for label in SRV_LABELS {
            probes.push((format!("{label}.{name}"), RecordType::SRV));
        }

        for (query, rr_type) in probes {
            let Ok(records) = resolvers.query(&query, rr_type).await else {
                continue;
            };
            for rec in records {
                let target = rec.data.trim_end_matches('.');
                let host = target.rsplit(' ').next().unwrap_or(target);
                if cfg.is_domain_in_scope(host) {
                    trace!(probe = %query, target = %host, "active probe hit");
                    src.submit_name(NameRequest::new(host, &domain, Tag::Dns, "Active DNS"));
                }
            }
        }
    }
}

#[async_trait]
impl Task for ActiveTask {
    async fn process(&self, req: Request) -> Result<Option<Request>> {
        if let Request::Name(ref name_req) = req {
            if let Ok(permit) = self.slots.clone().acquire_owned().await {
                let cfg = self.cfg.clone();
                let src = self.src.clone();
                let resolvers = self.resolvers.clone();
                let name = name_req.name.clone();
                let domain = name_req.domain.clone();
                tokio::spawn(async move {
                    Self::probe(cfg, src, resolvers, name, domain).await;
                    drop(permit);
                });
            }
        }
        Ok(Some(req))
    }
}
