//! Subdomain derivation stage.
//!
//! Every resolved name implies its chain of parent labels down to the
//! root domain. The first time a parent subdomain is sighted it re-enters
//! the stream as a DNS-tagged name, so the zone structure above each
//! finding gets explored too.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::trace;

use crate::enumeration::EnumSource;
use crate::errors::Result;
use crate::pipeline::Task;
use crate::requests::{NameRequest, Request, Tag};

pub struct SubdomainTask {
    src: Arc<EnumSource>,
    seen: Mutex<HashMap<String, u32>>,
}

impl SubdomainTask {
    pub fn new(src: Arc<EnumSource>) -> Self {
        Self {
            src,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Proper parent subdomains of `name`, exclusive of the name itself
    /// and of the root domain.
    fn parents(name: &str, domain: &str) -> Vec<String> {
        let mut out = Vec::new();
        let suffix = format!(".{domain}");
        let mut cur = name;
        while let Some((_, rest)) = cur.split_once('.') {
            if rest == domain || !rest.ends_with(&suffix) {
                break;
            }
            out.push(rest.to_string());
            cur = rest;
        }
        out
    }

    /// True on the first sighting of this subdomain.
    fn first_sighting(&self, sub: &str) -> bool {
        let mut seen = self.seen.lock().expect("seen lock");
        let times = seen.entry(sub.to_string()).or_insert(0);
        *times += 1;
        *times == 1
    }
}

#[async_trait]
impl Task for SubdomainTask {
    async fn process(&self, req: Request) -> Result<Option<Request>> {
        if let Request::Name(ref name_req) = req {
            for sub in Self::parents(&name_req.name, &name_req.domain) {
                if self.first_sighting(&sub) {
                    trace!(subdomain = %sub, "new subdomain derived");
                    self.src.submit_name(NameRequest::new(
                        &sub,
                        &name_req.domain,
                        Tag::Dns,
                        "DNS",
                    ));
                }
            }
        }
        Ok(Some(req))
    }
}
