//! The passive-mode filter stage.
//!
//! The only stage in a passive run: drops repeat sightings keyed by name
//! plus leading record type (or bare address), letting first sightings
//! through to the output sink untouched.

use async_trait::async_trait;

use crate::errors::Result;
use crate::filter::StableBloomFilter;
use crate::pipeline::Task;
use crate::requests::Request;

pub struct FilterTask {
    filter: StableBloomFilter,
}

impl FilterTask {
    pub fn new() -> Self {
        Self {
            filter: StableBloomFilter::new_default(),
        }
    }
}

impl Default for FilterTask {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Task for FilterTask {
    async fn process(&self, req: Request) -> Result<Option<Request>> {
        let key = match &req {
            Request::Name(r) if r.valid() => {
                let qtype = r
                    .records
                    .first()
                    .map(|rec| rec.rr_type.to_string())
                    .unwrap_or_default();
                format!("{}{}", r.name, qtype)
            }
            Request::Addr(r) if r.valid() => r.address.clone(),
            // Anything else passes through untouched.
            _ => return Ok(Some(req)),
        };

        if self.filter.test_and_add(key.as_bytes()) {
            return Ok(None);
        }
        Ok(Some(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::{NameRequest, Tag};

    fn name_req(n: &str) -> Request {
        Request::Name(NameRequest::new(n, "example.com", Tag::Scrape, "stub"))
    }

    #[tokio::test]
    async fn repeats_are_dropped() {
        let task = FilterTask::new();
        assert!(task.process(name_req("a.example.com")).await.unwrap().is_some());
        assert!(task.process(name_req("a.example.com")).await.unwrap().is_none());
        assert!(task.process(name_req("b.example.com")).await.unwrap().is_some());
    }
}
