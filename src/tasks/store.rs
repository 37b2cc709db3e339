//! The data-manager stage.
//!
//! Persists resolved names into the graph under the current run. Store
//! failures are logged and never abort the run; the next name proceeds.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::Config;
use crate::errors::Result;
use crate::graph::GraphStore;
use crate::pipeline::Task;
use crate::requests::Request;

pub struct DataManager {
    cfg: Arc<Config>,
    graph: Arc<dyn GraphStore>,
}

impl DataManager {
    pub fn new(cfg: Arc<Config>, graph: Arc<dyn GraphStore>) -> Self {
        Self { cfg, graph }
    }
}

#[async_trait]
impl Task for DataManager {
    async fn process(&self, req: Request) -> Result<Option<Request>> {
        if let Request::Name(ref name_req) = req {
            if self.cfg.is_domain_in_scope(&name_req.name) {
                let run = self.cfg.uuid.to_string();
                if let Err(e) = self
                    .graph
                    .upsert_fqdn(&name_req.name, &name_req.source, &run)
                    .await
                {
                    warn!(name = %name_req.name, error = %e, "graph upsert failed");
                }
            }
        }
        Ok(Some(req))
    }
}
