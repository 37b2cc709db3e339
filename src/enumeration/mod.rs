//! The enumeration engine.
//!
//! `Enumeration` wires the whole run together: the request broker fans
//! root domains and ASNs out to the data sources, the input source
//! filters and paces everything the sources discover, and the pipeline
//! stages resolve, persist, and derive from each accepted item. A single
//! cancellation token threads through every component; when the input
//! source goes idle for ten seconds the run drains and completes on its
//! own.

mod broker;
mod dups;
mod input;
mod queue;
mod sweep;

pub use broker::RequestBroker;
pub use input::{EnumSource, WAIT_FOR_DURATION};
pub use sweep::{ACTIVE_SWEEP_SIZE, DEFAULT_SWEEP_SIZE};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;
use crate::errors::Result;
use crate::filter::StableBloomFilter;
use crate::graph::{GraphStore, Node};
use crate::netutil::AsnCache;
use crate::pipeline::{OutputSink, Pipeline, Stage};
use crate::requests::{AsnRequest, NameRequest, Request, Tag};
use crate::resolve::ResolverPool;
use crate::sources::{select_sources, DataSource};
use crate::tasks::{ActiveTask, DataManager, DnsTask, FilterTask, RootTask, SubdomainTask};

/// Buffer depth between stages in non-passive mode.
const STAGE_BUFFER_DEPTH: usize = 50;

/// Executes a vertical domain enumeration.
pub struct Enumeration {
    cfg: Arc<Config>,
    graph: Arc<dyn GraphStore>,
    resolvers: Arc<dyn ResolverPool>,
    asn_cache: Arc<dyn AsnCache>,
    srcs: Vec<Arc<dyn DataSource>>,
}

impl Enumeration {
    /// Initialized but not yet started; `available` is filtered through
    /// the config's source selection.
    pub fn new(
        cfg: Arc<Config>,
        graph: Arc<dyn GraphStore>,
        resolvers: Arc<dyn ResolverPool>,
        asn_cache: Arc<dyn AsnCache>,
        available: Vec<Arc<dyn DataSource>>,
    ) -> Self {
        let srcs = select_sources(&cfg, available);
        Self {
            cfg,
            graph,
            resolvers,
            asn_cache,
            srcs,
        }
    }

    /// Run the enumeration to completion. Only configuration errors and
    /// cancellation surface; everything else is handled in-stage.
    pub async fn start(&self, token: CancellationToken) -> Result<()> {
        self.cfg.check_settings()?;

        let ctx = token.child_token();
        info!(
            run = %self.cfg.uuid,
            domains = self.cfg.domains().len(),
            sources = self.srcs.len(),
            passive = self.cfg.passive,
            active = self.cfg.active,
            "enumeration starting"
        );

        for src in &self.srcs {
            if let Err(e) = src.clone().start().await {
                warn!(source = src.name(), error = %e, "data source failed to start");
            }
        }

        let broker = RequestBroker::new(&self.srcs, ctx.child_token());

        let source = EnumSource::new(
            self.cfg.clone(),
            self.asn_cache.clone(),
            self.resolvers.qps(),
            &ctx,
        );
        source.start_watchers(&self.srcs);

        let dup_handle = tokio::spawn(dups::process_dup_names(
            source.clone(),
            self.graph.clone(),
            self.cfg.uuid.to_string(),
        ));

        let mut stages: Vec<Stage> = Vec::new();
        if !self.cfg.passive {
            stages.push(Stage::fifo(
                "root",
                Arc::new(RootTask::new(
                    self.cfg.clone(),
                    source.clone(),
                    self.resolvers.clone(),
                )),
            ));
            stages.push(Stage::pool(
                "dns",
                Arc::new(DnsTask::new(
                    self.cfg.clone(),
                    source.clone(),
                    self.resolvers.clone(),
                )),
                self.resolvers.qps(),
            ));
            stages.push(Stage::fifo(
                "store",
                Arc::new(DataManager::new(self.cfg.clone(), self.graph.clone())),
            ));
            stages.push(Stage::fifo("subs", Arc::new(SubdomainTask::new(source.clone()))));
        } else {
            stages.push(Stage::fifo("filter", Arc::new(FilterTask::new())));
        }
        if self.cfg.active {
            stages.push(Stage::fifo(
                "active",
                Arc::new(ActiveTask::new(
                    self.cfg.clone(),
                    source.clone(),
                    self.resolvers.clone(),
                )),
            ));
        }

        self.submit_domain_names(&source, &broker);
        self.submit_asns(&broker);
        // Names provided by the user and names acquired from the graph can
        // enter once the input source is ready for them.
        tokio::join!(
            self.submit_known_names(&source),
            self.submit_provided_names(&source),
        );

        let sink = Arc::new(GraphSink {
            cfg: self.cfg.clone(),
            graph: self.graph.clone(),
        });

        let pipeline = Pipeline::new(stages);
        let result = if self.cfg.passive {
            pipeline.execute(ctx.clone(), source.clone(), sink).await
        } else {
            pipeline
                .execute_buffered(ctx.clone(), source.clone(), sink, STAGE_BUFFER_DEPTH)
                .await
        };

        // Wind down: let the duplicate tracker flush, then tear everything
        // else down.
        source.mark_done();
        let _ = dup_handle.await;
        source.stop();
        ctx.cancel();
        for src in &self.srcs {
            src.stop();
        }

        info!(run = %self.cfg.uuid, "enumeration finished");
        result
    }

    /// Release the root domain names to the input source and every data
    /// source.
    fn submit_domain_names(&self, source: &Arc<EnumSource>, broker: &RequestBroker) {
        for domain in self.cfg.domains() {
            let req = NameRequest::new(domain, domain, Tag::Dns, "DNS");
            source.submit_name(req.clone());
            broker.send(Request::Name(req));
        }
    }

    /// Requests for specific ASNs go to the data sources only.
    fn submit_asns(&self, broker: &RequestBroker) {
        for asn in &self.cfg.asns {
            broker.send(Request::Asn(AsnRequest { asn: *asn }));
        }
    }

    /// Bring names from prior runs of the graph into this enumeration,
    /// preserving each name's original discoverer.
    async fn submit_known_names(&self, source: &Arc<EnumSource>) {
        let filter = StableBloomFilter::new_default();
        let src_tags: HashMap<&str, Tag> = self
            .srcs
            .iter()
            .map(|s| (s.name(), s.description()))
            .collect();

        let domains: Vec<String> = self.cfg.domains().to_vec();
        for event in self.graph.events_in_scope(&domains).await {
            for name in self.graph.event_fqdns(&event).await {
                if source.done().is_cancelled() {
                    return;
                }
                if filter.test_and_add(name.as_bytes()) {
                    continue;
                }
                let Some(domain) = self.cfg.which_domain(&name) else {
                    continue;
                };

                let node = Node {
                    name: name.clone(),
                    kind: "fqdn".to_string(),
                };
                if let Ok(sources) = self.graph.node_sources(&node, &event).await {
                    let Some(src_name) = sources.into_iter().next() else {
                        continue;
                    };
                    let tag = src_tags.get(src_name.as_str()).copied().unwrap_or(Tag::None);
                    if self.cfg.is_domain_in_scope(&name) {
                        source.submit_name(NameRequest::new(&name, domain, tag, src_name));
                    }
                }
            }
        }
    }

    /// User-supplied names enter with the external tag.
    async fn submit_provided_names(&self, source: &Arc<EnumSource>) {
        for name in &self.cfg.provided_names {
            if let Some(domain) = self.cfg.which_domain(name) {
                if self.cfg.is_domain_in_scope(name) {
                    source.submit_name(NameRequest::new(name, domain, Tag::External, "User Input"));
                }
            }
        }
    }
}

/// Terminal sink. Passive runs persist here; in non-passive runs the
/// store stage has already written everything, so this is a no-op.
struct GraphSink {
    cfg: Arc<Config>,
    graph: Arc<dyn GraphStore>,
}

#[async_trait]
impl OutputSink for GraphSink {
    async fn consume(&self, req: Request) -> Result<()> {
        if !self.cfg.passive {
            return Ok(());
        }

        if let Request::Name(name_req) = req {
            if name_req.valid() && self.cfg.is_domain_in_scope(&name_req.name) {
                let run = self.cfg.uuid.to_string();
                if let Err(e) = self
                    .graph
                    .upsert_fqdn(&name_req.name, &name_req.source, &run)
                    .await
                {
                    warn!(name = %name_req.name, error = %e, "output sink upsert failed");
                }
            }
        }
        Ok(())
    }
}
