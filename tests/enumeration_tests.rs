//! End-to-end tests for the enumeration engine.
//!
//! Everything runs against in-process stubs: static data sources, a
//! scripted resolver pool, and the in-memory graph. Tests use the paused
//! tokio clock so the ten-second idle timer elapses instantly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use trust_dns_resolver::proto::rr::RecordType;

use subsleuth::config::Config;
use subsleuth::enumeration::{EnumSource, Enumeration};
use subsleuth::errors::{EnumError, Result};
use subsleuth::graph::{GraphStore, MemoryGraph};
use subsleuth::netutil::MemoryAsnCache;
use subsleuth::pipeline::InputSource;
use subsleuth::requests::{AddrRequest, NameRequest, Record, Request, Tag};
use subsleuth::resolve::ResolverPool;
use subsleuth::sources::{DataSource, StaticSource};

/// Resolver stub with scripted A answers; everything else is a terminal
/// negative. Every query is recorded.
struct StubResolver {
    qps: usize,
    answers: HashMap<String, Vec<String>>,
    queries: Mutex<Vec<(String, RecordType)>>,
}

impl StubResolver {
    fn new(qps: usize, answers: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            qps,
            answers: answers
                .iter()
                .map(|(n, a)| (n.to_string(), vec![a.to_string()]))
                .collect(),
            queries: Mutex::new(Vec::new()),
        })
    }

    async fn queries_of_type(&self, rr_type: RecordType) -> Vec<String> {
        self.queries
            .lock()
            .await
            .iter()
            .filter(|(_, t)| *t == rr_type)
            .map(|(n, _)| n.clone())
            .collect()
    }
}

#[async_trait]
impl ResolverPool for StubResolver {
    fn qps(&self) -> usize {
        self.qps
    }

    async fn query(&self, name: &str, rr_type: RecordType) -> Result<Vec<Record>> {
        self.queries
            .lock()
            .await
            .push((name.to_string(), rr_type));

        if rr_type == RecordType::A {
            if let Some(data) = self.answers.get(name) {
                return Ok(data
                    .iter()
                    .map(|d| Record {
                        rr_type: 1,
                        name: name.to_string(),
                        data: d.clone(),
                    })
                    .collect());
            }
        }
        Err(EnumError::resolver(name, "no records found for query"))
    }

    async fn wildcard_detected(&self, _records: &[Record], _domain: &str) -> bool {
        false
    }
}

/// Data source stub for broker tests: capacity-one input channel with a
/// consumer that records arrival order.
struct SlowSource {
    name: String,
    done: CancellationToken,
    input_tx: mpsc::Sender<Request>,
    input_rx: Mutex<Option<mpsc::Receiver<Request>>>,
    output_rx: std::sync::Mutex<Option<mpsc::Receiver<Request>>>,
    seen: Arc<Mutex<Vec<Request>>>,
}

impl SlowSource {
    fn new(name: &str) -> Arc<Self> {
        let (input_tx, input_rx) = mpsc::channel(1);
        let (_output_tx, output_rx) = mpsc::channel(1);
        Arc::new(Self {
            name: name.to_string(),
            done: CancellationToken::new(),
            input_tx,
            input_rx: Mutex::new(Some(input_rx)),
            output_rx: std::sync::Mutex::new(Some(output_rx)),
            seen: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

#[async_trait]
impl DataSource for SlowSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Tag {
        Tag::Api
    }

    async fn start(self: Arc<Self>) -> Result<()> {
        let mut rx = self.input_rx.lock().await.take().unwrap();
        let seen = self.seen.clone();
        let done = self.done.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = done.cancelled() => break,
                    req = rx.recv() => match req {
                        Some(req) => {
                            // A sluggish consumer: deliveries must wait.
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            seen.lock().await.push(req);
                        }
                        None => break,
                    },
                }
            }
        });
        Ok(())
    }

    fn stop(&self) {
        self.done.cancel();
    }

    fn done(&self) -> CancellationToken {
        self.done.clone()
    }

    fn input(&self) -> mpsc::Sender<Request> {
        self.input_tx.clone()
    }

    fn take_output(&self) -> Option<mpsc::Receiver<Request>> {
        self.output_rx.lock().unwrap().take()
    }

    async fn check_rate_limit(&self) {}
}

fn scoped_cfg(passive: bool) -> Config {
    let mut cfg = Config::new();
    cfg.add_domain("example.com");
    cfg.passive = passive;
    cfg
}

fn name_req(name: &str, tag: Tag, source: &str) -> NameRequest {
    NameRequest::new(name, "example.com", tag, source)
}

// --------------------------------------------------------------------------
// Scenario: single-domain passive run with one stub source.
// --------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn passive_run_stores_deduplicated_names() {
    let cfg = Arc::new(scoped_cfg(true));
    let graph = Arc::new(MemoryGraph::new());
    let stub = StaticSource::new(
        "stub",
        Tag::Scrape,
        cfg.clone(),
        vec![
            "a.example.com".into(),
            "b.example.com".into(),
            "a.example.com".into(),
        ],
    );

    let e = Enumeration::new(
        cfg.clone(),
        graph.clone(),
        StubResolver::new(25, &[]),
        Arc::new(MemoryAsnCache::new()),
        vec![stub],
    );
    e.start(CancellationToken::new()).await.unwrap();

    let run = cfg.uuid.to_string();
    for name in ["a.example.com", "b.example.com"] {
        let node = graph.read_node(name, "fqdn").await.unwrap();
        let sources = graph.node_sources(&node, &run).await.unwrap();
        assert_eq!(sources, vec!["stub".to_string()], "{name} sources");
    }
}

// --------------------------------------------------------------------------
// Scenario: trusted tags supersede untrusted sightings, never the reverse.
// --------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn trust_override_accepts_exactly_twice() {
    let cfg = Arc::new(scoped_cfg(true));
    let token = CancellationToken::new();
    let source = EnumSource::new(cfg, Arc::new(MemoryAsnCache::new()), 25, &token);

    source.submit_name(name_req("x.example.com", Tag::Scrape, "untrusted-src"));
    source.submit_name(name_req("x.example.com", Tag::Cert, "trusted-src"));
    // Third sighting from anywhere is a duplicate.
    source.submit_name(name_req("x.example.com", Tag::Scrape, "another-src"));
    source.submit_name(name_req("x.example.com", Tag::Cert, "trusted-src"));

    let mut taken = Vec::new();
    while source.has_next(&token).await {
        if let Some(Request::Name(r)) = source.take().await {
            taken.push((r.name, r.tag));
        }
    }

    assert_eq!(taken.len(), 2, "exactly two items leave the input source");
    assert_eq!(taken[0].1, Tag::Scrape);
    assert_eq!(taken[1].1, Tag::Cert);
}

#[tokio::test(start_paused = true)]
async fn trusted_first_blocks_untrusted_resubmission() {
    let cfg = Arc::new(scoped_cfg(true));
    let token = CancellationToken::new();
    let source = EnumSource::new(cfg, Arc::new(MemoryAsnCache::new()), 25, &token);

    source.submit_name(name_req("y.example.com", Tag::Dns, "trusted-src"));
    source.submit_name(name_req("y.example.com", Tag::Scrape, "untrusted-src"));

    let mut taken = 0;
    while source.has_next(&token).await {
        source.take().await;
        taken += 1;
    }
    assert_eq!(taken, 1, "reverse order accepts only once");
}

// --------------------------------------------------------------------------
// Scenario: reverse sweep size around an accepted address.
// --------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn reverse_sweep_emits_one_hundred_addresses() {
    let cfg = Arc::new(scoped_cfg(false));
    let graph = Arc::new(MemoryGraph::new());
    let resolver = StubResolver::new(25, &[]);

    let stub = StaticSource::new("stub", Tag::Scrape, cfg.clone(), vec![]);
    let e = Enumeration::new(
        cfg.clone(),
        graph,
        resolver.clone(),
        Arc::new(MemoryAsnCache::new()),
        vec![stub.clone()],
    );

    // Feed one in-scope address through the stub source's output channel.
    let feeder = stub.clone();
    tokio::spawn(async move {
        let mut addr = AddrRequest::new("192.0.2.10", "example.com", Tag::Dns, "DNS");
        addr.in_scope = true;
        // The source's own output path is the same one a real adapter uses.
        let _ = feeder.output_handle().send(Request::Addr(addr)).await;
    });

    e.start(CancellationToken::new()).await.unwrap();

    let ptrs = resolver.queries_of_type(RecordType::PTR).await;
    // Every address in the /18 window reverses to *.0.192.in-addr.arpa.
    let swept: Vec<&String> = ptrs
        .iter()
        .filter(|q| q.ends_with(".0.192.in-addr.arpa"))
        .collect();

    // 100 distinct synthetic addresses, plus the driving address itself.
    let mut distinct: Vec<&&String> = swept.iter().collect();
    distinct.sort();
    distinct.dedup();
    assert_eq!(distinct.len(), 100, "distinct swept addresses");
    assert_eq!(swept.len(), 101, "the seed is probed once more than the rest");
}

// --------------------------------------------------------------------------
// Scenario: idle shutdown.
// --------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn idle_run_completes_within_twelve_seconds() {
    let cfg = Arc::new(scoped_cfg(true));
    let e = Enumeration::new(
        cfg,
        Arc::new(MemoryGraph::new()),
        StubResolver::new(25, &[]),
        Arc::new(MemoryAsnCache::new()),
        Vec::new(),
    );

    let started = tokio::time::Instant::now();
    e.start(CancellationToken::new()).await.unwrap();
    assert!(
        started.elapsed() <= Duration::from_secs(12),
        "idle shutdown took {:?}",
        started.elapsed()
    );
}

#[tokio::test(start_paused = true)]
async fn has_next_times_out_after_ten_seconds() {
    let cfg = Arc::new(scoped_cfg(true));
    let token = CancellationToken::new();
    let source = EnumSource::new(cfg, Arc::new(MemoryAsnCache::new()), 25, &token);

    let started = tokio::time::Instant::now();
    assert!(!source.has_next(&token).await);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(10), "timer fired early: {waited:?}");
    assert!(waited <= Duration::from_secs(11), "timer fired late: {waited:?}");
}

// --------------------------------------------------------------------------
// Scenario: broker fan-out ordering and single-flight delivery.
// --------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn broker_preserves_per_source_fifo() {
    use subsleuth::enumeration::RequestBroker;

    let s1 = SlowSource::new("one");
    let s2 = SlowSource::new("two");
    s1.clone().start().await.unwrap();
    s2.clone().start().await.unwrap();

    let srcs: Vec<Arc<dyn DataSource>> = vec![s1.clone(), s2.clone()];
    let token = CancellationToken::new();
    let broker = RequestBroker::new(&srcs, token.clone());

    let reqs: Vec<Request> = (1..=3)
        .map(|i| Request::Name(name_req(&format!("r{i}.example.com"), Tag::Dns, "DNS")))
        .collect();
    for r in &reqs {
        broker.send(r.clone());
    }

    // Allow the slow consumers to work through their backlogs.
    tokio::time::sleep(Duration::from_secs(2)).await;

    for src in [&s1, &s2] {
        let seen = src.seen.lock().await.clone();
        assert_eq!(seen, reqs, "per-source FIFO for {}", src.name());
    }
    token.cancel();
}

// --------------------------------------------------------------------------
// Scenario: service subdomain labels are rejected outright.
// --------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn service_labels_are_rejected() {
    let cfg = Arc::new(scoped_cfg(true));
    let token = CancellationToken::new();
    let source = EnumSource::new(cfg, Arc::new(MemoryAsnCache::new()), 25, &token);

    source.submit_name(name_req("_tcp.example.com", Tag::Scrape, "stub"));
    source.submit_name(name_req("x._udp.example.com", Tag::Scrape, "stub"));
    source.submit_name(name_req("_tls.x.example.com", Tag::Cert, "stub"));

    assert!(!source.has_next(&token).await, "nothing should be accepted");
}

// --------------------------------------------------------------------------
// Duplicate-sighting attribution reaches the graph.
// --------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn duplicate_sources_are_attributed_to_the_graph() {
    let cfg = Arc::new(scoped_cfg(true));
    let graph = Arc::new(MemoryGraph::new());

    let first = StaticSource::new(
        "first",
        Tag::Scrape,
        cfg.clone(),
        vec!["dup.example.com".into()],
    );
    let second = StaticSource::new(
        "second",
        Tag::Scrape,
        cfg.clone(),
        vec!["dup.example.com".into()],
    );

    let e = Enumeration::new(
        cfg.clone(),
        graph.clone(),
        StubResolver::new(25, &[]),
        Arc::new(MemoryAsnCache::new()),
        vec![first, second],
    );
    e.start(CancellationToken::new()).await.unwrap();

    let run = cfg.uuid.to_string();
    let node = graph.read_node("dup.example.com", "fqdn").await.unwrap();
    let mut sources = graph.node_sources(&node, &run).await.unwrap();
    sources.sort();
    assert_eq!(
        sources,
        vec!["first".to_string(), "second".to_string()],
        "both discoverers recorded"
    );
}

// --------------------------------------------------------------------------
// Round-trip: an in-scope root reaches the dns stage exactly once.
// --------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn root_domain_reaches_dns_stage_once() {
    let cfg = Arc::new(scoped_cfg(false));
    let graph = Arc::new(MemoryGraph::new());
    let resolver = StubResolver::new(25, &[("example.com", "93.184.216.34")]);

    let e = Enumeration::new(
        cfg.clone(),
        graph.clone(),
        resolver.clone(),
        Arc::new(MemoryAsnCache::new()),
        Vec::new(),
    );
    e.start(CancellationToken::new()).await.unwrap();

    let a_queries: Vec<String> = resolver
        .queries_of_type(RecordType::A)
        .await
        .into_iter()
        .filter(|q| q == "example.com")
        .collect();
    assert_eq!(a_queries.len(), 1, "root resolved exactly once");

    // And the resolution was persisted by the store stage.
    assert!(graph.read_node("example.com", "fqdn").await.is_ok());
}
