//! Pluggable data sources.
//!
//! Every passive data source implements the `DataSource` trait: the broker
//! pushes root-domain and ASN requests into its input channel, and the
//! source emits discovered names and addresses on its output channel at
//! its own pace. `BaseSource` owns the channel plumbing, the done signal,
//! and the rate limiter so a concrete source only writes its query logic.
//!
//! Adapter-specific scraping lives out of tree; `StaticSource` is the one
//! built-in implementation, replaying a fixed set of names for every
//! in-scope request, which is what the test suite and dry runs feed on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::errors::Result;
use crate::requests::{NameRequest, Request, Tag};

/// Channel depth between a source and its consumers.
const SOURCE_CHANNEL_DEPTH: usize = 64;

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Unique display name of the source.
    fn name(&self) -> &str;

    /// The provenance tag this source's findings carry.
    fn description(&self) -> Tag;

    /// Begin servicing requests.
    async fn start(self: Arc<Self>) -> Result<()>;

    /// Signal the source to wind down.
    fn stop(&self);

    /// Cancellation observed when the source has shut down.
    fn done(&self) -> CancellationToken;

    /// Sink for externally submitted requests.
    fn input(&self) -> mpsc::Sender<Request>;

    /// Take the output stream; yields `None` once per source.
    fn take_output(&self) -> Option<mpsc::Receiver<Request>>;

    /// Block until the next emission is permitted.
    async fn check_rate_limit(&self);
}

/// Shared plumbing for `DataSource` implementations.
pub struct BaseSource {
    name: String,
    tag: Tag,
    done: CancellationToken,
    input_tx: mpsc::Sender<Request>,
    input_rx: Mutex<Option<mpsc::Receiver<Request>>>,
    output_tx: mpsc::Sender<Request>,
    output_rx: std::sync::Mutex<Option<mpsc::Receiver<Request>>>,
    limiter: Mutex<RateGate>,
}

struct RateGate {
    interval: Duration,
    next: Instant,
}

impl BaseSource {
    pub fn new(name: impl Into<String>, tag: Tag) -> Self {
        let (input_tx, input_rx) = mpsc::channel(SOURCE_CHANNEL_DEPTH);
        let (output_tx, output_rx) = mpsc::channel(SOURCE_CHANNEL_DEPTH);
        Self {
            name: name.into(),
            tag,
            done: CancellationToken::new(),
            input_tx,
            input_rx: Mutex::new(Some(input_rx)),
            output_tx,
            output_rx: std::sync::Mutex::new(Some(output_rx)),
            limiter: Mutex::new(RateGate {
                interval: Duration::ZERO,
                next: Instant::now(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn done(&self) -> CancellationToken {
        self.done.clone()
    }

    pub fn stop(&self) {
        self.done.cancel();
    }

    pub fn input(&self) -> mpsc::Sender<Request> {
        self.input_tx.clone()
    }

    pub fn output(&self) -> mpsc::Sender<Request> {
        self.output_tx.clone()
    }

    /// Hand the service loop its input stream; valid once.
    pub async fn take_input(&self) -> Option<mpsc::Receiver<Request>> {
        self.input_rx.lock().await.take()
    }

    pub fn take_output(&self) -> Option<mpsc::Receiver<Request>> {
        self.output_rx.lock().expect("output lock").take()
    }

    /// At most `per_second` emissions per second; zero disables the gate.
    pub async fn set_rate_limit(&self, per_second: u32) {
        let mut gate = self.limiter.lock().await;
        gate.interval = if per_second == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / per_second
        };
    }

    pub async fn check_rate_limit(&self) {
        let wait = {
            let mut gate = self.limiter.lock().await;
            if gate.interval.is_zero() {
                return;
            }
            let now = Instant::now();
            let at = gate.next.max(now);
            gate.next = at + gate.interval;
            at
        };
        tokio::time::sleep_until(wait).await;
    }
}

/// Scope-check a discovered name and emit it on the source's output.
pub async fn new_name_event(cfg: &Config, base: &BaseSource, name: &str) {
    let Some(domain) = cfg.which_domain(name) else {
        return;
    };
    let req = Request::Name(NameRequest::new(name, domain, base.tag(), base.name()));
    let done = base.done();
    let output = base.output();
    tokio::select! {
        _ = done.cancelled() => {}
        _ = output.send(req) => {}
    }
}

/// Apply the config's source filter to the available sources.
pub fn select_sources(
    cfg: &Config,
    available: Vec<Arc<dyn DataSource>>,
) -> Vec<Arc<dyn DataSource>> {
    let names: Vec<&str> = available.iter().map(|s| s.name()).collect();
    let selected: std::collections::HashSet<String> = cfg
        .selected_source_names(&names)
        .into_iter()
        .map(|n| n.to_string())
        .collect();

    let mut out: Vec<Arc<dyn DataSource>> = available
        .into_iter()
        .filter(|s| selected.contains(s.name()))
        .collect();
    out.sort_by(|a, b| a.name().cmp(b.name()));
    out
}

/// A source that answers every in-scope name request with a fixed list of
/// names.
pub struct StaticSource {
    base: BaseSource,
    cfg: Arc<Config>,
    names: Vec<String>,
}

impl StaticSource {
    pub fn new(
        name: impl Into<String>,
        tag: Tag,
        cfg: Arc<Config>,
        names: Vec<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: BaseSource::new(name, tag),
            cfg,
            names,
        })
    }

    /// Direct handle on the output channel, for embedders that feed
    /// findings in from outside the request/response cycle.
    pub fn output_handle(&self) -> mpsc::Sender<Request> {
        self.base.output()
    }

    async fn handle(&self, req: Request) {
        let Request::Name(name_req) = req else {
            // ASN and address requests are not answerable from a fixed list.
            return;
        };
        if !self.cfg.is_domain_in_scope(&name_req.domain) {
            return;
        }
        debug!(source = self.base.name(), domain = %name_req.domain, "replaying static names");
        for n in &self.names {
            self.base.check_rate_limit().await;
            new_name_event(&self.cfg, &self.base, n).await;
        }
    }
}

#[async_trait]
impl DataSource for StaticSource {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn description(&self) -> Tag {
        self.base.tag()
    }

    async fn start(self: Arc<Self>) -> Result<()> {
        let mut input = match self.base.take_input().await {
            Some(rx) => rx,
            None => return Ok(()),
        };

        let me = self.clone();
        let done = self.base.done();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = done.cancelled() => break,
                    req = input.recv() => match req {
                        Some(req) => me.handle(req).await,
                        None => break,
                    },
                }
            }
        });
        Ok(())
    }

    fn stop(&self) {
        self.base.stop();
    }

    fn done(&self) -> CancellationToken {
        self.base.done()
    }

    fn input(&self) -> mpsc::Sender<Request> {
        self.base.input()
    }

    fn take_output(&self) -> Option<mpsc::Receiver<Request>> {
        self.base.take_output()
    }

    async fn check_rate_limit(&self) {
        self.base.check_rate_limit().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::AsnRequest;

    fn scoped_cfg() -> Arc<Config> {
        let mut c = Config::new();
        c.add_domain("example.com");
        Arc::new(c)
    }

    #[tokio::test]
    async fn static_source_replays_in_scope_names() {
        let cfg = scoped_cfg();
        let src = StaticSource::new(
            "stub",
            Tag::Scrape,
            cfg.clone(),
            vec!["a.example.com".into(), "b.example.org".into()],
        );
        let mut output = src.take_output().unwrap();
        src.clone().start().await.unwrap();

        let root = Request::Name(NameRequest::new("example.com", "example.com", Tag::Dns, "DNS"));
        src.input().send(root).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), output.recv())
            .await
            .unwrap()
            .unwrap();
        match got {
            Request::Name(r) => {
                assert_eq!(r.name, "a.example.com");
                assert_eq!(r.source, "stub");
                assert_eq!(r.tag, Tag::Scrape);
            }
            other => panic!("unexpected request: {other:?}"),
        }

        // The out-of-scope name never surfaces.
        let next = tokio::time::timeout(Duration::from_millis(200), output.recv()).await;
        assert!(next.is_err(), "b.example.org should have been dropped");
        src.stop();
    }

    #[tokio::test]
    async fn asn_requests_are_ignored() {
        let cfg = scoped_cfg();
        let src = StaticSource::new("stub", Tag::Scrape, cfg, vec!["a.example.com".into()]);
        let mut output = src.take_output().unwrap();
        src.clone().start().await.unwrap();

        src.input()
            .send(Request::Asn(AsnRequest { asn: 64500 }))
            .await
            .unwrap();
        let next = tokio::time::timeout(Duration::from_millis(200), output.recv()).await;
        assert!(next.is_err());
        src.stop();
    }

    #[tokio::test]
    async fn rate_gate_spaces_emissions() {
        let base = BaseSource::new("gated", Tag::Api);
        base.set_rate_limit(100).await;

        let start = Instant::now();
        for _ in 0..5 {
            base.check_rate_limit().await;
        }
        // Five checks at 100/s spread across at least ~40ms.
        assert!(start.elapsed() >= Duration::from_millis(35));
    }

    #[tokio::test]
    async fn source_selection_respects_filter() {
        let mut cfg = Config::new();
        cfg.add_domain("example.com");
        cfg.source_filter.sources = vec!["keep".to_string()];
        cfg.source_filter.include = true;
        let cfg = Arc::new(cfg);

        let keep: Arc<dyn DataSource> =
            StaticSource::new("keep", Tag::Scrape, cfg.clone(), vec![]);
        let drop: Arc<dyn DataSource> =
            StaticSource::new("drop", Tag::Scrape, cfg.clone(), vec![]);

        let selected = select_sources(&cfg, vec![keep, drop]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name(), "keep");
    }
}
