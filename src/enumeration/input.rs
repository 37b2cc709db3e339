//! The pipeline input source.
//!
//! Sole producer feeding the first pipeline stage. Data-source watchers
//! push discovered names and addresses through the acceptance decision;
//! accepted items queue up for `take`, duplicate sightings divert to the
//! duplicate tracker, and accepted non-reserved addresses seed the reverse
//! sweep generator. Admission from data sources is paced by a token bucket
//! of capacity `MaxQ = max(resolver QPS, 1000)`; tokens are replenished in
//! proportion to queue headroom so the pipeline is never flooded and never
//! starved while work remains.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::queue::SignalQueue;
use crate::config::Config;
use crate::filter::StableBloomFilter;
use crate::netutil::{is_reserved, AsnCache};
use crate::pipeline::InputSource;
use crate::requests::{AddrRequest, NameRequest, Request, SUBDOMAIN_RE};
use crate::sources::DataSource;

/// Idle window after which the enumeration is declared complete.
pub const WAIT_FOR_DURATION: Duration = Duration::from_secs(10);

/// Floor for the admission bound.
const MIN_QUEUE_BOUND: usize = 1000;

pub struct EnumSource {
    pub(super) cfg: Arc<Config>,
    pub(super) queue: SignalQueue<Request>,
    pub(super) dups: SignalQueue<NameRequest>,
    pub(super) sweeps: SignalQueue<AddrRequest>,
    accept_filter: StableBloomFilter,
    pub(super) sweep_filter: StableBloomFilter,
    pub(super) sweep_lock: AsyncMutex<()>,
    pub(super) asn_cache: Arc<dyn AsnCache>,
    done: CancellationToken,
    release: Semaphore,
    inputsig_tx: mpsc::Sender<u32>,
    inputsig_rx: std::sync::Mutex<Option<mpsc::Receiver<u32>>>,
    sweep_kick: Notify,
    max: usize,
    count: std::sync::Mutex<u32>,
}

impl EnumSource {
    /// Build the input source and wire it to the enumeration context.
    /// Watchers are attached separately via `start_watchers`.
    pub fn new(
        cfg: Arc<Config>,
        asn_cache: Arc<dyn AsnCache>,
        qps: usize,
        ctx: &CancellationToken,
    ) -> Arc<Self> {
        let max = qps.max(MIN_QUEUE_BOUND);
        let (inputsig_tx, inputsig_rx) = mpsc::channel(max * 2);

        let src = Arc::new(Self {
            cfg,
            queue: SignalQueue::new(),
            dups: SignalQueue::new(),
            sweeps: SignalQueue::new(),
            accept_filter: StableBloomFilter::new_default(),
            sweep_filter: StableBloomFilter::new_default(),
            sweep_lock: AsyncMutex::new(()),
            asn_cache,
            done: CancellationToken::new(),
            release: Semaphore::new(max),
            inputsig_tx,
            inputsig_rx: std::sync::Mutex::new(Some(inputsig_rx)),
            sweep_kick: Notify::new(),
            max,
            count: std::sync::Mutex::new(0),
        });

        // Completion or termination of the enumeration stops the source.
        let me = src.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move {
            ctx.cancelled().await;
            me.mark_done();
        });

        // Sweep generation runs out of band, kicked by fill_queue.
        let me = src.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = me.done.cancelled() => break,
                    _ = me.sweep_kick.notified() => me.request_sweeps().await,
                }
            }
        });

        src
    }

    /// One watcher per data source.
    pub fn start_watchers(self: &Arc<Self>, srcs: &[Arc<dyn DataSource>]) {
        for src in srcs {
            if let Some(output) = src.take_output() {
                let me = self.clone();
                let src_done = src.done();
                tokio::spawn(async move {
                    me.monitor_output(output, src_done).await;
                });
            }
        }
    }

    pub fn mark_done(&self) {
        self.done.cancel();
    }

    pub fn done(&self) -> CancellationToken {
        self.done.clone()
    }

    /// Admission bound; also the sweep generator's fill target.
    pub fn max(&self) -> usize {
        self.max
    }

    /// Tear down: stop accepting, drop queued work, clear the filters.
    pub fn stop(&self) {
        self.mark_done();
        self.queue.drain();
        self.dups.drain();
        self.sweeps.drain();
        self.accept_filter.reset();
        self.sweep_filter.reset();
    }

    /// The duplicate tracker takes the sequence stream; valid once.
    pub(super) fn take_inputsig(&self) -> Option<mpsc::Receiver<u32>> {
        self.inputsig_rx.lock().expect("inputsig lock").take()
    }

    /// Submit a discovered name. Called by data-source watchers and the
    /// seeder.
    pub fn submit_name(&self, mut req: NameRequest) {
        if self.done.is_cancelled() || !req.valid() {
            return;
        }
        req.sanitize();
        if !SUBDOMAIN_RE.is_match(&req.name) {
            return;
        }
        // Service subdomains are not fed back into resolution.
        for label in req.name.split('.') {
            if matches!(label, "_tcp" | "_udp" | "_tls") {
                return;
            }
        }
        if self.cfg.blacklisted(&req.name) {
            return;
        }
        if self.accept(&req) {
            self.queue.append(Request::Name(req));
        }
    }

    /// Submit a discovered address.
    pub fn submit_addr(&self, req: AddrRequest) {
        if self.done.is_cancelled() {
            return;
        }
        if !req.valid() || !req.in_scope || !self.accept_addr(&req) {
            return;
        }

        let reserved = req
            .address
            .parse()
            .map(is_reserved)
            .unwrap_or(true);
        if !reserved {
            // Kept for later use in reverse sweeps.
            self.sweeps.append(req.clone());
        }
        self.queue.append(Request::Addr(req));
    }

    fn accept(&self, req: &NameRequest) -> bool {
        let trusted = req.tag.is_trusted();

        // Never resubmit a name from an untrusted source once a trusted
        // source has delivered it.
        if !trusted
            && self
                .accept_filter
                .test(fingerprint(&req.name, true).as_bytes())
        {
            self.dups
                .append(NameRequest::new(&req.name, "", req.tag, req.source.clone()));
            return false;
        }
        // At most one untrusted and one trusted acceptance per subject.
        if self
            .accept_filter
            .test(fingerprint(&req.name, trusted).as_bytes())
        {
            self.dups
                .append(NameRequest::new(&req.name, "", req.tag, req.source.clone()));
            return false;
        }

        self.accept_filter
            .add(fingerprint(&req.name, trusted).as_bytes());
        true
    }

    fn accept_addr(&self, req: &AddrRequest) -> bool {
        let trusted = req.tag.is_trusted();
        if !trusted
            && self
                .accept_filter
                .test(fingerprint(&req.address, true).as_bytes())
        {
            return false;
        }
        if self
            .accept_filter
            .test(fingerprint(&req.address, trusted).as_bytes())
        {
            return false;
        }
        self.accept_filter
            .add(fingerprint(&req.address, trusted).as_bytes());
        true
    }

    /// Replenish admission tokens in proportion to queue headroom, then
    /// kick the sweep generator to fill any remaining slack.
    pub(super) fn fill_queue(&self) {
        let unfilled = self.max.saturating_sub(self.queue.len());
        if unfilled == 0 {
            return;
        }
        let fill = unfilled.saturating_sub(self.release.available_permits());
        if fill > 0 {
            self.release.add_permits(fill);
        }
        self.sweep_kick.notify_one();
    }

    async fn monitor_output(
        self: Arc<Self>,
        mut output: mpsc::Receiver<Request>,
        src_done: CancellationToken,
    ) {
        loop {
            let req = tokio::select! {
                _ = self.done.cancelled() => return,
                _ = src_done.cancelled() => return,
                req = output.recv() => match req {
                    Some(req) => req,
                    None => return,
                },
            };

            // One admission token per payload.
            tokio::select! {
                _ = self.done.cancelled() => return,
                _ = src_done.cancelled() => return,
                permit = self.release.acquire() => match permit {
                    Ok(permit) => permit.forget(),
                    Err(_) => return,
                },
            }

            match req {
                Request::Name(r) => self.submit_name(r),
                Request::Addr(r) => self.submit_addr(r),
                // Other payload kinds are dropped here.
                _ => {}
            }
        }
    }

    pub(super) fn get_count(&self) -> u32 {
        *self.count.lock().expect("count lock")
    }

    fn increment_count(&self) -> u32 {
        let mut count = self.count.lock().expect("count lock");
        if *count < u32::MAX {
            *count += 1;
            *count
        } else {
            *count = 0;
            0
        }
    }
}

fn fingerprint(subject: &str, trusted: bool) -> String {
    format!("{subject}{trusted}")
}

#[async_trait]
impl InputSource for EnumSource {
    async fn has_next(&self, token: &CancellationToken) -> bool {
        // Low-water mark: below 10% of the bound, top the queue up now.
        if self.queue.len() * 10 < self.max {
            self.fill_queue();
        }

        let timer = tokio::time::sleep(WAIT_FOR_DURATION);
        tokio::pin!(timer);
        let mut check = tokio::time::interval(Duration::from_secs(1));
        check.tick().await; // the first tick is immediate

        loop {
            if !self.queue.is_empty() {
                return true;
            }
            tokio::select! {
                _ = self.done.cancelled() => return false,
                _ = token.cancelled() => {
                    self.mark_done();
                    return false;
                }
                _ = &mut timer => {
                    trace!("input source idle, winding down");
                    self.mark_done();
                    return false;
                }
                _ = self.queue.signal() => return true,
                _ = check.tick() => self.fill_queue(),
            }
        }
    }

    async fn take(&self) -> Option<Request> {
        let item = self.queue.next()?;
        // Signal that new input entered the pipeline.
        let _ = self.inputsig_tx.send(self.increment_count()).await;
        Some(item)
    }
}
