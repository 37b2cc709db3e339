//! Fan-out of externally submitted requests to the data sources.
//!
//! Every accepted request is delivered to every registered source,
//! preserving per-source submission order with at most one delivery in
//! flight per source at any instant. A dead or slow source never blocks
//! the broker: the delivery primitive races the handoff against the
//! broker's and the source's shutdown signals.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::requests::Request;
use crate::sources::DataSource;

pub struct RequestBroker {
    tx: mpsc::UnboundedSender<Request>,
}

impl RequestBroker {
    /// Spawn the broker over the given sources. It runs until `done` is
    /// cancelled, then drains whatever is still queued without delivery.
    pub fn new(srcs: &[Arc<dyn DataSource>], done: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        let handles: Vec<(String, mpsc::Sender<Request>, CancellationToken)> = srcs
            .iter()
            .map(|s| (s.name().to_string(), s.input(), s.done()))
            .collect();
        tokio::spawn(manage(handles, rx, done));

        Self { tx }
    }

    /// Submit a request for fan-out. Never blocks.
    pub fn send(&self, req: Request) {
        let _ = self.tx.send(req);
    }
}

async fn manage(
    handles: Vec<(String, mpsc::Sender<Request>, CancellationToken)>,
    mut rx: mpsc::UnboundedReceiver<Request>,
    done: CancellationToken,
) {
    let mut pending: HashMap<String, bool> = HashMap::new();
    let mut backlog: HashMap<String, VecDeque<Request>> = HashMap::new();
    for (name, _, _) in &handles {
        pending.insert(name.clone(), false);
        backlog.insert(name.clone(), VecDeque::new());
    }
    let by_name: HashMap<String, (mpsc::Sender<Request>, CancellationToken)> = handles
        .into_iter()
        .map(|(name, input, src_done)| (name, (input, src_done)))
        .collect();

    let (fin_tx, mut fin_rx) = mpsc::channel::<String>(by_name.len().max(1));

    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            req = rx.recv() => {
                let Some(req) = req else { break };
                for (name, (input, src_done)) in &by_name {
                    let queue = backlog.get_mut(name).expect("backlog entry");
                    let busy = *pending.get(name).expect("pending entry");
                    if queue.is_empty() && !busy {
                        pending.insert(name.clone(), true);
                        fire_request(
                            name.clone(),
                            input.clone(),
                            src_done.clone(),
                            done.clone(),
                            req.clone(),
                            fin_tx.clone(),
                        );
                    } else {
                        queue.push_back(req.clone());
                    }
                }
            }
            name = fin_rx.recv() => {
                let Some(name) = name else { break };
                let queue = backlog.get_mut(&name).expect("backlog entry");
                match queue.pop_front() {
                    Some(next) => {
                        let (input, src_done) = by_name.get(&name).expect("source handle");
                        fire_request(
                            name,
                            input.clone(),
                            src_done.clone(),
                            done.clone(),
                            next,
                            fin_tx.clone(),
                        );
                    }
                    None => {
                        pending.insert(name, false);
                    }
                }
            }
        }
    }

    // Drain without delivery.
    while rx.try_recv().is_ok() {}
    trace!("request broker drained");
}

/// Async hand-off that can never wedge on a dead source. Whatever the
/// outcome, a finished signal carrying the source name follows.
fn fire_request(
    name: String,
    input: mpsc::Sender<Request>,
    src_done: CancellationToken,
    done: CancellationToken,
    req: Request,
    fin_tx: mpsc::Sender<String>,
) {
    tokio::spawn(async move {
        tokio::select! {
            _ = done.cancelled() => {}
            _ = src_done.cancelled() => {}
            _ = input.send(req) => {}
        }
        let _ = fin_tx.send(name).await;
    });
}
