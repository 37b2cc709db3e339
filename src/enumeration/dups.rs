//! Duplicate sighting tracker.
//!
//! When a name is rediscovered by a second source, the graph should end
//! up recording both discoverers. The rediscovery may arrive before the
//! original insertion has reached the graph, so attribution is retried
//! after enough further pipeline inputs have passed that the insertion
//! has almost certainly landed. The pipeline input counter is 32 bits and
//! wraps; entries whose gate would straddle the wrap start at zero.

use std::sync::Arc;

use tracing::debug;

use super::input::EnumSource;
use crate::graph::GraphStore;
use crate::requests::{NameRequest, Tag};

struct AltSource {
    name: String,
    source: String,
    min: u32,
    countdown: i64,
}

/// Long-running task consuming duplicate sightings and pipeline input
/// signals. Returns after the input source is done and a final flush has
/// been attempted.
pub(super) async fn process_dup_names(
    src: Arc<EnumSource>,
    graph: Arc<dyn GraphStore>,
    uuid: String,
) {
    let countdown = (src.max() as i64) * 2;
    let inc = (src.max() as u32).saturating_mul(2);

    let Some(mut inputsig) = src.take_inputsig() else {
        return;
    };

    let mut pending: Vec<AltSource> = Vec::new();
    let done = src.done();

    loop {
        tokio::select! {
            _ = done.cancelled() => break,
            _ = src.dups.signal() => {
                while let Some(req) = src.dups.next() {
                    record_sighting(&src, &graph, &uuid, req, countdown, inc, &mut pending).await;
                }
            }
            num = inputsig.recv() => {
                let Some(num) = num else { break };
                let mut i = 0;
                while i < pending.len() {
                    if num >= pending[i].min {
                        pending[i].countdown -= 1;
                    }
                    if pending[i].countdown <= 0 {
                        let a = pending.swap_remove(i);
                        let graph = graph.clone();
                        let uuid = uuid.clone();
                        tokio::spawn(async move {
                            add_source_to_entry(&*graph, &uuid, &a.name, &a.source).await;
                        });
                    } else {
                        i += 1;
                    }
                }
            }
        }
    }

    // Last attempt to update the source attributions.
    while let Some(req) = src.dups.next() {
        record_sighting(&src, &graph, &uuid, req, countdown, inc, &mut pending).await;
    }
    for a in pending {
        add_source_to_entry(&*graph, &uuid, &a.name, &a.source).await;
    }
}

async fn record_sighting(
    src: &Arc<EnumSource>,
    graph: &Arc<dyn GraphStore>,
    uuid: &str,
    req: NameRequest,
    countdown: i64,
    inc: u32,
    pending: &mut Vec<AltSource>,
) {
    if add_source_to_entry(&**graph, uuid, &req.name, &req.source).await {
        return;
    }
    // Brute-force and alteration guesses are not worth deferred
    // attribution.
    if req.tag == Tag::Brute || req.tag == Tag::Alt {
        return;
    }

    let mut min = src.get_count();
    if u32::MAX - min < inc {
        min = 0;
    }
    debug!(name = %req.name, source = %req.source, "deferring duplicate attribution");
    pending.push(AltSource {
        name: req.name,
        source: req.source,
        min,
        countdown,
    });
}

/// Attach `source` to an existing FQDN node; false when the node is not
/// in the graph yet.
async fn add_source_to_entry(graph: &dyn GraphStore, uuid: &str, name: &str, source: &str) -> bool {
    if graph.read_node(name, "fqdn").await.is_ok() {
        let _ = graph.upsert_fqdn(name, source, uuid).await;
        return true;
    }
    false
}
