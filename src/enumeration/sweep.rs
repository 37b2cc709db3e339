//! Reverse sweep generation.
//!
//! When pipeline input runs low, previously accepted addresses are
//! expanded into nearby address space so the dns stage stays busy with
//! reverse lookups. Each generation pass holds the sweep lock; passes
//! stop as soon as the queue is back at its bound. A given address is
//! swept at most once per enumeration.

use std::net::IpAddr;

use tracing::debug;

use super::input::EnumSource;
use crate::netutil::{cidr_subset, fallback_cidr};
use crate::requests::{AddrRequest, Request};

/// Sweep width in passive-DNS mode.
pub const DEFAULT_SWEEP_SIZE: usize = 100;

/// Sweep width when active probing is enabled.
pub const ACTIVE_SWEEP_SIZE: usize = 200;

impl EnumSource {
    /// One generation pass: pop sweep seeds until the queue is full or the
    /// seeds run out.
    pub(super) async fn request_sweeps(&self) {
        let _guard = self.sweep_lock.lock().await;

        loop {
            if self.queue.len() >= self.max() {
                break;
            }
            let Some(seed) = self.sweeps.next() else {
                break;
            };
            self.sweep_addrs(seed);
        }
    }

    /// Expand one seed address into a centered window of its enclosing
    /// CIDR, queueing every address not yet swept.
    fn sweep_addrs(&self, seed: AddrRequest) -> usize {
        let size = if self.cfg.active {
            ACTIVE_SWEEP_SIZE
        } else {
            DEFAULT_SWEEP_SIZE
        };

        let Ok(addr) = seed.address.parse::<IpAddr>() else {
            return 0;
        };
        let cidr = self
            .asn_cache
            .addr_search(addr)
            .unwrap_or_else(|| fallback_cidr(addr));

        let mut count = 0;
        for ip in cidr_subset(&cidr, addr, size) {
            if self.done().is_cancelled() {
                return count;
            }

            let a = ip.to_string();
            if !self.sweep_filter.test_and_add(a.as_bytes()) {
                count += 1;
                self.queue.append(Request::Addr(AddrRequest {
                    address: a,
                    in_scope: false,
                    domain: seed.domain.clone(),
                    tag: seed.tag,
                    source: seed.source.clone(),
                }));
            }
        }
        debug!(seed = %seed.address, generated = count, "reverse sweep expansion");
        count
    }
}
