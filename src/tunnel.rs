//! Tunnel dispatcher (spec §4.3): routes a package to one or more tunnel
//! ids, skipping self-delivery, and the periodic other→worker health
//! broadcast. Grounded on `global::tunnel_id` usage and
//! `other_app::on_other_tick`/`on_other_tunnel` in `other_app.cpp`.

use std::collections::HashMap;

use crate::error::Error;
use crate::ids::TunnelId;
use crate::proto::{ProtoPackage, TunnelPackage};

/// A destination's inbound queue. Delivery is in-order per destination;
/// there is no ordering guarantee across destinations.
pub trait TunnelSink {
    fn deliver(&mut self, package: ProtoPackage) -> Result<(), Error>;
}

/// Process-wide table of every tunnel endpoint reachable from this process,
/// standing in for `global::tunnel_id`'s worker/other id bookkeeping.
#[derive(Default)]
pub struct TunnelRegistry<S: TunnelSink> {
    sinks: HashMap<TunnelId, S>,
    worker_tunnel_ids: Vec<TunnelId>,
    other_tunnel_id: Option<TunnelId>,
}

impl<S: TunnelSink> TunnelRegistry<S> {
    pub fn new() -> Self {
        Self {
            sinks: HashMap::new(),
            worker_tunnel_ids: Vec::new(),
            other_tunnel_id: None,
        }
    }

    pub fn register_worker(&mut self, id: TunnelId, sink: S) {
        self.worker_tunnel_ids.push(id);
        self.sinks.insert(id, sink);
    }

    pub fn register_other(&mut self, id: TunnelId, sink: S) {
        self.other_tunnel_id = Some(id);
        self.sinks.insert(id, sink);
    }

    pub fn worker_tunnel_ids(&self) -> &[TunnelId] {
        &self.worker_tunnel_ids
    }

    pub fn other_tunnel_id(&self) -> Option<TunnelId> {
        self.other_tunnel_id
    }

    /// Forwards `package` to every id in `destinations`, skipping delivery
    /// back to `source`. Unknown destination ids are logged and skipped —
    /// a destination going away mid-broadcast does not abort the rest.
    pub fn tunnel_forward(
        &mut self,
        source: TunnelId,
        destinations: &[TunnelId],
        package: ProtoPackage,
    ) {
        for &destination in destinations {
            if destination == source {
                continue;
            }
            match self.sinks.get_mut(&destination) {
                Some(sink) => {
                    if let Err(err) = sink.deliver(package.clone()) {
                        log::error!(
                            "tunnel_forward delivery to {} failed: {}",
                            destination,
                            err
                        );
                    }
                }
                None => {
                    log::error!("tunnel_forward unknown destination tunnel id {}", destination);
                }
            }
        }
    }

    /// Builds the envelope form of a forward, for transports that carry the
    /// source/destination list alongside the package (spec §3 `TunnelPackage`).
    pub fn envelope(
        &self,
        source: TunnelId,
        destinations: Vec<TunnelId>,
        inner: ProtoPackage,
    ) -> TunnelPackage {
        TunnelPackage {
            source_tunnel_id: source,
            destination_tunnel_ids: destinations,
            inner,
        }
    }
}

/// Tracks the other-process tick's `abs(now - latest) >= 5` firing rule
/// (spec §4.3, preserved as-is — it fires on backward clock jumps too).
#[derive(Debug, Default)]
pub struct HealthBroadcastTimer {
    latest_tick_time: i64,
}

impl HealthBroadcastTimer {
    pub fn new() -> Self {
        Self {
            latest_tick_time: 0,
        }
    }

    /// Returns `true` (and records `now`) if a broadcast should fire.
    pub fn should_fire(&mut self, now: i64) -> bool {
        if (now - self.latest_tick_time).abs() >= 5 {
            self.latest_tick_time = now;
            true
        } else {
            false
        }
    }
}
