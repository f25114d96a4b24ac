//! Load balancer trait definitions.
//!
//! Every source owns one [`LoadBalancer`] instance. On each emitted request
//! the simulator hands it a [`SourceView`] of that source's per-server
//! outstanding counts and link statistics and asks for a destination.

use crate::stats::Stats;
use rand::RngCore;
use std::collections::HashMap;

/// A source's view of every server, indexed by server id.
///
/// `stats` is mutable because reading a link's predictive load may decay
/// an idle link's median.
pub struct SourceView<'a> {
    /// Outstanding requests from this source per server.
    pub load: &'a [u32],
    /// Link statistics from this source per server.
    pub stats: &'a mut [Stats],
}

impl<'a> SourceView<'a> {
    pub fn new(load: &'a [u32], stats: &'a mut [Stats]) -> Self {
        debug_assert_eq!(load.len(), stats.len());
        Self { load, stats }
    }

    /// Number of servers visible to the source.
    pub fn server_count(&self) -> usize {
        self.load.len().min(self.stats.len())
    }
}

/// Decision returned by a load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Send to the server with this index.
    Route(usize),
    /// No server is available.
    Reject,
}

impl RoutingDecision {
    pub fn server(self) -> Option<usize> {
        match self {
            RoutingDecision::Route(id) => Some(id),
            RoutingDecision::Reject => None,
        }
    }
}

/// The per-source load balancing policy.
///
/// Implementations must never return an index at or beyond
/// [`SourceView::server_count`].
pub trait LoadBalancer: Send {
    /// Pick a destination server for the next request.
    fn select(
        &mut self,
        view: &mut SourceView<'_>,
        now_ms: f64,
        rng: &mut dyn RngCore,
    ) -> RoutingDecision;

    /// Reconcile internal state after the server count changed.
    fn resize(&mut self, _server_count: usize, _rng: &mut dyn RngCore) {}

    /// Policy name for reports.
    fn name(&self) -> &str;

    /// The subset of servers this balancer currently restricts itself to,
    /// if it keeps one.
    fn subset(&self) -> Option<&[usize]> {
        None
    }

    /// Optional: policy-specific metrics to include in output.
    fn custom_metrics(&self) -> HashMap<String, f64> {
        HashMap::new()
    }
}
