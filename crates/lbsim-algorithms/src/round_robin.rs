//! Round-robin routing.
//!
//! Each source cycles through the servers in index order. The starting
//! position is randomised per source so that sources created together do not
//! hit the same server in lockstep.

use crate::traits::*;
use rand::RngCore;

/// Round-robin router.
///
/// The cursor is taken modulo the current server count on every call, so a
/// resize never produces an out-of-range index.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    /// Create a router whose first pick is `offset mod n`.
    pub fn new(offset: usize) -> Self {
        Self { cursor: offset }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new(0)
    }
}

impl LoadBalancer for RoundRobin {
    fn select(
        &mut self,
        view: &mut SourceView<'_>,
        _now_ms: f64,
        _rng: &mut dyn RngCore,
    ) -> RoutingDecision {
        let n = view.server_count();
        if n == 0 {
            return RoutingDecision::Reject;
        }
        let chosen = self.cursor % n;
        self.cursor = self.cursor.wrapping_add(1);
        RoutingDecision::Route(chosen)
    }

    fn name(&self) -> &str {
        "roundrobin"
    }
}
