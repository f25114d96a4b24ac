//! Uniform random routing.

use crate::traits::*;
use rand::{Rng, RngCore};

/// Picks a server uniformly at random, ignoring all state.
#[derive(Debug, Clone, Default)]
pub struct RandomBalancer;

impl RandomBalancer {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancer for RandomBalancer {
    fn select(
        &mut self,
        view: &mut SourceView<'_>,
        _now_ms: f64,
        rng: &mut dyn RngCore,
    ) -> RoutingDecision {
        let n = view.server_count();
        if n == 0 {
            return RoutingDecision::Reject;
        }
        RoutingDecision::Route(rng.gen_range(0..n))
    }

    fn name(&self) -> &str {
        "random"
    }
}
