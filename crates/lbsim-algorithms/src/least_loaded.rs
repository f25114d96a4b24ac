//! Least-loaded routing.
//!
//! Routes each request to the server with the fewest requests outstanding
//! from this source. Ties are broken uniformly at random so that idle
//! servers share traffic instead of the lowest index absorbing it all.

use crate::traits::*;
use rand::{Rng, RngCore};

/// Least outstanding requests router.
#[derive(Debug, Clone, Default)]
pub struct LeastLoaded {
    candidates: Vec<usize>,
}

impl LeastLoaded {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for LeastLoaded {
    fn select(
        &mut self,
        view: &mut SourceView<'_>,
        _now_ms: f64,
        rng: &mut dyn RngCore,
    ) -> RoutingDecision {
        let n = view.server_count();
        let Some(&min) = view.load[..n].iter().min() else {
            return RoutingDecision::Reject;
        };

        self.candidates.clear();
        self.candidates.extend(
            view.load[..n]
                .iter()
                .enumerate()
                .filter(|(_, l)| **l == min)
                .map(|(i, _)| i),
        );

        let pick = rng.gen_range(0..self.candidates.len());
        RoutingDecision::Route(self.candidates[pick])
    }

    fn name(&self) -> &str {
        "leastloaded"
    }
}
