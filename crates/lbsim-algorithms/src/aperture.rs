//! Aperture routing: each source talks to a bounded subset of servers.
//!
//! The subset ("aperture") is drawn from a shuffled pool of every server
//! index. Its size starts at the lower bound and moves by one whenever the
//! mean outstanding load per member leaves `[min_ratio, max_ratio]`, at most
//! once per `min_refresh_period_ms`. Every `refresh_period_ms` one member is
//! rotated out and replaced by the next pool entry, which spreads sources over
//! the whole fleet over time. Within the subset the member with the lowest
//! [`Stats::predictive_load`](crate::Stats::predictive_load) wins.

use crate::traits::*;
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// How an aperture picks the member to rotate out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApertureVariant {
    /// Evict the member with the highest predictive load.
    Predictive,
    /// Evict a uniformly random member.
    Random,
    /// Never rotate; only grow and shrink.
    Static,
}

impl ApertureVariant {
    pub fn policy_name(self) -> &'static str {
        match self {
            ApertureVariant::Predictive => "aperture",
            ApertureVariant::Random => "aperture-random",
            ApertureVariant::Static => "aperture-static",
        }
    }
}

/// Aperture sizing and refresh parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApertureConfig {
    pub min_connections: usize,
    pub max_connections: usize,
    pub min_ratio: f64,
    pub max_ratio: f64,
    pub refresh_period_ms: f64,
    pub min_refresh_period_ms: f64,
}

impl Default for ApertureConfig {
    fn default() -> Self {
        Self {
            min_connections: 3,
            max_connections: 20,
            min_ratio: 1.0,
            max_ratio: 2.0,
            refresh_period_ms: 3000.0,
            min_refresh_period_ms: 1000.0,
        }
    }
}

impl ApertureConfig {
    /// Size bounds for `server_count` servers: `(lower, upper)`.
    pub fn bounds(&self, server_count: usize) -> (usize, usize) {
        if server_count == 0 {
            return (0, 0);
        }
        let lower = self.min_connections.min(server_count).max(1);
        let upper = self.max_connections.min(server_count).max(lower);
        (lower, upper)
    }
}

/// Aperture load balancer for one source.
#[derive(Debug, Clone)]
pub struct Aperture {
    variant: ApertureVariant,
    config: ApertureConfig,
    server_count: usize,
    /// Every server index, shuffled once per topology change.
    pool: Vec<usize>,
    pool_cursor: usize,
    subset: Vec<usize>,
    target: usize,
    last_rotation_ms: Option<f64>,
    last_resize_ms: Option<f64>,
    rotations: u64,
}

impl Aperture {
    pub fn new(
        variant: ApertureVariant,
        config: ApertureConfig,
        server_count: usize,
        rng: &mut dyn RngCore,
    ) -> Self {
        let mut aperture = Self {
            variant,
            config,
            server_count: 0,
            pool: Vec::new(),
            pool_cursor: 0,
            subset: Vec::new(),
            target: 0,
            last_rotation_ms: None,
            last_resize_ms: None,
            rotations: 0,
        };
        aperture.rebuild(server_count, rng);
        aperture
    }

    /// Current target subset size.
    pub fn target_size(&self) -> usize {
        self.target
    }

    fn rebuild(&mut self, server_count: usize, rng: &mut dyn RngCore) {
        let old = self.server_count;
        self.server_count = server_count;

        self.pool.retain(|&s| s < server_count);
        self.pool.extend(old..server_count);
        self.pool.shuffle(rng);
        self.pool_cursor = 0;

        self.subset.retain(|&s| s < server_count);
        let (lower, upper) = self.config.bounds(server_count);
        self.target = self.target.clamp(lower, upper);
        self.subset.truncate(self.target);
        self.fill(None);
    }

    /// Top the subset up to the target size from the pool, skipping
    /// `exclude` unless nothing else is left.
    fn fill(&mut self, exclude: Option<usize>) {
        let len = self.pool.len();
        let mut steps = 0;
        while self.subset.len() < self.target && steps < len {
            let candidate = self.pool[self.pool_cursor % len];
            self.pool_cursor = (self.pool_cursor + 1) % len;
            steps += 1;
            if Some(candidate) != exclude && !self.subset.contains(&candidate) {
                self.subset.push(candidate);
            }
        }
        if let Some(evicted) = exclude {
            if self.subset.len() < self.target && !self.subset.contains(&evicted) {
                self.subset.push(evicted);
            }
        }
    }

    /// Index within `subset` of the member with the highest predictive load.
    fn worst_member(&self, view: &mut SourceView<'_>, now_ms: f64) -> Option<usize> {
        let mut worst: Option<(usize, f64)> = None;
        for (pos, &server) in self.subset.iter().enumerate() {
            let load = view.stats[server].predictive_load(now_ms);
            if worst.map_or(true, |(_, w)| load > w) {
                worst = Some((pos, load));
            }
        }
        worst.map(|(pos, _)| pos)
    }

    fn maybe_resize(&mut self, view: &mut SourceView<'_>, now_ms: f64) {
        if self.subset.is_empty() {
            return;
        }
        if let Some(last) = self.last_resize_ms {
            if now_ms - last < self.config.min_refresh_period_ms {
                return;
            }
        }

        let total: u64 = self.subset.iter().map(|&s| u64::from(view.load[s])).sum();
        let mean = total as f64 / self.subset.len() as f64;
        let (lower, upper) = self.config.bounds(self.server_count);

        if mean > self.config.max_ratio && self.target < upper {
            self.target += 1;
            self.fill(None);
            self.last_resize_ms = Some(now_ms);
            debug!(size = self.target, mean, "aperture growing");
        } else if mean < self.config.min_ratio && self.target > lower {
            self.target -= 1;
            if let Some(pos) = self.worst_member(view, now_ms) {
                self.subset.remove(pos);
            }
            self.last_resize_ms = Some(now_ms);
            debug!(size = self.target, mean, "aperture shrinking");
        }
    }

    fn maybe_rotate(&mut self, view: &mut SourceView<'_>, now_ms: f64, rng: &mut dyn RngCore) {
        let last = *self.last_rotation_ms.get_or_insert(now_ms);
        if self.variant == ApertureVariant::Static
            || now_ms - last < self.config.refresh_period_ms
            || self.subset.is_empty()
        {
            return;
        }
        self.last_rotation_ms = Some(now_ms);

        // A full aperture has nothing to rotate in.
        if self.subset.len() >= self.server_count {
            return;
        }

        let pos = match self.variant {
            ApertureVariant::Predictive => self.worst_member(view, now_ms),
            ApertureVariant::Random => Some(rng.gen_range(0..self.subset.len())),
            ApertureVariant::Static => None,
        };
        if let Some(pos) = pos {
            let evicted = self.subset.remove(pos);
            self.fill(Some(evicted));
            self.rotations += 1;
            debug!(evicted, subset = ?self.subset, "aperture rotated");
        }
    }
}

impl LoadBalancer for Aperture {
    fn select(
        &mut self,
        view: &mut SourceView<'_>,
        now_ms: f64,
        rng: &mut dyn RngCore,
    ) -> RoutingDecision {
        let n = view.server_count();
        if n == 0 {
            return RoutingDecision::Reject;
        }
        if n != self.server_count {
            self.rebuild(n, rng);
        }

        self.maybe_rotate(view, now_ms, rng);
        self.maybe_resize(view, now_ms);

        let mut best: Option<(usize, f64)> = None;
        for &server in &self.subset {
            let load = view.stats[server].predictive_load(now_ms);
            if best.map_or(true, |(_, b)| load < b) {
                best = Some((server, load));
            }
        }

        match best {
            Some((server, _)) => RoutingDecision::Route(server),
            None => RoutingDecision::Reject,
        }
    }

    fn resize(&mut self, server_count: usize, rng: &mut dyn RngCore) {
        self.rebuild(server_count, rng);
    }

    fn name(&self) -> &str {
        self.variant.policy_name()
    }

    fn subset(&self) -> Option<&[usize]> {
        Some(&self.subset)
    }

    fn custom_metrics(&self) -> HashMap<String, f64> {
        let mut m = HashMap::new();
        m.insert("aperture_size".to_string(), self.subset.len() as f64);
        m.insert("aperture_rotations".to_string(), self.rotations as f64);
        m
    }
}
