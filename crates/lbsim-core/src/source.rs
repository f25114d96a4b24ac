//! Simulated request source.
//!
//! A source keeps, for every server slot, how many requests it has
//! outstanding there and the [`Stats`] of that link, plus its own load
//! balancer instance.

use crate::snapshot::{LinkSnapshot, SourceSnapshot};
use lbsim_algorithms::{LoadBalancer, RoutingDecision, SourceView, Stats};
use rand::RngCore;

pub struct Source {
    pub id: usize,
    pub active: bool,
    /// Bumped each time a retired slot is reactivated; requests carry the
    /// generation they were emitted under.
    pub generation: u64,
    load: Vec<u32>,
    stats: Vec<Stats>,
    balancer: Box<dyn LoadBalancer>,
    pub emitted: u64,
}

impl Source {
    pub fn new(
        id: usize,
        server_slots: usize,
        balancer: Box<dyn LoadBalancer>,
        now_ms: f64,
        inactivity_period_ms: f64,
    ) -> Self {
        Self {
            id,
            active: true,
            generation: 0,
            load: vec![0; server_slots],
            stats: (0..server_slots)
                .map(|_| Stats::new(now_ms, inactivity_period_ms))
                .collect(),
            balancer,
            emitted: 0,
        }
    }

    /// Pick a destination among the first `server_count` servers.
    pub fn route(
        &mut self,
        server_count: usize,
        now_ms: f64,
        rng: &mut dyn RngCore,
    ) -> RoutingDecision {
        let n = server_count.min(self.load.len());
        let mut view = SourceView::new(&self.load[..n], &mut self.stats[..n]);
        match self.balancer.select(&mut view, now_ms, rng) {
            RoutingDecision::Route(id) if id >= n => RoutingDecision::Reject,
            decision => decision,
        }
    }

    /// Account for a request sent to `server`.
    pub fn on_send(&mut self, server: usize, now_ms: f64) {
        if let (Some(load), Some(stats)) = (self.load.get_mut(server), self.stats.get_mut(server)) {
            *load += 1;
            stats.on_send(now_ms);
            self.emitted += 1;
        }
    }

    /// Account for a response (or a cancellation charged as one) from
    /// `server`. Returns the RTT fed to the link's median.
    pub fn on_complete(&mut self, server: usize, now_ms: f64, original_send_ms: f64) -> Option<f64> {
        let load = self.load.get_mut(server)?;
        *load = load.saturating_sub(1);
        let stats = self.stats.get_mut(server)?;
        Some(stats.on_complete(now_ms, original_send_ms))
    }

    /// Make sure link vectors cover `slots` servers.
    pub fn ensure_slots(&mut self, slots: usize, now_ms: f64, inactivity_period_ms: f64) {
        if self.load.len() < slots {
            self.load.resize(slots, 0);
        }
        while self.stats.len() < slots {
            self.stats.push(Stats::new(now_ms, inactivity_period_ms));
        }
    }

    /// Forget everything about the link to `server`.
    pub fn reset_link(&mut self, server: usize, now_ms: f64, inactivity_period_ms: f64) {
        self.ensure_slots(server + 1, now_ms, inactivity_period_ms);
        self.load[server] = 0;
        self.stats[server] = Stats::new(now_ms, inactivity_period_ms);
    }

    pub fn set_inactivity_period(&mut self, ms: f64) {
        for stats in &mut self.stats {
            stats.set_inactivity_period_ms(ms);
        }
    }

    /// Reconcile the balancer with a new server count.
    pub fn resize_balancer(&mut self, server_count: usize, rng: &mut dyn RngCore) {
        self.balancer.resize(server_count, rng);
    }

    pub fn replace_balancer(&mut self, balancer: Box<dyn LoadBalancer>) {
        self.balancer = balancer;
    }

    /// Retire the slot.
    pub fn retire(&mut self) {
        self.active = false;
    }

    /// Reactivate a retired slot with fresh links and a new balancer.
    pub fn reactivate(
        &mut self,
        balancer: Box<dyn LoadBalancer>,
        now_ms: f64,
        inactivity_period_ms: f64,
    ) {
        let slots = self.load.len();
        self.active = true;
        self.generation += 1;
        self.load = vec![0; slots];
        self.stats = (0..slots)
            .map(|_| Stats::new(now_ms, inactivity_period_ms))
            .collect();
        self.balancer = balancer;
        self.emitted = 0;
    }

    pub fn load(&self) -> &[u32] {
        &self.load
    }

    pub fn stats(&self) -> &[Stats] {
        &self.stats
    }

    pub fn balancer(&self) -> &dyn LoadBalancer {
        self.balancer.as_ref()
    }

    /// Snapshot the first `server_count` links. Reading predictive load may
    /// decay idle links.
    pub fn snapshot(&mut self, server_count: usize, now_ms: f64) -> SourceSnapshot {
        let n = server_count.min(self.load.len());
        let subset = self.balancer.subset().map(<[usize]>::to_vec);
        let links = (0..n)
            .map(|server| {
                let stats = &mut self.stats[server];
                LinkSnapshot {
                    server,
                    load: self.load[server],
                    outstanding: stats.outstanding(),
                    median_ms: stats.median(),
                    predictive_load: stats.predictive_load(now_ms),
                    in_subset: subset.as_ref().map_or(true, |s| s.contains(&server)),
                }
            })
            .collect();
        SourceSnapshot {
            id: self.id,
            emitted: self.emitted,
            links,
        }
    }
}
