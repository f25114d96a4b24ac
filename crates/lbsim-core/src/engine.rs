//! Discrete-event simulation engine.
//!
//! The engine maintains a priority queue of [`SimEvent`]s sorted by virtual
//! timestamp. Each step pops the next event, advances the virtual clock and
//! processes the event, which may schedule further events. Sources, servers
//! and the requests travelling between them are all owned here.
//!
//! Model durations (network delay, processing latency, GC pauses, emission
//! intervals) are divided by `[simulation].time_scale` when scheduled.
//! Recorded latencies stay in model milliseconds.

use crate::clock::{ms_to_us, SimClock};
use crate::config::{ConfigError, SimConfig};
use crate::distributions::normal_random;
use crate::histogram::WindowedHistogram;
use crate::latency_series::LatencySeries;
use crate::metrics::{MetricsCollector, RequestMetric, RunSummary, SimulationMetrics};
use crate::request::Request;
use crate::scheduler::EventQueue;
use crate::server::{ProcessStep, Server};
use crate::snapshot::{HistogramSnapshot, SimulationSnapshot};
use crate::source::Source;
use lbsim_algorithms::{Policy, RoutingDecision};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, trace};

/// RTT charged to a source for every request lost with its server.
pub const CANCEL_PENALTY_MS: f64 = 60_000.0;

/// Events in the discrete-event simulation.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    /// A random source emits a request; reschedules itself.
    EmitRequest,
    /// A request finished a network leg (either direction).
    NetworkLegComplete { request_id: u64 },
    /// A server's processing timer fired.
    ProcessQueue { server: usize, timer: u64 },
    /// A GC pause on a server elapsed.
    GcPauseEnd {
        server: usize,
        timer: u64,
        pause_ms: f64,
    },
    /// Periodic GC on a random server; reschedules itself.
    GcTick,
}

/// The main simulation driver.
pub struct Simulation {
    clock: SimClock,
    events: EventQueue<SimEvent>,
    rng: ChaCha8Rng,
    config: SimConfig,
    /// Source slots; the first `source_count` are live.
    sources: Vec<Source>,
    /// Server slots; the first `server_count` are live.
    servers: Vec<Server>,
    source_count: usize,
    server_count: usize,
    /// Requests crossing the network, keyed by id.
    in_flight: BTreeMap<u64, Request>,
    histogram: WindowedHistogram,
    latency: LatencySeries,
    metrics: MetricsCollector,
    next_request_id: u64,
    next_timer: u64,
    started: bool,
    emitting: bool,
    gc_ticking: bool,
    /// Total events processed.
    pub events_processed: u64,
}

impl Simulation {
    /// Build a simulation from a validated config. Nothing is scheduled
    /// until [`start`](Self::start).
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut rng = ChaCha8Rng::seed_from_u64(config.simulation.seed);
        let server_count = config.servers.count;
        let source_count = config.sources.count;
        let latency_model = config.latency_model();
        let inactivity = config.predictive.inactivity_period_ms;
        let aperture = config.aperture_config();

        let servers = (0..server_count)
            .map(|id| Server::new(id, latency_model))
            .collect();
        let sources = (0..source_count)
            .map(|id| {
                let balancer = config.balancer.policy.build(&aperture, server_count, &mut rng);
                Source::new(id, server_count, balancer, 0.0, inactivity)
            })
            .collect();

        let h = &config.histogram;
        let histogram = WindowedHistogram::new(h.slots, h.period_ms, h.bucket_ms, h.max_duration_ms);
        let ls = &config.latency_series;
        let latency = LatencySeries::new(ls.window_ms, ls.median_window, ls.smoothing_ms);
        let metrics = MetricsCollector::with_record_limit(config.simulation.max_records);

        Ok(Self {
            clock: SimClock::new(),
            events: EventQueue::new(),
            rng,
            config,
            sources,
            servers,
            source_count,
            server_count,
            in_flight: BTreeMap::new(),
            histogram,
            latency,
            metrics,
            next_request_id: 0,
            next_timer: 0,
            started: false,
            emitting: false,
            gc_ticking: false,
            events_processed: 0,
        })
    }

    /// Begin emitting requests and, if configured, periodic GC.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        info!(
            name = %self.config.simulation.name,
            policy = %self.config.balancer.policy,
            sources = self.source_count,
            servers = self.server_count,
            "Simulation started"
        );
        self.ensure_emitting();
        self.ensure_gc_ticking();
    }

    /// Current virtual time in milliseconds.
    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms_f64()
    }

    /// Process the next event. Returns `false` when the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some(timed) = self.events.pop() else {
            return false;
        };
        self.clock.advance_to_us(timed.time_us);
        self.events_processed += 1;
        trace!(t = self.now_ms(), event = ?timed.event, "Event");
        self.process_event(timed.event);
        true
    }

    /// Process every event due at or before `until_ms`, then move the clock
    /// there. Returns the number of events processed.
    pub fn run_until(&mut self, until_ms: f64) -> u64 {
        let until = ms_to_us(until_ms);
        let mut processed = 0;
        while self.events.peek_time().is_some_and(|t| t <= until) {
            self.step();
            processed += 1;
        }
        if self.clock.now_us() < until {
            self.clock.advance_to_us(until);
        }
        processed
    }

    /// [`run_until`](Self::run_until) `now + ms`.
    pub fn run_for(&mut self, ms: f64) -> u64 {
        self.run_until(self.now_ms() + ms)
    }

    /// Stop the run and summarise it. Pending events are discarded; requests
    /// still on the wire or queued are reported as in flight.
    pub fn shutdown(&mut self) -> SimulationMetrics {
        let metrics = self.metrics();

        self.events.clear();
        self.started = false;
        self.emitting = false;
        self.gc_ticking = false;

        info!(
            t = self.now_ms(),
            completed = metrics.completed_requests,
            in_flight = metrics.in_flight_requests,
            "Simulation stopped"
        );
        metrics
    }

    /// Summary of the run so far, without stopping it.
    pub fn metrics(&mut self) -> SimulationMetrics {
        let queued: usize = self.servers[..self.server_count]
            .iter()
            .map(|s| s.queue.len())
            .sum();
        self.summarize((self.in_flight.len() + queued) as u64)
    }

    fn summarize(&mut self, in_flight: u64) -> SimulationMetrics {
        let now = self.now_ms();
        self.histogram.advance(now);
        let run = RunSummary {
            duration_ms: self.clock.now_ms(),
            in_flight,
            windowed_p50_ms: self.histogram.percentile_ms(0.5),
            windowed_p99_ms: self.histogram.percentile_ms(0.99),
            custom_metrics: self.policy_metrics(),
        };
        self.metrics.aggregate(
            self.config.balancer.policy.name(),
            &self.servers[..self.server_count],
            run,
        )
    }

    /// Policy metrics averaged over live sources.
    fn policy_metrics(&self) -> HashMap<String, f64> {
        let live = &self.sources[..self.source_count];
        let mut totals: HashMap<String, f64> = HashMap::new();
        for source in live {
            for (key, value) in source.balancer().custom_metrics() {
                *totals.entry(key).or_insert(0.0) += value;
            }
        }
        let n = live.len().max(1) as f64;
        totals.values_mut().for_each(|v| *v /= n);
        totals
    }

    fn schedule_after(&mut self, model_ms: f64, event: SimEvent) {
        let delay_us = ms_to_us(model_ms / self.config.simulation.time_scale);
        let at = self.clock.now_us().saturating_add(delay_us);
        self.events.schedule_at(at, event);
    }

    fn next_timer(&mut self) -> u64 {
        self.next_timer += 1;
        self.next_timer
    }

    fn process_event(&mut self, event: SimEvent) {
        match event {
            SimEvent::EmitRequest => self.handle_emit_tick(),
            SimEvent::NetworkLegComplete { request_id } => self.handle_leg_complete(request_id),
            SimEvent::ProcessQueue { server, timer } => {
                if self.fire_timer(server, timer) {
                    self.process_server(server);
                }
            }
            SimEvent::GcPauseEnd {
                server,
                timer,
                pause_ms,
            } => {
                if self.fire_timer(server, timer) {
                    self.servers[server].finish_gc(pause_ms);
                    self.process_server(server);
                }
            }
            SimEvent::GcTick => self.handle_gc_tick(),
        }
    }

    fn fire_timer(&mut self, server: usize, timer: u64) -> bool {
        server < self.server_count && self.servers[server].fire_timer(timer)
    }

    // --- Emission ---

    fn ensure_emitting(&mut self) {
        if self.started
            && !self.emitting
            && !self.config.simulation.emit_paused
            && self.config.sources.global_rps > 0.0
        {
            self.emitting = true;
            self.events
                .schedule_at(self.clock.now_us(), SimEvent::EmitRequest);
        }
    }

    fn handle_emit_tick(&mut self) {
        let rps = self.config.sources.global_rps;
        if self.config.simulation.emit_paused || rps <= 0.0 {
            self.emitting = false;
            debug!(t = self.now_ms(), "Emission stopped");
            return;
        }
        self.emit_request();
        // Mean of normal_random() is 0.5, so the factor 2 keeps the mean
        // interval at 1000 / rps.
        let dt = 1000.0 / rps * 2.0 * normal_random(&mut self.rng);
        self.schedule_after(dt, SimEvent::EmitRequest);
    }

    /// Emit one request from a random live source right now. Returns its id,
    /// or `None` when there is no source, no server, or the balancer
    /// rejected it.
    pub fn emit_request(&mut self) -> Option<u64> {
        if self.source_count == 0 {
            return None;
        }
        let now = self.now_ms();
        let src = self.rng.gen_range(0..self.source_count);
        if self.server_count == 0 {
            self.metrics.record_rejection();
            return None;
        }

        let server = match self.sources[src].route(self.server_count, now, &mut self.rng) {
            RoutingDecision::Route(server) => server,
            RoutingDecision::Reject => {
                self.metrics.record_rejection();
                debug!(source = src, "Request rejected by balancer");
                return None;
            }
        };

        let work = self.config.sources.work.sample(&mut self.rng);
        let id = self.next_request_id;
        self.next_request_id += 1;

        let source = &mut self.sources[src];
        source.on_send(server, now);
        let request = Request::new(id, work, src, source.generation, server, now);
        self.in_flight.insert(id, request);
        self.metrics.record_emitted();

        self.schedule_after(
            self.config.network.delay_ms,
            SimEvent::NetworkLegComplete { request_id: id },
        );
        Some(id)
    }

    // --- Request flow ---

    fn source_alive(&self, request: &Request) -> bool {
        request.source < self.source_count
            && self.sources[request.source].active
            && self.sources[request.source].generation == request.source_generation
    }

    fn handle_leg_complete(&mut self, request_id: u64) {
        // Missing means the request was cancelled while on the wire.
        let Some(request) = self.in_flight.remove(&request_id) else {
            return;
        };
        if request.is_response() {
            self.complete_request(request);
            return;
        }

        let idx = request.server;
        if idx >= self.server_count {
            self.cancel_request(request);
            return;
        }
        let network = self.config.network.delay_ms;
        if let Some(processing) = self.servers[idx].enqueue(request, network, &mut self.rng) {
            let timer = self.next_timer();
            self.servers[idx].arm_timer(timer);
            self.schedule_after(processing, SimEvent::ProcessQueue { server: idx, timer });
        }
    }

    fn process_server(&mut self, idx: usize) {
        loop {
            match self.servers[idx].next_step() {
                ProcessStep::Idle => return,
                ProcessStep::GcPause(pause_ms) => {
                    let timer = self.next_timer();
                    self.servers[idx].arm_timer(timer);
                    debug!(server = idx, pause_ms, "GC pause");
                    self.schedule_after(
                        pause_ms,
                        SimEvent::GcPauseEnd {
                            server: idx,
                            timer,
                            pause_ms,
                        },
                    );
                    return;
                }
                ProcessStep::Dequeued(mut request) => {
                    if !self.source_alive(&request) {
                        debug!(request = request.id, source = request.source, "Dropped request of removed source");
                        self.metrics.record_dropped();
                        continue;
                    }

                    let now = self.now_ms();
                    let server = &mut self.servers[idx];
                    let latency = server.sample_latency(request.work, &mut self.rng);
                    server.delay_queue(latency);
                    server.served += 1;
                    let more = !server.queue.is_empty();

                    request.respond(now);
                    let id = request.id;
                    self.in_flight.insert(id, request);
                    self.schedule_after(
                        self.config.network.delay_ms,
                        SimEvent::NetworkLegComplete { request_id: id },
                    );

                    if more {
                        let timer = self.next_timer();
                        self.servers[idx].arm_timer(timer);
                        self.schedule_after(latency, SimEvent::ProcessQueue { server: idx, timer });
                    }
                    return;
                }
            }
        }
    }

    fn complete_request(&mut self, request: Request) {
        let now = self.now_ms();
        if !self.source_alive(&request) {
            self.metrics.record_dropped();
            return;
        }
        self.sources[request.source].on_complete(request.server, now, request.original_send_ms);

        let latency = request.latency_ms(self.config.network.delay_ms);
        self.histogram.add(latency, now);
        self.latency.add(now, latency);
        self.metrics.record(RequestMetric {
            request_id: request.id,
            source: request.source,
            server: request.server,
            send_ms: request.original_send_ms,
            completed_ms: now,
            latency_ms: latency,
        });
    }

    /// Charge the penalty for a request lost with its server.
    fn cancel_request(&mut self, request: Request) {
        if self.source_alive(&request) {
            let now = self.now_ms();
            self.sources[request.source].on_complete(request.server, now, now - CANCEL_PENALTY_MS);
        }
        self.metrics.record_cancelled();
    }

    // --- GC ---

    fn ensure_gc_ticking(&mut self) {
        if self.started && !self.gc_ticking && self.config.servers.gc.enabled() {
            self.gc_ticking = true;
            self.schedule_after(self.config.servers.gc.interval_ms, SimEvent::GcTick);
        }
    }

    fn handle_gc_tick(&mut self) {
        let gc = self.config.servers.gc.clone();
        if !gc.enabled() {
            self.gc_ticking = false;
            return;
        }
        if self.server_count > 0 {
            let idx = self.rng.gen_range(0..self.server_count);
            self.trigger_gc(idx, gc.pause_ms);
        }
        self.schedule_after(gc.interval_ms, SimEvent::GcTick);
    }

    /// Queue a GC pause of `pause_ms` model milliseconds on `server`. It
    /// takes effect at the server's next processing step. Returns `false`
    /// for an unknown server.
    pub fn trigger_gc(&mut self, server: usize, pause_ms: f64) -> bool {
        if server >= self.server_count {
            return false;
        }
        self.servers[server].gc(pause_ms);
        true
    }

    // --- Topology ---

    /// Forget network legs whose request is no longer on the wire.
    fn purge_stale_legs(&mut self) {
        let in_flight = &self.in_flight;
        self.events.retain(|event| match event {
            SimEvent::NetworkLegComplete { request_id } => in_flight.contains_key(request_id),
            _ => true,
        });
    }

    /// Resize the server set. Removed servers cancel every request addressed
    /// to or from them and charge the originating source a penalty RTT.
    pub fn set_server_count(&mut self, count: usize) {
        let old = self.server_count;
        if count == old {
            return;
        }
        let now = self.now_ms();
        let inactivity = self.config.predictive.inactivity_period_ms;

        if count < old {
            let mut cancelled = Vec::new();
            for server in &mut self.servers[count..old] {
                cancelled.extend(server.close());
            }
            let on_wire: Vec<u64> = self
                .in_flight
                .iter()
                .filter(|(_, r)| r.server >= count)
                .map(|(&id, _)| id)
                .collect();
            for id in on_wire {
                if let Some(request) = self.in_flight.remove(&id) {
                    cancelled.push(request);
                }
            }
            // Count must shrink after the purge so cancellations still see
            // the sources as live.
            let n = cancelled.len();
            for request in cancelled {
                self.cancel_request(request);
            }
            self.purge_stale_legs();
            self.server_count = count;
            info!(from = old, to = count, cancelled = n, "Servers removed");
        } else {
            let model = self.config.latency_model();
            for idx in old..count {
                if idx < self.servers.len() {
                    self.servers[idx].reopen(model);
                } else {
                    self.servers.push(Server::new(idx, model));
                }
                for source in &mut self.sources {
                    source.reset_link(idx, now, inactivity);
                }
            }
            self.server_count = count;
            info!(from = old, to = count, "Servers added");
        }

        for source in &mut self.sources[..self.source_count] {
            source.resize_balancer(count, &mut self.rng);
        }
    }

    /// Resize the source set. Requests of removed sources still on the wire
    /// are dropped now; queued ones are dropped when their server reaches
    /// them.
    pub fn set_source_count(&mut self, count: usize) {
        let old = self.source_count;
        if count == old {
            return;
        }
        let now = self.now_ms();
        let inactivity = self.config.predictive.inactivity_period_ms;

        if count < old {
            for source in &mut self.sources[count..old] {
                source.retire();
            }
            let before = self.in_flight.len();
            self.in_flight.retain(|_, r| r.source < count);
            for _ in self.in_flight.len()..before {
                self.metrics.record_dropped();
            }
            self.purge_stale_legs();
            self.source_count = count;
            info!(from = old, to = count, dropped = before - self.in_flight.len(), "Sources removed");
        } else {
            let aperture = self.config.aperture_config();
            let slots = self.servers.len();
            for idx in old..count {
                let balancer =
                    self.config
                        .balancer
                        .policy
                        .build(&aperture, self.server_count, &mut self.rng);
                if idx < self.sources.len() {
                    let source = &mut self.sources[idx];
                    source.reactivate(balancer, now, inactivity);
                    source.ensure_slots(slots, now, inactivity);
                } else {
                    self.sources
                        .push(Source::new(idx, slots, balancer, now, inactivity));
                }
            }
            self.source_count = count;
            info!(from = old, to = count, "Sources added");
        }
    }

    /// Apply a new configuration to the running simulation.
    ///
    /// Counts are reconciled, balancers are rebuilt when the policy or its
    /// tuning changes, and emission or periodic GC start or stop as needed.
    /// The seed is only read at construction. The collectors are rebuilt
    /// (and emptied) only when their shape changes.
    pub fn reconfigure(&mut self, config: SimConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let old = std::mem::replace(&mut self.config, config);
        let now = self.now_ms();

        if old.servers.latency_jitter_ms != self.config.servers.latency_jitter_ms {
            let model = self.config.latency_model();
            for server in &mut self.servers {
                server.set_latency_model(model);
            }
        }

        self.set_server_count(self.config.servers.count);
        self.set_source_count(self.config.sources.count);

        if old.balancer != self.config.balancer {
            let aperture = self.config.aperture_config();
            for source in &mut self.sources[..self.source_count] {
                let balancer =
                    self.config
                        .balancer
                        .policy
                        .build(&aperture, self.server_count, &mut self.rng);
                source.replace_balancer(balancer);
            }
            info!(policy = %self.config.balancer.policy, "Balancer changed");
        }

        let inactivity = self.config.predictive.inactivity_period_ms;
        if old.predictive.inactivity_period_ms != inactivity {
            for source in &mut self.sources {
                source.set_inactivity_period(inactivity);
            }
        }

        if old.histogram != self.config.histogram {
            let h = &self.config.histogram;
            self.histogram =
                WindowedHistogram::new(h.slots, h.period_ms, h.bucket_ms, h.max_duration_ms);
        }
        if old.latency_series != self.config.latency_series {
            let ls = &self.config.latency_series;
            self.latency = LatencySeries::new(ls.window_ms, ls.median_window, ls.smoothing_ms);
        }

        self.ensure_emitting();
        self.ensure_gc_ticking();
        debug!(t = now, "Reconfigured");
        Ok(())
    }

    // --- Views ---

    /// Read-only state for renderers. Advances the histogram window and
    /// trims the latency series to now; reading predictive loads may decay
    /// idle links.
    pub fn snapshot(&mut self) -> SimulationSnapshot {
        let now = self.now_ms();
        self.histogram.advance(now);
        self.latency.trim(now);

        let server_count = self.server_count;
        let sources = self.sources[..self.source_count]
            .iter_mut()
            .map(|s| s.snapshot(server_count, now))
            .collect();

        SimulationSnapshot {
            now_ms: now,
            policy: self.config.balancer.policy.name().to_string(),
            in_flight: self.in_flight.len(),
            servers: self.servers[..server_count]
                .iter()
                .map(Server::snapshot)
                .collect(),
            sources,
            histogram: HistogramSnapshot {
                bucket_ms: self.histogram.bucket_size(),
                buckets: self.histogram.data(),
                max_count: self.histogram.max_count(),
                total: self.histogram.total(),
                p50_ms: self.histogram.percentile_ms(0.5),
                p99_ms: self.histogram.percentile_ms(0.99),
            },
            latency: self.latency.points().copied().collect(),
            smoothed_median_ms: self.latency.smoothed_median(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn policy(&self) -> &Policy {
        &self.config.balancer.policy
    }

    /// Live servers.
    pub fn servers(&self) -> &[Server] {
        &self.servers[..self.server_count]
    }

    /// Live sources.
    pub fn sources(&self) -> &[Source] {
        &self.sources[..self.source_count]
    }

    pub fn server_count(&self) -> usize {
        self.server_count
    }

    pub fn source_count(&self) -> usize {
        self.source_count
    }

    /// Requests currently crossing the network.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn histogram(&self) -> &WindowedHistogram {
        &self.histogram
    }

    pub fn latency_series(&self) -> &LatencySeries {
        &self.latency
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Get the number of pending events.
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn is_emitting(&self) -> bool {
        self.emitting
    }
}
