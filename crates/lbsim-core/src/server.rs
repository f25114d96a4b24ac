//! Simulated server with a single FIFO processing queue.
//!
//! A [`Server`] only mutates its own state; the engine turns the returned
//! outcomes into scheduled events. At most one timer (processing step or GC
//! pause) is pending per server, identified by a token so that a timer
//! outliving [`Server::close`] is recognised as stale and ignored.

use crate::distributions::LatencyModel;
use crate::request::Request;
use crate::snapshot::ServerSnapshot;
use rand::Rng;
use std::collections::VecDeque;

/// What the next processing step should do.
#[derive(Debug)]
pub enum ProcessStep {
    /// Nothing to do: the queue is empty or the server is closed.
    Idle,
    /// A GC pause of this many model milliseconds must elapse first.
    GcPause(f64),
    /// The head of the queue was removed and is ready to be served.
    Dequeued(Request),
}

#[derive(Debug, Clone)]
pub struct Server {
    pub id: usize,
    pub queue: VecDeque<Request>,
    pub active: bool,
    latency: LatencyModel,
    /// Pending GC pause (model ms) not yet applied.
    gc_pause_ms: f64,
    /// Token of the pending timer, if any.
    pending_timer: Option<u64>,
    /// Requests accepted into the queue.
    pub request_count: u64,
    /// Requests that finished processing.
    pub served: u64,
    /// Total GC pause applied so far (model ms).
    pub gc_total_ms: f64,
}

impl Server {
    pub fn new(id: usize, latency: LatencyModel) -> Self {
        Self {
            id,
            queue: VecDeque::new(),
            active: true,
            latency,
            gc_pause_ms: 0.0,
            pending_timer: None,
            request_count: 0,
            served: 0,
            gc_total_ms: 0.0,
        }
    }

    /// Draw a processing latency (model ms) for a request of `work`.
    pub fn sample_latency<R: Rng + ?Sized>(&self, work: f64, rng: &mut R) -> f64 {
        self.latency.sample(work, rng)
    }

    pub fn set_latency_model(&mut self, latency: LatencyModel) {
        self.latency = latency;
    }

    /// Accept a request that just arrived over the network.
    ///
    /// The request's delay is reset to the outbound network delay plus a
    /// freshly sampled processing latency. Returns that latency when the
    /// queue was empty, meaning the caller must schedule the first
    /// processing step after it.
    pub fn enqueue<R: Rng + ?Sized>(
        &mut self,
        mut request: Request,
        network_delay_ms: f64,
        rng: &mut R,
    ) -> Option<f64> {
        let processing = self.sample_latency(request.work, rng);
        request.delay_ms = network_delay_ms + processing;
        self.queue.push_back(request);
        self.request_count += 1;
        (self.queue.len() == 1).then_some(processing)
    }

    /// Decide the next processing step, removing the head request when it
    /// is ready to be served.
    pub fn next_step(&mut self) -> ProcessStep {
        if self.queue.is_empty() || !self.active {
            return ProcessStep::Idle;
        }
        if self.gc_pause_ms > 0.0 {
            return ProcessStep::GcPause(self.gc_pause_ms);
        }
        match self.queue.pop_front() {
            Some(request) => ProcessStep::Dequeued(request),
            None => ProcessStep::Idle,
        }
    }

    /// Add `ms` to the delay of every queued request.
    pub fn delay_queue(&mut self, ms: f64) {
        for request in &mut self.queue {
            request.delay_ms += ms;
        }
    }

    /// Request a GC pause of `ms`; pauses accumulate until applied.
    pub fn gc(&mut self, ms: f64) {
        if ms > 0.0 {
            self.gc_pause_ms += ms;
        }
    }

    /// Apply a finished GC pause of `pause_ms` to the queue.
    pub fn finish_gc(&mut self, pause_ms: f64) {
        self.delay_queue(pause_ms);
        self.gc_total_ms += pause_ms;
        self.gc_pause_ms = (self.gc_pause_ms - pause_ms).max(0.0);
    }

    pub fn gc_pending(&self) -> bool {
        self.gc_pause_ms > 0.0
    }

    pub fn arm_timer(&mut self, token: u64) {
        self.pending_timer = Some(token);
    }

    /// Consume the pending timer if `token` is the current one.
    pub fn fire_timer(&mut self, token: u64) -> bool {
        if self.pending_timer == Some(token) {
            self.pending_timer = None;
            true
        } else {
            false
        }
    }

    /// Stop the server: cancel its timer and hand back every queued request.
    pub fn close(&mut self) -> Vec<Request> {
        self.active = false;
        self.pending_timer = None;
        self.gc_pause_ms = 0.0;
        self.queue.drain(..).collect()
    }

    /// Bring a retired slot back with fresh state.
    pub fn reopen(&mut self, latency: LatencyModel) {
        *self = Server::new(self.id, latency);
    }

    pub fn snapshot(&self) -> ServerSnapshot {
        ServerSnapshot {
            id: self.id,
            queue_len: self.queue.len(),
            active: self.active,
            gc: self.gc_pending(),
            request_count: self.request_count,
            served: self.served,
        }
    }
}
