//! Simulated request model.
//!
//! A [`Request`] travels source → server → source. It is owned by exactly one
//! place at a time: the simulation's on-the-wire set while crossing the
//! network, or a server queue while waiting to be processed.

use serde::{Deserialize, Serialize};

/// Which way a request is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Source to server.
    Outbound,
    /// Server back to source.
    Inbound,
}

/// A single request flowing through the simulated system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request identifier.
    pub id: u64,
    /// Work amount fed to the server's latency model.
    pub work: f64,
    pub direction: Direction,
    /// Virtual time the current network leg started (ms).
    pub send_ms: f64,
    /// Virtual time the request left its source (ms).
    pub original_send_ms: f64,
    /// Accumulated model delay: network out, processing and queueing (ms).
    pub delay_ms: f64,
    /// Originating source index.
    pub source: usize,
    /// Generation of the source slot when the request was emitted.
    pub source_generation: u64,
    /// Destination server index.
    pub server: usize,
}

impl Request {
    pub fn new(
        id: u64,
        work: f64,
        source: usize,
        source_generation: u64,
        server: usize,
        now_ms: f64,
    ) -> Self {
        Self {
            id,
            work,
            direction: Direction::Outbound,
            send_ms: now_ms,
            original_send_ms: now_ms,
            delay_ms: 0.0,
            source,
            source_generation,
            server,
        }
    }

    /// Turn the request around for its return leg.
    pub fn respond(&mut self, now_ms: f64) {
        self.direction = Direction::Inbound;
        self.send_ms = now_ms;
    }

    pub fn is_response(&self) -> bool {
        self.direction == Direction::Inbound
    }

    /// End-to-end latency once the return leg of `network_delay_ms` lands.
    pub fn latency_ms(&self, network_delay_ms: f64) -> f64 {
        self.delay_ms + network_delay_ms
    }
}
