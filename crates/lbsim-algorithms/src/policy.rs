//! Policy selection.
//!
//! A [`Policy`] is parsed once from the configured name and then builds one
//! [`LoadBalancer`] per source.

use crate::aperture::{Aperture, ApertureConfig, ApertureVariant};
use crate::least_loaded::LeastLoaded;
use crate::random::RandomBalancer;
use crate::round_robin::RoundRobin;
use crate::traits::LoadBalancer;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("unknown load balancing policy '{0}' (available: {available})", available = available_policies().join(", "))]
    Unknown(String),
}

/// Load balancing policy shared by every source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Policy {
    Random,
    RoundRobin,
    LeastLoaded,
    Aperture(ApertureVariant),
}

impl Policy {
    /// Canonical policy name.
    pub fn name(&self) -> &'static str {
        match self {
            Policy::Random => "random",
            Policy::RoundRobin => "roundrobin",
            Policy::LeastLoaded => "leastloaded",
            Policy::Aperture(v) => v.policy_name(),
        }
    }

    /// Build a balancer for one source seeing `server_count` servers.
    pub fn build(
        &self,
        aperture: &ApertureConfig,
        server_count: usize,
        rng: &mut dyn RngCore,
    ) -> Box<dyn LoadBalancer> {
        match self {
            Policy::Random => Box::new(RandomBalancer::new()),
            Policy::RoundRobin => Box::new(RoundRobin::new(rng.gen())),
            Policy::LeastLoaded => Box::new(LeastLoaded::new()),
            Policy::Aperture(variant) => Box::new(Aperture::new(
                *variant,
                aperture.clone(),
                server_count,
                rng,
            )),
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Policy::Random
    }
}

impl FromStr for Policy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "random" => Ok(Policy::Random),
            "roundrobin" | "round-robin" => Ok(Policy::RoundRobin),
            "leastloaded" | "least-loaded" => Ok(Policy::LeastLoaded),
            "aperture" => Ok(Policy::Aperture(ApertureVariant::Predictive)),
            "aperture-random" => Ok(Policy::Aperture(ApertureVariant::Random)),
            "aperture-static" => Ok(Policy::Aperture(ApertureVariant::Static)),
            _ => Err(PolicyError::Unknown(s.to_string())),
        }
    }
}

impl TryFrom<String> for Policy {
    type Error = PolicyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Policy> for String {
    fn from(p: Policy) -> Self {
        p.name().to_string()
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// List all available policy names.
pub fn available_policies() -> Vec<&'static str> {
    vec![
        "random",
        "roundrobin",
        "leastloaded",
        "aperture",
        "aperture-random",
        "aperture-static",
    ]
}
