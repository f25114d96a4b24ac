//! Load balancing policies and per-link estimators for lbsim.
//!
//! Every simulated source owns one [`LoadBalancer`] built from the configured
//! [`Policy`], plus one [`Stats`] per server describing that link:
//!
//! | Policy | Strategy | Reads |
//! |--------|----------|-------|
//! | [`RandomBalancer`] | Uniform pick | nothing |
//! | [`RoundRobin`] | Cycle from a random offset | nothing |
//! | [`LeastLoaded`] | Fewest outstanding, random tie-break | load vector |
//! | [`Aperture`] | Lowest predictive load within a rotating subset | load + [`Stats`] |

pub mod aperture;
pub mod least_loaded;
pub mod policy;
pub mod random;
pub mod round_robin;
pub mod sliding_median;
pub mod stats;
pub mod traits;

pub use aperture::{Aperture, ApertureConfig, ApertureVariant};
pub use least_loaded::LeastLoaded;
pub use policy::{available_policies, Policy, PolicyError};
pub use random::RandomBalancer;
pub use round_robin::RoundRobin;
pub use sliding_median::SlidingMedian;
pub use stats::Stats;
pub use traits::*;
