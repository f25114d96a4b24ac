//! Random draws used by the simulation.
//!
//! All sampling goes through the simulation's seeded RNG so runs are
//! reproducible for a given `[simulation].seed`.

use rand::Rng;
use rand_distr::{Distribution, Normal, StandardNormal};
use serde::{Deserialize, Serialize};

/// Normal draw centred on 0.5 with standard deviation 0.1, clamped to
/// `[0, 1]`. Used as a jitter multiplier.
pub fn normal_random<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    ((5.0 + z) / 10.0).clamp(0.0, 1.0)
}

/// Distribution of the work amount carried by each emitted request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkDistribution {
    Constant { value: f64 },
    Uniform { min: f64, max: f64 },
    Normal { mean: f64, std_dev: f64 },
}

impl Default for WorkDistribution {
    fn default() -> Self {
        WorkDistribution::Constant { value: 50.0 }
    }
}

impl WorkDistribution {
    /// Draw a work amount (never negative).
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let x = match *self {
            WorkDistribution::Constant { value } => value,
            WorkDistribution::Uniform { min, max } => {
                if max > min {
                    rng.gen_range(min..max)
                } else {
                    min
                }
            }
            WorkDistribution::Normal { mean, std_dev } => match Normal::new(mean, std_dev) {
                Ok(d) => d.sample(rng),
                Err(_) => mean,
            },
        };
        x.max(0.0)
    }

    /// Parameter errors, if any.
    pub fn check(&self) -> Result<(), String> {
        match *self {
            WorkDistribution::Constant { value } if !(value.is_finite() && value >= 0.0) => {
                Err(format!("constant work must be a non-negative number, got {value}"))
            }
            WorkDistribution::Uniform { min, max } if !(min >= 0.0 && max >= min) => Err(format!(
                "uniform work needs 0 <= min <= max, got min={min} max={max}"
            )),
            WorkDistribution::Normal { std_dev, .. } if !(std_dev.is_finite() && std_dev >= 0.0) => {
                Err(format!("normal work std_dev must be >= 0, got {std_dev}"))
            }
            _ => Ok(()),
        }
    }
}

/// Server processing latency: `|round(work + jitter × normal_random())|`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyModel {
    pub jitter_ms: f64,
}

impl Default for LatencyModel {
    fn default() -> Self {
        Self { jitter_ms: 100.0 }
    }
}

impl LatencyModel {
    pub fn new(jitter_ms: f64) -> Self {
        Self { jitter_ms }
    }

    /// Processing latency in model milliseconds for a request of `work`.
    pub fn sample<R: Rng + ?Sized>(&self, work: f64, rng: &mut R) -> f64 {
        if self.jitter_ms == 0.0 {
            return work.round().abs();
        }
        (work + self.jitter_ms * normal_random(rng)).round().abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_normal_random_is_clamped_and_centred() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let n = 10_000;
        let mut sum = 0.0;
        for _ in 0..n {
            let x = normal_random(&mut rng);
            assert!((0.0..=1.0).contains(&x));
            sum += x;
        }
        let mean = sum / n as f64;
        assert!((mean - 0.5).abs() < 0.01, "mean was {mean}");
    }

    #[test]
    fn test_constant_work() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(WorkDistribution::default().sample(&mut rng), 50.0);
    }

    #[test]
    fn test_uniform_work_in_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let d = WorkDistribution::Uniform { min: 10.0, max: 20.0 };
        for _ in 0..100 {
            let x = d.sample(&mut rng);
            assert!((10.0..20.0).contains(&x));
        }
    }

    #[test]
    fn test_work_never_negative() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let d = WorkDistribution::Normal { mean: 0.0, std_dev: 50.0 };
        for _ in 0..100 {
            assert!(d.sample(&mut rng) >= 0.0);
        }
    }

    #[test]
    fn test_check_rejects_bad_parameters() {
        assert!(WorkDistribution::Uniform { min: 5.0, max: 1.0 }.check().is_err());
        assert!(WorkDistribution::Normal { mean: 1.0, std_dev: -1.0 }.check().is_err());
        assert!(WorkDistribution::Constant { value: -3.0 }.check().is_err());
        assert!(WorkDistribution::default().check().is_ok());
    }

    #[test]
    fn test_zero_jitter_latency_is_work() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(LatencyModel::new(0.0).sample(50.0, &mut rng), 50.0);
    }

    #[test]
    fn test_latency_within_jitter() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let model = LatencyModel::default();
        for _ in 0..1000 {
            let l = model.sample(50.0, &mut rng);
            assert!((50.0..=150.0).contains(&l));
            assert_eq!(l, l.round());
        }
    }
}
