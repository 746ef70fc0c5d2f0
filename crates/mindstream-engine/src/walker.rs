//! Bounded random-walk metrics

use mindstream_core::{Error, MetricSample, Result};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Range and step configuration for one walked metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRange {
    pub min: f64,
    pub max: f64,
    pub initial: f64,
    /// Width of the uniform step window, centred on zero.
    pub step_scale: f64,
    /// Floor each step so the value stays whole (e.g. recursion depth).
    #[serde(default)]
    pub integral: bool,
}

impl MetricRange {
    pub fn new(min: f64, max: f64, initial: f64, step_scale: f64) -> Self {
        Self {
            min,
            max,
            initial,
            step_scale,
            integral: false,
        }
    }

    pub fn integral(mut self) -> Self {
        self.integral = true;
        self
    }

    /// Check the range. `field` prefixes error messages (e.g. `metrics.ranges.load`).
    pub fn validate(&self, field: &str) -> Result<()> {
        for (name, v) in [
            ("min", self.min),
            ("max", self.max),
            ("initial", self.initial),
            ("step_scale", self.step_scale),
        ] {
            if !v.is_finite() {
                return Err(Error::config(format!("{}.{}", field, name), "must be a finite number"));
            }
        }
        if self.min >= self.max {
            return Err(Error::config(
                format!("{}.min", field),
                format!("min ({}) must be below max ({})", self.min, self.max),
            ));
        }
        if self.step_scale < 0.0 {
            return Err(Error::config(format!("{}.step_scale", field), "must not be negative"));
        }
        if self.initial < self.min || self.initial > self.max {
            return Err(Error::config(
                format!("{}.initial", field),
                format!("{} is outside [{}, {}]", self.initial, self.min, self.max),
            ));
        }
        Ok(())
    }
}

/// `clamp(current + uniform(-step_scale/2, +step_scale/2), min, max)`
pub fn advance(current: f64, step_scale: f64, min: f64, max: f64, rng: &mut dyn RngCore) -> f64 {
    let step = (rng.gen::<f64>() - 0.5) * step_scale;
    (current + step).clamp(min, max)
}

fn advance_integral(current: f64, step_scale: f64, min: f64, max: f64, rng: &mut dyn RngCore) -> f64 {
    let step = ((rng.gen::<f64>() - 0.5) * step_scale).floor();
    (current + step).clamp(min.ceil(), max.floor())
}

/// One named metric advancing by a bounded random walk.
#[derive(Debug, Clone)]
pub struct MetricWalker {
    name: String,
    range: MetricRange,
    value: f64,
}

impl MetricWalker {
    pub fn new(name: impl Into<String>, range: MetricRange) -> Result<Self> {
        let name = name.into();
        range.validate(&format!("metrics.ranges.{}", name))?;
        if range.integral && range.min.ceil() > range.max.floor() {
            return Err(Error::config(
                format!("metrics.ranges.{}", name),
                "integral metric range contains no whole number",
            ));
        }
        let value = if range.integral {
            range.initial.round().clamp(range.min.ceil(), range.max.floor())
        } else {
            range.initial
        };
        Ok(Self { name, range, value })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn range(&self) -> &MetricRange {
        &self.range
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Advance the owned value one step and return the stamped sample.
    pub fn step(&mut self, rng: &mut dyn RngCore) -> MetricSample {
        let r = &self.range;
        self.value = if r.integral {
            advance_integral(self.value, r.step_scale, r.min, r.max, rng)
        } else {
            advance(self.value, r.step_scale, r.min, r.max, rng)
        };
        self.sample()
    }

    /// The current value as a sample, without stepping.
    pub fn sample(&self) -> MetricSample {
        MetricSample::new(self.name.clone(), self.value)
    }

    pub fn reset(&mut self) {
        self.value = if self.range.integral {
            self.range.initial.round().clamp(self.range.min.ceil(), self.range.max.floor())
        } else {
            self.range.initial
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn min_not_below_max_is_rejected() {
        let err = MetricWalker::new("load", MetricRange::new(5.0, 5.0, 5.0, 1.0)).unwrap_err();
        assert!(err.to_string().contains("metrics.ranges.load.min"), "{}", err);
        let err = MetricWalker::new("load", MetricRange::new(6.0, 5.0, 5.5, 1.0)).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn initial_outside_range_is_rejected() {
        let err = MetricWalker::new("x", MetricRange::new(0.0, 1.0, 1.5, 0.1)).unwrap_err();
        assert!(err.to_string().contains("initial"));
    }

    #[test]
    fn non_finite_and_negative_step_are_rejected() {
        assert!(MetricWalker::new("x", MetricRange::new(0.0, f64::INFINITY, 0.5, 0.1)).is_err());
        assert!(MetricWalker::new("x", MetricRange::new(0.0, 1.0, 0.5, -0.1)).is_err());
    }

    #[test]
    fn zero_rng_steps_down_by_half_scale() {
        // StepRng(0, 0) yields 0.0 from gen::<f64>(), the bottom of the window.
        let mut rng = StepRng::new(0, 0);
        assert_eq!(advance(50.0, 2.0, 0.0, 100.0, &mut rng), 49.0);
        assert_eq!(advance(0.5, 2.0, 0.0, 100.0, &mut rng), 0.0);
    }

    #[test]
    fn seeded_walks_are_reproducible() {
        let range = MetricRange::new(85.0, 100.0, 94.7, 3.0);
        let mut a = MetricWalker::new("c", range.clone()).unwrap();
        let mut b = MetricWalker::new("c", range).unwrap();
        let mut ra = StdRng::seed_from_u64(9);
        let mut rb = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            assert_eq!(a.step(&mut ra).value, b.step(&mut rb).value);
        }
    }

    #[test]
    fn integral_walk_stays_whole() {
        let mut w = MetricWalker::new("recursionDepth", MetricRange::new(1.0, 10.0, 7.0, 3.0).integral()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1_000 {
            let v = w.step(&mut rng).value;
            assert_eq!(v.fract(), 0.0);
            assert!((1.0..=10.0).contains(&v));
        }
    }

    #[test]
    fn reset_restores_initial() {
        let mut w = MetricWalker::new("s", MetricRange::new(0.7, 1.0, 0.923, 0.05)).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10 {
            w.step(&mut rng);
        }
        w.reset();
        assert_eq!(w.value(), 0.923);
    }
}
