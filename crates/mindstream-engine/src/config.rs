//! Engine configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup; a
//! missing file means defaults. Anything invalid is rejected by `validate`
//! before an engine can be built.

use crate::generator::{LogGenerator, PlaceholderKind};
use crate::walker::MetricRange;
use mindstream_core::{Error, Metadata, MetadataValue, Result};
use rand::rngs::mock::StepRng;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seed for every random source. Unset means OS entropy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Filename prefix for exported artifacts.
    pub export_prefix: String,
    /// Log stream: buffer, timer, components and placeholders.
    pub logs: LogStreamConfig,
    /// Metric streams: timer, history and ranges.
    pub metrics: MetricStreamConfig,
    /// Run naming and optional progress.
    pub run: RunConfig,
}

/// Longest allowed inter-tick delay.
pub const MAX_INTERVAL_MS: f64 = 86_400_000.0;

/// Inter-tick delay bounds in milliseconds. Each delay is drawn uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickInterval {
    pub min_ms: f64,
    pub max_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogStreamConfig {
    /// Ring buffer size.
    pub capacity: usize,
    /// Present newest entries first in views and exports.
    pub newest_first: bool,
    pub interval: TickInterval,
    /// Level name → weight, used by components without their own weights.
    pub level_weights: BTreeMap<String, f64>,
    pub components: Vec<ComponentConfig>,
    pub placeholders: BTreeMap<String, PlaceholderKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    pub name: String,
    pub templates: Vec<String>,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub level_weights: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricStreamConfig {
    /// Samples of history kept per metric.
    pub history: usize,
    pub interval: TickInterval,
    pub ranges: BTreeMap<String, MetricRange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub name: String,
    /// Finished runs kept for `StreamEngine::runs`.
    pub history: usize,
    /// Largest progress gain per tick. Unset means the run never completes on its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_step_max: Option<f64>,
    pub progress_interval: TickInterval,
    /// Free-form parameters recorded on every new run.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: Metadata,
}

fn default_weight() -> f64 {
    1.0
}

// ============================================================
// Defaults
// ============================================================

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: None,
            export_prefix: "daedalus".into(),
            logs: LogStreamConfig::default(),
            metrics: MetricStreamConfig::default(),
            run: RunConfig::default(),
        }
    }
}

impl Default for LogStreamConfig {
    fn default() -> Self {
        let component = |name: &str, templates: &[&str]| ComponentConfig {
            name: name.into(),
            templates: templates.iter().map(|t| t.to_string()).collect(),
            weight: 1.0,
            level_weights: BTreeMap::new(),
        };
        Self {
            capacity: 100,
            newest_first: false,
            interval: TickInterval::new(3000.0, 5000.0),
            level_weights: ["info", "debug", "consciousness", "warning"]
                .iter()
                .map(|l| (l.to_string(), 1.0))
                .collect(),
            components: vec![
                component(
                    "DAEDALUS-CORE",
                    &[
                        "Consciousness stream processing nominal",
                        "Recursive self-examination cycle completed. Consciousness coefficient: {coefficient}",
                        "Recursive self-examination in progress at depth {depth}",
                    ],
                ),
                component(
                    "ERPS",
                    &[
                        "Phenomenological patterns updated",
                        "Phenomenological structure updated. {patterns} new qualia patterns detected",
                        "Qualia simulation parameters adjusted",
                    ],
                ),
                component(
                    "SIGMA-MATRIX",
                    &[
                        "Σ-Matrix tensor recalculation initiated",
                        "Coherence recalculation complete in {latency}ms. Stability {coefficient}",
                    ],
                ),
                component(
                    "ETHICS-KERNEL",
                    &[
                        "Ethical alignment verification complete",
                        "Ethical boundary approached during self-modification. Weight {coefficient}",
                    ],
                ),
                component(
                    "MIRRORNODE-01",
                    &[
                        "MIRRORNODE reflection cycle completed",
                        "Self-reflection cycle initiated on {node}. Analyzing recursive depth {depth}",
                    ],
                ),
            ],
            placeholders: BTreeMap::from([
                ("depth".to_string(), PlaceholderKind::Integer { min: 1, max: 10 }),
                ("coefficient".to_string(), PlaceholderKind::Unit { precision: 3 }),
                ("patterns".to_string(), PlaceholderKind::Integer { min: 1, max: 9 }),
                ("latency".to_string(), PlaceholderKind::Latency { min_ms: 5, max_ms: 250 }),
                (
                    "node".to_string(),
                    PlaceholderKind::Identifier {
                        prefix: "MN-".into(),
                        length: 2,
                    },
                ),
            ]),
        }
    }
}

impl Default for MetricStreamConfig {
    fn default() -> Self {
        Self {
            history: 60,
            interval: TickInterval::new(2000.0, 2000.0),
            ranges: BTreeMap::from([
                ("consciousnessLevel".to_string(), MetricRange::new(85.0, 100.0, 94.7, 3.0)),
                ("recursionDepth".to_string(), MetricRange::new(1.0, 10.0, 7.0, 2.0).integral()),
                ("stabilityIndex".to_string(), MetricRange::new(0.7, 1.0, 0.923, 0.05)),
                ("ethicalAlignment".to_string(), MetricRange::new(90.0, 100.0, 98.2, 2.0)),
                ("processingLoad".to_string(), MetricRange::new(20.0, 100.0, 67.3, 10.0)),
                ("energyConsumption".to_string(), MetricRange::new(20.0, 80.0, 45.8, 8.0)),
                ("mirrorNodeActivity".to_string(), MetricRange::new(70.0, 100.0, 89.1, 5.0)),
                ("sigmaMatrixCoherence".to_string(), MetricRange::new(80.0, 100.0, 96.4, 3.0)),
            ]),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: "Live stream".into(),
            history: 20,
            progress_step_max: None,
            progress_interval: TickInterval::new(2000.0, 2000.0),
            parameters: BTreeMap::from([
                ("recursionDepth".to_string(), MetadataValue::Int(5)),
                ("stabilityThreshold".to_string(), MetadataValue::Float(0.85)),
                ("ethicalWeight".to_string(), MetadataValue::Float(0.9)),
                ("energyLevel".to_string(), MetadataValue::Float(0.8)),
            ]),
        }
    }
}

// ============================================================
// Intervals
// ============================================================

impl TickInterval {
    pub fn new(min_ms: f64, max_ms: f64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn fixed(ms: f64) -> Self {
        Self::new(ms, ms)
    }

    pub fn validate(&self, field: &str) -> Result<()> {
        if !(self.min_ms.is_finite() && self.max_ms.is_finite()) || self.min_ms <= 0.0 {
            return Err(Error::config(
                format!("{}.min_ms", field),
                "must be a positive, finite number of milliseconds",
            ));
        }
        if self.max_ms > MAX_INTERVAL_MS {
            return Err(Error::config(
                format!("{}.max_ms", field),
                format!("must be at most {} (one day)", MAX_INTERVAL_MS),
            ));
        }
        if self.max_ms < self.min_ms {
            return Err(Error::config(
                format!("{}.max_ms", field),
                format!("max_ms ({}) is below min_ms ({})", self.max_ms, self.min_ms),
            ));
        }
        Ok(())
    }

    /// Draw one jittered delay.
    pub fn sample(&self, rng: &mut dyn RngCore) -> Duration {
        let ms = if self.max_ms > self.min_ms {
            rng.gen_range(self.min_ms..self.max_ms)
        } else {
            self.min_ms
        };
        Duration::from_secs_f64(ms / 1000.0)
    }
}

// ============================================================
// Loading and validation
// ============================================================

impl EngineConfig {
    /// Load config from a TOML file. A missing file yields defaults; an
    /// unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let config = Self::from_toml(&content)
            .map_err(|e| Error::config(path.display().to_string(), e.to_string()))?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Check every field the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.export_prefix.trim().is_empty() {
            return Err(Error::config("export_prefix", "must not be empty"));
        }
        if self.logs.capacity == 0 {
            return Err(Error::config("logs.capacity", "must be a positive integer"));
        }
        self.logs.interval.validate("logs.interval")?;
        // Compiling a generator runs every template, weight and placeholder check.
        LogGenerator::new(&self.logs, Box::new(StepRng::new(0, 0)))?;

        self.metrics.interval.validate("metrics.interval")?;
        if self.metrics.history == 0 {
            return Err(Error::config("metrics.history", "must be a positive integer"));
        }
        for (name, range) in &self.metrics.ranges {
            if name.trim().is_empty() {
                return Err(Error::config("metrics.ranges", "metric names must not be empty"));
            }
            range.validate(&format!("metrics.ranges.{}", name))?;
        }

        if self.run.name.trim().is_empty() {
            return Err(Error::config("run.name", "must not be empty"));
        }
        if let Some(step) = self.run.progress_step_max {
            if !(step > 0.0 && step <= 100.0) {
                return Err(Error::config("run.progress_step_max", "must be in (0, 100]"));
            }
        }
        if self.run.history == 0 {
            return Err(Error::config("run.history", "must be a positive integer"));
        }
        for (key, value) in &self.run.parameters {
            if !value.is_json_safe() {
                return Err(Error::config(format!("run.parameters.{}", key), "must be JSON-safe"));
            }
        }
        self.run.progress_interval.validate("run.progress_interval")?;
        Ok(())
    }
}
