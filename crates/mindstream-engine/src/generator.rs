//! Log generation from weighted, templated components
//!
//! Every template, weight and placeholder is checked in `LogGenerator::new`,
//! so `generate` is total.

use crate::config::{ComponentConfig, LogStreamConfig};
use crate::template::Template;
use chrono::Utc;
use mindstream_core::{Error, LogEntry, LogLevel, Metadata, MetadataValue, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const IDENT_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_IDENT_LENGTH: usize = 64;

fn default_precision() -> usize {
    3
}

fn default_ident_length() -> usize {
    4
}

/// How a placeholder's value is produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlaceholderKind {
    /// Whole number in `[min, max]` (e.g. a recursion depth).
    Integer { min: i64, max: i64 },
    /// Float in `[0, 1]` rendered with fixed precision.
    Unit {
        #[serde(default = "default_precision")]
        precision: usize,
    },
    Float {
        min: f64,
        max: f64,
        #[serde(default = "default_precision")]
        precision: usize,
    },
    /// `prefix` followed by `length` uppercase alphanumerics.
    Identifier {
        #[serde(default)]
        prefix: String,
        #[serde(default = "default_ident_length")]
        length: usize,
    },
    /// Whole milliseconds in `[min_ms, max_ms]`.
    Latency { min_ms: u64, max_ms: u64 },
    Choice { values: Vec<String> },
}

impl PlaceholderKind {
    pub fn validate(&self, field: &str) -> Result<()> {
        match self {
            PlaceholderKind::Integer { min, max } if min > max => {
                Err(Error::config(field, format!("min ({}) exceeds max ({})", min, max)))
            }
            PlaceholderKind::Float { min, max, .. } if !(min.is_finite() && max.is_finite()) => {
                Err(Error::config(field, "bounds must be finite"))
            }
            PlaceholderKind::Float { min, max, .. } if min > max => {
                Err(Error::config(field, format!("min ({}) exceeds max ({})", min, max)))
            }
            PlaceholderKind::Float { min, max, .. } if !(max - min).is_finite() => {
                Err(Error::config(field, "range width overflows; narrow min and max"))
            }
            PlaceholderKind::Unit { precision } | PlaceholderKind::Float { precision, .. } if *precision > 12 => {
                Err(Error::config(field, "precision must be at most 12"))
            }
            PlaceholderKind::Identifier { length: 0, .. } => Err(Error::config(field, "length must be positive")),
            PlaceholderKind::Identifier { length, .. } if *length > MAX_IDENT_LENGTH => Err(Error::config(
                field,
                format!("length must be at most {}", MAX_IDENT_LENGTH),
            )),
            PlaceholderKind::Latency { min_ms, max_ms } if min_ms > max_ms => Err(Error::config(
                field,
                format!("min_ms ({}) exceeds max_ms ({})", min_ms, max_ms),
            )),
            PlaceholderKind::Latency { max_ms, .. } if i64::try_from(*max_ms).is_err() => {
                Err(Error::config(field, format!("max_ms must be at most {}", i64::MAX)))
            }
            PlaceholderKind::Choice { values } if values.is_empty() => {
                Err(Error::config(field, "choice needs at least one value"))
            }
            _ => Ok(()),
        }
    }

    /// Rendered text plus the typed value recorded in metadata.
    pub fn generate(&self, rng: &mut dyn RngCore) -> (String, MetadataValue) {
        match self {
            PlaceholderKind::Integer { min, max } => {
                let v = rng.gen_range(*min..=*max);
                (v.to_string(), MetadataValue::Int(v))
            }
            PlaceholderKind::Unit { precision } => fixed(rng.gen::<f64>(), *precision),
            PlaceholderKind::Float { min, max, precision } => {
                let v = if min == max { *min } else { rng.gen_range(*min..=*max) };
                fixed(v, *precision)
            }
            PlaceholderKind::Identifier { prefix, length } => {
                let mut id = String::with_capacity(prefix.len() + length);
                id.push_str(prefix);
                for _ in 0..*length {
                    id.push(IDENT_CHARSET[rng.gen_range(0..IDENT_CHARSET.len())] as char);
                }
                (id.clone(), MetadataValue::String(id))
            }
            PlaceholderKind::Latency { min_ms, max_ms } => {
                let v = rng.gen_range(*min_ms..=*max_ms);
                (v.to_string(), MetadataValue::Int(i64::try_from(v).unwrap_or(i64::MAX)))
            }
            PlaceholderKind::Choice { values } => {
                let v = &values[rng.gen_range(0..values.len())];
                (v.clone(), MetadataValue::String(v.clone()))
            }
        }
    }
}

/// Text and metadata agree: the recorded float is the rendered one.
fn fixed(v: f64, precision: usize) -> (String, MetadataValue) {
    let text = format!("{:.*}", precision, v);
    let value = text.parse::<f64>().unwrap_or(v);
    (text, MetadataValue::Float(value))
}

#[derive(Debug, Clone)]
struct LevelTable {
    levels: Vec<LogLevel>,
    dist: WeightedIndex<f64>,
}

impl LevelTable {
    fn build(field: &str, weights: &BTreeMap<String, f64>) -> Result<Self> {
        let mut levels = Vec::with_capacity(weights.len());
        let mut w = Vec::with_capacity(weights.len());
        for (name, weight) in weights {
            let level: LogLevel = name
                .parse()
                .map_err(|e: String| Error::config(format!("{}.{}", field, name), e))?;
            levels.push(level);
            w.push(*weight);
        }
        let dist = weighted(field, &w)?;
        Ok(Self { levels, dist })
    }

    fn pick(&self, rng: &mut dyn RngCore) -> LogLevel {
        self.levels[self.dist.sample(rng)]
    }
}

fn weighted(field: &str, weights: &[f64]) -> Result<WeightedIndex<f64>> {
    if weights.is_empty() {
        return Err(Error::config(field, "must contain at least one entry"));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(Error::config(field, "weights must be finite and non-negative"));
    }
    WeightedIndex::new(weights).map_err(|e| Error::config(field, e.to_string()))
}

#[derive(Debug, Clone)]
struct CompiledComponent {
    name: String,
    templates: Vec<Template>,
    levels: Option<LevelTable>,
}

impl CompiledComponent {
    fn compile(
        index: usize,
        config: &ComponentConfig,
        placeholders: &BTreeMap<String, PlaceholderKind>,
    ) -> Result<Self> {
        let field = format!("logs.components[{}]", index);
        if config.name.trim().is_empty() {
            return Err(Error::config(format!("{}.name", field), "must not be empty"));
        }
        if config.templates.is_empty() {
            return Err(Error::config(
                format!("{}.templates", field),
                format!("component {} has no templates", config.name),
            ));
        }
        let mut templates = Vec::with_capacity(config.templates.len());
        for source in &config.templates {
            let template = Template::parse(&config.name, source)?;
            if let Some(missing) = template.placeholders().find(|p| !placeholders.contains_key(*p)) {
                return Err(Error::unknown_placeholder(&config.name, source, missing));
            }
            templates.push(template);
        }
        let levels = if config.level_weights.is_empty() {
            None
        } else {
            Some(LevelTable::build(&format!("{}.level_weights", field), &config.level_weights)?)
        };
        Ok(Self {
            name: config.name.clone(),
            templates,
            levels,
        })
    }
}

/// Produces log entries from the configured components.
pub struct LogGenerator {
    components: Vec<CompiledComponent>,
    component_dist: WeightedIndex<f64>,
    default_levels: LevelTable,
    placeholders: BTreeMap<String, PlaceholderKind>,
    rng: Box<dyn RngCore + Send>,
    next_id: u64,
}

impl std::fmt::Debug for LogGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogGenerator")
            .field("components", &self.component_names())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl LogGenerator {
    pub fn new(config: &LogStreamConfig, rng: Box<dyn RngCore + Send>) -> Result<Self> {
        for (name, kind) in &config.placeholders {
            kind.validate(&format!("logs.placeholders.{}", name))?;
        }
        if config.components.is_empty() {
            return Err(Error::config("logs.components", "at least one component is required"));
        }
        let components = config
            .components
            .iter()
            .enumerate()
            .map(|(i, c)| CompiledComponent::compile(i, c, &config.placeholders))
            .collect::<Result<Vec<_>>>()?;
        let weights: Vec<f64> = config.components.iter().map(|c| c.weight).collect();
        let component_dist = weighted("logs.components.weight", &weights)?;
        let default_levels = LevelTable::build("logs.level_weights", &config.level_weights)?;

        Ok(Self {
            components,
            component_dist,
            default_levels,
            placeholders: config.placeholders.clone(),
            rng,
            next_id: 1,
        })
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name.as_str()).collect()
    }

    /// Id the next generated entry will carry.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn generate(&mut self) -> LogEntry {
        let rng: &mut dyn RngCore = &mut *self.rng;
        let component = &self.components[self.component_dist.sample(rng)];
        let template = &component.templates[rng.gen_range(0..component.templates.len())];
        let level = component.levels.as_ref().unwrap_or(&self.default_levels).pick(rng);

        let mut rendered: BTreeMap<&str, String> = BTreeMap::new();
        let mut metadata = Metadata::new();
        for name in template.placeholders() {
            if rendered.contains_key(name) {
                continue;
            }
            // Registration was checked at construction.
            if let Some(kind) = self.placeholders.get(name) {
                let (text, value) = kind.generate(rng);
                rendered.insert(name, text);
                metadata.insert(name.to_string(), value);
            }
        }
        let message = template.render(|name| rendered.get(name).map(String::as_str).unwrap_or(""));

        let id = self.next_id;
        self.next_id += 1;
        LogEntry {
            id,
            timestamp: Utc::now(),
            level,
            component: component.name.clone(),
            message,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng(seed: u64) -> Box<dyn RngCore + Send> {
        Box::new(StdRng::seed_from_u64(seed))
    }

    #[test]
    fn integer_placeholder_stays_in_range() {
        let kind = PlaceholderKind::Integer { min: 1, max: 3 };
        let mut r = StdRng::seed_from_u64(0);
        for _ in 0..200 {
            let (text, value) = kind.generate(&mut r);
            let n: i64 = text.parse().unwrap();
            assert!((1..=3).contains(&n));
            assert_eq!(value, MetadataValue::Int(n));
        }
    }

    #[test]
    fn unit_placeholder_has_fixed_precision() {
        let kind = PlaceholderKind::Unit { precision: 3 };
        let mut r = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            let (text, value) = kind.generate(&mut r);
            assert_eq!(text.split('.').nth(1).map(str::len), Some(3), "{}", text);
            let v = value.as_f64().unwrap();
            assert!((0.0..=1.0).contains(&v));
            assert_eq!(text.parse::<f64>().unwrap(), v);
        }
    }

    #[test]
    fn identifier_placeholder_shape() {
        let kind = PlaceholderKind::Identifier { prefix: "MN-".into(), length: 2 };
        let (text, value) = kind.generate(&mut StdRng::seed_from_u64(1));
        assert!(text.starts_with("MN-"));
        assert_eq!(text.len(), 5);
        assert!(text[3..].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        assert_eq!(value.as_str(), Some(text.as_str()));
    }

    #[test]
    fn invalid_placeholder_ranges_are_rejected() {
        assert!(PlaceholderKind::Integer { min: 5, max: 1 }.validate("p").is_err());
        assert!(PlaceholderKind::Latency { min_ms: 9, max_ms: 1 }.validate("p").is_err());
        assert!(PlaceholderKind::Choice { values: vec![] }.validate("p").is_err());
        assert!(PlaceholderKind::Identifier { prefix: String::new(), length: 0 }.validate("p").is_err());
        assert!(PlaceholderKind::Float { min: 0.0, max: f64::NAN, precision: 2 }.validate("p").is_err());
        assert!(PlaceholderKind::Unit { precision: 3 }.validate("p").is_ok());
    }

    #[test]
    fn float_range_too_wide_to_sample_is_rejected() {
        let kind = PlaceholderKind::Float { min: -f64::MAX, max: f64::MAX, precision: 2 };
        assert!(kind.validate("p").is_err());

        let mut config = LogStreamConfig::default();
        config.placeholders.insert("coefficient".into(), kind);
        assert!(LogGenerator::new(&config, rng(0)).unwrap_err().is_configuration());

        let wide = PlaceholderKind::Float { min: -1e300, max: 1e300, precision: 0 };
        wide.validate("p").unwrap();
        let (_, value) = wide.generate(&mut StdRng::seed_from_u64(3));
        assert!(value.as_f64().unwrap().is_finite());
    }

    #[test]
    fn latency_beyond_i64_is_rejected() {
        let kind = PlaceholderKind::Latency { min_ms: 0, max_ms: u64::MAX };
        assert!(kind.validate("p").is_err());
        let edge = PlaceholderKind::Latency { min_ms: i64::MAX as u64, max_ms: i64::MAX as u64 };
        edge.validate("p").unwrap();
        let (text, value) = edge.generate(&mut StdRng::seed_from_u64(0));
        assert_eq!(text, i64::MAX.to_string());
        assert_eq!(value, MetadataValue::Int(i64::MAX));
    }

    #[test]
    fn oversized_identifier_is_rejected() {
        let kind = PlaceholderKind::Identifier { prefix: "N-".into(), length: MAX_IDENT_LENGTH + 1 };
        assert!(kind.validate("p").is_err());
    }

    #[test]
    fn ids_are_monotonic() {
        let mut gen = LogGenerator::new(&LogStreamConfig::default(), rng(2)).unwrap();
        let ids: Vec<u64> = (0..5).map(|_| gen.generate().id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(gen.next_id(), 6);
    }
}
