//! Export of log and metric views to downloadable artifacts

use crate::error::{Error, Result};
use crate::types::{LogEntry, MetadataValue, MetricSample};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// A single pretty-printed JSON array.
    #[default]
    Json,
    /// One JSON object per line.
    JsonLines,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::JsonLines => "jsonl",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Json => "application/json",
            ExportFormat::JsonLines => "application/x-ndjson",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "jsonl" | "ndjson" | "jsonlines" => Ok(ExportFormat::JsonLines),
            other => Err(format!("unknown export format: {}", other)),
        }
    }
}

/// Serialized payload plus the name a browser or CLI should save it under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: String,
    pub content_type: &'static str,
    pub payload: Vec<u8>,
}

impl ExportArtifact {
    /// Write the payload to `dir/filename`, creating `dir` if needed.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.payload)?;
        debug!("Wrote {} ({} bytes)", path.display(), self.payload.len());
        Ok(path)
    }
}

/// `<prefix>-logs-<YYYY-MM-DD>.<ext>`
pub fn logs_filename(prefix: &str, date: NaiveDate, format: ExportFormat) -> String {
    format!("{}-logs-{}.{}", prefix, date.format("%Y-%m-%d"), format.extension())
}

/// `<prefix>-metrics-<YYYY-MM-DD>.json`
pub fn metrics_filename(prefix: &str, date: NaiveDate) -> String {
    format!("{}-metrics-{}.json", prefix, date.format("%Y-%m-%d"))
}

/// Export log entries, stamping the filename with today's UTC date.
pub fn export_logs(entries: &[LogEntry], format: ExportFormat, prefix: &str) -> Result<ExportArtifact> {
    export_logs_on(entries, format, prefix, Utc::now().date_naive())
}

pub fn export_logs_on(
    entries: &[LogEntry],
    format: ExportFormat,
    prefix: &str,
    date: NaiveDate,
) -> Result<ExportArtifact> {
    let sanitized: Vec<LogEntry> = entries.iter().map(sanitize_entry).collect();
    let payload = match format {
        ExportFormat::Json => to_json(&sanitized)?,
        ExportFormat::JsonLines => {
            let mut out = Vec::new();
            for entry in &sanitized {
                out.extend(serde_json::to_vec(entry).map_err(|e| Error::Serialization(e.to_string()))?);
                out.push(b'\n');
            }
            out
        }
    };
    debug!("Exported {} log entries as {:?}", sanitized.len(), format);
    Ok(ExportArtifact {
        filename: logs_filename(prefix, date, format),
        content_type: format.content_type(),
        payload,
    })
}

pub fn export_metrics(samples: &[MetricSample], prefix: &str) -> Result<ExportArtifact> {
    export_metrics_on(samples, prefix, Utc::now().date_naive())
}

pub fn export_metrics_on(samples: &[MetricSample], prefix: &str, date: NaiveDate) -> Result<ExportArtifact> {
    Ok(ExportArtifact {
        filename: metrics_filename(prefix, date),
        content_type: ExportFormat::Json.content_type(),
        payload: to_json(samples)?,
    })
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn sanitize_entry(entry: &LogEntry) -> LogEntry {
    if entry.metadata.values().all(MetadataValue::is_json_safe) {
        return entry.clone();
    }
    let mut clean = entry.clone();
    for (key, value) in clean.metadata.iter_mut() {
        if !value.is_json_safe() {
            warn!(
                "Log entry {} metadata {:?} is not JSON-safe; exporting it as a string",
                entry.id, key
            );
            *value = sanitize_value(value);
        }
    }
    clean
}

/// Non-finite floats become their string form; containers are walked.
pub fn sanitize_value(value: &MetadataValue) -> MetadataValue {
    match value {
        MetadataValue::Float(f) if !f.is_finite() => MetadataValue::String(f.to_string()),
        MetadataValue::List(items) => MetadataValue::List(items.iter().map(sanitize_value).collect()),
        MetadataValue::Map(map) => MetadataValue::Map(
            map.iter().map(|(k, v)| (k.clone(), sanitize_value(v))).collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogLevel;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn filename_pattern() {
        assert_eq!(logs_filename("daedalus", date(), ExportFormat::Json), "daedalus-logs-2024-01-15.json");
        assert_eq!(logs_filename("x", date(), ExportFormat::JsonLines), "x-logs-2024-01-15.jsonl");
        assert_eq!(metrics_filename("x", date()), "x-metrics-2024-01-15.json");
    }

    #[test]
    fn field_order_is_stable() {
        let entry = LogEntry::new(7, LogLevel::Info, "ERPS", "hello").with_metadata("b", 1i64);
        let artifact = export_logs_on(&[entry], ExportFormat::JsonLines, "p", date()).unwrap();
        let line = String::from_utf8(artifact.payload).unwrap();
        let positions: Vec<usize> = ["\"id\"", "\"timestamp\"", "\"level\"", "\"component\"", "\"message\"", "\"metadata\""]
            .iter()
            .map(|k| line.find(k).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", line);
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn non_finite_metadata_is_stringified() {
        let entry = LogEntry::new(1, LogLevel::Error, "SIGMA-MATRIX", "diverged")
            .with_metadata("coherence", f64::INFINITY)
            .with_metadata("samples", vec![MetadataValue::Float(f64::NAN), MetadataValue::Int(2)]);
        let artifact = export_logs_on(&[entry], ExportFormat::Json, "p", date()).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&artifact.payload).unwrap();
        assert_eq!(parsed[0]["metadata"]["coherence"], "inf");
        assert_eq!(parsed[0]["metadata"]["samples"][0], "NaN");
        assert_eq!(parsed[0]["metadata"]["samples"][1], 2);
    }

    #[test]
    fn format_parses_aliases() {
        assert_eq!("ndjson".parse::<ExportFormat>().unwrap(), ExportFormat::JsonLines);
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("csv".parse::<ExportFormat>().is_err());
    }
}
