//! StreamEngine - owns the log stream, the metric streams and the current run
//!
//! Each stream gets its own ticker while the run is `running`. Pausing,
//! completing or failing a run cancels every ticker before the state moves,
//! so ticks only ever mutate streams of a running run. Views (filtering,
//! export) work on cloned snapshots and never hold a stream lock while
//! filtering.

use crate::config::EngineConfig;
use crate::generator::LogGenerator;
use crate::run::{Run, RunState};
use crate::ticker::{lock, Ticker};
use crate::walker::MetricWalker;
use dashmap::DashMap;
use mindstream_core::export::{self, ExportArtifact, ExportFormat};
use mindstream_core::filter::{self, FilterState};
use mindstream_core::{DisplayOrder, Error, LogEntry, Metadata, MetadataValue, MetricSample, Result, RingBuffer};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 1024;

/// Events emitted to every subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Log(LogEntry),
    Metric(MetricSample),
    State { run: Uuid, state: RunState },
    Progress { run: Uuid, progress: f64 },
}

pub struct LogStream {
    generator: LogGenerator,
    buffer: RingBuffer<LogEntry>,
    events: broadcast::Sender<EngineEvent>,
}

impl LogStream {
    fn tick(&mut self) -> LogEntry {
        let entry = self.generator.generate();
        debug!("log #{} [{}] {}", entry.id, entry.level, entry.component);
        self.buffer.push(entry.clone());
        let _ = self.events.send(EngineEvent::Log(entry.clone()));
        entry
    }
}

pub struct MetricStream {
    walker: MetricWalker,
    history: RingBuffer<MetricSample>,
    rng: Box<dyn RngCore + Send>,
    events: broadcast::Sender<EngineEvent>,
}

impl MetricStream {
    fn tick(&mut self) -> MetricSample {
        let sample = self.walker.step(&mut *self.rng);
        debug!("metric {} = {:.3}", sample.name, sample.value);
        self.history.push(sample.clone());
        let _ = self.events.send(EngineEvent::Metric(sample.clone()));
        sample
    }

    fn reset(&mut self) {
        self.walker.reset();
        self.history.clear();
        self.history.push(self.walker.sample());
    }
}

/// Hands out random sources: seeded children of one master seed, or entropy.
struct RngFactory {
    master: Option<StdRng>,
}

impl RngFactory {
    fn new(seed: Option<u64>) -> Self {
        Self {
            master: seed.map(StdRng::seed_from_u64),
        }
    }

    fn next(&mut self) -> Box<dyn RngCore + Send> {
        match self.master.as_mut() {
            Some(master) => Box::new(StdRng::seed_from_u64(master.gen())),
            None => Box::new(StdRng::from_entropy()),
        }
    }
}

pub struct StreamEngine {
    config: EngineConfig,
    logs: Arc<Mutex<LogStream>>,
    metrics: DashMap<String, Arc<Mutex<MetricStream>>>,
    run: Arc<Mutex<Run>>,
    /// Finished runs, oldest first.
    history: RingBuffer<Run>,
    run_token: CancellationToken,
    log_ticker: Option<Ticker<LogStream>>,
    metric_tickers: Vec<Ticker<MetricStream>>,
    progress_ticker: Option<Ticker<Run>>,
    events: broadcast::Sender<EngineEvent>,
    rngs: RngFactory,
}

impl std::fmt::Debug for StreamEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl StreamEngine {
    /// Validate `config` and build every stream. Nothing ticks until `start`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let mut rngs = RngFactory::new(config.seed);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let order = if config.logs.newest_first {
            DisplayOrder::NewestFirst
        } else {
            DisplayOrder::OldestFirst
        };
        let logs = LogStream {
            generator: LogGenerator::new(&config.logs, rngs.next())?,
            buffer: RingBuffer::with_order(config.logs.capacity, order)?,
            events: events.clone(),
        };

        let metrics = DashMap::new();
        for (name, range) in &config.metrics.ranges {
            let walker = MetricWalker::new(name.clone(), range.clone())?;
            let mut history = RingBuffer::new(config.metrics.history)?;
            history.push(walker.sample());
            let stream = MetricStream {
                walker,
                history,
                rng: rngs.next(),
                events: events.clone(),
            };
            metrics.insert(name.clone(), Arc::new(Mutex::new(stream)));
        }

        let run = Run::new(config.run.name.clone()).with_parameters(config.run.parameters.clone());
        let history = RingBuffer::new(config.run.history)?;
        info!(
            "Engine ready: {} components, {} metrics, log capacity {}",
            config.logs.components.len(),
            metrics.len(),
            config.logs.capacity
        );

        Ok(Self {
            logs: Arc::new(Mutex::new(logs)),
            metrics,
            run: Arc::new(Mutex::new(run)),
            history,
            run_token: CancellationToken::new(),
            log_ticker: None,
            metric_tickers: Vec::new(),
            progress_ticker: None,
            events,
            rngs,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> RunState {
        lock(&self.run).state
    }

    pub fn run(&self) -> Run {
        lock(&self.run).clone()
    }

    /// Finished runs (oldest first) followed by the current one.
    pub fn runs(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = self.history.iter().cloned().collect();
        runs.push(self.run());
        runs
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// idle → running. Spawns the tickers, so call from inside a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        self.transition(RunState::Running, RunState::Idle)?;
        self.spawn_tickers();
        Ok(())
    }

    /// running → paused. Buffers are kept.
    pub fn pause(&mut self) -> Result<()> {
        self.halt(RunState::Paused)
    }

    /// paused → running.
    pub fn resume(&mut self) -> Result<()> {
        self.transition(RunState::Running, RunState::Paused)?;
        self.spawn_tickers();
        Ok(())
    }

    /// running → completed.
    pub fn complete(&mut self) -> Result<()> {
        self.halt(RunState::Completed)
    }

    /// running | paused → error.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<()> {
        let reason = reason.into();
        self.ensure_can(RunState::Error)?;
        self.stop_tickers();
        let mut run = lock(&self.run);
        run.fail(reason.clone())?;
        let id = run.id;
        drop(run);
        warn!("Run {} failed: {}", id, reason);
        let _ = self.events.send(EngineEvent::State {
            run: id,
            state: RunState::Error,
        });
        Ok(())
    }

    /// Replace a finished (or never started) run with a fresh idle one using
    /// the configured name and parameters.
    pub fn new_run(&mut self) -> Result<Run> {
        let name = self.config.run.name.clone();
        let parameters = self.config.run.parameters.clone();
        self.new_run_with(name, parameters)
    }

    /// Like `new_run`, with an explicit name and parameters. A finished run
    /// moves to `runs()` history; clears the log buffer and resets every
    /// metric to its initial value.
    pub fn new_run_with(&mut self, name: impl Into<String>, parameters: Metadata) -> Result<Run> {
        let state = self.state();
        if !(state.is_terminal() || state == RunState::Idle) {
            return Err(Error::invalid_transition(state, RunState::Idle));
        }
        if let Some((key, _)) = parameters.iter().find(|(_, v)| !v.is_json_safe()) {
            return Err(Error::config(format!("parameters.{}", key), "must be JSON-safe"));
        }
        self.stop_tickers();
        self.run_token = CancellationToken::new();

        lock(&self.logs).buffer.clear();
        for stream in self.metric_streams() {
            lock(&stream).reset();
        }

        let run = Run::new(name).with_parameters(parameters);
        let previous = std::mem::replace(&mut *lock(&self.run), run.clone());
        if previous.state.is_terminal() {
            self.history.push(previous);
        }
        info!("New run {} ({})", run.id, run.name);
        let _ = self.events.send(EngineEvent::State {
            run: run.id,
            state: RunState::Idle,
        });
        Ok(run)
    }

    /// Cancel every ticker and wait for their tasks to exit.
    pub async fn shutdown(&mut self) {
        self.run_token.cancel();
        if let Some(t) = self.log_ticker.take() {
            t.shutdown().await;
        }
        for t in self.metric_tickers.drain(..) {
            t.shutdown().await;
        }
        if let Some(t) = self.progress_ticker.take() {
            t.shutdown().await;
        }
        debug!("Engine shut down");
    }

    fn ensure_can(&self, to: RunState) -> Result<()> {
        let from = self.state();
        if from.can_transition(to) {
            Ok(())
        } else {
            Err(Error::invalid_transition(from, to))
        }
    }

    /// Stop tickers first, then move the state: no tick lands after the move.
    fn halt(&mut self, to: RunState) -> Result<()> {
        self.ensure_can(to)?;
        self.stop_tickers();
        let from = self.state();
        // The progress ticker may have completed the run meanwhile.
        if from == to {
            return Ok(());
        }
        self.transition(to, from)
    }

    fn transition(&mut self, to: RunState, expected: RunState) -> Result<()> {
        let results = (to == RunState::Completed).then(|| results_of(&self.metric_streams()));
        let mut run = lock(&self.run);
        if run.state != expected {
            return Err(Error::invalid_transition(run.state, to));
        }
        match results {
            Some(results) => run.complete_with(results)?,
            None => run.transition(to)?,
        }
        let id = run.id;
        drop(run);
        info!("Run {} -> {}", id, to);
        let _ = self.events.send(EngineEvent::State { run: id, state: to });
        Ok(())
    }

    fn spawn_tickers(&mut self) {
        let cfg = &self.config;

        let log_ticker = Ticker::spawn(
            "logs",
            cfg.logs.interval,
            self.rngs.next(),
            self.logs.clone(),
            &self.run_token,
            |stream: &mut LogStream| {
                stream.tick();
            },
        );
        self.log_ticker = Some(log_ticker);

        let streams = self.metric_streams();
        let mut metric_tickers = Vec::with_capacity(streams.len());
        for stream in &streams {
            let name = lock(stream).walker.name().to_string();
            metric_tickers.push(Ticker::spawn(
                format!("metric:{}", name),
                cfg.metrics.interval,
                self.rngs.next(),
                stream.clone(),
                &self.run_token,
                |stream: &mut MetricStream| {
                    stream.tick();
                },
            ));
        }
        self.metric_tickers = metric_tickers;

        if let Some(step_max) = cfg.run.progress_step_max {
            let mut rng = self.rngs.next();
            let events = self.events.clone();
            let run_token = self.run_token.clone();
            let logs = self.logs.clone();
            self.progress_ticker = Some(Ticker::spawn(
                "progress",
                cfg.run.progress_interval,
                self.rngs.next(),
                self.run.clone(),
                &self.run_token,
                move |run: &mut Run| {
                    let done = run.advance_progress(rng.gen_range(0.0..=step_max));
                    let _ = events.send(EngineEvent::Progress {
                        run: run.id,
                        progress: run.progress,
                    });
                    if !done {
                        return;
                    }
                    // Stop the streams and wait out in-flight ticks before the run leaves `running`.
                    run_token.cancel();
                    drop(lock(&logs));
                    let results = results_of(&streams);
                    if run.complete_with(results).is_ok() {
                        info!("Run {} completed", run.id);
                        let _ = events.send(EngineEvent::State {
                            run: run.id,
                            state: RunState::Completed,
                        });
                    }
                },
            ));
        }
        debug!("Spawned {} tickers", self.ticker_count());
    }

    fn stop_tickers(&mut self) {
        if let Some(t) = self.log_ticker.take() {
            t.cancel();
        }
        for t in self.metric_tickers.drain(..) {
            t.cancel();
        }
        if let Some(t) = self.progress_ticker.take() {
            t.cancel();
        }
    }

    /// Metric stream handles, sorted by metric name.
    fn metric_streams(&self) -> Vec<Arc<Mutex<MetricStream>>> {
        let mut entries: Vec<(String, Arc<Mutex<MetricStream>>)> = self
            .metrics
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, stream)| stream).collect()
    }

    /// Live tickers (0 unless running).
    pub fn ticker_count(&self) -> usize {
        self.log_ticker.iter().filter(|t| !t.is_cancelled()).count()
            + self.metric_tickers.iter().filter(|t| !t.is_cancelled()).count()
            + self.progress_ticker.iter().filter(|t| !t.is_cancelled()).count()
    }

    // ------------------------------------------------------------------
    // Manual ticks
    // ------------------------------------------------------------------

    /// Generate one log entry now. `None` unless the run is running.
    pub fn tick_logs(&self) -> Option<LogEntry> {
        let run = lock(&self.run);
        if run.state != RunState::Running {
            return None;
        }
        let entry = lock(&self.logs).tick();
        drop(run);
        Some(entry)
    }

    /// Step every metric once now. Empty unless the run is running.
    pub fn tick_metrics(&self) -> Vec<MetricSample> {
        let run = lock(&self.run);
        if run.state != RunState::Running {
            return Vec::new();
        }
        let mut samples: Vec<MetricSample> = self.metrics.iter().map(|s| lock(s.value()).tick()).collect();
        drop(run);
        samples.sort_by(|a, b| a.name.cmp(&b.name));
        samples
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    /// Buffer contents in display order.
    pub fn all_logs(&self) -> Vec<LogEntry> {
        lock(&self.logs).buffer.to_vec()
    }

    /// The filtered view of the log buffer.
    pub fn logs(&self, filter: &FilterState) -> Vec<LogEntry> {
        let snapshot = self.all_logs();
        filter::apply(&snapshot, filter)
    }

    pub fn log_count(&self) -> usize {
        lock(&self.logs).buffer.len()
    }

    pub fn clear_logs(&self) {
        lock(&self.logs).buffer.clear();
        debug!("Log buffer cleared");
    }

    pub fn component_names(&self) -> Vec<String> {
        lock(&self.logs)
            .generator
            .component_names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    /// Current value of every metric, sorted by name.
    pub fn metrics(&self) -> Vec<MetricSample> {
        let mut samples: Vec<MetricSample> = self
            .metrics
            .iter()
            .map(|s| lock(s.value()).walker.sample())
            .collect();
        samples.sort_by(|a, b| a.name.cmp(&b.name));
        samples
    }

    pub fn metric(&self, name: &str) -> Option<MetricSample> {
        self.metrics.get(name).map(|s| lock(s.value()).walker.sample())
    }

    /// Oldest → newest history for one metric.
    pub fn metric_history(&self, name: &str) -> Option<Vec<MetricSample>> {
        self.metrics.get(name).map(|s| lock(s.value()).history.to_vec())
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    pub fn export_logs(&self, filter: &FilterState, format: ExportFormat) -> Result<ExportArtifact> {
        let view = self.logs(filter);
        let artifact = export::export_logs(&view, format, &self.config.export_prefix)?;
        info!("Exported {} log entries to {}", view.len(), artifact.filename);
        Ok(artifact)
    }

    /// Every metric's history, grouped by metric name.
    pub fn export_metrics(&self) -> Result<ExportArtifact> {
        let mut names: Vec<String> = self.metrics.iter().map(|e| e.key().clone()).collect();
        names.sort();
        let samples: Vec<MetricSample> = names
            .iter()
            .filter_map(|n| self.metric_history(n))
            .flatten()
            .collect();
        export::export_metrics(&samples, &self.config.export_prefix)
    }
}

/// Current value of every metric, keyed by name. Takes each stream lock in turn.
fn results_of(streams: &[Arc<Mutex<MetricStream>>]) -> Metadata {
    streams
        .iter()
        .map(|stream| {
            let stream = lock(stream);
            let value = if stream.walker.range().integral {
                MetadataValue::Int(stream.walker.value() as i64)
            } else {
                MetadataValue::Float(stream.walker.value())
            };
            (stream.walker.name().to_string(), value)
        })
        .collect()
}

impl Drop for StreamEngine {
    fn drop(&mut self) {
        self.run_token.cancel();
    }
}
