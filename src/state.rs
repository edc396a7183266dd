//! Application state and component wiring.
//!
//! `Components` turns the effective configuration into an engine and a
//! remediator that share one provider and one policy registry. The HTTP
//! server wraps them in `AppState` together with the Prometheus registry.

use chrono::Utc;
use prometheus::Registry;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

use procwarden::action::{ActionExecutor, LinuxExecutor, Remediator, SnapshotExecutor};
use procwarden::classify::{ClassificationEngine, ClassificationResult};
use procwarden::metrics::ScanMetrics;
use procwarden::policy::{PolicyGate, PolicyRegistry};
use procwarden::snapshot::{
    HostProvider, ProcfsReader, ProviderError, SnapshotProvider, StaticProvider, SystemdReader,
};

use crate::config::{Config, DEFAULT_CPU_SAMPLE_INTERVAL_MS};

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

/// Engine, remediator and policy built from one configuration.
pub struct Components {
    pub engine: Arc<ClassificationEngine>,
    pub remediator: Arc<Remediator>,
    pub registry: Arc<PolicyRegistry>,
    /// Snapshot file mode: no live host access.
    pub offline: bool,
    sample_interval: Duration,
}

impl Components {
    pub fn build(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        let registry = Arc::new(config.build_registry()?);
        let scan_services = config.scan_services.unwrap_or(true);

        let (provider, executor, offline): (
            Arc<dyn SnapshotProvider>,
            Arc<dyn ActionExecutor>,
            bool,
        ) = match &config.test_data_file {
            Some(path) => {
                info!("Using snapshot file {}", path.display());
                let snapshot = Arc::new(StaticProvider::from_file(path)?);
                let executor = Arc::new(SnapshotExecutor::new(snapshot.clone()));
                (snapshot, executor, true)
            }
            None => {
                let proc_root = config.proc_root();
                debug!("Reading processes from {}", proc_root.display());
                let systemd = scan_services.then(SystemdReader::default);
                let host = Arc::new(HostProvider::new(ProcfsReader::new(&proc_root), systemd));
                let executor = Arc::new(LinuxExecutor::new(proc_root, "systemctl"));
                (host, executor, false)
            }
        };

        let engine = ClassificationEngine::new(provider.clone(), registry.clone())?
            .with_services(scan_services);
        let remediator = Remediator::new(provider, executor, PolicyGate::new(registry.clone()))
            .with_timeouts(config.timeout_policy());

        Ok(Self {
            engine: Arc::new(engine),
            remediator: Arc::new(remediator),
            registry,
            offline,
            sample_interval: Duration::from_millis(
                config
                    .cpu_sample_interval_ms
                    .unwrap_or(DEFAULT_CPU_SAMPLE_INTERVAL_MS),
            ),
        })
    }

    /// Waits one sample interval so live CPU percentages have a baseline.
    pub fn warm_up(&self) {
        if !self.offline && !self.sample_interval.is_zero() {
            debug!("Waiting {:?} for CPU baseline", self.sample_interval);
            std::thread::sleep(self.sample_interval);
        }
    }
}

/// Last completed scan, kept for `/scan` readers between refreshes.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub result: ClassificationResult,
    pub processes: usize,
    pub services: usize,
    pub elapsed_ms: u64,
}

/// Global application state shared across requests.
pub struct AppState {
    pub registry: Registry,
    pub metrics: ScanMetrics,
    pub engine: Arc<ClassificationEngine>,
    pub remediator: Arc<Remediator>,
    pub config: Arc<Config>,
    pub last_scan: RwLock<Option<ScanSummary>>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(components: Components, config: Config) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let metrics = ScanMetrics::new(&registry)?;
        debug!("Prometheus registry initialized");

        Ok(Self {
            registry,
            metrics,
            engine: components.engine,
            remediator: components.remediator,
            config: Arc::new(config),
            last_scan: RwLock::new(None),
            start_time: Instant::now(),
        })
    }

    /// Takes and classifies one snapshot, publishing the metrics.
    ///
    /// Blocking; call from `spawn_blocking` inside the server.
    pub fn scan_blocking(&self) -> Result<ScanSummary, ProviderError> {
        let start = Instant::now();
        let snapshot = match self.engine.snapshot() {
            Ok(s) => s,
            Err(e) => {
                self.metrics.scan_failures_total.inc();
                return Err(e);
            }
        };
        let result = self.engine.classify(&snapshot, Utc::now());
        let elapsed = start.elapsed();

        self.metrics.observe_scan(
            &result,
            snapshot.processes.len(),
            snapshot.services.len(),
            elapsed,
            self.engine.history().tracked_pids(),
        );

        Ok(ScanSummary {
            result,
            processes: snapshot.processes.len(),
            services: snapshot.services.len(),
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }
}
