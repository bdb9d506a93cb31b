//! Counters for interception chains.

use super::Outcome;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Why a stage was turned into a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultClass {
    /// The extension misused the packet or output API.
    Validation,
    /// Any other error returned by the extension.
    Runtime,
    Panic,
}

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    chains: AtomicU64,
    delivered: AtomicU64,
    prevented: AtomicU64,
    disconnects: AtomicU64,
    timeouts: AtomicU64,
    validation_faults: AtomicU64,
    runtime_faults: AtomicU64,
    panic_faults: AtomicU64,
}

/// Point-in-time copy of [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub chains: u64,
    pub delivered: u64,
    pub prevented: u64,
    pub disconnects: u64,
    pub timeouts: u64,
    pub validation_faults: u64,
    pub runtime_faults: u64,
    pub panic_faults: u64,
}

impl PipelineMetrics {
    pub fn record_outcome(&self, outcome: &Outcome) {
        self.chains.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            Outcome::Delivered(_) => &self.delivered,
            Outcome::Prevented { .. } => &self.prevented,
            Outcome::Disconnect { .. } => &self.disconnects,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault(&self, class: FaultClass) {
        let counter = match class {
            FaultClass::Validation => &self.validation_faults,
            FaultClass::Runtime => &self.runtime_faults,
            FaultClass::Panic => &self.panic_faults,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            chains: self.chains.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            prevented: self.prevented.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            validation_faults: self.validation_faults.load(Ordering::Relaxed),
            runtime_faults: self.runtime_faults.load(Ordering::Relaxed),
            panic_faults: self.panic_faults.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    pub fn faults(&self) -> u64 {
        self.validation_faults + self.runtime_faults + self.panic_faults
    }

    /// Prometheus text exposition.
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        for (name, value) in [
            ("gatehouse_chains_total", self.chains),
            ("gatehouse_chains_delivered_total", self.delivered),
            ("gatehouse_chains_prevented_total", self.prevented),
            ("gatehouse_chains_disconnect_total", self.disconnects),
            ("gatehouse_interceptor_timeouts_total", self.timeouts),
        ] {
            out.push_str(&format!("{name} {value}\n"));
        }
        for (class, value) in [
            ("validation", self.validation_faults),
            ("runtime", self.runtime_faults),
            ("panic", self.panic_faults),
        ] {
            out.push_str(&format!(
                "gatehouse_interceptor_faults_total{{class=\"{class}\"}} {value}\n"
            ));
        }
        out
    }
}
