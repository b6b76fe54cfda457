use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;

/// Counter sink handed to the components that report activity.
pub trait MetricsSink: Send + Sync {
    fn incr(&self, name: &str, labels: &[(&str, &str)], value: u64);
}

/// Emits counters as tracing events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsSink for TracingMetrics {
    fn incr(&self, name: &str, labels: &[(&str, &str)], value: u64) {
        debug!(metric = name, ?labels, value, "counter");
    }
}

/// Keeps counters in memory, keyed by name and sorted labels.
#[derive(Debug, Default)]
pub struct RecordingMetrics {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str, labels: &[(&str, &str)]) -> String {
        let mut labels: Vec<String> = labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        labels.sort();
        format!("{}{{{}}}", name, labels.join(","))
    }

    pub fn get(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = Self::key(name, labels);
        self.counters
            .lock()
            .map(|c| c.get(&key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Sum across every label set of `name`.
    pub fn total(&self, name: &str) -> u64 {
        let prefix = format!("{}{{", name);
        self.counters
            .lock()
            .map(|c| {
                c.iter()
                    .filter(|(k, _)| k.starts_with(&prefix))
                    .map(|(_, v)| *v)
                    .sum()
            })
            .unwrap_or(0)
    }
}

impl MetricsSink for RecordingMetrics {
    fn incr(&self, name: &str, labels: &[(&str, &str)], value: u64) {
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(Self::key(name, labels)).or_insert(0) += value;
        }
    }
}
