//! Named counters, mirrored to the log with a `METRIC` marker.

use compact_str::CompactString;
use dashmap::DashMap;
use tracing::info;

#[derive(Debug, Default)]
pub struct Metrics {
    counters: DashMap<CompactString, u64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        let value = {
            let mut counter = self.counters.entry(CompactString::new(name)).or_insert(0);
            *counter += 1;
            *counter
        };
        info!(marker = "METRIC", metric = name, value, "Metric recorded");
    }

    pub fn count(&self, name: &str) -> u64 {
        self.counters.get(name).map_or(0, |v| *v)
    }
}
