use ahash::AHashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// Metric names recorded by the bridge.
pub mod names {
    /// Frames written to the socket, labelled by `kind` (`envelope` / `heartbeat`).
    pub const FRAMES_SENT: &str = "vt_frames_sent_total";
    /// Sends that never reached the socket, labelled by `reason`.
    pub const SENDS_DROPPED: &str = "vt_sends_dropped_total";
    /// Calls to `connect`, labelled by `outcome`.
    pub const CONNECT_ATTEMPTS: &str = "vt_connect_attempts_total";
    /// Full stop sequences, labelled by `reason`.
    pub const TEARDOWNS: &str = "vt_teardowns_total";
    /// Messages classified on submit, labelled by `decision`.
    pub const CLASSIFICATIONS: &str = "vt_classifications_total";
    /// 0 = disconnected, 1 = connecting, 2 = open, 3 = closed.
    pub const CONNECTION_STATE: &str = "vt_connection_state";
}

// ---------------------------------------------------------------------------
// Label key for counters
// ---------------------------------------------------------------------------

/// A label set is a sorted list of key=value pairs, used to distinguish
/// counter families.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Labels(Vec<(String, String)>);

impl Labels {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        let mut v: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        v.sort_by(|a, b| a.0.cmp(&b.0));
        Self(v)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Format labels as `{key="value",key2="value2"}` for Prometheus output.
    pub fn prometheus_str(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let inner: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect();
        format!("{{{}}}", inner.join(","))
    }
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

/// Counters and gauges shared between the controller and the socket task.
///
/// Registration takes a write lock once per new series; updates are atomic.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    counters: RwLock<AHashMap<(String, Labels), AtomicU64>>,
    gauges: RwLock<AHashMap<String, AtomicI64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by 1.
    pub fn increment_counter(&self, name: &str, labels: &[(&str, &str)]) {
        self.increment_counter_by(name, labels, 1);
    }

    /// Increment a counter by an arbitrary amount.
    pub fn increment_counter_by(&self, name: &str, labels: &[(&str, &str)], amount: u64) {
        let key = (name.to_string(), Labels::new(labels));
        {
            let map = self.counters.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(c) = map.get(&key) {
                c.fetch_add(amount, Ordering::Relaxed);
                return;
            }
        }
        let mut map = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(key)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(amount, Ordering::Relaxed);
    }

    /// Get the current value of a counter.
    pub fn get_counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        let key = (name.to_string(), Labels::new(labels));
        let map = self.counters.read().unwrap_or_else(PoisonError::into_inner);
        map.get(&key).map(|c| c.load(Ordering::Relaxed)).unwrap_or(0)
    }

    /// Sum a counter across every label set.
    pub fn counter_total(&self, name: &str) -> u64 {
        let map = self.counters.read().unwrap_or_else(PoisonError::into_inner);
        map.iter()
            .filter(|((n, _), _)| n == name)
            .map(|(_, c)| c.load(Ordering::Relaxed))
            .sum()
    }

    /// Set a gauge to an absolute value.
    pub fn set_gauge(&self, name: &str, value: i64) {
        {
            let map = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(g) = map.get(name) {
                g.store(value, Ordering::Relaxed);
                return;
            }
        }
        let mut map = self.gauges.write().unwrap_or_else(PoisonError::into_inner);
        map.entry(name.to_string())
            .or_insert_with(|| AtomicI64::new(0))
            .store(value, Ordering::Relaxed);
    }

    /// Get the current value of a gauge.
    pub fn get_gauge(&self, name: &str) -> i64 {
        let map = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
        map.get(name).map(|g| g.load(Ordering::Relaxed)).unwrap_or(0)
    }

    /// Export all metrics in Prometheus text exposition format.
    pub fn export_prometheus(&self) -> String {
        let mut out = String::new();

        {
            let map = self.counters.read().unwrap_or_else(PoisonError::into_inner);
            let mut grouped: AHashMap<&str, Vec<(&Labels, u64)>> = AHashMap::new();
            for ((name, labels), val) in map.iter() {
                grouped
                    .entry(name.as_str())
                    .or_default()
                    .push((labels, val.load(Ordering::Relaxed)));
            }
            let mut names: Vec<&str> = grouped.keys().copied().collect();
            names.sort_unstable();
            for name in names {
                out.push_str(&format!("# TYPE {} counter\n", name));
                let mut entries = grouped[name].clone();
                entries.sort_by_key(|(labels, _)| labels.prometheus_str());
                for (labels, value) in entries {
                    out.push_str(&format!("{}{} {}\n", name, labels.prometheus_str(), value));
                }
            }
        }

        {
            let map = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
            let mut names: Vec<&String> = map.keys().collect();
            names.sort();
            for name in names {
                out.push_str(&format!("# TYPE {} gauge\n", name));
                out.push_str(&format!("{} {}\n", name, map[name].load(Ordering::Relaxed)));
            }
        }

        out
    }

    /// Export all metrics as a JSON value.
    pub fn export_json(&self) -> serde_json::Value {
        let mut counters_json = serde_json::Map::new();
        {
            let map = self.counters.read().unwrap_or_else(PoisonError::into_inner);
            for ((name, labels), val) in map.iter() {
                let key = format!("{}{}", name, labels.prometheus_str());
                counters_json.insert(key, serde_json::json!(val.load(Ordering::Relaxed)));
            }
        }

        let mut gauges_json = serde_json::Map::new();
        {
            let map = self.gauges.read().unwrap_or_else(PoisonError::into_inner);
            for (name, val) in map.iter() {
                gauges_json.insert(name.clone(), serde_json::json!(val.load(Ordering::Relaxed)));
            }
        }

        serde_json::json!({
            "counters": counters_json,
            "gauges": gauges_json,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
