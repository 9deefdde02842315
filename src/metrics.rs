// Toolgate - Metrics Recorder
//
// Append-only in-memory event log with derived aggregates.
// Bounded rings: 10,000 requests, 1,000 errors, oldest evicted first.
// Latency history keeps the last 1,000 samples per tool. Aggregates
// window request/error counts but average latency over the entire
// retained history — that asymmetry is deliberate and load-bearing
// (see get_metrics).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Mutex;

const MAX_REQUESTS: usize = 10_000;
const MAX_ERRORS: usize = 1_000;
const MAX_LATENCY_SAMPLES: usize = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub tool: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub tool: Option<String>,
    pub error: String,
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate view over the trailing window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub period_hours: i64,
    pub total_requests: usize,
    pub total_errors: usize,
    /// Percentage, rounded to two decimals; 0 when no requests
    pub success_rate: f64,
    pub tool_usage: HashMap<String, u64>,
    /// Mean over the whole retained latency history, not the window
    pub avg_response_times: HashMap<String, f64>,
    pub error_breakdown: HashMap<String, u64>,
    pub uptime_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolPerformance {
    pub tool: String,
    pub total_calls: usize,
    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
}

/// Snapshot written to disk; loading restores only tool_usage and
/// start_time, never the event rings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub start_time: DateTime<Utc>,
    pub current_time: DateTime<Utc>,
    pub metrics: MetricsSummary,
    pub tool_usage: HashMap<String, u64>,
    pub recent_errors: Vec<ErrorEvent>,
}

/// Thread-safe recorder shared by all connections. Each field has its
/// own lock so request appends never contend with latency appends.
pub struct MetricsRecorder {
    requests: Mutex<std::collections::VecDeque<RequestEvent>>,
    errors: Mutex<std::collections::VecDeque<ErrorEvent>>,
    tool_usage: Mutex<HashMap<String, u64>>,
    response_times: Mutex<HashMap<String, Vec<f64>>>,
    start_time: Mutex<DateTime<Utc>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(std::collections::VecDeque::new()),
            errors: Mutex::new(std::collections::VecDeque::new()),
            tool_usage: Mutex::new(HashMap::new()),
            response_times: Mutex::new(HashMap::new()),
            start_time: Mutex::new(Utc::now()),
        }
    }

    /// Append a RequestEvent; bumps the per-tool counter when a tool is
    /// named. Never fails.
    pub fn record_request(&self, kind: &str, tool: Option<&str>) {
        let event = RequestEvent {
            kind: kind.to_string(),
            tool: tool.map(|s| s.to_string()),
            timestamp: Utc::now(),
        };
        let mut requests = self.requests.lock().expect("requests lock poisoned");
        if requests.len() >= MAX_REQUESTS {
            requests.pop_front();
        }
        requests.push_back(event);
        drop(requests);

        if let Some(tool) = tool {
            let mut usage = self.tool_usage.lock().expect("usage lock poisoned");
            *usage.entry(tool.to_string()).or_insert(0) += 1;
        }
    }

    /// Record a success: append the duration to the tool's latency
    /// history, trimmed to the most recent 1,000 samples.
    pub fn record_success(&self, _kind: &str, tool: Option<&str>, duration_secs: f64) {
        if let Some(tool) = tool {
            let mut times = self.response_times.lock().expect("latency lock poisoned");
            let samples = times.entry(tool.to_string()).or_default();
            samples.push(duration_secs);
            if samples.len() > MAX_LATENCY_SAMPLES {
                let excess = samples.len() - MAX_LATENCY_SAMPLES;
                samples.drain(..excess);
            }
        }
    }

    pub fn record_error(&self, kind: &str, tool: Option<&str>, message: &str, duration_secs: f64) {
        let event = ErrorEvent {
            kind: kind.to_string(),
            tool: tool.map(|s| s.to_string()),
            error: message.to_string(),
            execution_time: duration_secs,
            timestamp: Utc::now(),
        };
        let mut errors = self.errors.lock().expect("errors lock poisoned");
        if errors.len() >= MAX_ERRORS {
            errors.pop_front();
        }
        errors.push_back(event);
    }

    /// Aggregates over the trailing `window_hours`
    pub fn get_metrics(&self, window_hours: i64) -> MetricsSummary {
        let cutoff = Utc::now() - Duration::hours(window_hours);

        let requests = self.requests.lock().expect("requests lock poisoned");
        let recent: Vec<&RequestEvent> =
            requests.iter().filter(|r| r.timestamp > cutoff).collect();
        let total_requests = recent.len();

        let mut tool_usage: HashMap<String, u64> = HashMap::new();
        for req in &recent {
            if let Some(tool) = &req.tool {
                *tool_usage.entry(tool.clone()).or_insert(0) += 1;
            }
        }
        drop(requests);

        let errors = self.errors.lock().expect("errors lock poisoned");
        let recent_errors: Vec<&ErrorEvent> =
            errors.iter().filter(|e| e.timestamp > cutoff).collect();
        let total_errors = recent_errors.len();

        let mut error_breakdown: HashMap<String, u64> = HashMap::new();
        for err in &recent_errors {
            let key = err.tool.clone().unwrap_or_else(|| "unknown".to_string());
            *error_breakdown.entry(key).or_insert(0) += 1;
        }
        drop(errors);

        // Never divide by zero
        let success_rate = if total_requests > 0 {
            let rate =
                (total_requests as f64 - total_errors as f64) / total_requests as f64 * 100.0;
            (rate * 100.0).round() / 100.0
        } else {
            0.0
        };

        let times = self.response_times.lock().expect("latency lock poisoned");
        let mut avg_response_times = HashMap::new();
        for (tool, samples) in times.iter() {
            if !samples.is_empty() {
                let avg = samples.iter().sum::<f64>() / samples.len() as f64;
                avg_response_times.insert(tool.clone(), avg);
            }
        }
        drop(times);

        let started = *self.start_time.lock().expect("start_time lock poisoned");
        let uptime_seconds = (Utc::now() - started).num_milliseconds() as f64 / 1000.0;

        MetricsSummary {
            period_hours: window_hours,
            total_requests,
            total_errors,
            success_rate,
            tool_usage,
            avg_response_times,
            error_breakdown,
            uptime_seconds,
        }
    }

    /// Per-tool latency stats; all zeros when no samples exist
    pub fn get_tool_performance(&self, tool: &str) -> ToolPerformance {
        let times = self.response_times.lock().expect("latency lock poisoned");
        let samples = times.get(tool).map(|s| s.as_slice()).unwrap_or(&[]);
        if samples.is_empty() {
            return ToolPerformance {
                tool: tool.to_string(),
                total_calls: 0,
                avg_response_time: 0.0,
                min_response_time: 0.0,
                max_response_time: 0.0,
            };
        }
        let total = samples.len();
        let sum: f64 = samples.iter().sum();
        let min = samples.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = samples.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        ToolPerformance {
            tool: tool.to_string(),
            total_calls: total,
            avg_response_time: sum / total as f64,
            min_response_time: min,
            max_response_time: max,
        }
    }

    /// Most recent `count` errors, oldest first
    pub fn recent_errors(&self, count: usize) -> Vec<ErrorEvent> {
        let errors = self.errors.lock().expect("errors lock poisoned");
        let skip = errors.len().saturating_sub(count);
        errors.iter().skip(skip).cloned().collect()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        // Take each lock into a local before building the struct:
        // guards created inline would live for the whole expression and
        // get_metrics re-locks start_time.
        let start_time = *self.start_time.lock().expect("start_time lock poisoned");
        let tool_usage = self.tool_usage.lock().expect("usage lock poisoned").clone();
        let metrics = self.get_metrics(24);
        let recent_errors = self.recent_errors(50);
        MetricsSnapshot {
            start_time,
            current_time: Utc::now(),
            metrics,
            tool_usage,
            recent_errors,
        }
    }

    /// Serialize the current state as pretty JSON
    pub fn export<W: Write>(&self, writer: W) -> anyhow::Result<()> {
        serde_json::to_writer_pretty(writer, &self.snapshot())?;
        Ok(())
    }

    /// Merge a previously exported snapshot: tool-usage counters are
    /// added onto the current ones and start_time is restored. Event
    /// rings and latency history are intentionally not round-tripped.
    pub fn import<R: Read>(&self, reader: R) -> anyhow::Result<()> {
        let snapshot: MetricsSnapshot = serde_json::from_reader(reader)?;
        let mut usage = self.tool_usage.lock().expect("usage lock poisoned");
        for (tool, count) in snapshot.tool_usage {
            *usage.entry(tool).or_insert(0) += count;
        }
        drop(usage);
        *self.start_time.lock().expect("start_time lock poisoned") = snapshot.start_time;
        Ok(())
    }

    pub fn reset(&self) {
        self.requests.lock().expect("requests lock poisoned").clear();
        self.errors.lock().expect("errors lock poisoned").clear();
        self.tool_usage.lock().expect("usage lock poisoned").clear();
        self.response_times.lock().expect("latency lock poisoned").clear();
        *self.start_time.lock().expect("start_time lock poisoned") = Utc::now();
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_zero_without_requests() {
        let recorder = MetricsRecorder::new();
        let summary = recorder.get_metrics(24);
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.success_rate, 0.0);
    }

    #[test]
    fn success_rate_arithmetic() {
        let recorder = MetricsRecorder::new();
        for _ in 0..10 {
            recorder.record_request("call_tool", Some("file_read"));
        }
        recorder.record_error("call_tool", Some("file_read"), "boom", 0.1);
        recorder.record_error("call_tool", Some("file_read"), "boom", 0.1);
        let summary = recorder.get_metrics(24);
        assert_eq!(summary.total_requests, 10);
        assert_eq!(summary.total_errors, 2);
        assert_eq!(summary.success_rate, 80.0);
    }

    #[test]
    fn tool_usage_counted_in_window() {
        let recorder = MetricsRecorder::new();
        recorder.record_request("call_tool", Some("git_status"));
        recorder.record_request("call_tool", Some("git_status"));
        recorder.record_request("list_tools", None);
        let summary = recorder.get_metrics(24);
        assert_eq!(summary.tool_usage.get("git_status"), Some(&2));
        assert_eq!(summary.total_requests, 3);
    }

    #[test]
    fn tool_performance_zero_without_samples() {
        let recorder = MetricsRecorder::new();
        let perf = recorder.get_tool_performance("file_read");
        assert_eq!(perf.total_calls, 0);
        assert_eq!(perf.avg_response_time, 0.0);
        assert_eq!(perf.min_response_time, 0.0);
        assert_eq!(perf.max_response_time, 0.0);
    }

    #[test]
    fn tool_performance_stats() {
        let recorder = MetricsRecorder::new();
        recorder.record_success("call_tool", Some("web_api"), 0.2);
        recorder.record_success("call_tool", Some("web_api"), 0.4);
        recorder.record_success("call_tool", Some("web_api"), 0.6);
        let perf = recorder.get_tool_performance("web_api");
        assert_eq!(perf.total_calls, 3);
        assert!((perf.avg_response_time - 0.4).abs() < 1e-9);
        assert_eq!(perf.min_response_time, 0.2);
        assert_eq!(perf.max_response_time, 0.6);
    }

    #[test]
    fn latency_history_trimmed_to_last_1000() {
        let recorder = MetricsRecorder::new();
        for i in 0..1_200 {
            recorder.record_success("call_tool", Some("db_query"), i as f64);
        }
        let perf = recorder.get_tool_performance("db_query");
        assert_eq!(perf.total_calls, 1_000);
        // oldest 200 samples trimmed
        assert_eq!(perf.min_response_time, 200.0);
        assert_eq!(perf.max_response_time, 1_199.0);
    }

    #[test]
    fn error_ring_bounded() {
        let recorder = MetricsRecorder::new();
        for i in 0..1_050 {
            recorder.record_error("call_tool", Some("t"), &format!("e{}", i), 0.0);
        }
        let summary = recorder.get_metrics(24);
        assert_eq!(summary.total_errors, 1_000);
        let recent = recorder.recent_errors(10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent.last().unwrap().error, "e1049");
    }

    #[test]
    fn snapshot_returns_with_recorded_state() {
        // snapshot() takes every lock the aggregates need; it must
        // return, not wedge on its own recorder.
        let recorder = MetricsRecorder::new();
        recorder.record_request("call_tool", Some("file_read"));
        recorder.record_success("call_tool", Some("file_read"), 0.2);
        let snap = recorder.snapshot();
        assert_eq!(snap.tool_usage.get("file_read"), Some(&1));
        assert_eq!(snap.metrics.total_requests, 1);
        assert!(snap.current_time >= snap.start_time);
        // a second snapshot works too
        let again = recorder.snapshot();
        assert_eq!(again.metrics.total_requests, 1);
    }

    #[test]
    fn snapshot_import_restores_usage_and_start_time() {
        let recorder = MetricsRecorder::new();
        recorder.record_request("call_tool", Some("file_read"));
        recorder.record_request("call_tool", Some("file_read"));
        recorder.record_error("call_tool", Some("file_read"), "nope", 0.1);

        let mut buf = Vec::new();
        recorder.export(&mut buf).unwrap();
        let exported_start = recorder.snapshot().start_time;

        let restored = MetricsRecorder::new();
        restored.record_request("call_tool", Some("file_read"));
        restored.import(buf.as_slice()).unwrap();

        // counters merged, rings not restored
        let snap = restored.snapshot();
        assert_eq!(snap.tool_usage.get("file_read"), Some(&3));
        assert_eq!(snap.start_time, exported_start);
        assert_eq!(restored.recent_errors(10).len(), 0);
    }

    #[test]
    fn reset_clears_everything() {
        let recorder = MetricsRecorder::new();
        recorder.record_request("call_tool", Some("x"));
        recorder.record_success("call_tool", Some("x"), 0.5);
        recorder.record_error("call_tool", Some("x"), "err", 0.5);
        recorder.reset();
        let summary = recorder.get_metrics(24);
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.total_errors, 0);
        assert!(summary.tool_usage.is_empty());
    }
}
