use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::debug::json_escape;

/// Stage timing log. One NDJSON line per pipeline stage per attempt, with
/// per-stage totals emitted when the run ends.
#[derive(Clone)]
pub(crate) struct PerfLogger {
    inner: Arc<Mutex<PerfState>>,
}

struct PerfState {
    writer: BufWriter<File>,
    stage_totals: HashMap<String, f64>,
    stage_counts: HashMap<String, u64>,
}

impl PerfLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(PerfState {
                writer: BufWriter::new(file),
                stage_totals: HashMap::new(),
                stage_counts: HashMap::new(),
            })),
        })
    }

    pub fn log_stage_ms(&self, stage: &str, attempt: usize, ms: f64) {
        let line = format!(
            "{{\"type\":\"perf.stage\",\"stage\":\"{}\",\"attempt\":{},\"unit\":\"ms\",\"ms\":{:.3}}}",
            json_escape(stage),
            attempt,
            ms
        );
        if let Ok(mut state) = self.inner.lock() {
            *state.stage_totals.entry(stage.to_string()).or_insert(0.0) += ms;
            let entry = state.stage_counts.entry(stage.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            let _ = writeln!(state.writer, "{line}");
        }
    }

    pub fn emit_totals(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let mut stages: Vec<(String, f64)> = state
                .stage_totals
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect();
            stages.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            for (stage, ms) in stages {
                let count = *state.stage_counts.get(&stage).unwrap_or(&1);
                let avg = if count == 0 { 0.0 } else { ms / count as f64 };
                let line = format!(
                    "{{\"type\":\"perf.total\",\"stage\":\"{}\",\"unit\":\"ms\",\"ms\":{:.3},\"count\":{},\"avg_ms\":{:.3}}}",
                    json_escape(&stage),
                    ms,
                    count,
                    avg
                );
                let _ = writeln!(state.writer, "{line}");
            }
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}
