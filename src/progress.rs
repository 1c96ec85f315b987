//! Pipeline progress reporting.
//!
//! Long-running stages (`raia fetch`, `raia chunk`, `raia pdf`, `raia index build`)
//! report per-item progress so users can see how far along a crawl or an embedding
//! run is. Progress is emitted on **stderr** so stdout remains parseable for
//! scripts that consume the summary lines.

use std::io::Write;

/// A single progress event from a pipeline stage.
#[derive(Clone, Debug)]
pub enum PipelineEvent {
    /// A stage is starting; total number of items is known up front.
    Stage { stage: String, total: u64 },
    /// Item n of total has been handled. `detail` identifies the item
    /// (a URL, a file name, a batch label).
    Step {
        stage: String,
        n: u64,
        total: u64,
        detail: String,
    },
}

/// Reports pipeline progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the stage drivers.
    fn report(&self, event: PipelineEvent);
}

/// Human-friendly progress on stderr: "fetch  3 / 42  https://www.kra.go.ke/...".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: PipelineEvent) {
        let line = match &event {
            PipelineEvent::Stage { stage, total } => {
                format!("{}  starting ({} items)\n", stage, format_number(*total))
            }
            PipelineEvent::Step {
                stage,
                n,
                total,
                detail,
            } => {
                let n_fmt = format_number(*n);
                let total_fmt = format_number(*total);
                format!("{}  {} / {}  {}\n", stage, n_fmt, total_fmt, detail)
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: PipelineEvent) {
        let obj = match &event {
            PipelineEvent::Stage { stage, total } => serde_json::json!({
                "event": "progress",
                "stage": stage,
                "phase": "start",
                "total": total
            }),
            PipelineEvent::Step {
                stage,
                n,
                total,
                detail,
            } => serde_json::json!({
                "event": "progress",
                "stage": stage,
                "phase": "step",
                "n": n,
                "total": total,
                "detail": detail
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: PipelineEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse the CLI `--progress` value: `auto`, `json`, or `none`.
    pub fn from_flag(flag: &str) -> Self {
        match flag {
            "json" => ProgressMode::Json,
            "none" => ProgressMode::Off,
            _ => ProgressMode::default_for_tty(),
        }
    }

    /// Build a reporter for this mode. Caller passes it into the stage drivers.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(1), "1");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234), "1,234");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn from_flag_maps_values() {
        assert_eq!(ProgressMode::from_flag("json"), ProgressMode::Json);
        assert_eq!(ProgressMode::from_flag("none"), ProgressMode::Off);
        // "auto" resolves from the TTY, so it is one of Human or Off.
        let auto = ProgressMode::from_flag("auto");
        assert!(auto == ProgressMode::Human || auto == ProgressMode::Off);
    }
}
