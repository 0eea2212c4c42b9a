use std::path::Path;

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Record of one interactive session, written to `summary.json` when the
/// session ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub workflow_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub blend_batches: u32,
    pub final_batches: u32,
    pub candidates: u64,
    pub final_results: u64,
    pub last_error: Option<String>,
}

impl SessionSummary {
    pub fn begin(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            started_at: now_utc_iso(),
            ..Self::default()
        }
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let mut finished = self.clone();
        if finished.finished_at.is_empty() {
            finished.finished_at = now_utc_iso();
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&finished)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_load_round_trips() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("summary.json");

        let mut summary = SessionSummary::begin("wf-abc");
        summary.blend_batches = 2;
        summary.final_batches = 1;
        summary.candidates = 5;
        summary.final_results = 3;
        summary.last_error = Some("rate limit exceeded".to_string());
        summary.write(&path)?;

        let loaded = SessionSummary::load(&path)?;
        assert_eq!(loaded.workflow_id, "wf-abc");
        assert_eq!(loaded.blend_batches, 2);
        assert_eq!(loaded.candidates, 5);
        assert_eq!(loaded.last_error.as_deref(), Some("rate limit exceeded"));
        assert!(!loaded.finished_at.is_empty());
        Ok(())
    }

    #[test]
    fn begin_stamps_start_time() {
        let summary = SessionSummary::begin("wf-1");
        assert!(!summary.started_at.is_empty());
        assert!(summary.finished_at.is_empty());
        assert_eq!(summary.blend_batches, 0);
    }
}
