use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// One page of a message listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

impl MessagePage {
    pub fn new(ids: Vec<String>, next_page_token: Option<String>) -> Self {
        Self {
            ids,
            next_page_token,
        }
    }

    /// A missing or empty continuation token marks the final page
    pub fn is_last(&self) -> bool {
        self.next_page_token
            .as_deref()
            .map_or(true, |token| token.is_empty())
    }
}

/// Labels to add to and remove from every swept message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelChange {
    #[serde(default)]
    pub add: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl LabelChange {
    /// Remove `UNREAD`, i.e. mark messages as read
    pub fn mark_read() -> Self {
        Self {
            add: Vec::new(),
            remove: vec!["UNREAD".to_string()],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

impl Default for LabelChange {
    fn default() -> Self {
        Self::mark_read()
    }
}

/// Result of modifying a single message, as reported by the worker that handled it
#[derive(Debug)]
pub struct ItemOutcome {
    pub worker: usize,
    pub id: String,
    pub result: Result<()>,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Keep only what a report needs from a failed outcome
    pub fn into_failure(self) -> Option<FailedItem> {
        match self.result {
            Ok(()) => None,
            Err(e) => Some(FailedItem {
                id: self.id,
                worker: self.worker,
                error: e.to_string(),
            }),
        }
    }
}

/// A message that could not be modified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub id: String,
    pub worker: usize,
    pub error: String,
}

/// Counters a worker owns for its whole lifetime, handed back when it exits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub worker: usize,
    pub processed: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub query: String,
    pub pages: usize,
    pub enqueued: usize,
    pub processed: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub workers: Vec<WorkerSummary>,
    /// Only populated when outcome collection is enabled
    pub failures: Vec<FailedItem>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> usize {
        self.processed.saturating_sub(self.failed)
    }

    /// Save report to file as pretty JSON
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GmailError;

    #[test]
    fn test_page_is_last() {
        assert!(MessagePage::new(vec!["m1".to_string()], None).is_last());
        assert!(MessagePage::new(vec![], Some(String::new())).is_last());
        assert!(!MessagePage::new(vec![], Some("tok-2".to_string())).is_last());
    }

    #[test]
    fn test_default_label_change_marks_read() {
        let change = LabelChange::default();
        assert!(change.add.is_empty());
        assert_eq!(change.remove, vec!["UNREAD".to_string()]);
        assert!(!change.is_empty());

        let empty = LabelChange {
            add: vec![],
            remove: vec![],
        };
        assert!(empty.is_empty());
    }

    #[test]
    fn test_failed_item_from_outcome() {
        let ok = ItemOutcome {
            worker: 0,
            id: "m1".to_string(),
            result: Ok(()),
        };
        assert!(ok.is_success());
        assert_eq!(ok.into_failure(), None);

        let failed = ItemOutcome {
            worker: 3,
            id: "m2".to_string(),
            result: Err(GmailError::MessageNotFound("m2".to_string())),
        };
        let item = failed.into_failure().unwrap();
        assert_eq!(item.id, "m2");
        assert_eq!(item.worker, 3);
        assert!(item.error.contains("not found"));
    }

    #[tokio::test]
    async fn test_report_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("run.json");
        let report = PipelineReport {
            run_id: "run-1".to_string(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            query: "is:unread".to_string(),
            pages: 2,
            enqueued: 5,
            processed: 5,
            failed: 1,
            elapsed: Duration::from_millis(1500),
            workers: vec![],
            failures: vec![FailedItem {
                id: "m3".to_string(),
                worker: 1,
                error: "boom".to_string(),
            }],
        };
        assert_eq!(report.succeeded(), 4);

        report.save(&path).await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        let loaded: PipelineReport = serde_json::from_str(&content).unwrap();
        assert_eq!(loaded.run_id, "run-1");
        assert_eq!(loaded.failures.len(), 1);
        assert_eq!(loaded.elapsed, Duration::from_millis(1500));
    }
}
