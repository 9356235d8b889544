// src/utils/progress_bars/progress_callback.rs - Progress callback plumbing for matching runs
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Type alias for progress callback functions.
/// Takes phase name and optional detailed progress information.
pub type ProgressCallback = Arc<dyn Fn(String, Option<String>) + Send + Sync>;

/// Shared per-partition status map used by the concurrent driver.
pub type StatusTracker = Arc<Mutex<HashMap<String, PartitionTaskStatus>>>;

/// Status of one partition task in the concurrent driver.
#[derive(Debug, Clone)]
pub struct PartitionTaskStatus {
    pub partition_key: String,
    pub status: TaskStatus,
    pub uploaded_count: usize,
    pub reference_count: usize,
    pub pairs_compared: usize,
    pub candidates_found: usize,
    pub start_time: Instant,
    pub end_time: Option<Instant>,
    pub error: Option<String>,
}

impl PartitionTaskStatus {
    pub fn queued(partition_key: &str, uploaded_count: usize) -> Self {
        Self {
            partition_key: partition_key.to_string(),
            status: TaskStatus::Queued,
            uploaded_count,
            reference_count: 0,
            pairs_compared: 0,
            candidates_found: 0,
            start_time: Instant::now(),
            end_time: None,
            error: None,
        }
    }

    pub fn elapsed_secs(&self) -> f32 {
        match self.end_time {
            Some(end) => (end - self.start_time).as_secs_f32(),
            None => self.start_time.elapsed().as_secs_f32(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    Queued,
    Running,
    Complete,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn emoji(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "⏳",
            TaskStatus::Running => "▶️",
            TaskStatus::Complete => "✅",
            TaskStatus::Failed => "❌",
            TaskStatus::Cancelled => "🛑",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "Queued",
            TaskStatus::Running => "Running",
            TaskStatus::Complete => "Complete",
            TaskStatus::Failed => "Failed",
            TaskStatus::Cancelled => "Cancelled",
        }
    }
}

/// Helper to create a callback that just logs, for callers without bars.
pub fn create_simple_callback(run_label: &str) -> ProgressCallback {
    let run_label = run_label.to_string();
    Arc::new(move |phase: String, details: Option<String>| {
        let detail_str = details.map(|d| format!(" - {}", d)).unwrap_or_default();
        log::debug!("[{}] Progress: {}{}", run_label, phase, detail_str);
    })
}

/// Convenience macro for updating progress within matching code
#[macro_export]
macro_rules! update_progress {
    ($callback:expr, $phase:expr) => {
        if let Some(ref cb) = $callback {
            cb($phase.to_string(), None);
        }
    };
    ($callback:expr, $phase:expr, $details:expr) => {
        if let Some(ref cb) = $callback {
            cb($phase.to_string(), Some($details.to_string()));
        }
    };
}

/// Convenience macro for updating progress with current/total counts
#[macro_export]
macro_rules! update_detailed_progress {
    ($callback:expr, $phase:expr, $current:expr, $total:expr) => {
        if let Some(ref cb) = $callback {
            let details = format!("{}/{}", $current, $total);
            cb($phase.to_string(), Some(details));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_update_progress_macro_invokes_callback() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = Arc::clone(&call_count);

        let callback: Option<ProgressCallback> =
            Some(Arc::new(move |_phase: String, _details: Option<String>| {
                call_count_clone.fetch_add(1, Ordering::SeqCst);
            }));

        update_progress!(callback, "Partitioning");
        update_progress!(callback, "Matching", "partition CA");
        update_detailed_progress!(callback, "Matching", 3, 7);

        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_none_callback_is_a_noop() {
        let callback: Option<ProgressCallback> = None;
        update_progress!(callback, "Partitioning");
    }

    #[test]
    fn test_simple_callback_creation() {
        let callback = create_simple_callback("test-run");
        callback("Phase".to_string(), Some("details".to_string()));
        callback("Phase2".to_string(), None);
    }

    #[test]
    fn test_partition_task_status() {
        let status = PartitionTaskStatus::queued("CA", 12);
        assert_eq!(status.partition_key, "CA");
        assert_eq!(status.status, TaskStatus::Queued);
        assert_eq!(status.uploaded_count, 12);
        assert!(status.error.is_none());
    }
}
