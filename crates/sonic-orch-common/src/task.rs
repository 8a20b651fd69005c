//! Task processing status.

/// Outcome of processing one change-feed entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Entry fully applied; consume it.
    Success,
    /// Malformed payload; consume it without retrying.
    InvalidEntry,
    /// Hardware call failed; keep the entry and retry on the next drive.
    Failed,
    /// Waiting on capacity, references or a dependency; keep the entry.
    NeedRetry,
    /// Nothing to do (superseded or unknown operation); consume it.
    Ignore,
}

impl TaskStatus {
    /// Returns true if the entry leaves the pending queue.
    pub fn is_consumed(&self) -> bool {
        !self.keeps_pending()
    }

    /// Returns true if the entry must stay in the pending queue.
    pub fn keeps_pending(&self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::NeedRetry)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Ignore)
    }

    /// Maps the boolean result of a sync-style call.
    pub fn from_success(ok: bool) -> Self {
        if ok {
            TaskStatus::Success
        } else {
            TaskStatus::Failed
        }
    }
}
