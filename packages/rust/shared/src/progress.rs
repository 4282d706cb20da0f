//! Progress callbacks for long-running stages.

/// Progress callback for reporting stage status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Item-level progress within the current phase. `total` is 0 when unknown.
    fn item(&self, current: usize, total: usize, detail: &str);
    /// Called when the stage completes.
    fn done(&self, summary: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _current: usize, _total: usize, _detail: &str) {}
    fn done(&self, _summary: &str) {}
}
