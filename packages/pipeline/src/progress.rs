//! Progress reporting for pipeline runs.
//!
//! The pipeline only knows it has a fixed number of steps to get through;
//! how that is shown (terminal bars, logs, nothing) is decided by the
//! binary that drives it.

/// Receives step updates from a running pipeline.
///
/// Implementations must be `Send + Sync` so one reporter can be shared
/// by concurrent calculations.
pub trait ProgressCallback: Send + Sync {
    /// Set the total number of steps.
    fn set_total(&self, total: u64);

    /// Set the current step (absolute, not delta).
    fn set_position(&self, pos: u64);

    /// Advance by `delta` steps.
    fn inc(&self, delta: u64);

    /// Describe the step currently running.
    fn set_message(&self, msg: String);

    /// Mark the run as complete with a final message.
    fn finish(&self, msg: String);

    /// Mark the run as complete and remove the indicator.
    fn finish_and_clear(&self);
}

/// Reporter that ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn set_position(&self, _pos: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
    fn finish_and_clear(&self) {}
}
