//! Scheduler state definitions.

/// Scheduler operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Scheduler is starting up.
    Starting,
    /// Scheduler is running and driving cycles.
    Running,
    /// Scheduler is shutting down, no further cycles fire.
    ShuttingDown,
    /// Scheduler is stopped.
    Stopped,
}

impl SchedulerState {
    /// Check if the scheduler is operational.
    pub fn is_operational(&self) -> bool {
        matches!(self, SchedulerState::Running)
    }

    /// Check if the scheduler is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SchedulerState::Stopped)
    }
}
