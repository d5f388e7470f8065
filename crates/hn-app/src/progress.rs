use hn_core::RunId;

/// Lifecycle state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Preparing,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed | RunState::Cancelled
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            RunState::Preparing => "preparing",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::Cancelled => "cancelled",
        }
    }
}

/// One executed step of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunProgress {
    pub run_id: RunId,
    pub step: usize,
    pub time_s: i64,
    pub duration_s: i64,
}

impl RunProgress {
    pub fn fraction_complete(&self) -> f64 {
        if self.duration_s <= 0 {
            1.0
        } else {
            (self.time_s as f64 / self.duration_s as f64).clamp(0.0, 1.0)
        }
    }
}
