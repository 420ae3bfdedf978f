use std::fmt;

/// Phases of one traversal run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    Initializing,
    /// Jumping to the newest item to learn where the run ends.
    LocatingFrontier,
    /// Navigating back to the checkpointed item.
    SeekingStart,
    /// Stepping toward newer items, one download per item.
    Stepping,
    /// No more steps; waiting for queued and running jobs.
    Draining,
    Terminated,
}

impl TraversalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraversalState::Initializing => "initializing",
            TraversalState::LocatingFrontier => "locating-frontier",
            TraversalState::SeekingStart => "seeking-start",
            TraversalState::Stepping => "stepping",
            TraversalState::Draining => "draining",
            TraversalState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for TraversalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
