//! Progress reporting for the generation and mirroring pipeline
//!
//! Three front ends share the `Ui` trait:
//! - `UiApp`: full-screen dashboard with a per-type mirror tally
//! - `LogUi`: forwards everything to `tracing`
//! - `SilentUi`: discards everything, for tests

mod dashboard;

use std::fmt;

use crate::schema::EntityKind;

pub use dashboard::UiApp;

/// Pipeline phases shown in the dashboard header
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    Starting,
    Resetting,
    LoadingCatalog,
    Scheduling,
    GeneratingFacts,
    Clearing,
    Syncing(EntityKind),
    Exporting,
    Complete,
    Failed(EntityKind),
}

impl Phase {
    /// Which of the three pipeline stages this phase belongs to
    pub fn stage(self) -> &'static str {
        match self {
            Phase::Starting => "start",
            Phase::Resetting | Phase::LoadingCatalog | Phase::Scheduling | Phase::GeneratingFacts => {
                "generate"
            }
            Phase::Clearing | Phase::Syncing(_) | Phase::Failed(_) => "graph",
            Phase::Exporting => "peers",
            Phase::Complete => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Starting => f.write_str("Starting"),
            Phase::Resetting => f.write_str("Resetting fact store"),
            Phase::LoadingCatalog => f.write_str("Loading reference catalog"),
            Phase::Scheduling => f.write_str("Generating schedule"),
            Phase::GeneratingFacts => f.write_str("Generating students and attendance"),
            Phase::Clearing => f.write_str("Clearing graph mirror"),
            Phase::Syncing(kind) => write!(f, "Mirroring {}", kind),
            Phase::Exporting => f.write_str("Rebuilding peer mirrors"),
            Phase::Complete => f.write_str("Complete"),
            Phase::Failed(kind) => write!(f, "Failed while mirroring {}", kind),
        }
    }
}

/// Sink for pipeline progress. Generators and the synchronizer only talk to this.
pub trait Ui {
    fn set_phase(&mut self, phase: Phase);
    fn set_info(&mut self, info: impl Into<String>);
    fn set_progress(&mut self, current: u64, total: u64, label: impl Into<String>);
    fn clear_progress(&mut self);
    fn log(&mut self, message: impl Into<String>);

    /// Something was skipped or degraded but the run continues
    fn warn(&mut self, message: impl Into<String>) {
        self.log(message);
    }

    /// Final counts of one committed entity type
    fn tally(&mut self, _kind: EntityKind, _nodes: u64, _edges: u64, _skipped: u64) {}
}

/// Line-oriented UI that reports through the installed tracing subscriber
#[derive(Default)]
pub struct LogUi;

impl LogUi {
    pub fn new() -> Self {
        Self
    }
}

impl Ui for LogUi {
    fn set_phase(&mut self, phase: Phase) {
        match phase {
            Phase::Failed(_) => tracing::error!(stage = phase.stage(), "{}", phase),
            _ => tracing::info!(stage = phase.stage(), "{}", phase),
        }
    }

    fn set_info(&mut self, info: impl Into<String>) {
        tracing::info!("{}", info.into());
    }

    fn set_progress(&mut self, current: u64, total: u64, label: impl Into<String>) {
        tracing::debug!(current, total, "{}", label.into());
    }

    fn clear_progress(&mut self) {}

    fn log(&mut self, message: impl Into<String>) {
        tracing::info!("{}", message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        tracing::warn!("{}", message.into());
    }
}

/// Discards everything
#[derive(Default)]
pub struct SilentUi;

impl SilentUi {
    pub fn new() -> Self {
        Self
    }
}

impl Ui for SilentUi {
    fn set_phase(&mut self, _phase: Phase) {}
    fn set_info(&mut self, _info: impl Into<String>) {}
    fn set_progress(&mut self, _current: u64, _total: u64, _label: impl Into<String>) {}
    fn clear_progress(&mut self) {}
    fn log(&mut self, _message: impl Into<String>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(
            Phase::Syncing(EntityKind::Attendance).to_string(),
            "Mirroring Attendance"
        );
        assert_eq!(
            Phase::Failed(EntityKind::Institute).to_string(),
            "Failed while mirroring Institute"
        );
    }

    #[test]
    fn test_phase_stages() {
        assert_eq!(Phase::Scheduling.stage(), "generate");
        assert_eq!(Phase::Syncing(EntityKind::Group).stage(), "graph");
        assert_eq!(Phase::Failed(EntityKind::Group).stage(), "graph");
        assert_eq!(Phase::Exporting.stage(), "peers");
    }
}
