//! Cyclic task-status signal with optional debounce.

use std::fmt;
use std::time::{Duration, Instant};
use tracing::{Span, info, info_span};

/// Minimum time between two accepted edges from a physical button.
pub const DEBOUNCE_DWELL: Duration = Duration::from_millis(200);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    #[default]
    NotStarted,
    Running,
    End,
}

impl TaskStatus {
    /// The next state in the cycle `NotStarted -> Running -> End -> NotStarted`.
    pub fn next(self) -> Self {
        match self {
            Self::NotStarted => Self::Running,
            Self::Running => Self::End,
            Self::End => Self::NotStarted,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::NotStarted => write!(f, "NOT_STARTED"),
            TaskStatus::Running => write!(f, "RUNNING"),
            TaskStatus::End => write!(f, "END"),
        }
    }
}

/// State machine driven by a boolean "advance" signal.
///
/// With a debounce dwell configured, an advance arriving less than the dwell after the
/// previously accepted one is dropped, so a single press of a noisy button produces one
/// transition. Replay sources are deterministic and use [`TaskStatusController::immediate`].
#[derive(Debug)]
pub struct TaskStatusController {
    status: TaskStatus,
    dwell: Option<Duration>,
    last_edge: Option<Instant>,
    span: Span,
}

impl TaskStatusController {
    /// Debounced controller for physical input.
    pub fn debounced() -> Self {
        Self::with_dwell(Some(DEBOUNCE_DWELL))
    }

    /// Controller that accepts every advance signal.
    pub fn immediate() -> Self {
        Self::with_dwell(None)
    }

    pub fn with_dwell(dwell: Option<Duration>) -> Self {
        Self {
            status: TaskStatus::NotStarted,
            dwell,
            last_edge: None,
            span: info_span!("task_status"),
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Feeds the advance signal, timestamped now.
    pub fn update_task_status(&mut self, advance: bool) -> bool {
        self.update_task_status_at(advance, Instant::now())
    }

    /// Feeds the advance signal with an explicit timestamp.
    ///
    /// Returns `true` when the signal caused a transition.
    pub fn update_task_status_at(&mut self, advance: bool, now: Instant) -> bool {
        if !advance {
            return false;
        }
        if let (Some(dwell), Some(last)) = (self.dwell, self.last_edge)
            && now.saturating_duration_since(last) < dwell
        {
            return false;
        }
        self.last_edge = Some(now);
        self.status = self.status.next();
        let _enter = self.span.enter();
        info!(status = %self.status, "task status changed");
        true
    }

    /// Forces the status back to [`TaskStatus::NotStarted`].
    pub fn reset(&mut self) {
        self.status = TaskStatus::NotStarted;
    }
}
