use serde::{Deserialize, Serialize};

use crate::types::ShippingOption;

/// One entry in a planning task's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlanEvent {
    Progress { message: String },
    Options { options: Vec<ShippingOption> },
    Done {},
    Error { message: String },
}

impl PlanEvent {
    pub fn progress(message: impl Into<String>) -> Self {
        PlanEvent::Progress {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        PlanEvent::Error {
            message: message.into(),
        }
    }

    /// `Done` and `Error` seal the log.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanEvent::Done {} | PlanEvent::Error { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            PlanEvent::Progress { .. } => "progress",
            PlanEvent::Options { .. } => "options",
            PlanEvent::Done {} => "done",
            PlanEvent::Error { .. } => "error",
        }
    }
}

/// Final result of a sealed task.
///
/// Mirrors the terminal stream payload so polling and streaming agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlanOutcome {
    Options { options: Vec<ShippingOption> },
    Failed { error: String },
}

impl PlanOutcome {
    /// Derives the outcome from a complete event sequence.
    ///
    /// Returns `None` while the sequence has no terminal event.
    pub fn from_events(events: &[PlanEvent]) -> Option<Self> {
        match events.last()? {
            PlanEvent::Error { message } => Some(PlanOutcome::Failed {
                error: message.clone(),
            }),
            PlanEvent::Done {} => {
                let options = events
                    .iter()
                    .rev()
                    .find_map(|event| match event {
                        PlanEvent::Options { options } => Some(options.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();
                Some(PlanOutcome::Options { options })
            }
            _ => None,
        }
    }

    /// Replays the outcome as the events a late stream consumer would have seen last.
    pub fn into_events(self) -> Vec<PlanEvent> {
        match self {
            PlanOutcome::Options { options } => {
                vec![PlanEvent::Options { options }, PlanEvent::Done {}]
            }
            PlanOutcome::Failed { error } => vec![PlanEvent::Error { message: error }],
        }
    }
}
