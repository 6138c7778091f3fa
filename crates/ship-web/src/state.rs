use chrono::{DateTime, Utc};
use ship_plan::launcher::Planner;

/// Shared handler state. Cloning is cheap; every clone sees the same planner.
#[derive(Clone)]
pub struct AppState {
    planner: Planner,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(planner: Planner) -> Self {
        Self {
            planner,
            started_at: Utc::now(),
        }
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
