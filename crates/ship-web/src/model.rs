use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ship_core::state::TaskStatus;
use ship_core::types::{PlanningRequest, Task, TaskId};
use ship_core::validation::ValidationIssue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartPlanResponse {
    pub task_id: TaskId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub request: PlanningRequest,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub event_count: usize,
}

impl TaskView {
    pub fn new(task: Task, event_count: usize) -> Self {
        Self {
            task_id: task.id,
            status: task.status,
            request: task.request,
            created_at: task.created_at,
            updated_at: task.updated_at,
            event_count,
        }
    }
}

/// JSON body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ValidationIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub ok: bool,
    pub tasks: usize,
    pub started_at: DateTime<Utc>,
}
