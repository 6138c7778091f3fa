//! Drives a [`WizardSession`] against a planning backend.
//!
//! Events are pulled one at a time with an idle timeout. When the stream
//! breaks before a terminal event the driver asks the poll endpoint for the
//! outcome; only if that fails too does the wizard fall back to `select`
//! with a transport notice.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use ship_core::events::{PlanEvent, PlanOutcome};
use ship_core::state::TaskStatus;
use ship_core::types::{PlanningRequest, ShippingOption, TaskId};
use ship_plan::launcher::{PlanError, Planner};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::machine::{Transition, WizardError, WizardSession, WizardStage};

/// Client-local failure of the event channel. Never a verdict on the task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("event stream ended before the plan finished")]
    Disconnected,
    #[error("no plan event received for {timeout:?}")]
    Idle { timeout: Duration },
    #[error("http error: {message}")]
    Http { message: String },
    #[error("failed to decode plan event: {message}")]
    Decode { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The server refused the request; the message is authoritative.
    #[error("{message}")]
    Rejected { message: String },
    #[error("task not found: {task_id}")]
    NotFound { task_id: TaskId },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type EventStream = BoxStream<'static, Result<PlanEvent, TransportError>>;

#[derive(Debug, Clone, PartialEq)]
pub enum PollResult {
    Finished(PlanOutcome),
    InFlight(TaskStatus),
}

#[async_trait]
pub trait PlanBackend: Send + Sync {
    async fn start_plan(&self, request: &PlanningRequest) -> Result<TaskId, BackendError>;
    async fn subscribe(&self, task_id: TaskId) -> Result<EventStream, BackendError>;
    async fn poll_result(&self, task_id: TaskId) -> Result<PollResult, BackendError>;
}

#[async_trait]
impl PlanBackend for Planner {
    async fn start_plan(&self, request: &PlanningRequest) -> Result<TaskId, BackendError> {
        Planner::start_plan(self, request.clone())
            .await
            .map_err(backend_error)
    }

    async fn subscribe(&self, task_id: TaskId) -> Result<EventStream, BackendError> {
        let subscription = Planner::subscribe(self, &task_id)
            .await
            .map_err(backend_error)?;
        Ok(subscription.into_stream().map(Ok).boxed())
    }

    async fn poll_result(&self, task_id: TaskId) -> Result<PollResult, BackendError> {
        match Planner::result(self, &task_id).await {
            Ok(outcome) => Ok(PollResult::Finished(outcome)),
            Err(PlanError::InFlight { status, .. }) => Ok(PollResult::InFlight(status)),
            Err(err) => Err(backend_error(err)),
        }
    }
}

fn backend_error(err: PlanError) -> BackendError {
    match err {
        PlanError::TaskNotFound { task_id } => BackendError::NotFound { task_id },
        other => BackendError::Rejected {
            message: other.to_string(),
        },
    }
}

pub struct WizardDriver<B> {
    backend: B,
    session: WizardSession,
    stream: Option<EventStream>,
    idle_timeout: Duration,
}

impl<B: PlanBackend> WizardDriver<B> {
    pub fn new(backend: B, idle_timeout: Duration) -> Self {
        Self {
            backend,
            session: WizardSession::new(),
            stream: None,
            idle_timeout,
        }
    }

    pub fn session(&self) -> &WizardSession {
        &self.session
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Submits the request and, when accepted, subscribes to its events.
    pub async fn start(&mut self, request: PlanningRequest) -> Result<Transition, WizardError> {
        let task_id = match self.backend.start_plan(&request).await {
            Ok(task_id) => task_id,
            Err(err) => {
                warn!(error = %err, "plan request refused");
                return self.session.launch_failed(err.to_string());
            }
        };
        let transition = self.session.begin(task_id, request)?;
        info!(%task_id, "watching plan");

        match self.backend.subscribe(task_id).await {
            Ok(stream) => self.stream = Some(stream),
            Err(err) => {
                let transport = match err {
                    BackendError::Transport(transport) => transport,
                    other => TransportError::Http {
                        message: other.to_string(),
                    },
                };
                self.recover(task_id, transport).await?;
            }
        }
        Ok(transition)
    }

    /// Consumes one event, or recovers from a broken stream. Returns `None`
    /// once nothing is being watched.
    pub async fn step(&mut self) -> Result<Option<Transition>, WizardError> {
        let Some(task_id) = self.session.task_id() else {
            self.stream = None;
            return Ok(None);
        };
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        let received = match tokio::time::timeout(self.idle_timeout, stream.next()).await {
            Err(_) => Err(TransportError::Idle {
                timeout: self.idle_timeout,
            }),
            Ok(None) => Err(TransportError::Disconnected),
            Ok(Some(result)) => result,
        };

        match received {
            Ok(event) => {
                debug!(%task_id, event = event.name(), "plan event");
                let terminal = event.is_terminal();
                let transition = self.session.apply(event)?;
                if terminal || !self.session.stage().is_watching() {
                    self.stream = None;
                }
                Ok(Some(transition))
            }
            Err(transport) => {
                self.stream = None;
                self.recover(task_id, transport).await.map(Some)
            }
        }
    }

    /// Steps until the plan settles: options received and stream sealed, or
    /// back at `select`.
    pub async fn run_to_settle(&mut self) -> Result<WizardStage, WizardError> {
        while self.step().await?.is_some() {}
        Ok(self.session.stage())
    }

    pub fn select_option(&mut self, option_id: &str) -> Result<&ShippingOption, WizardError> {
        self.session.select_option(option_id)
    }

    pub fn confirm(&mut self) -> Result<Transition, WizardError> {
        self.session.confirm()
    }

    /// Drops the subscription. The server task keeps running.
    pub fn leave(&mut self) -> Result<Option<TaskId>, WizardError> {
        self.stream = None;
        self.session.leave()
    }

    async fn recover(
        &mut self,
        task_id: TaskId,
        transport: TransportError,
    ) -> Result<Transition, WizardError> {
        warn!(%task_id, error = %transport, "event stream broke, polling for result");
        let from = self.session.stage();
        match self.backend.poll_result(task_id).await {
            Ok(PollResult::Finished(outcome)) => {
                for event in outcome.into_events() {
                    if !self.session.stage().is_watching() {
                        break;
                    }
                    self.session.apply(event)?;
                }
                Ok(Transition {
                    from,
                    to: self.session.stage(),
                })
            }
            Ok(PollResult::InFlight(status)) => self
                .session
                .transport_failed(format!("{transport} (task still {status})")),
            Err(err) => self
                .session
                .transport_failed(format!("{transport} (poll failed: {err})")),
        }
    }
}
