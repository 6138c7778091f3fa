//! Client-side wizard state machine.
//!
//! ```text
//! select ──start ok──> planning ──options──> options ──select+confirm──> review
//!   ^                     │                     │
//!   └──── error / transport failure / leave ────┘
//! ```
//!
//! Pure and synchronous: the driver feeds it stream events and user actions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ship_core::documents::{Document, DocumentError, DocumentRenderer};
use ship_core::events::PlanEvent;
use ship_core::types::{PlanningRequest, Quote, ShippingOption, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WizardStage {
    #[default]
    Select,
    Planning,
    Options,
    Review,
}

impl WizardStage {
    pub fn as_str(self) -> &'static str {
        match self {
            WizardStage::Select => "select",
            WizardStage::Planning => "planning",
            WizardStage::Options => "options",
            WizardStage::Review => "review",
        }
    }

    /// Stages that hold a live subscription to a server task.
    pub fn is_watching(self) -> bool {
        matches!(self, WizardStage::Planning | WizardStage::Options)
    }
}

impl std::fmt::Display for WizardStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error("cannot {action} while in stage {stage}")]
    InvalidStage {
        action: &'static str,
        stage: WizardStage,
    },
    #[error("option {option_id} is not among the current options")]
    UnknownOption { option_id: String },
    #[error("no option selected")]
    NothingSelected,
    #[error("failed to derive documents: {message}")]
    Documents { message: String },
}

impl From<DocumentError> for WizardError {
    fn from(err: DocumentError) -> Self {
        WizardError::Documents {
            message: err.to_string(),
        }
    }
}

/// An error shown to the user after the wizard fell back to `select`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardNotice {
    pub message: String,
    /// Set when the failure was local to the client, not reported by the server.
    pub transport: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: WizardStage,
    pub to: WizardStage,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WizardSession {
    stage: WizardStage,
    task_id: Option<TaskId>,
    request: Option<PlanningRequest>,
    options: Vec<ShippingOption>,
    selected: Option<String>,
    log: Vec<String>,
    last_error: Option<WizardNotice>,
}

impl WizardSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&self) -> WizardStage {
        self.stage
    }

    pub fn task_id(&self) -> Option<TaskId> {
        self.task_id
    }

    pub fn request(&self) -> Option<&PlanningRequest> {
        self.request.as_ref()
    }

    pub fn options(&self) -> &[ShippingOption] {
        &self.options
    }

    pub fn log(&self) -> &[String] {
        &self.log
    }

    pub fn last_error(&self) -> Option<&WizardNotice> {
        self.last_error.as_ref()
    }

    pub fn selected_option(&self) -> Option<&ShippingOption> {
        let selected = self.selected.as_deref()?;
        self.options.iter().find(|option| option.id == selected)
    }

    /// The server accepted the request; start watching `task_id`.
    pub fn begin(
        &mut self,
        task_id: TaskId,
        request: PlanningRequest,
    ) -> Result<Transition, WizardError> {
        self.require(&[WizardStage::Select, WizardStage::Review], "start a plan")?;
        let from = self.stage;
        self.task_id = Some(task_id);
        self.request = Some(request);
        self.options.clear();
        self.selected = None;
        self.last_error = None;
        self.log = vec![format!("plan {task_id} started")];
        self.stage = WizardStage::Planning;
        Ok(self.moved(from))
    }

    /// The server refused the request; stay in `select` with the reason.
    pub fn launch_failed(&mut self, message: impl Into<String>) -> Result<Transition, WizardError> {
        self.require(&[WizardStage::Select, WizardStage::Review], "start a plan")?;
        let from = self.stage;
        self.reset_to_select(Some(WizardNotice {
            message: message.into(),
            transport: false,
        }));
        Ok(self.moved(from))
    }

    /// Applies one event from the watched task's stream.
    pub fn apply(&mut self, event: PlanEvent) -> Result<Transition, WizardError> {
        if !self.stage.is_watching() {
            return Err(WizardError::InvalidStage {
                action: "apply a plan event",
                stage: self.stage,
            });
        }
        let from = self.stage;
        match event {
            PlanEvent::Progress { message } => self.log.push(message),
            PlanEvent::Options { options } => {
                self.log.push(format!("received {} options", options.len()));
                self.options = options;
                if self.selected_option().is_none() {
                    self.selected = None;
                }
                self.stage = WizardStage::Options;
            }
            PlanEvent::Done {} => {
                if self.stage == WizardStage::Planning {
                    self.reset_to_select(Some(WizardNotice {
                        message: "plan finished without options".to_string(),
                        transport: false,
                    }));
                } else {
                    self.log.push("planning complete".to_string());
                }
            }
            PlanEvent::Error { message } => {
                self.reset_to_select(Some(WizardNotice {
                    message,
                    transport: false,
                }));
            }
        }
        Ok(self.moved(from))
    }

    pub fn select_option(&mut self, option_id: &str) -> Result<&ShippingOption, WizardError> {
        self.require(&[WizardStage::Options], "select an option")?;
        if !self.options.iter().any(|option| option.id == option_id) {
            return Err(WizardError::UnknownOption {
                option_id: option_id.to_string(),
            });
        }
        self.selected = Some(option_id.to_string());
        self.selected_option().ok_or(WizardError::NothingSelected)
    }

    pub fn confirm(&mut self) -> Result<Transition, WizardError> {
        self.require(&[WizardStage::Options], "confirm")?;
        if self.selected_option().is_none() {
            return Err(WizardError::NothingSelected);
        }
        let from = self.stage;
        self.stage = WizardStage::Review;
        Ok(self.moved(from))
    }

    /// The event stream broke locally. Says nothing about the server task.
    pub fn transport_failed(
        &mut self,
        message: impl Into<String>,
    ) -> Result<Transition, WizardError> {
        self.require(
            &[WizardStage::Planning, WizardStage::Options],
            "report a transport failure",
        )?;
        let from = self.stage;
        self.reset_to_select(Some(WizardNotice {
            message: message.into(),
            transport: true,
        }));
        Ok(self.moved(from))
    }

    /// Stops watching the task. The server keeps running it.
    pub fn leave(&mut self) -> Result<Option<TaskId>, WizardError> {
        self.require(&[WizardStage::Planning, WizardStage::Options], "leave")?;
        let task_id = self.task_id;
        self.reset_to_select(None);
        Ok(task_id)
    }

    /// Renders every shipping document for the confirmed option.
    pub fn documents(
        &self,
        quote: &Quote,
        renderer: &DocumentRenderer,
        issued_on: NaiveDate,
    ) -> Result<Vec<Document>, WizardError> {
        self.require(&[WizardStage::Review], "derive documents")?;
        let option = self.selected_option().ok_or(WizardError::NothingSelected)?;
        Ok(renderer.render_all(quote, option, issued_on)?)
    }

    fn require(&self, allowed: &[WizardStage], action: &'static str) -> Result<(), WizardError> {
        if allowed.contains(&self.stage) {
            Ok(())
        } else {
            Err(WizardError::InvalidStage {
                action,
                stage: self.stage,
            })
        }
    }

    fn reset_to_select(&mut self, notice: Option<WizardNotice>) {
        if let Some(notice) = &notice {
            self.log.push(format!("error: {}", notice.message));
        }
        self.stage = WizardStage::Select;
        self.task_id = None;
        self.options.clear();
        self.selected = None;
        self.last_error = notice;
    }

    fn moved(&self, from: WizardStage) -> Transition {
        Transition {
            from,
            to: self.stage,
        }
    }
}
