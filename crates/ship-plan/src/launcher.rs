//! Entry point for planning: validate, create, spawn, return.

use futures::FutureExt;
use ship_core::config::PlannerConfig;
use ship_core::events::PlanOutcome;
use ship_core::quotes::{QuoteBook, QuoteError};
use ship_core::state::TaskStatus;
use ship_core::types::{PlanningRequest, Task, TaskId};
use ship_core::validation::{has_errors, render_errors, Validate, ValidationIssue};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::event_log::Subscription;
use crate::rates::RateSource;
use crate::store::TaskStore;
use crate::worker::{fetch_quote, PlannerWorker};

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("invalid planning request: {}", render_errors(.issues))]
    Validation { issues: Vec<ValidationIssue> },
    #[error(transparent)]
    Quote(#[from] QuoteError),
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: TaskId },
    #[error("task {task_id} is still {status}")]
    InFlight { task_id: TaskId, status: TaskStatus },
}

#[derive(Clone)]
pub struct Planner {
    store: TaskStore,
    quotes: QuoteBook,
    worker: Arc<PlannerWorker>,
}

impl Planner {
    pub fn new(quotes: QuoteBook, rates: Arc<dyn RateSource>, config: &PlannerConfig) -> Self {
        let worker = PlannerWorker::new(quotes.clone(), rates, config.stage_timeout());
        Self {
            store: TaskStore::new(),
            quotes,
            worker: Arc::new(worker),
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn quotes(&self) -> &QuoteBook {
        &self.quotes
    }

    /// Validates the request, registers a task and starts planning in the
    /// background. Returns as soon as the task exists.
    pub async fn start_plan(&self, request: PlanningRequest) -> Result<TaskId, PlanError> {
        let mut issues = request.validate();
        if !request.quote_id.0.trim().is_empty()
            && fetch_quote(&self.quotes, &request.quote_id).await?.is_none()
        {
            issues.push(ValidationIssue::error(
                "request.quote_id.unknown",
                format!("quote {} does not exist", request.quote_id),
            ));
        }
        if has_errors(&issues) {
            warn!(quote_id = %request.quote_id, issues = %render_errors(&issues), "planning request rejected");
            return Err(PlanError::Validation { issues });
        }

        let handle = self.store.create(request.clone()).await;
        let task_id = handle.task_id();
        let worker = self.worker.clone();
        tokio::spawn(async move {
            let run = AssertUnwindSafe(worker.run(&handle, request)).catch_unwind();
            let message = match run.await {
                Ok(()) => "planner stopped before producing a result",
                Err(_) => {
                    error!(%task_id, "planner worker panicked");
                    "planner stopped unexpectedly"
                }
            };
            match handle.abandon(message).await {
                Ok(Some(_)) => warn!(%task_id, "unsettled planning task marked failed"),
                Ok(None) => {}
                Err(err) => warn!(%task_id, error = %err, "failed to settle abandoned task"),
            }
        });
        info!(%task_id, "planning task launched");
        Ok(task_id)
    }

    pub async fn task(&self, task_id: &TaskId) -> Result<Task, PlanError> {
        self.store
            .task(task_id)
            .await
            .ok_or(PlanError::TaskNotFound { task_id: *task_id })
    }

    pub async fn subscribe(&self, task_id: &TaskId) -> Result<Subscription, PlanError> {
        self.store
            .subscribe(task_id)
            .await
            .ok_or(PlanError::TaskNotFound { task_id: *task_id })
    }

    /// The sealed outcome, or `InFlight` while the worker is still going.
    pub async fn result(&self, task_id: &TaskId) -> Result<PlanOutcome, PlanError> {
        let (task, outcome) = self
            .store
            .snapshot(task_id)
            .await
            .ok_or(PlanError::TaskNotFound { task_id: *task_id })?;
        match outcome {
            Some(outcome) if task.status.is_terminal() => Ok(outcome),
            _ => Err(PlanError::InFlight {
                task_id: *task_id,
                status: task.status,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::StreamExt;
    use ship_core::events::PlanEvent;
    use ship_core::types::{
        Preference, Quote, QuoteId, QuoteItem, ShipmentProfile, ShippingOption,
    };
    use std::time::{Duration, Instant};
    use tokio::sync::Notify;

    use crate::rates::RateError;

    fn quote() -> Quote {
        Quote {
            id: QuoteId::new("q1"),
            customer: "Acme Looms".to_string(),
            origin: "Ningbo, CN".to_string(),
            currency: "USD".to_string(),
            items: vec![QuoteItem {
                sku: "RUG-01".to_string(),
                description: "Wool rug".to_string(),
                quantity: 10,
                unit_price_usd: 120.0,
                unit_weight_kg: 12.5,
                unit_volume_m3: 0.08,
                hs_code: None,
            }],
        }
    }

    fn maersk_option() -> ShippingOption {
        ShippingOption {
            id: "o1".to_string(),
            carrier: "MaerskX".to_string(),
            service: "Ocean FCL".to_string(),
            eta_days: 18,
            price_usd: 420.0,
            co2_kg: Some(1.9),
            origin: "Ningbo, CN".to_string(),
            destination: "Rotterdam, NL".to_string(),
            weight_kg: 125.0,
            volume_m3: 0.8,
            route: vec!["Ningbo, CN".to_string(), "Rotterdam, NL".to_string()],
            notes: None,
        }
    }

    /// Holds the matching stage until released.
    struct GatedRates {
        gate: Arc<Notify>,
        result: Result<Vec<ShippingOption>, RateError>,
    }

    #[async_trait]
    impl RateSource for GatedRates {
        async fn quote_rates(
            &self,
            _shipment: &ShipmentProfile,
        ) -> Result<Vec<ShippingOption>, RateError> {
            self.gate.notified().await;
            self.result.clone()
        }
    }

    struct PanickingRates;

    #[async_trait]
    impl RateSource for PanickingRates {
        async fn quote_rates(
            &self,
            _shipment: &ShipmentProfile,
        ) -> Result<Vec<ShippingOption>, RateError> {
            panic!("rate table corrupted")
        }
    }

    fn planner(result: Result<Vec<ShippingOption>, RateError>) -> (Planner, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        let rates = Arc::new(GatedRates {
            gate: gate.clone(),
            result,
        });
        let config = PlannerConfig {
            stage_timeout_secs: 30,
            ..PlannerConfig::default()
        };
        (Planner::new(QuoteBook::in_memory([quote()]), rates, &config), gate)
    }

    fn request() -> PlanningRequest {
        PlanningRequest::new("q1", "Rotterdam, NL", Preference::Balanced)
    }

    #[tokio::test]
    async fn start_plan_returns_before_planning_completes() {
        let (planner, gate) = planner(Ok(vec![maersk_option()]));

        let started = Instant::now();
        let task_id = planner.start_plan(request()).await.expect("start plan");
        assert!(started.elapsed() < Duration::from_secs(1));

        let err = planner.result(&task_id).await.expect_err("still running");
        assert!(matches!(err, PlanError::InFlight { .. }));

        gate.notify_one();
        let events = planner
            .subscribe(&task_id)
            .await
            .expect("subscribe")
            .into_stream()
            .collect::<Vec<_>>()
            .await;
        assert_eq!(events.last(), Some(&PlanEvent::Done {}));
        assert_eq!(
            planner.task(&task_id).await.expect("task").status,
            TaskStatus::Succeeded
        );
    }

    #[tokio::test]
    async fn empty_destination_is_rejected_without_creating_a_task() {
        let (planner, _gate) = planner(Ok(vec![maersk_option()]));
        let err = planner
            .start_plan(PlanningRequest::new("q1", "  ", Preference::Balanced))
            .await
            .expect_err("validation failure");

        match err {
            PlanError::Validation { issues } => {
                assert_eq!(issues.len(), 1);
                assert_eq!(issues[0].code, "request.destination.empty");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(planner.store().is_empty().await);
    }

    #[tokio::test]
    async fn unknown_quote_is_rejected() {
        let (planner, _gate) = planner(Ok(vec![maersk_option()]));
        let err = planner
            .start_plan(PlanningRequest::new("q404", "Rotterdam, NL", Preference::Green))
            .await
            .expect_err("unknown quote");
        assert!(err.to_string().contains("request.quote_id.unknown"));
        assert!(planner.store().is_empty().await);
    }

    #[tokio::test]
    async fn subscribers_see_identical_sequences_regardless_of_join_time() {
        let (planner, gate) = planner(Ok(vec![maersk_option()]));
        let task_id = planner.start_plan(request()).await.expect("start plan");

        let early = planner.subscribe(&task_id).await.expect("subscribe early");
        let early = tokio::spawn(early.into_stream().collect::<Vec<_>>());
        let dropped = planner.subscribe(&task_id).await.expect("subscribe and drop");
        dropped.unsubscribe();

        gate.notify_one();
        let early = early.await.expect("early subscriber joins");
        let late = planner
            .subscribe(&task_id)
            .await
            .expect("subscribe late")
            .into_stream()
            .collect::<Vec<_>>()
            .await;

        assert_eq!(early, late);
        assert_eq!(early.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(early.last().is_some_and(PlanEvent::is_terminal));
    }

    #[tokio::test]
    async fn failed_plan_reports_the_same_error_through_result() {
        let (planner, gate) = planner(Err(RateError::Unavailable {
            message: "carrier API unavailable".to_string(),
        }));
        let task_id = planner.start_plan(request()).await.expect("start plan");
        gate.notify_one();

        let events = planner
            .subscribe(&task_id)
            .await
            .expect("subscribe")
            .into_stream()
            .collect::<Vec<_>>()
            .await;
        assert_eq!(events.last(), Some(&PlanEvent::error("carrier API unavailable")));

        assert_eq!(
            planner.task(&task_id).await.expect("task").status,
            TaskStatus::Failed
        );
        assert_eq!(
            planner.result(&task_id).await.expect("result"),
            PlanOutcome::Failed {
                error: "carrier API unavailable".to_string()
            }
        );
    }

    #[tokio::test]
    async fn unknown_task_ids_are_reported() {
        let (planner, _gate) = planner(Ok(Vec::new()));
        let missing = TaskId::generate();
        assert!(matches!(
            planner.subscribe(&missing).await,
            Err(PlanError::TaskNotFound { .. })
        ));
        assert!(matches!(
            planner.result(&missing).await,
            Err(PlanError::TaskNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn panicking_rate_source_fails_the_task_in_lockstep() {
        let planner = Planner::new(
            QuoteBook::in_memory([quote()]),
            Arc::new(PanickingRates),
            &PlannerConfig::default(),
        );
        let task_id = planner.start_plan(request()).await.expect("start plan");

        let events = planner
            .subscribe(&task_id)
            .await
            .expect("subscribe")
            .into_stream()
            .collect::<Vec<_>>()
            .await;
        assert_eq!(
            events.last(),
            Some(&PlanEvent::error("planner stopped unexpectedly"))
        );
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

        assert_eq!(
            planner.task(&task_id).await.expect("task").status,
            TaskStatus::Failed
        );
        assert_eq!(
            planner.result(&task_id).await.expect("result"),
            PlanOutcome::Failed {
                error: "planner stopped unexpectedly".to_string()
            }
        );

        let purged = planner
            .store()
            .purge_expired(chrono::Utc::now(), Duration::ZERO)
            .await;
        assert_eq!(purged, vec![task_id]);
    }
}
