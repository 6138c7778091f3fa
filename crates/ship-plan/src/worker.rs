//! The planner worker: one run per task, stage by stage.

use ship_core::quotes::{QuoteBook, QuoteError};
use ship_core::types::{PlanningRequest, Quote, QuoteId, ShipmentProfile, ShippingOption};
use ship_core::validation::{has_errors, render_errors, Validate};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::rates::{RateError, RateSource};
use crate::scoring::scorer_for;
use crate::store::{StoreError, TaskHandle};

/// Planning stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PlanStage {
    Analyzing,
    Extracting,
    Matching,
    Ranking,
}

impl PlanStage {
    pub const ALL: [PlanStage; 4] = [
        PlanStage::Analyzing,
        PlanStage::Extracting,
        PlanStage::Matching,
        PlanStage::Ranking,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PlanStage::Analyzing => "analyzing",
            PlanStage::Extracting => "extracting",
            PlanStage::Matching => "matching",
            PlanStage::Ranking => "ranking",
        }
    }

    /// Progress message announced before the stage runs.
    pub fn message(self, request: &PlanningRequest) -> String {
        match self {
            PlanStage::Analyzing => format!("analyzing quote {}", request.quote_id),
            PlanStage::Extracting => "extracting shipment profile".to_string(),
            PlanStage::Matching => "compiling carriers".to_string(),
            PlanStage::Ranking => "scoring routes".to_string(),
        }
    }

    /// Maps a progress message back to its stage.
    pub fn from_message(message: &str) -> Option<PlanStage> {
        match message {
            m if m.starts_with("analyzing quote") => Some(PlanStage::Analyzing),
            "extracting shipment profile" => Some(PlanStage::Extracting),
            "compiling carriers" => Some(PlanStage::Matching),
            "scoring routes" => Some(PlanStage::Ranking),
            _ => None,
        }
    }
}

impl std::fmt::Display for PlanStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("quote {quote_id} not found")]
    QuoteMissing { quote_id: String },
    #[error("quote {quote_id} has no line items")]
    EmptyQuote { quote_id: String },
    #[error(transparent)]
    Quote(#[from] QuoteError),
    #[error(transparent)]
    Rates(#[from] RateError),
    #[error("carrier returned an invalid option: {details}")]
    InvalidOption { details: String },
    #[error("no carrier can serve {origin} -> {destination}")]
    NoOptions { origin: String, destination: String },
    #[error("stage {stage} timed out after {timeout:?}")]
    StageTimeout { stage: PlanStage, timeout: Duration },
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct PlannerWorker {
    quotes: QuoteBook,
    rates: Arc<dyn RateSource>,
    stage_timeout: Duration,
}

impl PlannerWorker {
    pub fn new(quotes: QuoteBook, rates: Arc<dyn RateSource>, stage_timeout: Duration) -> Self {
        Self {
            quotes,
            rates,
            stage_timeout,
        }
    }

    /// Runs every stage for the task and seals its log. Never retries.
    pub async fn run(&self, handle: &TaskHandle, request: PlanningRequest) {
        let task_id = handle.task_id();
        if let Err(err) = handle.start().await {
            warn!(%task_id, error = %err, "planner could not start task");
            return;
        }
        info!(%task_id, quote_id = %request.quote_id, preference = %request.preference, "planning started");

        match self.execute(handle, &request).await {
            Ok(options) => {
                let count = options.len();
                match handle.succeed(options).await {
                    Ok(_) => info!(%task_id, options = count, "planning succeeded"),
                    Err(err) => warn!(%task_id, error = %err, "failed to publish planning result"),
                }
            }
            Err(err) => {
                let message = err.to_string();
                warn!(%task_id, error = %message, "planning failed");
                if let Err(err) = handle.fail(message).await {
                    warn!(%task_id, error = %err, "failed to publish planning failure");
                }
            }
        }
    }

    async fn execute(
        &self,
        handle: &TaskHandle,
        request: &PlanningRequest,
    ) -> Result<Vec<ShippingOption>, WorkerError> {
        let quote = self
            .stage(handle, request, PlanStage::Analyzing, self.load_quote(request))
            .await?;

        let shipment = self
            .stage(handle, request, PlanStage::Extracting, async {
                Ok(ShipmentProfile::from_quote(&quote, &request.destination))
            })
            .await?;

        let candidates = self
            .stage(handle, request, PlanStage::Matching, async {
                let options = self.rates.quote_rates(&shipment).await?;
                check_options(&shipment, options)
            })
            .await?;

        self.stage(handle, request, PlanStage::Ranking, async move {
            let mut ranked = candidates;
            scorer_for(request.preference).rank(&mut ranked);
            Ok(ranked)
        })
        .await
    }

    async fn stage<T, F>(
        &self,
        handle: &TaskHandle,
        request: &PlanningRequest,
        stage: PlanStage,
        work: F,
    ) -> Result<T, WorkerError>
    where
        F: Future<Output = Result<T, WorkerError>>,
    {
        handle.progress(stage.message(request))?;
        debug!(task_id = %handle.task_id(), %stage, "stage started");
        tokio::time::timeout(self.stage_timeout, work)
            .await
            .map_err(|_| WorkerError::StageTimeout {
                stage,
                timeout: self.stage_timeout,
            })?
    }

    async fn load_quote(&self, request: &PlanningRequest) -> Result<Quote, WorkerError> {
        let quote = fetch_quote(&self.quotes, &request.quote_id)
            .await?
            .ok_or_else(|| WorkerError::QuoteMissing {
                quote_id: request.quote_id.to_string(),
            })?;
        if quote.items.is_empty() {
            return Err(WorkerError::EmptyQuote {
                quote_id: quote.id.to_string(),
            });
        }
        Ok(quote)
    }
}

/// Looks a quote up on the blocking pool, since a cache miss reads the source.
pub(crate) async fn fetch_quote(
    quotes: &QuoteBook,
    id: &QuoteId,
) -> Result<Option<Quote>, QuoteError> {
    let quotes = quotes.clone();
    let id = id.clone();
    tokio::task::spawn_blocking(move || quotes.get(&id))
        .await
        .map_err(|err| QuoteError::Unavailable {
            message: format!("quote lookup did not complete: {err}"),
        })?
}

fn check_options(
    shipment: &ShipmentProfile,
    options: Vec<ShippingOption>,
) -> Result<Vec<ShippingOption>, WorkerError> {
    if options.is_empty() {
        return Err(WorkerError::NoOptions {
            origin: shipment.origin.clone(),
            destination: shipment.destination.clone(),
        });
    }
    let issues = options
        .iter()
        .flat_map(Validate::validate)
        .collect::<Vec<_>>();
    if has_errors(&issues) {
        return Err(WorkerError::InvalidOption {
            details: render_errors(&issues),
        });
    }
    Ok(options)
}
