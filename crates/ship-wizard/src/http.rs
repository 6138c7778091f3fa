//! [`PlanBackend`] over the `shipd` HTTP interface.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::Deserialize;
use ship_core::events::{PlanEvent, PlanOutcome};
use ship_core::state::TaskStatus;
use ship_core::types::{PlanningRequest, TaskId};
use std::collections::VecDeque;
use tracing::debug;

use crate::driver::{BackendError, EventStream, PlanBackend, PollResult, TransportError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPlanBody {
    task_id: TaskId,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    status: Option<TaskStatus>,
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn http_error(err: reqwest::Error) -> TransportError {
    TransportError::Http {
        message: err.to_string(),
    }
}

async fn error_body(response: reqwest::Response) -> Result<ErrorBody, TransportError> {
    let status = response.status();
    let body = response.text().await.map_err(http_error)?;
    serde_json::from_str(&body).map_err(|_| TransportError::Http {
        message: format!("unexpected {status}: {body}"),
    })
}

#[async_trait]
impl PlanBackend for HttpBackend {
    async fn start_plan(&self, request: &PlanningRequest) -> Result<TaskId, BackendError> {
        let response = self
            .client
            .post(self.url("/shipping/plan"))
            .json(request)
            .send()
            .await
            .map_err(http_error)?;

        match response.status() {
            StatusCode::ACCEPTED | StatusCode::OK => {
                let body: StartPlanBody = response.json().await.map_err(|err| {
                    TransportError::Decode {
                        message: err.to_string(),
                    }
                })?;
                Ok(body.task_id)
            }
            StatusCode::BAD_REQUEST => Err(BackendError::Rejected {
                message: error_body(response).await?.error,
            }),
            status => Err(TransportError::Http {
                message: format!("unexpected {status} from start plan"),
            }
            .into()),
        }
    }

    async fn subscribe(&self, task_id: TaskId) -> Result<EventStream, BackendError> {
        let response = self
            .client
            .get(self.url(&format!("/shipping/plan/{task_id}/events")))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(http_error)?;

        match response.status() {
            StatusCode::OK => Ok(sse_events(response.bytes_stream().boxed())),
            StatusCode::NOT_FOUND => Err(BackendError::NotFound { task_id }),
            status => Err(TransportError::Http {
                message: format!("unexpected {status} from event stream"),
            }
            .into()),
        }
    }

    async fn poll_result(&self, task_id: TaskId) -> Result<PollResult, BackendError> {
        let response = self
            .client
            .get(self.url(&format!("/shipping/plan/{task_id}/result")))
            .send()
            .await
            .map_err(http_error)?;

        // Check the status first: a 409 body also has an `error` field.
        match response.status() {
            StatusCode::OK => {
                let outcome: PlanOutcome = response.json().await.map_err(|err| {
                    TransportError::Decode {
                        message: err.to_string(),
                    }
                })?;
                Ok(PollResult::Finished(outcome))
            }
            StatusCode::CONFLICT => {
                let body = error_body(response).await?;
                Ok(PollResult::InFlight(body.status.unwrap_or(TaskStatus::Running)))
            }
            StatusCode::NOT_FOUND => Err(BackendError::NotFound { task_id }),
            status => Err(TransportError::Http {
                message: format!("unexpected {status} from result"),
            }
            .into()),
        }
    }
}

struct SseState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<PlanEvent>,
    finished: bool,
}

fn sse_events(body: BoxStream<'static, reqwest::Result<Bytes>>) -> EventStream {
    let state = SseState {
        body,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };
    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => match state.decoder.push(&chunk) {
                    Ok(events) => state.pending.extend(events),
                    Err(err) => {
                        state.finished = true;
                        return Some((Err(err), state));
                    }
                },
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(http_error(err)), state));
                }
                None => state.finished = true,
            }
        }
    })
    .boxed()
}

/// Incremental `text/event-stream` parser for plan events.
///
/// Chunks may split lines, and UTF-8 sequences, anywhere; bytes are buffered
/// until a full line arrives. Frames end on a blank line; `data:` lines
/// within a frame are joined with newlines. Comments and `event:` lines are
/// skipped since the JSON payload carries its own type.
#[derive(Debug, Default)]
pub struct SseDecoder {
    partial_line: BytesMut,
    data: Vec<String>,
    frames: usize,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<PlanEvent>, TransportError> {
        self.partial_line.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.partial_line.iter().position(|byte| *byte == b'\n') {
            let raw = self.partial_line.split_to(newline + 1);
            let line = std::str::from_utf8(&raw[..newline]).map_err(|err| {
                TransportError::Decode {
                    message: format!("event stream is not valid UTF-8: {err}"),
                }
            })?;
            let line = line.trim_end_matches('\r');

            if line.is_empty() {
                if let Some(event) = self.dispatch()? {
                    events.push(event);
                }
            } else if line.starts_with(':') {
                continue;
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data
                    .push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
        }
        Ok(events)
    }

    fn dispatch(&mut self) -> Result<Option<PlanEvent>, TransportError> {
        if self.data.is_empty() {
            return Ok(None);
        }
        let payload = self.data.join("\n");
        self.data.clear();
        self.frames += 1;
        debug!(frame = self.frames, bytes = payload.len(), "sse frame");
        serde_json::from_str(&payload)
            .map(Some)
            .map_err(|err| TransportError::Decode {
                message: err.to_string(),
            })
    }
}
