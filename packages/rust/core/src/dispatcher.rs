//! Request dispatcher: the front door between connections and the pool.
//!
//! Accepting a message is cheap and never waits on the pool. Admitted
//! requests run on their own task, so a slow question never holds up others.
//! Admission itself is bounded by `max_pending`.

use std::sync::Arc;
use std::time::Duration;

use deepqa_shared::{DeepQaError, ServerConfig};
use serde_json::json;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::pool::PipelinePool;

// ---------------------------------------------------------------------------
// Wire messages
// ---------------------------------------------------------------------------

/// An inbound request, `<verb>:<payload>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `ask:<question text>`
    Ask(String),
}

impl Request {
    /// Parse a message, splitting at the first colon.
    ///
    /// Unknown verbs and messages without a colon yield `None`.
    pub fn parse(message: &str) -> Option<Self> {
        let (verb, payload) = message.split_once(':')?;
        match verb.trim() {
            "ask" => Some(Self::Ask(payload.to_string())),
            _ => None,
        }
    }
}

/// The reply to one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Ranked answers, already serialized as a JSON array.
    Answers(String),
    /// No capacity: the submission queue was full or no instance freed up.
    Busy(String),
    /// The pipeline failed on this question.
    Failed(String),
}

impl Response {
    /// Wire form: the answer array, or `{"error": ..., "message": ...}`.
    pub fn to_json(&self) -> String {
        match self {
            Self::Answers(json) => json.clone(),
            Self::Busy(message) => json!({ "error": "busy", "message": message }).to_string(),
            Self::Failed(message) => json!({ "error": "failed", "message": message }).to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Admits requests and runs each on the pool in its own task.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<PipelinePool>,
    pending: Arc<Semaphore>,
    max_pending: usize,
    acquire_timeout: Duration,
}

impl Dispatcher {
    pub fn new(pool: Arc<PipelinePool>, config: &ServerConfig) -> Self {
        let max_pending = config.max_pending.max(1);
        Self {
            pool,
            pending: Arc::new(Semaphore::new(max_pending)),
            max_pending,
            acquire_timeout: config.acquire_timeout,
        }
    }

    /// Requests admitted and not yet answered.
    pub fn in_flight(&self) -> usize {
        self.max_pending - self.pending.available_permits()
    }

    /// Handle one inbound message, replying on `reply`.
    ///
    /// Malformed messages are ignored. Returns the handle of the task that
    /// will answer, if one was spawned.
    pub fn dispatch(&self, message: &str, reply: mpsc::Sender<String>) -> Option<JoinHandle<()>> {
        let Some(Request::Ask(text)) = Request::parse(message) else {
            debug!(error = %DeepQaError::MalformedRequest(preview(message)), "ignoring message");
            return None;
        };

        let Ok(permit) = Arc::clone(&self.pending).try_acquire_owned() else {
            warn!("submission queue full, rejecting request");
            let busy = Response::Busy("too many pending requests".to_string());
            if reply.try_send(busy.to_json()).is_err() {
                debug!("busy reply dropped, connection not accepting");
            }
            return None;
        };

        let pool = Arc::clone(&self.pool);
        let timeout = self.acquire_timeout;
        let span = info_span!("request", chars = text.chars().count());
        Some(tokio::spawn(
            async move {
                let _permit = permit;
                let response = answer(&pool, &text, timeout).await;
                if reply.send(response.to_json()).await.is_err() {
                    debug!("connection closed, response discarded");
                }
            }
            .instrument(span),
        ))
    }
}

/// Acquire an instance, run the question, and shape the reply.
pub async fn answer(pool: &PipelinePool, text: &str, acquire_timeout: Duration) -> Response {
    let mut lease = match pool.acquire(acquire_timeout).await {
        Ok(lease) => lease,
        Err(e) => {
            warn!(error = %e, "no pipeline available");
            return Response::Busy(e.to_string());
        }
    };

    let result = lease.ask_text(text).await;
    lease.release();

    match result.and_then(|q| q.ranked_json().map_err(DeepQaError::from)) {
        Ok(json) => {
            info!("request answered");
            Response::Answers(json)
        }
        Err(e) => {
            error!(error = %e, "request failed");
            Response::Failed(e.to_string())
        }
    }
}

fn preview(message: &str) -> String {
    message.chars().take(40).collect()
}
