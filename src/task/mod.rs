//! Execution engine: one [`Task`] drives one [`RequestContext`] to settlement.
//!
//! A task moves through these states:
//!
//! ```text
//! Pending -> InFlight -> Succeeded
//!               |  ^
//!               v  |
//!            Retrying      (server or transport failure, budget left)
//!               |
//!               v
//!             Failed
//! ```
//!
//! Attempts run strictly one after another on the same context. A retry
//! spends one unit of `config.repeat_num`; logic errors and a missing adapter
//! are never retried.

mod response;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::adapter::{Responder, Settlement, TransportFailure};
use crate::context::{RequestContext, TaskControl};
use crate::error::RequestError;

pub use response::logic_error_message;
use response::{evaluate_retcode, normalize_retcode};

/// Rejection reported when an adapter drops its responder without settling.
pub const DROPPED_RESPONDER_MESSAGE: &str = "adapter dropped the request without settling";

/// Lifecycle state of a [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Not dispatched yet.
    Pending,
    /// An attempt is waiting on the adapter.
    InFlight,
    /// The previous attempt failed and another one is about to start.
    Retrying,
    /// Settled with a business-level success.
    Succeeded,
    /// Settled with a terminal error.
    Failed,
}

/// Owns a request context while it is being executed.
#[derive(Debug)]
pub struct Task {
    ctx: RequestContext,
    status: TaskStatus,
}

impl Task {
    /// Wraps a context in a pending task.
    #[must_use]
    pub fn new(ctx: RequestContext) -> Self {
        Self {
            ctx,
            status: TaskStatus::Pending,
        }
    }

    /// Returns the context.
    #[must_use]
    pub fn context(&self) -> &RequestContext {
        &self.ctx
    }

    /// Returns the context mutably.
    pub fn context_mut(&mut self) -> &mut RequestContext {
        &mut self.ctx
    }

    /// Releases the context.
    #[must_use]
    pub fn into_context(self) -> RequestContext {
        self.ctx
    }

    /// Returns the current state.
    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns a control sharing this task's in-flight handle.
    #[must_use]
    pub fn control(&self) -> TaskControl {
        self.ctx.task.control().clone()
    }

    /// Aborts the in-flight attempt, if any. Does not stop the retry loop.
    pub fn abort(&self) -> bool {
        self.ctx.task.control().abort()
    }

    /// Runs attempts until success, a non-retryable error or an exhausted budget.
    ///
    /// On success the context's `response` holds the normalized payload.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's [`RequestError`]. A server error stays a
    /// server error after retries run out.
    #[instrument(skip_all, fields(name = ?self.ctx.task.name))]
    pub async fn dispatch(&mut self) -> Result<(), RequestError> {
        self.prepare_url();

        loop {
            match self.attempt().await {
                Ok(()) => {
                    self.status = TaskStatus::Succeeded;
                    debug!(
                        attempts = self.ctx.task.attempts,
                        elapsed = ?self.ctx.task.elapsed,
                        "request succeeded"
                    );
                    return Ok(());
                }
                Err(error) if error.is_retryable() && self.ctx.config.repeat_num > 0 => {
                    self.ctx.config.repeat_num -= 1;
                    self.status = TaskStatus::Retrying;
                    info!(
                        url = %self.ctx.request.url,
                        attempt = self.ctx.task.attempts + 1,
                        remaining = self.ctx.config.repeat_num,
                        error = %error,
                        "retrying request"
                    );
                }
                Err(error) => {
                    self.status = TaskStatus::Failed;
                    if error.is_retryable() {
                        warn!(
                            url = %self.ctx.request.url,
                            attempts = self.ctx.task.attempts,
                            kind = %error.kind(),
                            error = %error,
                            "request failed after exhausting retries"
                        );
                    } else {
                        debug!(kind = %error.kind(), error = %error, "not retrying request");
                    }
                    return Err(error);
                }
            }
        }
    }

    /// Applies the base URL and records the query-stripped URL, once.
    fn prepare_url(&mut self) {
        if self.ctx.task.url_without_query.is_some() {
            return;
        }

        let base_url = &self.ctx.config.base_url;
        if !base_url.is_empty() && !self.ctx.request.url.starts_with("http") {
            self.ctx.request.url = format!("{base_url}{}", self.ctx.request.url);
        }

        let url = &self.ctx.request.url;
        let stripped = url.split_once('?').map_or(url.as_str(), |(path, _)| path);
        self.ctx.task.url_without_query = Some(stripped.to_string());
    }

    async fn attempt(&mut self) -> Result<(), RequestError> {
        self.status = TaskStatus::InFlight;
        self.ctx.response = None;
        self.ctx.task.attempts += 1;

        let Some(adapter) = self.ctx.config.adapter.clone() else {
            return Err(RequestError::MissingAdapter);
        };

        let deadline = self.ctx.config.timeout().map(|t| Instant::now() + t);
        let (responder, outcome) = Responder::channel();
        let control = self.ctx.task.control().clone();

        debug!(
            adapter = adapter.name(),
            method = %self.ctx.request.method,
            url = %self.ctx.request.url,
            attempt = self.ctx.task.attempts,
            "sending request"
        );
        control.install(adapter.send(&self.ctx.request, responder));
        let settled = wait_for_settlement(outcome, deadline, &control).await;
        control.clear();
        self.ctx.task.elapsed = self.ctx.elapsed_since_start();

        let mut response = settled.map_err(|failure| RequestError::transport(failure.message))?;
        if !response.is_success() {
            return Err(RequestError::server(response.status_code));
        }

        let config = &self.ctx.config;
        normalize_retcode(&mut response.data, &config.retcode_key);
        let verdict = evaluate_retcode(
            &response.data,
            &config.retcode_key,
            &config.retcode_white_list,
            config.logic_error_msg_key.as_deref(),
            &config.logic_error_msg_unknown,
        );
        self.ctx.response = Some(response);
        verdict
    }
}

/// Waits for the adapter, aborting the transport once if `deadline` passes first.
///
/// After a timeout the attempt still settles through the adapter, normally
/// as a rejection.
async fn wait_for_settlement(
    mut outcome: oneshot::Receiver<Settlement>,
    deadline: Option<Instant>,
    control: &TaskControl,
) -> Settlement {
    let received = match deadline {
        None => outcome.await,
        Some(deadline) => {
            tokio::select! {
                biased;
                received = &mut outcome => received,
                () = tokio::time::sleep_until(deadline) => {
                    debug!("attempt timed out, aborting transport");
                    control.abort();
                    outcome.await
                }
            }
        }
    };
    received.unwrap_or_else(|_| Err(TransportFailure::new(DROPPED_RESPONDER_MESSAGE)))
}
