//! Per-request context threaded through plugins, the engine and hooks.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde_json::Value;
use tracing::trace;

use crate::adapter::TransportHandle;
use crate::config::{Config, REQUEST_ID_HEADER, REQUEST_TIME_HEADER};
use crate::request::{RequestSpec, Response};

/// Mutable record of one logical request.
///
/// Built once per request by the [`Client`](crate::Client), owned by its
/// [`Task`](crate::Task) while in flight and lent to plugins and hooks.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The request handed to the adapter.
    pub request: RequestSpec,
    /// The latest 2xx transport response; `None` until one arrives.
    pub response: Option<Response>,
    /// Resolved configuration. `repeat_num` counts down as retries are spent.
    pub config: Config,
    /// Runtime state.
    pub task: TaskState,
}

impl RequestContext {
    /// Builds a context, attaching the request-time header and, when
    /// `config.x_request_id` is set, a request-id header.
    ///
    /// Headers already present on `request` are kept.
    #[must_use]
    pub fn new(mut request: RequestSpec, config: Config, name: Option<String>) -> Self {
        if config.x_request_id {
            request
                .header
                .entry(REQUEST_ID_HEADER.to_string())
                .or_insert_with(generate_request_id);
        }
        request
            .header
            .entry(REQUEST_TIME_HEADER.to_string())
            .or_insert_with(|| now_millis().to_string());
        trace!(url = %request.url, ?name, "context created");

        Self {
            request,
            response: None,
            config,
            task: TaskState::named(name),
        }
    }

    /// Returns the response payload, if a response arrived.
    #[must_use]
    pub fn response_data(&self) -> Option<&Value> {
        self.response.as_ref().map(|r| &r.data)
    }

    /// Time since the request-time header was stamped.
    ///
    /// `None` when the header is missing or unparseable (a plugin may have
    /// rewritten it).
    #[must_use]
    pub fn elapsed_since_start(&self) -> Option<Duration> {
        let started: u64 = self.request.header.get(REQUEST_TIME_HEADER)?.parse().ok()?;
        Some(Duration::from_millis(now_millis().saturating_sub(started)))
    }
}

/// Runtime-only state of a request.
#[derive(Debug, Clone, Default)]
pub struct TaskState {
    /// Registry name, used for cancellation.
    pub name: Option<String>,
    /// Elapsed time measured at the latest settlement.
    pub elapsed: Option<Duration>,
    /// Number of adapter invocations so far.
    pub attempts: u32,
    /// The dispatched URL without its query string.
    pub url_without_query: Option<String>,
    control: TaskControl,
}

impl TaskState {
    fn named(name: Option<String>) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Returns the cancellation cell shared with the client registry.
    #[must_use]
    pub fn control(&self) -> &TaskControl {
        &self.control
    }
}

/// Shared cell holding the in-flight transport handle of one request.
///
/// Clones share the cell, which is how the client registry reaches a
/// request's current attempt.
#[derive(Clone, Default)]
pub struct TaskControl {
    current: Arc<Mutex<Option<Arc<dyn TransportHandle>>>>,
}

impl fmt::Debug for TaskControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskControl")
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}

impl TaskControl {
    /// Aborts the current transport call, if any.
    ///
    /// Returns whether a handle was present. The handle stays installed, so
    /// the attempt still settles through the adapter.
    pub fn abort(&self) -> bool {
        let handle = self.lock().clone();
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Whether a transport call is currently installed.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.lock().is_some()
    }

    /// Whether both controls share the same cell.
    #[must_use]
    pub fn same_as(&self, other: &TaskControl) -> bool {
        Arc::ptr_eq(&self.current, &other.current)
    }

    pub(crate) fn install(&self, handle: Box<dyn TransportHandle>) {
        *self.lock() = Some(Arc::from(handle));
    }

    pub(crate) fn clear(&self) {
        self.lock().take();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn TransportHandle>>> {
        // The guarded value is a plain Option; a poisoned lock still holds a usable one.
        self.current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Generates 16 random bytes rendered as 32 lowercase hex characters.
#[must_use]
pub fn generate_request_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().r#gen();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[allow(clippy::cast_possible_truncation)]
fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
