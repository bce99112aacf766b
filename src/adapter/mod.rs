//! Transport adapter contract.
//!
//! An [`Adapter`] bridges the execution engine to an actual transport. The
//! engine calls [`Adapter::send`] once per attempt with the request and a
//! [`Responder`]; the adapter settles the responder exactly once, from any
//! thread or task, and returns a [`TransportHandle`] the engine can use to
//! abort the call (on timeout or on explicit cancellation).
//!
//! Aborting is advisory. An adapter that honors it should settle the
//! responder with a rejection; a responder dropped without being settled is
//! treated by the engine as a rejection too.
//!
//! # Example
//!
//! ```
//! use cloudsea_core::adapter::{Adapter, NoopHandle, Responder, TransportHandle};
//! use cloudsea_core::{RequestSpec, Response};
//! use serde_json::json;
//!
//! struct Echo;
//!
//! impl Adapter for Echo {
//!     fn name(&self) -> &'static str {
//!         "echo"
//!     }
//!
//!     fn send(&self, request: &RequestSpec, responder: Responder) -> Box<dyn TransportHandle> {
//!         responder.resolve(Response::new(200, json!({"retcode": 0, "url": request.url})));
//!         Box::new(NoopHandle)
//!     }
//! }
//! ```

mod http;

use tokio::sync::oneshot;

use crate::request::{RequestSpec, Response};

pub use http::{ABORTED_MESSAGE, HttpAdapter};

/// Environment-supplied transport.
pub trait Adapter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Starts one transport call and returns a handle that can abort it.
    fn send(&self, request: &RequestSpec, responder: Responder) -> Box<dyn TransportHandle>;
}

/// Cancellable handle to one in-flight transport call.
///
/// `abort` may be called after the call has settled and must then do nothing.
pub trait TransportHandle: Send + Sync {
    /// Asks the transport to abandon the call.
    fn abort(&self);
}

/// Handle for transports with nothing to cancel.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHandle;

impl TransportHandle for NoopHandle {
    fn abort(&self) {}
}

/// Reason an adapter rejected an attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TransportFailure {
    /// Human-readable reason.
    pub message: String,
}

impl TransportFailure {
    /// Creates a failure with the given reason.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for TransportFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for TransportFailure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

pub(crate) type Settlement = Result<Response, TransportFailure>;

/// One-shot settlement callback handed to [`Adapter::send`].
#[derive(Debug)]
pub struct Responder {
    tx: oneshot::Sender<Settlement>,
}

impl Responder {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Settlement>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Settles the attempt with a transport response (any status code).
    pub fn resolve(self, response: Response) {
        // The engine may have stopped listening; a late settlement is dropped.
        let _ = self.tx.send(Ok(response));
    }

    /// Settles the attempt with a transport failure.
    pub fn reject(self, failure: impl Into<TransportFailure>) {
        let _ = self.tx.send(Err(failure.into()));
    }

    /// Whether the engine has stopped waiting for this attempt.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
