//! Cloudsea Core Library
//!
//! A request-lifecycle engine layered over a pluggable transport. Each
//! request gets a layered configuration, request-id and timing headers, a
//! bounded retry budget, an optional per-attempt timeout and business-level
//! evaluation of the response's result code.
//!
//! # Architecture
//!
//! - [`config`] - Three-tier configuration and shared defaults
//! - [`request`] - Request/response data model and caller options
//! - [`context`] - Per-request context and cancellation cell
//! - [`plugins`] - Ordered context transforms
//! - [`task`] - Execution engine (retry, timeout, result-code evaluation)
//! - [`adapter`] - Transport contract and the bundled HTTP adapter
//! - [`client`] - Facade tying the above together
//! - [`error`] - Classified request errors

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod adapter;
pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod plugins;
pub mod request;
pub mod task;

// Re-export commonly used types
pub use adapter::{Adapter, HttpAdapter, NoopHandle, Responder, TransportFailure, TransportHandle};
pub use client::{Client, CompleteHook, FailureHook, Reply, SuccessHook};
pub use config::{Config, ConfigError, ConfigOverrides, Defaults, RetcodeKey, Whitelist};
pub use context::{RequestContext, TaskControl, TaskState, generate_request_id};
pub use error::{ErrorKind, RequestError};
pub use plugins::{Pipeline, Plugin};
pub use request::{ClientOptions, Method, RequestOptions, RequestSpec, Response, UnknownMethod};
pub use task::{DROPPED_RESPONDER_MESSAGE, Task, TaskStatus, logic_error_message};
