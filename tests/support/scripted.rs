//! In-process adapter replaying a scripted sequence of outcomes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cloudsea_core::adapter::ABORTED_MESSAGE;
use cloudsea_core::{Adapter, RequestSpec, Responder, Response, TransportHandle};
use serde_json::Value;

/// Outcome of one adapter invocation.
#[derive(Debug, Clone)]
pub enum Step {
    /// Resolve immediately.
    Resolve(u16, Value),
    /// Reject immediately.
    Reject(String),
    /// Never settle unless aborted.
    Hang,
    /// Resolve after a delay unless aborted first.
    Delayed(Duration, u16, Value),
    /// Drop the responder without settling.
    Drop,
}

impl Step {
    pub fn ok(data: Value) -> Self {
        Self::Resolve(200, data)
    }

    pub fn reject(message: &str) -> Self {
        Self::Reject(message.to_string())
    }
}

/// Adapter replaying [`Step`]s in order, repeating the last one once the
/// script runs out.
#[derive(Debug)]
pub struct ScriptedAdapter {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: AtomicUsize,
    aborts: Arc<AtomicUsize>,
    requests: Mutex<Vec<RequestSpec>>,
}

impl ScriptedAdapter {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into_iter().collect()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            aborts: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn always(step: Step) -> Arc<Self> {
        Self::new([step])
    }

    /// Number of `send` invocations.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of `abort` calls across all handles.
    pub fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<RequestSpec> {
        self.requests.lock().unwrap().clone()
    }

    fn next_step(&self) -> Step {
        let next = self.steps.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last.clone().expect("script is empty"),
        }
    }
}

impl Adapter for ScriptedAdapter {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn send(&self, request: &RequestSpec, responder: Responder) -> Box<dyn TransportHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let slot = Arc::new(Mutex::new(None));
        match self.next_step() {
            Step::Resolve(status, data) => responder.resolve(Response::new(status, data)),
            Step::Reject(message) => responder.reject(message),
            Step::Drop => drop(responder),
            Step::Hang => *slot.lock().unwrap() = Some(responder),
            Step::Delayed(delay, status, data) => {
                *slot.lock().unwrap() = Some(responder);
                let pending = Arc::clone(&slot);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let responder = pending.lock().unwrap().take();
                    if let Some(responder) = responder {
                        responder.resolve(Response::new(status, data));
                    }
                });
            }
        }

        Box::new(ScriptedHandle {
            slot,
            aborts: Arc::clone(&self.aborts),
        })
    }
}

struct ScriptedHandle {
    slot: Arc<Mutex<Option<Responder>>>,
    aborts: Arc<AtomicUsize>,
}

impl TransportHandle for ScriptedHandle {
    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        let responder = self.slot.lock().unwrap().take();
        if let Some(responder) = responder {
            responder.reject(ABORTED_MESSAGE);
        }
    }
}
