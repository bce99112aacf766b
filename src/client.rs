//! Client facade: configuration layering, plugins, hooks and cancellation.
//!
//! A [`Client`] turns [`RequestOptions`] into a [`RequestContext`], runs the
//! request plugins, hands the context to a [`Task`] and post-processes the
//! settlement:
//!
//! ```text
//! options -> merge config -> context -> request plugins -> Task::dispatch
//!                                                             |
//!                        complete hook  <---------------------+
//!                          |                 |
//!                        Ok                 Err
//!                          |                 |
//!          response plugins, success hook   failure hook
//! ```
//!
//! Named requests are tracked while in flight so [`Client::abort`] can reach
//! them.

use std::fmt;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::{Config, ConfigOverrides, Defaults};
use crate::context::{RequestContext, TaskControl};
use crate::error::RequestError;
use crate::plugins::Pipeline;
use crate::request::{ClientOptions, Method, RequestOptions, RequestSpec};
use crate::task::Task;

/// Called after every settlement, before any other post-processing.
pub type CompleteHook = Box<dyn Fn(&RequestContext, Option<&RequestError>) + Send + Sync>;

/// Called after the response plugins on success. `Some` replaces the reply.
pub type SuccessHook = Box<dyn Fn(&RequestContext) -> Option<Value> + Send + Sync>;

/// Called on failure. `Some` replaces the error returned to the caller.
pub type FailureHook =
    Box<dyn Fn(&RequestError, &RequestContext) -> Option<RequestError> + Send + Sync>;

/// Value a successful request resolves to.
#[derive(Debug, Clone)]
pub enum Reply {
    /// The settled context, response populated.
    Context(Box<RequestContext>),
    /// A replacement value produced by the success hook.
    Value(Value),
}

impl Reply {
    /// Returns the settled context, unless the success hook replaced it.
    #[must_use]
    pub fn context(&self) -> Option<&RequestContext> {
        match self {
            Self::Context(ctx) => Some(&**ctx),
            Self::Value(_) => None,
        }
    }

    /// Returns the response payload or the replacement value.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Context(ctx) => ctx.response.map_or(Value::Null, |r| r.data),
            Self::Value(value) => value,
        }
    }

    /// Deserializes [`into_value`](Self::into_value) into `T`.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error when the value does not fit `T`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.into_value())
    }
}

#[derive(Default)]
struct Hooks {
    complete: Option<CompleteHook>,
    success: Option<SuccessHook>,
    failure: Option<FailureHook>,
}

/// Request client.
///
/// Register plugins and hooks up front (they need `&mut self`), then share
/// the client, typically behind an `Arc`, to issue concurrent requests.
///
/// ```no_run
/// use cloudsea_core::{Client, ClientOptions, ConfigOverrides, RequestOptions};
///
/// # async fn run() -> Result<(), cloudsea_core::RequestError> {
/// let mut client = Client::new(ClientOptions::new().ext(ConfigOverrides {
///     base_url: Some("https://api.example.com".into()),
///     ..ConfigOverrides::default()
/// }));
/// client.on_success(|ctx| ctx.response_data().map(|data| data["result"].clone()));
///
/// let user = client.get(RequestOptions::new("/v1/user/42")).await?.into_value();
/// println!("{user}");
/// # Ok(())
/// # }
/// ```
pub struct Client {
    defaults: Defaults,
    options: ClientOptions,
    req: Pipeline,
    res: Pipeline,
    in_flight: DashMap<String, TaskControl>,
    hooks: Hooks,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("defaults", &self.defaults)
            .field("options", &self.options)
            .field("req", &self.req)
            .field("res", &self.res)
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new(ClientOptions::default())
    }
}

impl Client {
    /// Creates a client with its own defaults.
    #[must_use]
    pub fn new(options: ClientOptions) -> Self {
        Self::with_defaults(Defaults::default(), options)
    }

    /// Creates a client over shared defaults.
    #[must_use]
    pub fn with_defaults(defaults: Defaults, options: ClientOptions) -> Self {
        Self {
            defaults,
            options,
            req: Pipeline::new(),
            res: Pipeline::new(),
            in_flight: DashMap::new(),
            hooks: Hooks::default(),
        }
    }

    /// Returns the shared defaults tier.
    #[must_use]
    pub fn defaults(&self) -> &Defaults {
        &self.defaults
    }

    /// Overlays `layer` onto the shared defaults.
    ///
    /// Every client sharing these defaults sees the change on its next request.
    pub fn set_config(&self, layer: &ConfigOverrides) {
        self.defaults.merge(layer);
    }

    /// Appends a plugin run on every context before dispatch.
    pub fn use_request_plugin<F>(&mut self, plugin: F) -> &mut Self
    where
        F: Fn(RequestContext) -> RequestContext + Send + Sync + 'static,
    {
        self.req.register(plugin);
        self
    }

    /// Appends a plugin run on every successfully settled context.
    pub fn use_response_plugin<F>(&mut self, plugin: F) -> &mut Self
    where
        F: Fn(RequestContext) -> RequestContext + Send + Sync + 'static,
    {
        self.res.register(plugin);
        self
    }

    /// Sets the hook called after every settlement.
    pub fn on_complete<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&RequestContext, Option<&RequestError>) + Send + Sync + 'static,
    {
        self.hooks.complete = Some(Box::new(hook));
        self
    }

    /// Sets the success hook.
    pub fn on_success<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&RequestContext) -> Option<Value> + Send + Sync + 'static,
    {
        self.hooks.success = Some(Box::new(hook));
        self
    }

    /// Sets the failure hook.
    pub fn on_failure<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&RequestError, &RequestContext) -> Option<RequestError> + Send + Sync + 'static,
    {
        self.hooks.failure = Some(Box::new(hook));
        self
    }

    /// Issues a request.
    ///
    /// # Errors
    ///
    /// Returns the engine's [`RequestError`], or the failure hook's replacement.
    #[instrument(skip_all, fields(url = %options.url, name = ?options.name))]
    pub async fn request(&self, options: RequestOptions) -> Result<Reply, RequestError> {
        let RequestOptions {
            method,
            url,
            header,
            data,
            extra,
            ext,
            name,
        } = options;

        let config = Config::layered(&self.defaults.snapshot(), &self.options.ext, &ext);

        let mut merged_header = self.options.header.clone();
        merged_header.extend(header);
        let mut merged_extra = self.options.extra.clone();
        merged_extra.extend(extra);

        let request = RequestSpec {
            method: method.or(self.options.method).unwrap_or_default(),
            url,
            header: merged_header,
            data,
            extra: merged_extra,
        };

        let ctx = RequestContext::new(request, config, name);
        let registration = Registration::new(&self.in_flight, &ctx);
        let mut task = Task::new(self.req.apply(ctx));

        let outcome = task.dispatch().await;
        drop(registration);

        let ctx = task.into_context();
        if let Some(hook) = &self.hooks.complete {
            hook(&ctx, outcome.as_ref().err());
        }

        match outcome {
            Ok(()) => {
                let ctx = self.res.apply(ctx);
                if let Some(hook) = &self.hooks.success
                    && let Some(value) = hook(&ctx)
                {
                    return Ok(Reply::Value(value));
                }
                Ok(Reply::Context(Box::new(ctx)))
            }
            Err(error) => match &self.hooks.failure {
                Some(hook) => Err(hook(&error, &ctx).unwrap_or(error)),
                None => Err(error),
            },
        }
    }

    /// Issues a request with the given verb.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn method(
        &self,
        method: Method,
        options: RequestOptions,
    ) -> Result<Reply, RequestError> {
        self.request(RequestOptions {
            method: Some(method),
            ..options
        })
        .await
    }

    /// Issues a `GET` request.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get(&self, options: RequestOptions) -> Result<Reply, RequestError> {
        self.method(Method::Get, options).await
    }

    /// Issues a `POST` request.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn post(&self, options: RequestOptions) -> Result<Reply, RequestError> {
        self.method(Method::Post, options).await
    }

    /// Aborts the named in-flight request, or every one when `name` is `None`.
    ///
    /// Unknown names are ignored. Aborted attempts fail like any transport
    /// error and may still be retried. Returns the number of transport
    /// handles aborted.
    pub fn abort(&self, name: Option<&str>) -> usize {
        let controls: Vec<TaskControl> = match name {
            Some(name) => self
                .in_flight
                .get(name)
                .map(|entry| entry.value().clone())
                .into_iter()
                .collect(),
            None => self
                .in_flight
                .iter()
                .map(|entry| entry.value().clone())
                .collect(),
        };

        // Shard locks are released before any adapter code runs.
        let aborted = controls.iter().filter(|control| control.abort()).count();
        debug!(?name, aborted, "abort requested");
        aborted
    }

    /// Names of the tracked in-flight requests.
    #[must_use]
    pub fn in_flight(&self) -> Vec<String> {
        self.in_flight
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}

/// Registry entry for a named request, removed on drop.
///
/// A later request reusing the name replaces the entry; the earlier request
/// then leaves the newer entry in place when it settles.
struct Registration<'a> {
    registry: &'a DashMap<String, TaskControl>,
    entry: Option<(String, TaskControl)>,
}

impl<'a> Registration<'a> {
    fn new(registry: &'a DashMap<String, TaskControl>, ctx: &RequestContext) -> Self {
        let entry = ctx.task.name.clone().map(|name| {
            let control = ctx.task.control().clone();
            registry.insert(name.clone(), control.clone());
            (name, control)
        });
        Self { registry, entry }
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if let Some((name, control)) = &self.entry {
            self.registry
                .remove_if(name, |_, current| current.same_as(control));
        }
    }
}
