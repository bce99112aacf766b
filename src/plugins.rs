//! Ordered plugin pipeline over [`RequestContext`].
//!
//! Plugins run strictly in registration order, each receiving the previous
//! plugin's output. There is no removal and no priority; an empty pipeline
//! returns its input unchanged.

use std::fmt;

use tracing::trace;

use crate::context::RequestContext;

/// A context transform.
pub type Plugin = Box<dyn Fn(RequestContext) -> RequestContext + Send + Sync>;

/// Linear list of context transforms.
#[derive(Default)]
pub struct Pipeline {
    handlers: Vec<Plugin>,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl Pipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a plugin.
    pub fn register<F>(&mut self, plugin: F)
    where
        F: Fn(RequestContext) -> RequestContext + Send + Sync + 'static,
    {
        self.handlers.push(Box::new(plugin));
    }

    /// Returns the number of registered plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if no plugins are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Folds the context through every plugin in order.
    #[must_use]
    pub fn apply(&self, ctx: RequestContext) -> RequestContext {
        trace!(plugins = self.handlers.len(), "applying pipeline");
        self.handlers.iter().fold(ctx, |ctx, plugin| plugin(ctx))
    }
}
