//! Reflective handler discovery, generalized to a builder-registered table.
//!
//! The original framework discovers handler methods by reflecting over an
//! agent class at startup. Without reflection, the same event-type-tag to
//! ordered-handler-list mapping is built once per agent type via an
//! explicit builder, producing an immutable table consulted by the kernel
//! on every dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use gagent_primitives::EventEnvelope;

/// Invoked by the kernel with one envelope that matched this handler's
/// registration.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handles the envelope. Errors are logged and counted but never abort
    /// dispatch of subsequent handlers.
    async fn handle(&self, envelope: &EventEnvelope) -> HandlerOutcome;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Send + Sync + Fn(&EventEnvelope) -> Fut,
    Fut: Future<Output = HandlerOutcome> + Send,
{
    async fn handle(&self, envelope: &EventEnvelope) -> HandlerOutcome {
        (self)(envelope).await
    }
}

/// Reserved event type a configuration handler registers under, and the
/// type [`gagent_kernel::GAgentKernel::publish_config`] publishes on —
/// the "dedicated configuration event path" distinct from arbitrary
/// user event types.
pub const CONFIG_EVENT_TYPE: &str = "__config__";

/// Result of running one handler against one envelope.
pub type HandlerOutcome = Result<(), HandlerFailure>;

/// A handler-reported failure. Carries enough context for the kernel to
/// log and count it without halting dispatch.
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    reason: String,
}

impl HandlerFailure {
    /// Creates a failure from a human-readable reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Returns the failure reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for HandlerFailure {}

/// A single registered handler with its dispatch metadata.
#[derive(Clone)]
pub struct HandlerEntry {
    priority: i32,
    allow_self: bool,
    declaration_order: usize,
    handler: Arc<dyn EventHandler>,
}

impl HandlerEntry {
    /// Returns the ascending dispatch priority.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns whether this handler may observe an envelope this agent
    /// itself originated.
    #[must_use]
    pub fn allow_self(&self) -> bool {
        self.allow_self
    }

    /// Runs the handler.
    pub async fn invoke(&self, envelope: &EventEnvelope) -> HandlerOutcome {
        self.handler.handle(envelope).await
    }
}

/// Immutable, priority-ordered `event_type -> handlers` table plus a
/// catch-all list, built once per agent type and shared across every
/// activation of that type.
#[derive(Clone, Default)]
pub struct HandlerTable {
    by_type: HashMap<String, Vec<HandlerEntry>>,
    catch_all: Vec<HandlerEntry>,
}

impl HandlerTable {
    /// Starts building a table.
    #[must_use]
    pub fn builder() -> HandlerTableBuilder {
        HandlerTableBuilder::default()
    }

    /// Resolves the priority-ordered handler list for `event_type`,
    /// combining its typed handlers with the all-events catch list.
    ///
    /// Ties are broken by declaration order, matching the order
    /// registrations were added to the builder.
    #[must_use]
    pub fn resolve(&self, event_type: &str) -> Vec<&HandlerEntry> {
        let mut resolved: Vec<&HandlerEntry> = self
            .by_type
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .chain(self.catch_all.iter())
            .collect();

        resolved.sort_by_key(|entry| (entry.priority, entry.declaration_order));
        resolved
    }

    /// Returns whether any handler — typed or catch-all — would match
    /// `event_type`.
    #[must_use]
    pub fn has_handler_for(&self, event_type: &str) -> bool {
        self.by_type.contains_key(event_type) || !self.catch_all.is_empty()
    }
}

/// Builder for a [`HandlerTable`], used once per agent type at
/// registration time.
#[derive(Default)]
pub struct HandlerTableBuilder {
    by_type: HashMap<String, Vec<HandlerEntry>>,
    catch_all: Vec<HandlerEntry>,
    next_order: usize,
}

impl HandlerTableBuilder {
    /// Registers a typed handler for `event_type`.
    #[must_use]
    pub fn on_event(
        mut self,
        event_type: impl Into<String>,
        priority: i32,
        allow_self: bool,
        handler: impl EventHandler + 'static,
    ) -> Self {
        let entry = self.entry(priority, allow_self, handler);
        self.by_type.entry(event_type.into()).or_default().push(entry);
        self
    }

    /// Registers an all-events catch-all handler.
    #[must_use]
    pub fn on_all_events(
        mut self,
        priority: i32,
        allow_self: bool,
        handler: impl EventHandler + 'static,
    ) -> Self {
        let entry = self.entry(priority, allow_self, handler);
        self.catch_all.push(entry);
        self
    }

    /// Registers a configuration handler: a typed handler under the
    /// reserved [`CONFIG_EVENT_TYPE`] tag rather than a user event type,
    /// matching "a method annotated as configuration handler registers
    /// under the config type". Always `allow_self = true` — a
    /// self-originated config update is the common case, since config is
    /// normally published by the owning agent onto its own stream.
    #[must_use]
    pub fn on_config(self, priority: i32, handler: impl EventHandler + 'static) -> Self {
        self.on_event(CONFIG_EVENT_TYPE, priority, true, handler)
    }

    fn entry(
        &mut self,
        priority: i32,
        allow_self: bool,
        handler: impl EventHandler + 'static,
    ) -> HandlerEntry {
        let declaration_order = self.next_order;
        self.next_order += 1;
        HandlerEntry {
            priority,
            allow_self,
            declaration_order,
            handler: Arc::new(handler),
        }
    }

    /// Finalizes the table.
    #[must_use]
    pub fn build(self) -> HandlerTable {
        HandlerTable {
            by_type: self.by_type,
            catch_all: self.catch_all,
        }
    }
}
