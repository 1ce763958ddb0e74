//! Named event registry scoped to an optional target object.

use std::any::Any;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::event::{Event, EventError, EventOptions};
use crate::firer;
use crate::storage::CallbackStore;
use crate::util;

/// Errors surfaced by manager operations.
#[derive(Debug, thiserror::Error)]
pub enum EventManagerError {
    /// Fire was requested for a name with no registered event
    #[error("No event found with name: {0}")]
    NoEventFound(String),

    /// Underlying event failure
    #[error(transparent)]
    Event(#[from] EventError),
}

pub(crate) struct ManagerInner {
    events: DashMap<String, Event>,
    target: Option<Arc<dyn Any + Send + Sync>>,
}

/// Named registry of [`Event`]s.
///
/// Holds at most one event per normalized name; registering a second event
/// under the same name replaces the first and evicts its stored callback.
/// `EventManager` is a cheaply clonable handle; clones share the registry.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use tinderbox::EventManager;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let manager = EventManager::new();
/// manager.add("save", |_event, args| {
///     json!(args[0].as_i64().unwrap_or(0) * 2)
/// })?;
///
/// assert_eq!(manager.fire("save", &[json!(21)])?, Some(json!(42)));
///
/// // Events default to once: the registration is gone after the fire.
/// assert!(!manager.has("save")?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EventManager {
    inner: Arc<ManagerInner>,
}

impl EventManager {
    /// Create an empty manager with no default target.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                events: DashMap::new(),
                target: None,
            }),
        }
    }

    /// Create a manager whose events default their target to the given
    /// object.
    pub fn with_target(target: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                events: DashMap::new(),
                target: Some(target),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<ManagerInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ManagerInner> {
        Arc::downgrade(&self.inner)
    }

    /// Default target handed to events created through
    /// [`add`](EventManager::add)/[`add_with`](EventManager::add_with).
    pub fn target(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.target.clone()
    }

    /// Register a callback under a name with default options (once, no
    /// data).
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyName`] (wrapped) if the name normalizes
    /// to the empty string.
    pub fn add<F>(&self, name: &str, callback: F) -> Result<(), EventManagerError>
    where
        F: Fn(&Event, &[Value]) -> Value + Send + Sync + 'static,
    {
        self.add_with(name, callback, EventOptions::new())
    }

    /// Register a callback under a name with explicit options.
    ///
    /// An unset `target` option defaults to the manager's own target.
    pub fn add_with<F>(
        &self,
        name: &str,
        callback: F,
        mut options: EventOptions,
    ) -> Result<(), EventManagerError>
    where
        F: Fn(&Event, &[Value]) -> Value + Send + Sync + 'static,
    {
        if options.target.is_none() {
            options.target = self.inner.target.clone();
        }

        let event = Event::new(name, callback, options)?;
        self.add_event(event);
        Ok(())
    }

    /// Register an already-built event under its own normalized name,
    /// replacing any prior registration at that name.
    pub fn add_event(&self, event: Event) {
        event.set_manager(self);
        let id = event.id();
        let name = event.name().to_string();
        debug!(id = %id, name = %name, "event registered");

        if let Some(previous) = self.inner.events.insert(name, event)
            && previous.id() != id
        {
            // The replaced event can no longer be fired through this
            // manager; dropping its stored callback keeps the side table
            // leak-free.
            CallbackStore::remove(&previous.id());
            debug!(id = %previous.id(), name = %previous.name(), "replaced event evicted");
        }
    }

    /// Look up an event by name.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyName`] (wrapped) if the name normalizes
    /// to the empty string.
    pub fn get(&self, name: &str) -> Result<Option<Event>, EventManagerError> {
        let name = util::normalize_name(name)?;
        Ok(self
            .inner
            .events
            .get(&name)
            .map(|entry| entry.value().clone()))
    }

    /// Remove a registration by name, evicting its stored callback.
    ///
    /// Removing a name with no registration is a no-op.
    pub fn remove(&self, name: &str) -> Result<(), EventManagerError> {
        let name = util::normalize_name(name)?;
        if let Some((_, event)) = self.inner.events.remove(&name) {
            // Manual removal before any fire must not leak the callback.
            CallbackStore::remove(&event.id());
            debug!(id = %event.id(), name = %name, "event removed");
        }

        Ok(())
    }

    /// Whether an event is registered under a name.
    pub fn has(&self, name: &str) -> Result<bool, EventManagerError> {
        let name = util::normalize_name(name)?;
        Ok(self.inner.events.contains_key(&name))
    }

    /// Fire an event by name with call-time arguments.
    ///
    /// # Errors
    ///
    /// Returns [`EventManagerError::NoEventFound`] when nothing is
    /// registered under the name; event-level failures are passed through.
    pub fn fire(&self, name: &str, args: &[Value]) -> Result<Option<Value>, EventManagerError> {
        let name = util::normalize_name(name)?;

        // Capture the handle before invoking: once-removal mutates the map
        // while the dispatch is in flight.
        let event = self
            .inner
            .events
            .get(&name)
            .map(|entry| entry.value().clone())
            .ok_or(EventManagerError::NoEventFound(name))?;

        Ok(firer::fire(&event, args)?)
    }

    /// Build an event without registering it anywhere.
    pub fn create_event<F>(
        name: &str,
        callback: F,
        options: EventOptions,
    ) -> Result<Event, EventError>
    where
        F: Fn(&Event, &[Value]) -> Value + Send + Sync + 'static,
    {
        Event::new(name, callback, options)
    }

    /// Fire an event that need not belong to any manager.
    pub fn fire_event(event: &Event, args: &[Value]) -> Result<Option<Value>, EventError> {
        firer::fire(event, args)
    }

    /// Number of registered events.
    pub fn len(&self) -> usize {
        self.inner.events.len()
    }

    /// Whether no events are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.events.is_empty()
    }

    /// Drop every registration, evicting all stored callbacks.
    pub fn clear(&self) {
        let ids: Vec<Uuid> = self
            .inner
            .events
            .iter()
            .map(|entry| entry.value().id())
            .collect();
        self.inner.events.clear();

        for id in &ids {
            CallbackStore::remove(id);
        }
        debug!(count = ids.len(), "manager cleared");
    }

    /// Once-removal path: drop the registration only if it still holds the
    /// same event, so a replacement registered mid-dispatch survives.
    pub(crate) fn discard(&self, event: &Event) {
        self.inner
            .events
            .remove_if(event.name(), |_, stored| stored.id() == event.id());
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

/// `on`/`off` convenience for host objects that own an [`EventManager`].
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use tinderbox::{Emitter, EventManager};
///
/// struct Button {
///     events: EventManager,
/// }
///
/// impl Emitter for Button {
///     fn event_manager(&self) -> &EventManager {
///         &self.events
///     }
/// }
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let button = Button { events: EventManager::new() };
/// button.on("click", |_event, _args| json!("clicked"))?;
/// assert!(button.event_manager().has("click")?);
///
/// button.off("click")?;
/// assert!(!button.event_manager().has("click")?);
/// # Ok(())
/// # }
/// ```
pub trait Emitter {
    /// The manager events are routed through.
    fn event_manager(&self) -> &EventManager;

    /// Register a callback under a name with default options.
    fn on<F>(&self, name: &str, callback: F) -> Result<(), EventManagerError>
    where
        F: Fn(&Event, &[Value]) -> Value + Send + Sync + 'static,
    {
        self.event_manager().add(name, callback)
    }

    /// Remove a registration by name.
    fn off(&self, name: &str) -> Result<(), EventManagerError> {
        self.event_manager().remove(name)
    }
}
